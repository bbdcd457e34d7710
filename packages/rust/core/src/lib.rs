//! Core pipeline orchestration and domain logic for docweave.
//!
//! This crate ties together environment bootstrap, source discovery, the
//! doc-comment parser, post-processing and template rendering into one
//! command-line run (see [`pipeline::Pipeline`]), and exposes the same parse
//! sequence to embedding hosts through [`session::Session`].

pub mod extensions;
pub mod parser;
pub mod pipeline;
pub mod plugins;
pub mod postprocess;
pub mod publish;
pub mod reporter;
pub mod runtime;
pub mod session;
pub mod tutorials;
