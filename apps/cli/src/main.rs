//! docweave CLI: generate reference documentation from annotated sources.

mod commands;

use std::process::ExitCode;

use color_eyre::eyre::Result;

fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    commands::run()
}
