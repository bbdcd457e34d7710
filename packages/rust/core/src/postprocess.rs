//! Post-processing over the parsed doclet buffer: index, augment, borrow.

use std::collections::{BTreeMap, HashSet};

use docweave_shared::{Doclet, DocletCollection, DocletKind, Scope};
use tracing::{debug, instrument, warn};

/// The three post-parse passes, run in order by the orchestrator.
pub trait PostProcessor {
    /// Build the longname index.
    fn index(&mut self, doclets: &mut DocletCollection);
    /// Apply mixins, inheritance and implemented interfaces.
    fn augment(&mut self, doclets: &mut DocletCollection);
    /// Materialize `@borrows` declarations as members of the borrower.
    fn resolve_borrows(&mut self, doclets: &mut DocletCollection);
}

/// The built-in post-processor.
#[derive(Debug, Default)]
pub struct StandardPostProcessor;

impl PostProcessor for StandardPostProcessor {
    #[instrument(skip_all, fields(doclets = doclets.len()))]
    fn index(&mut self, doclets: &mut DocletCollection) {
        doclets.reindex();
        debug!("indexed doclets");
    }

    #[instrument(skip_all, fields(doclets = doclets.len()))]
    fn augment(&mut self, doclets: &mut DocletCollection) {
        add_mixed_in(doclets);
        add_inherited(doclets);
        add_implemented(doclets);
        doclets.reindex();
    }

    #[instrument(skip_all, fields(doclets = doclets.len()))]
    fn resolve_borrows(&mut self, doclets: &mut DocletCollection) {
        let mut added = Vec::new();

        for i in 0..doclets.len() {
            let Some(borrower) = doclets.get(i) else { continue };
            if borrower.borrowed.is_empty() {
                continue;
            }

            for borrow in &borrower.borrowed {
                let Some(source) = doclets.by_longname(&borrow.from).into_iter().next() else {
                    debug!(from = %borrow.from, borrower = %borrower.longname, "borrow source not found");
                    continue;
                };

                let (scope, name) = split_scoped_name(&borrow.as_name);
                let mut clone = source.clone();
                clone.name = name.to_string();
                clone.set_member_of(&borrower.longname, scope);
                added.push(clone);
            }
        }

        for i in 0..doclets.len() {
            if let Some(doclet) = doclets.get_mut(i) {
                doclet.borrowed.clear();
            }
        }

        debug!(borrowed = added.len(), "resolved borrows");
        for doclet in added {
            doclets.push(doclet);
        }
    }
}

/// Split `#name`, `~name` or `name` into a scope and bare name.
fn split_scoped_name(name: &str) -> (Scope, &str) {
    if let Some(rest) = name.strip_prefix('#') {
        (Scope::Instance, rest)
    } else if let Some(rest) = name.strip_prefix('~') {
        (Scope::Inner, rest)
    } else {
        (Scope::Static, name.strip_prefix('.').unwrap_or(name))
    }
}

fn has_member(doclets: &DocletCollection, parent: &str, name: &str, scope: Option<Scope>) -> bool {
    doclets
        .members_of(parent)
        .any(|m| m.name == name && m.scope == scope)
}

/// Copy `source` members onto `target`, skipping names `target` already has.
fn copy_members(
    doclets: &mut DocletCollection,
    source: &str,
    target: &str,
    scope_for: impl Fn(&Doclet) -> Scope,
    mark: impl Fn(&mut Doclet, &Doclet),
) -> usize {
    let members: Vec<Doclet> = doclets
        .members_of(source)
        .filter(|m| m.scope != Some(Scope::Inner))
        .cloned()
        .collect();

    let mut copied = 0;
    for member in members {
        let scope = scope_for(&member);
        if has_member(doclets, target, &member.name, Some(scope)) {
            continue;
        }
        let mut clone = member.clone();
        clone.set_member_of(target, scope);
        mark(&mut clone, &member);
        doclets.push(clone);
        copied += 1;
    }
    copied
}

fn add_mixed_in(doclets: &mut DocletCollection) {
    let targets: Vec<(String, DocletKind, Vec<String>)> = doclets
        .iter()
        .filter(|d| !d.mixes.is_empty())
        .map(|d| (d.longname.clone(), d.kind, d.mixes.clone()))
        .collect();

    for (target, kind, mixins) in targets {
        for mixin in mixins {
            let copied = copy_members(
                doclets,
                &mixin,
                &target,
                |m| match (kind, m.scope) {
                    (DocletKind::Class, _) => Scope::Instance,
                    (_, Some(scope)) => scope,
                    (_, None) => Scope::Static,
                },
                |clone, _| clone.mixed = true,
            );
            debug!(%target, %mixin, copied, "mixed in members");
        }
    }
}

/// Parents before children; doclets caught in a cycle are left out.
fn inheritance_order(doclets: &DocletCollection) -> Vec<(String, Vec<String>)> {
    let graph: BTreeMap<String, Vec<String>> = doclets
        .iter()
        .filter(|d| !d.augments.is_empty())
        .map(|d| (d.longname.clone(), d.augments.clone()))
        .collect();

    let mut order = Vec::new();
    let mut done = HashSet::new();
    let mut visiting = HashSet::new();

    fn visit(
        node: &str,
        graph: &BTreeMap<String, Vec<String>>,
        done: &mut HashSet<String>,
        visiting: &mut HashSet<String>,
        order: &mut Vec<(String, Vec<String>)>,
    ) -> bool {
        if done.contains(node) {
            return true;
        }
        let Some(parents) = graph.get(node) else {
            return true;
        };
        if !visiting.insert(node.to_string()) {
            warn!(doclet = node, "circular inheritance, skipping");
            return false;
        }
        let acyclic = parents
            .iter()
            .fold(true, |ok, parent| visit(parent, graph, done, visiting, order) && ok);
        visiting.remove(node);
        done.insert(node.to_string());
        if acyclic {
            order.push((node.to_string(), parents.clone()));
        }
        acyclic
    }

    for node in graph.keys() {
        visit(node, &graph, &mut done, &mut visiting, &mut order);
    }
    order
}

fn add_inherited(doclets: &mut DocletCollection) {
    for (child, parents) in inheritance_order(doclets) {
        for parent in parents {
            let copied = copy_members(
                doclets,
                &parent,
                &child,
                |m| m.scope.unwrap_or(Scope::Instance),
                |clone, original| {
                    clone.inherited = true;
                    clone.inherits = Some(original.longname.clone());
                    clone.mixed = false;
                },
            );
            debug!(%child, %parent, copied, "inherited members");
        }
    }
}

fn add_implemented(doclets: &mut DocletCollection) {
    let implementors: Vec<(String, Vec<String>)> = doclets
        .iter()
        .filter(|d| d.kind == DocletKind::Class && !d.implements.is_empty())
        .map(|d| (d.longname.clone(), d.implements.clone()))
        .collect();

    for (class, interfaces) in implementors {
        for interface in interfaces {
            let interface_members: Vec<Doclet> = doclets.members_of(&interface).cloned().collect();

            for member in interface_members {
                let positions: Vec<usize> = (0..doclets.len())
                    .filter(|&i| {
                        doclets.get(i).is_some_and(|d| {
                            d.memberof.as_deref() == Some(class.as_str()) && d.name == member.name
                        })
                    })
                    .collect();

                for i in positions {
                    let Some(own) = doclets.get_mut(i) else { continue };
                    if own.description.is_none() {
                        own.description = member.description.clone();
                    }
                    if !own.implements.contains(&member.longname) {
                        own.implements.push(member.longname.clone());
                    }
                }
            }
        }
    }
}
