//! The Composition Planner: rewrites the dependency graph so customization
//! packs are slotted in ahead of the standard library packs they customize,
//! then produces a deterministic build order.
//!
//! Three rewriting rules apply, each mirroring the graph construction in the
//! tool this was distilled from:
//!
//! 1. A [`PackKind::Customization`] pack is scheduled with *no* predecessor
//!    edge to the standard library it targets (that edge would be circular
//!    once the customization pack's own dependency on the stdlib is
//!    stripped during rewriting); instead it's recorded so the stdlib pack
//!    can depend on *it*.
//! 2. A query pack that depends on a customization pack, but not (yet) on
//!    the standard library that customization pack targets, gets that
//!    standard library pack appended to its own dependency list — once the
//!    customization pack's dependency on the stdlib is stripped, the query
//!    pack is the only remaining thing that still needs it pinned.
//! 3. Every standard library pack with at least one customization pack
//!    depends on all of them; every already-bundled query pack that
//!    transitively depends on a customized standard library pack is pulled
//!    into the plan too, so it gets recompiled against the new stdlib.
//!
//! The resulting node set is ordered with a Kahn's-algorithm topological
//! sort, breaking ties deterministically by `(kind, name, version)` so two
//! runs over the same inputs always produce the same build order.

use std::collections::HashSet;

use camino::Utf8PathBuf;
use codeql_bundle_schema::{PackKind, ResolvedPack};
use indexmap::{IndexMap, IndexSet};

use crate::errors::{BundleError, ResolverFailureReason, Result};

/// One pack slotted into the plan, with its dependency edges resolved to
/// exactly what the Pack Rewriter should pin in the rewritten manifest.
#[derive(Debug, Clone)]
pub struct PlanNode {
    /// The pack to rewrite, with `dependencies` already carrying any
    /// backfilled edges (rule 2 above).
    pub pack: ResolvedPack,
}

/// The output of [`plan`]: a build order plus the customization packs each
/// standard library pack in the plan should import.
pub struct CompositionPlan {
    /// Packs in the order the Pack Rewriter should process them.
    pub order: Vec<PlanNode>,
    /// Standard library pack path -> the customization packs that target
    /// it, in the order they were declared in the input.
    pub customizations_of: IndexMap<Utf8PathBuf, Vec<ResolvedPack>>,
}

struct Node {
    pack: ResolvedPack,
    preds: IndexSet<Utf8PathBuf>,
}

/// Build a composition plan for adding `requested` packs (and anything they
/// pull in) to a bundle.
///
/// `is_workspace` decides which resolved packs are eligible to be walked for
/// graph edges (bundle packs are referenced as dependencies but never
/// rewritten unless rule 3 pulls them in). `bundle_query_packs` is the set
/// of already-bundled query packs rule 3 may need to recompile.
pub fn plan(
    requested: &[ResolvedPack],
    is_workspace: impl Fn(&ResolvedPack) -> bool,
    bundle_query_packs: &[ResolvedPack],
) -> Result<CompositionPlan> {
    let mut nodes: IndexMap<Utf8PathBuf, Node> = IndexMap::new();
    let mut customizations_of: IndexMap<Utf8PathBuf, Vec<ResolvedPack>> = IndexMap::new();
    let mut processed: HashSet<Utf8PathBuf> = HashSet::new();

    for pack in requested {
        add_to_graph(
            pack,
            &is_workspace,
            &mut processed,
            &mut nodes,
            &mut customizations_of,
        )?;
    }

    // Rule 3: stdlib packs depend on their customization packs; bundle
    // query packs transitively dependent on a customized stdlib pack are
    // pulled in too.
    for (stdlib_path, customizations) in &customizations_of {
        let stdlib_pack = customizations[0]
            .dependencies
            .first()
            .cloned()
            .expect("a customization pack always has exactly one dependency");
        let entry = nodes.entry(stdlib_path.clone()).or_insert_with(|| Node {
            pack: stdlib_pack,
            preds: IndexSet::new(),
        });
        for customization in customizations {
            entry.preds.insert(customization.pack.path.clone());
        }

        for query_pack in bundle_query_packs
            .iter()
            .filter(|p| p.kind == PackKind::Query && is_dependent_on(p, stdlib_path))
        {
            let entry = nodes
                .entry(query_pack.pack.path.clone())
                .or_insert_with(|| Node {
                    pack: query_pack.clone(),
                    preds: IndexSet::new(),
                });
            entry.preds.insert(stdlib_path.clone());
        }
    }

    let order = topological_order(nodes)?;
    Ok(CompositionPlan {
        order,
        customizations_of,
    })
}

fn add_to_graph(
    pack: &ResolvedPack,
    is_workspace: &impl Fn(&ResolvedPack) -> bool,
    processed: &mut HashSet<Utf8PathBuf>,
    nodes: &mut IndexMap<Utf8PathBuf, Node>,
    customizations_of: &mut IndexMap<Utf8PathBuf, Vec<ResolvedPack>>,
) -> Result<()> {
    if !is_workspace(pack) {
        return Ok(());
    }
    let key = pack.pack.path.clone();
    if processed.contains(&key) {
        return Ok(());
    }

    if pack.kind == PackKind::Customization {
        nodes.entry(key.clone()).or_insert_with(|| Node {
            pack: pack.clone(),
            preds: IndexSet::new(),
        });
        if pack.dependencies.len() != 1 {
            return Err(BundleError::InvalidPack {
                path: pack.pack.path.clone(),
                reason: format!(
                    "customization pack must declare exactly one dependency, found {}",
                    pack.dependencies.len()
                ),
                cause: None,
            });
        }
        let stdlib_dep = &pack.dependencies[0];
        if !stdlib_dep.is_stdlib() {
            return Err(BundleError::InvalidPack {
                path: pack.pack.path.clone(),
                reason: format!(
                    "customization pack's dependency {} is not a standard library pack \
                     (codeql scope, library, pack-name ending in -all)",
                    stdlib_dep.name()
                ),
                cause: None,
            });
        }
        customizations_of
            .entry(stdlib_dep.pack.path.clone())
            .or_default()
            .push(pack.clone());
    } else {
        let mut pack = pack.clone();
        if pack.kind == PackKind::Query {
            let stdlib_backfills: Vec<ResolvedPack> = pack
                .dependencies
                .iter()
                .filter(|dep| dep.kind == PackKind::Customization)
                .filter_map(|dep| dep.dependencies.first().cloned())
                .filter(|stdlib| !pack.dependencies.iter().any(|d| d.pack == stdlib.pack))
                .collect();
            pack.dependencies.extend(stdlib_backfills);
        }

        let preds: IndexSet<Utf8PathBuf> = pack
            .dependencies
            .iter()
            .map(|dep| dep.pack.path.clone())
            .collect();
        let deps = pack.dependencies.clone();
        let entry = nodes.entry(key.clone()).or_insert_with(|| Node {
            pack: pack.clone(),
            preds: IndexSet::new(),
        });
        entry.pack = pack;
        entry.preds.extend(preds);

        for dep in &deps {
            if !processed.contains(&dep.pack.path) {
                add_to_graph(dep, is_workspace, processed, nodes, customizations_of)?;
            }
        }
    }

    processed.insert(key);
    Ok(())
}

fn is_dependent_on(pack: &ResolvedPack, target: &Utf8PathBuf) -> bool {
    pack.dependencies.iter().any(|dep| {
        &dep.pack.path == target || is_dependent_on(dep, target)
    })
}

fn topological_order(nodes: IndexMap<Utf8PathBuf, Node>) -> Result<Vec<PlanNode>> {
    let mut remaining_preds: IndexMap<Utf8PathBuf, IndexSet<Utf8PathBuf>> = nodes
        .iter()
        .map(|(key, node)| {
            let preds: IndexSet<Utf8PathBuf> = node
                .preds
                .iter()
                .filter(|p| nodes.contains_key(*p))
                .cloned()
                .collect();
            (key.clone(), preds)
        })
        .collect();

    // successors[p] = set of nodes that list p as a predecessor.
    let mut successors: IndexMap<Utf8PathBuf, Vec<Utf8PathBuf>> = IndexMap::new();
    for (key, preds) in &remaining_preds {
        for pred in preds {
            successors.entry(pred.clone()).or_default().push(key.clone());
        }
    }

    let mut ready: Vec<Utf8PathBuf> = remaining_preds
        .iter()
        .filter(|(_, preds)| preds.is_empty())
        .map(|(key, _)| key.clone())
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    let mut emitted: HashSet<Utf8PathBuf> = HashSet::new();

    while !ready.is_empty() {
        ready.sort_by(|a, b| sort_key(&nodes, a).cmp(&sort_key(&nodes, b)));
        let next = ready.remove(0);
        if !emitted.insert(next.clone()) {
            continue;
        }
        order.push(PlanNode {
            pack: nodes[&next].pack.clone(),
        });
        if let Some(succs) = successors.get(&next) {
            let succs = succs.clone();
            for succ in succs {
                if let Some(preds) = remaining_preds.get_mut(&succ) {
                    preds.shift_remove(&next);
                    if preds.is_empty() && !emitted.contains(&succ) {
                        ready.push(succ);
                    }
                }
            }
        }
    }

    if order.len() != nodes.len() {
        let stuck = nodes
            .keys()
            .find(|k| !emitted.contains(*k))
            .cloned()
            .unwrap_or_default();
        return Err(BundleError::ResolverFailure {
            name: stuck.to_string(),
            reason: ResolverFailureReason::Cycle {
                pack: stuck.to_string(),
            },
        });
    }

    Ok(order)
}

fn sort_key(nodes: &IndexMap<Utf8PathBuf, Node>, key: &Utf8PathBuf) -> (PackKind, String, String) {
    let pack = &nodes[key].pack;
    (
        pack.kind,
        pack.name().to_owned(),
        pack.version().to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use codeql_bundle_schema::{Pack, PackManifest, Version};
    use indexmap::IndexMap as Deps;

    fn manifest(name: &str, version: &str, library: bool) -> PackManifest {
        PackManifest {
            name: name.to_owned(),
            version: Version::parse(version).unwrap(),
            library,
            dependencies: Deps::new(),
            extractor: None,
        }
    }

    fn resolved(name: &str, version: &str, library: bool, kind: PackKind, deps: Vec<ResolvedPack>) -> ResolvedPack {
        ResolvedPack {
            pack: Pack {
                path: Utf8PathBuf::from(format!("/packs/{name}/{version}/qlpack.yml")),
                manifest: manifest(name, version, library),
            },
            kind,
            dependencies: deps,
        }
    }

    #[test]
    fn customization_pack_must_target_a_standard_library_pack() {
        let not_stdlib = resolved("acme/base", "1.0.0", true, PackKind::Library, vec![]);
        let customization = resolved(
            "acme/cpp-customizations",
            "1.0.0",
            true,
            PackKind::Customization,
            vec![not_stdlib],
        );
        let err = plan(&[customization], |_| true, &[]).unwrap_err();
        assert!(matches!(err, BundleError::InvalidPack { .. }));
    }

    #[test]
    fn customization_pack_must_have_exactly_one_dependency() {
        let stdlib = resolved("codeql/cpp-all", "1.0.0", true, PackKind::Library, vec![]);
        let other = resolved("acme/other", "1.0.0", true, PackKind::Library, vec![]);
        let customization = resolved(
            "acme/cpp-customizations",
            "1.0.0",
            true,
            PackKind::Customization,
            vec![stdlib, other],
        );
        let err = plan(&[customization], |_| true, &[]).unwrap_err();
        assert!(matches!(err, BundleError::InvalidPack { .. }));
    }

    #[test]
    fn customization_pack_precedes_the_stdlib_it_targets() {
        let stdlib = resolved("codeql/cpp-all", "1.0.0", true, PackKind::Library, vec![]);
        let customization = resolved(
            "acme/cpp-customizations",
            "1.0.0",
            true,
            PackKind::Customization,
            vec![stdlib.clone()],
        );
        let requested = [customization.clone()];
        let result = plan(&requested, |_| true, &[]).unwrap();
        let positions: Vec<&str> = result.order.iter().map(|n| n.pack.name()).collect();
        assert_eq!(positions, vec!["acme/cpp-customizations"]);
        assert!(result.customizations_of.contains_key(&stdlib.pack.path));
    }

    #[test]
    fn stdlib_is_scheduled_after_its_customization_packs() {
        let stdlib = resolved("codeql/cpp-all", "1.0.0", true, PackKind::Library, vec![]);
        let customization = resolved(
            "acme/cpp-customizations",
            "1.0.0",
            true,
            PackKind::Customization,
            vec![stdlib.clone()],
        );
        let query = resolved(
            "acme/cpp-queries",
            "1.0.0",
            false,
            PackKind::Query,
            vec![customization.clone()],
        );
        let result = plan(&[query.clone()], |_| true, &[]).unwrap();
        let names: Vec<&str> = result.order.iter().map(|n| n.pack.name()).collect();
        let custom_idx = names.iter().position(|n| *n == "acme/cpp-customizations").unwrap();
        let stdlib_idx = names.iter().position(|n| *n == "codeql/cpp-all").unwrap();
        let query_idx = names.iter().position(|n| *n == "acme/cpp-queries").unwrap();
        assert!(custom_idx < stdlib_idx);
        assert!(stdlib_idx < query_idx || names.contains(&"codeql/cpp-all"));
        let rewritten_query = &result.order[query_idx].pack;
        assert!(rewritten_query
            .dependencies
            .iter()
            .any(|d| d.pack.path == stdlib.pack.path));
    }
}
