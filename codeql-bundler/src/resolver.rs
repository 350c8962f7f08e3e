//! The Pack Resolver: turns a flat list of [`Pack`]s into a graph of
//! [`ResolvedPack`]s by matching each manifest dependency against the
//! best-declared candidate.
//!
//! Resolution is seeded: packs already resolved (typically the bundle's own
//! packs) are reused as-is and never re-walked, so resolving the workspace's
//! packs against a bundle only has to classify/link the workspace packs
//! themselves.

use std::collections::HashMap;

use camino::Utf8Path;
use codeql_bundle_schema::{Pack, PackKind, ResolvedPack};

use crate::errors::{BundleError, ResolverFailureReason, Result};

/// Resolves packs against a fixed pool of candidates.
///
/// Construct with [`PackResolver::new`], seeding it with packs that are
/// already resolved (e.g. a bundle's own standard library), then call
/// [`PackResolver::resolve`] once per top-level pack you need resolved.
pub struct PackResolver {
    /// name -> candidate packs, in declaration order (workspace packs first,
    /// then already-resolved packs), matching the seeding order below.
    candidates: HashMap<String, Vec<Pack>>,
    resolved: HashMap<Pack, ResolvedPack>,
}

impl PackResolver {
    /// Build a resolver over `packs`, with `already_resolved` packs
    /// available as dependency candidates but reused verbatim rather than
    /// re-resolved.
    pub fn new(packs: Vec<Pack>, already_resolved: Vec<ResolvedPack>) -> Self {
        let mut candidates: HashMap<String, Vec<Pack>> = HashMap::new();
        for pack in packs.iter().cloned() {
            candidates
                .entry(pack.manifest.name.clone())
                .or_default()
                .push(pack);
        }
        let mut resolved = HashMap::new();
        for resolved_pack in already_resolved {
            candidates
                .entry(resolved_pack.pack.manifest.name.clone())
                .or_default()
                .push(resolved_pack.pack.clone());
            resolved.insert(resolved_pack.pack.clone(), resolved_pack);
        }
        Self {
            candidates,
            resolved,
        }
    }

    /// Resolve `pack` and its full dependency closure.
    ///
    /// A pack that (transitively) depends on itself is a
    /// [`BundleError::ResolverFailure`] with
    /// [`ResolverFailureReason::Cycle`], matching the upstream resolver's
    /// self-dependency check.
    pub fn resolve(&mut self, pack: &Pack) -> Result<ResolvedPack> {
        self.resolve_inner(pack, pack)
    }

    fn resolve_inner(&mut self, root: &Pack, pack: &Pack) -> Result<ResolvedPack> {
        if let Some(resolved) = self.resolved.get(pack) {
            return Ok(resolved.clone());
        }

        let mut resolved_deps = Vec::with_capacity(pack.manifest.dependencies.len());
        for (dep_name, dep_version) in &pack.manifest.dependencies {
            let constraint = codeql_bundle_schema::VersionConstraint::parse(dep_name, dep_version)
                .map_err(|cause| BundleError::InvalidPack {
                    path: pack.path.clone(),
                    reason: format!("dependency {dep_name:?} has an invalid version constraint"),
                    cause: Some(cause),
                })?;

            let candidates = self
                .candidates
                .get(dep_name)
                .cloned()
                .unwrap_or_default();

            let mut resolved_dep = None;
            for candidate in &candidates {
                if candidate == root {
                    return Err(BundleError::ResolverFailure {
                        name: root.manifest.name.clone(),
                        reason: ResolverFailureReason::Cycle {
                            pack: pack.manifest.name.clone(),
                        },
                    });
                }
                if constraint.matches(&candidate.manifest.version) {
                    resolved_dep = Some(self.resolve_inner(root, candidate)?);
                }
            }

            let resolved_dep = resolved_dep.ok_or_else(|| BundleError::ResolverFailure {
                name: pack.manifest.name.clone(),
                reason: ResolverFailureReason::NoCandidate {
                    constraint: dep_version.clone(),
                    required_by: pack.manifest.name.clone(),
                },
            })?;
            resolved_deps.push(resolved_dep);
        }

        let resolved = ResolvedPack {
            pack: pack.clone(),
            kind: classify(pack),
            dependencies: resolved_deps,
        };
        self.resolved.insert(pack.clone(), resolved.clone());
        Ok(resolved)
    }
}

/// Classify a pack by whether its QL source tree contains a
/// `Customizations.qll` module at the path CodeQL's pack-namespace
/// convention expects for this pack's own name.
///
/// A library pack with that module is a [`PackKind::Customization`]; a
/// library pack without one is a [`PackKind::Library`]; anything else is a
/// [`PackKind::Query`].
pub fn classify(pack: &Pack) -> PackKind {
    if !pack.manifest.library {
        return PackKind::Query;
    }
    let module_dir = pack.manifest.name.replace('-', "_");
    let customizations_path: &Utf8Path = &pack.dir().join(module_dir).join("Customizations.qll");
    if customizations_path.is_file() {
        PackKind::Customization
    } else {
        PackKind::Library
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use codeql_bundle_schema::{PackManifest, Version};
    use indexmap::IndexMap;

    fn pack(name: &str, version: &str, library: bool, deps: &[(&str, &str)]) -> Pack {
        let mut dependencies = IndexMap::new();
        for (dep_name, dep_range) in deps {
            dependencies.insert(dep_name.to_string(), dep_range.to_string());
        }
        Pack {
            path: Utf8PathBuf::from(format!("/packs/{name}/{version}/qlpack.yml")),
            manifest: PackManifest {
                name: name.to_owned(),
                version: Version::parse(version).unwrap(),
                library,
                dependencies,
                extractor: None,
            },
        }
    }

    #[test]
    fn resolves_a_simple_dependency_chain() {
        let base = pack("acme/base", "1.0.0", true, &[]);
        let leaf = pack("acme/leaf", "1.0.0", false, &[("acme/base", "^1.0.0")]);
        let mut resolver = PackResolver::new(vec![base.clone(), leaf.clone()], vec![]);
        let resolved = resolver.resolve(&leaf).unwrap();
        assert_eq!(resolved.kind, PackKind::Query);
        assert_eq!(resolved.dependencies.len(), 1);
        assert_eq!(resolved.dependencies[0].pack, base);
    }

    #[test]
    fn missing_dependency_is_a_resolver_failure() {
        let leaf = pack("acme/leaf", "1.0.0", false, &[("acme/base", "^1.0.0")]);
        let mut resolver = PackResolver::new(vec![leaf.clone()], vec![]);
        let err = resolver.resolve(&leaf).unwrap_err();
        assert!(matches!(err, BundleError::ResolverFailure { .. }));
    }

    #[test]
    fn self_dependency_cycle_is_detected() {
        let a = pack("acme/a", "1.0.0", true, &[("acme/b", "^1.0.0")]);
        let b = pack("acme/b", "1.0.0", true, &[("acme/a", "^1.0.0")]);
        let mut resolver = PackResolver::new(vec![a.clone(), b.clone()], vec![]);
        let err = resolver.resolve(&a).unwrap_err();
        assert!(matches!(
            err,
            BundleError::ResolverFailure {
                reason: ResolverFailureReason::Cycle { .. },
                ..
            }
        ));
    }
}
