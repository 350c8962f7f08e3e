#![deny(missing_docs)]

//! # codeql-bundle-schema
//!
//! Value types shared by the pack resolver, the composition planner and the
//! pack rewriter: [`Version`], [`VersionConstraint`], [`PackManifest`],
//! [`Pack`], [`PackKind`] and [`ResolvedPack`].
//!
//! This crate has no knowledge of the filesystem or of subprocesses; it only
//! describes the shape of a CodeQL pack manifest and the graph built out of
//! them. Reading/writing the YAML is left to callers (see [`PackManifest::from_yaml_str`]
//! and [`PackManifest::to_yaml_string`], which are thin wrappers so callers
//! don't need to depend on `serde_yaml` directly).

use std::cmp::Ordering;
use std::fmt;

use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while parsing or validating schema-level data.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The manifest's YAML couldn't be parsed.
    #[error("failed to parse pack manifest")]
    Yaml(#[from] serde_yaml::Error),

    /// A version string in a manifest wasn't valid semver.
    #[error("invalid version {raw:?}")]
    Version {
        /// The offending string.
        raw: String,
        /// The underlying parse error.
        #[source]
        cause: semver::Error,
    },

    /// A dependency constraint wasn't a valid semver range.
    #[error("invalid version constraint {raw:?} for dependency {name:?}")]
    Constraint {
        /// The dependency name the constraint was attached to.
        name: String,
        /// The offending string.
        raw: String,
        /// The underlying parse error.
        #[source]
        cause: semver::Error,
    },
}

/// A semantic version: (major, minor, patch), totally ordered.
///
/// A thin newtype over [`semver::Version`] so callers of this crate don't
/// need to depend on `semver` themselves just to compare pack versions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(pub semver::Version);

impl Version {
    /// Parse a semver string.
    pub fn parse(raw: &str) -> Result<Self, SchemaError> {
        semver::Version::parse(raw)
            .map(Version)
            .map_err(|cause| SchemaError::Version {
                raw: raw.to_owned(),
                cause,
            })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        semver::Version::parse(&raw)
            .map(Version)
            .map_err(serde::de::Error::custom)
    }
}

/// An npm-style version range, e.g. `^1.2.0`, `~1.2.0`, `1.2.x`.
///
/// Rust's [`semver::VersionReq`] defaults to caret semantics for a bare
/// `major.minor.patch`, which is the same default npm/`semantic_version`'s
/// `NpmSpec` uses, so it's a faithful stand-in for the "npm-style range
/// expression" the spec calls for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint(pub semver::VersionReq);

impl VersionConstraint {
    /// Parse a version range.
    pub fn parse(name: &str, raw: &str) -> Result<Self, SchemaError> {
        semver::VersionReq::parse(raw)
            .map(VersionConstraint)
            .map_err(|cause| SchemaError::Constraint {
                name: name.to_owned(),
                raw: raw.to_owned(),
                cause,
            })
    }

    /// Does `version` satisfy this constraint?
    pub fn matches(&self, version: &Version) -> bool {
        self.0.matches(&version.0)
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// On-disk shape of a `qlpack.yml` manifest, as spec.md §3 describes it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PackManifest {
    /// Scoped (`scope/pack`) or bare (`pack`) name.
    pub name: String,
    /// The pack's own version.
    #[serde(with = "version_as_string")]
    pub version: Version,
    /// Whether this is a library pack (as opposed to a query pack).
    #[serde(default)]
    pub library: bool,
    /// Dependency name -> version range, in declaration order.
    #[serde(default)]
    pub dependencies: IndexMap<String, String>,
    /// The extractor this pack is written for, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extractor: Option<String>,
}

mod version_as_string {
    use super::Version;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &Version, s: S) -> Result<S::Ok, S::Error> {
        v.0.to_string().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Version, D::Error> {
        let raw = String::deserialize(d)?;
        semver::Version::parse(&raw)
            .map(Version)
            .map_err(serde::de::Error::custom)
    }
}

impl PackManifest {
    /// Parse a manifest from YAML text.
    pub fn from_yaml_str(raw: &str) -> Result<Self, SchemaError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Serialize a manifest to YAML text.
    pub fn to_yaml_string(&self) -> Result<String, SchemaError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Parsed dependency constraints, in declaration order.
    pub fn dependency_constraints(&self) -> Result<Vec<(String, VersionConstraint)>, SchemaError> {
        self.dependencies
            .iter()
            .map(|(name, raw)| {
                VersionConstraint::parse(name, raw).map(|constraint| (name.clone(), constraint))
            })
            .collect()
    }

    /// The part of `name` before `/`, if `name` is scoped.
    pub fn scope(&self) -> Option<&str> {
        self.name.split_once('/').map(|(scope, _)| scope)
    }

    /// The part of `name` after `/`, or the whole name if unscoped.
    pub fn pack_name(&self) -> &str {
        self.name.split_once('/').map_or(&self.name[..], |(_, n)| n)
    }
}

/// A [`PackManifest`] bound to the filesystem path of its manifest file.
///
/// Equality/hashing is identity-of-location: two distinct directories with
/// byte-identical manifests are distinct packs, because they're distinct
/// artifacts on disk that could diverge at any time.
#[derive(Debug, Clone)]
pub struct Pack {
    /// Path to the `qlpack.yml` (or equivalent) manifest file.
    pub path: Utf8PathBuf,
    /// The parsed manifest.
    pub manifest: PackManifest,
}

impl Pack {
    /// Directory containing the manifest file (the pack root).
    pub fn dir(&self) -> &camino::Utf8Path {
        self.path
            .parent()
            .expect("a manifest path always has a parent directory")
    }
}

impl PartialEq for Pack {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}
impl Eq for Pack {}

impl std::hash::Hash for Pack {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl Ord for Pack {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path.cmp(&other.path)
    }
}
impl PartialOrd for Pack {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A pack's classification, per spec.md §3's classification rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PackKind {
    /// A customization pack: a library pack with a `Customizations.qll`
    /// module, whose sole dependency is the standard library it customizes.
    ///
    /// Ordered first so that `(kind, name, version)` tie-breaking in the
    /// composition planner's topological sort puts customizations before
    /// libraries before queries, per spec.md §4.4.
    Customization,
    /// A library pack with no `Customizations.qll` module.
    Library,
    /// A non-library (query) pack.
    Query,
}

impl fmt::Display for PackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PackKind::Customization => "customization",
            PackKind::Library => "library",
            PackKind::Query => "query",
        };
        write!(f, "{s}")
    }
}

/// A [`Pack`] bound to its classification and resolved dependency edges.
///
/// Dependencies are listed in manifest declaration order; for a
/// [`PackKind::Customization`] pack the first (and only) dependency is its
/// target standard library, per spec.md §3 invariant 5.
#[derive(Debug, Clone)]
pub struct ResolvedPack {
    /// The underlying pack.
    pub pack: Pack,
    /// Its classification.
    pub kind: PackKind,
    /// Resolved dependency edges, in declaration order.
    pub dependencies: Vec<ResolvedPack>,
}

impl ResolvedPack {
    /// The name of the underlying manifest (`scope/pack-name` or `pack-name`).
    pub fn name(&self) -> &str {
        &self.pack.manifest.name
    }

    /// The underlying manifest's version.
    pub fn version(&self) -> &Version {
        &self.pack.manifest.version
    }

    /// True if this is a standard library pack: `codeql` scope, library,
    /// pack-name ending in `-all`.
    pub fn is_stdlib(&self) -> bool {
        self.pack.manifest.library
            && self.pack.manifest.scope() == Some("codeql")
            && self.pack.manifest.pack_name().ends_with("-all")
    }

    /// Dotted-and-underscored module name used in `import` statements, e.g.
    /// `acme/cpp-queries-customizations` -> `acme.cpp_queries_customizations`.
    pub fn module_name(&self) -> String {
        self.pack.manifest.name.replace('-', "_").replace('/', ".")
    }

    /// Path to this pack's `Customizations.qll`, whether or not it exists yet.
    pub fn customizations_module_path(&self) -> Utf8PathBuf {
        self.pack.dir().join("Customizations.qll")
    }

    /// Path to `codeql-pack.lock.yml`.
    pub fn lock_file_path(&self) -> Utf8PathBuf {
        self.pack.dir().join("codeql-pack.lock.yml")
    }

    /// Path to the `.codeql` dependency cache directory.
    pub fn dependency_cache_path(&self) -> Utf8PathBuf {
        self.pack.dir().join(".codeql")
    }

    /// Path to the `.cache` compilation cache directory.
    pub fn compilation_cache_path(&self) -> Utf8PathBuf {
        self.pack.dir().join(".cache")
    }
}

impl PartialEq for ResolvedPack {
    fn eq(&self, other: &Self) -> bool {
        self.pack == other.pack
    }
}
impl Eq for ResolvedPack {}

impl std::hash::Hash for ResolvedPack {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.pack.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_and_pack_name_split_on_first_slash() {
        let manifest = PackManifest {
            name: "acme/cpp-queries".to_owned(),
            version: Version::parse("1.0.0").unwrap(),
            library: false,
            dependencies: IndexMap::new(),
            extractor: None,
        };
        assert_eq!(manifest.scope(), Some("acme"));
        assert_eq!(manifest.pack_name(), "cpp-queries");
    }

    #[test]
    fn bare_name_has_no_scope() {
        let manifest = PackManifest {
            name: "standalone".to_owned(),
            version: Version::parse("1.0.0").unwrap(),
            library: false,
            dependencies: IndexMap::new(),
            extractor: None,
        };
        assert_eq!(manifest.scope(), None);
        assert_eq!(manifest.pack_name(), "standalone");
    }

    #[test]
    fn caret_constraint_matches_like_npm_default() {
        let constraint = VersionConstraint::parse("codeql/cpp-all", "^0.4.0").unwrap();
        assert!(constraint.matches(&Version::parse("0.4.9").unwrap()));
        assert!(!constraint.matches(&Version::parse("0.5.0").unwrap()));
        assert!(!constraint.matches(&Version::parse("0.3.9").unwrap()));
    }

    #[test]
    fn manifest_round_trips_through_yaml() {
        let raw = "name: codeql/cpp-all\nversion: 0.4.1\nlibrary: true\ndependencies: {}\n";
        let manifest = PackManifest::from_yaml_str(raw).unwrap();
        assert_eq!(manifest.name, "codeql/cpp-all");
        assert!(manifest.library);
        let back = manifest.to_yaml_string().unwrap();
        let reparsed = PackManifest::from_yaml_str(&back).unwrap();
        assert_eq!(reparsed.name, manifest.name);
        assert_eq!(reparsed.version, manifest.version);
    }

    #[test]
    fn module_name_dashes_and_slashes_become_dots_and_underscores() {
        let manifest = PackManifest {
            name: "acme/cpp-queries-customizations".to_owned(),
            version: Version::parse("1.0.0").unwrap(),
            library: true,
            dependencies: IndexMap::new(),
            extractor: None,
        };
        let pack = Pack {
            path: Utf8PathBuf::from("/tmp/acme/cpp-queries-customizations/1.0.0/qlpack.yml"),
            manifest,
        };
        let resolved = ResolvedPack {
            pack,
            kind: PackKind::Customization,
            dependencies: vec![],
        };
        assert_eq!(resolved.module_name(), "acme.cpp_queries_customizations");
    }
}
