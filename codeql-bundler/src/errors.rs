//! The error surface for every operation in this crate.
//!
//! One enum, [`BundleError`], covers the six failure categories a bundle
//! compose can hit. Every fallible function in this crate returns
//! `Result<T, BundleError>` (aliased below as [`Result`]), so `main.rs` only
//! ever has to turn one type into a [`miette::Report`].

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, BundleError>;

/// Everything that can go wrong composing a custom CodeQL bundle.
#[derive(Debug, Error, Diagnostic)]
pub enum BundleError {
    /// The external `codeql` binary exited non-zero or couldn't be launched.
    #[error("codeql invocation failed: {summary}")]
    #[diagnostic(help("run with `--log debug` to see the exact command line that failed"))]
    CLIFailure {
        /// What the invocation was trying to do.
        summary: String,
        /// The underlying process error.
        #[source]
        cause: procwrap::ProcwrapError,
    },

    /// The `codeql` binary produced output this tool couldn't parse.
    #[error("couldn't parse codeql output for {summary}")]
    CLIOutput {
        /// What the invocation was trying to do.
        summary: String,
        /// The parse failure.
        #[source]
        cause: serde_json::Error,
    },

    /// The bundle at the given path isn't a bundle this tool can work with.
    #[error("{path} doesn't look like a CodeQL bundle")]
    #[diagnostic(help(
        "pass a directory containing a `codeql` executable and per-language `tools/` \
         subdirectories, or a `.tar.gz` archive of one"
    ))]
    InvalidBundle {
        /// The path that was supposed to be a bundle.
        path: Utf8PathBuf,
        /// More detail on what was wrong with it.
        reason: String,
    },

    /// The bundle doesn't support one or more of the requested output platforms.
    #[error("bundle does not support platform(s): {platforms}")]
    UnsupportedPlatform {
        /// A comma-joined list of the unsupported platform names.
        platforms: String,
    },

    /// Dependency resolution couldn't find or order the requested packs.
    #[error("failed to resolve pack {name}")]
    ResolverFailure {
        /// The pack whose dependencies couldn't be resolved.
        name: String,
        /// Why resolution failed.
        reason: ResolverFailureReason,
    },

    /// A pack's `qlpack.yml` (or its directory layout) violates an invariant
    /// this tool relies on.
    #[error("pack at {path} is invalid: {reason}")]
    InvalidPack {
        /// Path to the offending pack directory.
        path: Utf8PathBuf,
        /// Human-readable explanation.
        reason: String,
        /// The underlying schema error, if there was one.
        #[source]
        cause: Option<codeql_bundle_schema::SchemaError>,
    },

    /// `codeql-workspace.yml` or a pack's `qlpack.yml` couldn't be parsed.
    #[error("invalid configuration at {path}")]
    ConfigError {
        /// Path to the offending file.
        path: Utf8PathBuf,
        /// The underlying parse error.
        #[source]
        cause: codeql_bundle_schema::SchemaError,
    },

    /// A filesystem operation failed (copy, mkdir, remove, archive write, ...).
    #[error("I/O error while {context}")]
    IOFailure {
        /// What was being attempted.
        context: String,
        /// The underlying error.
        #[source]
        cause: std::io::Error,
    },
}

/// Why [`BundleError::ResolverFailure`] was raised.
#[derive(Debug, Error)]
pub enum ResolverFailureReason {
    /// No candidate pack satisfies the dependency's name/version constraint.
    #[error("no pack satisfies {constraint} (required by {required_by})")]
    NoCandidate {
        /// The unsatisfiable version constraint, rendered as text.
        constraint: String,
        /// The name of the pack that declared the dependency.
        required_by: String,
    },

    /// A pack transitively depends on itself.
    #[error("dependency cycle detected at {pack}")]
    Cycle {
        /// The pack where the cycle was detected.
        pack: String,
    },

    /// A customization pack's workspace scope was empty.
    #[error("workspace contains no packs")]
    EmptyWorkspace,
}

impl From<std::io::Error> for BundleError {
    fn from(cause: std::io::Error) -> Self {
        BundleError::IOFailure {
            context: "accessing the filesystem".to_owned(),
            cause,
        }
    }
}
