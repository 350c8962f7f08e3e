#![deny(missing_docs)]

//! # codeql-bundler
//!
//! Fuses user-authored CodeQL packs — library customizations, pure library
//! packs, or query packs — into a pre-built vendor CodeQL bundle, yielding a
//! new bundle with the workspace packs and any standard packs they touch
//! spliced in, recompiled, and re-archived.
//!
//! The pipeline lives across these modules, roughly leaf-to-root:
//!
//! - [`platform`] — the three operating systems a bundle ships tools for.
//! - [`codeql`] — the CLI Adapter: the one seam that shells out to the
//!   bundled `codeql` binary.
//! - [`resolver`] — the Pack Resolver: builds a resolved dependency graph
//!   from a flat list of manifests.
//! - [`loader`] — the Bundle Loader: unpacks a vendor bundle into scratch
//!   and resolves its own packs as a seed for workspace resolution.
//! - [`planner`] — the Composition Planner: rewrites the dependency graph
//!   so customization packs precede the standard libraries they target,
//!   and produces a deterministic build order.
//! - [`rewriter`] — the Pack Rewriter: executes that order, copying and
//!   mutating packs on disk and delegating (re)compilation back to
//!   [`codeql`].
//! - [`archive`] — the Archiver: writes the composed bundle out as one or
//!   more `.tar.gz` files.
//! - [`compose`] — ties all of the above into the data flow this crate
//!   implements; the CLI binary's `main.rs` calls [`compose::compose`].

pub mod archive;
pub mod codeql;
pub mod compose;
pub mod errors;
pub mod fs_util;
pub mod loader;
pub mod planner;
pub mod platform;
pub mod resolver;
pub mod rewriter;
