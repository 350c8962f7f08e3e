//! Top-level orchestration: wires the Bundle Loader, Pack Resolver,
//! Composition Planner, Pack Rewriter and Archiver together into the data
//! flow spec.md §2 describes:
//!
//! ```text
//! CLI -> Bundle Loader -> Resolver(bundle) -> CustomBundle init
//!     -> Resolver(workspace, seeded with bundle) -> Composition Planner
//!     -> (for each pack in topo order) Pack Rewriter -> Archiver
//! ```

use std::collections::HashSet;

use camino::{Utf8Path, Utf8PathBuf};
use codeql_bundle_schema::ResolvedPack;
use indexmap::IndexMap;

use crate::errors::{BundleError, ResolverFailureReason, Result};
use crate::loader::Bundle;
use crate::platform::Platform;
use crate::resolver::PackResolver;
use crate::{archive, planner, rewriter};

/// Everything [`compose`] needs, one-to-one with the CLI surface in
/// spec.md §6.
pub struct ComposeOptions {
    /// Path to the vendor bundle: a directory, or a `.tar.gz` archive.
    pub bundle_path: Utf8PathBuf,
    /// Where to write the composed bundle (file or directory, see
    /// [`archive`]).
    pub output_path: Utf8PathBuf,
    /// A directory containing `codeql-workspace.yml`, or the file itself.
    pub workspace_path: Utf8PathBuf,
    /// Names filtering which workspace packs to add; empty selects all of
    /// them.
    pub packs: Vec<String>,
    /// Platforms to produce per-platform archives for; empty selects the
    /// platform-agnostic single-archive mode.
    pub platforms: Vec<Platform>,
    /// Suppress `--qlx` on every recompiled query pack regardless of what
    /// the bundled `codeql` supports.
    pub no_precompile: bool,
    /// Validated for existence only; copying its referenced files/certs
    /// into the bundle is the external installer named out of scope in
    /// spec.md §1.
    pub code_scanning_config: Option<Utf8PathBuf>,
}

/// A loaded vendor [`Bundle`] plus the workspace packs resolved against it.
///
/// Mirrors `CustomBundle` from the tool this was distilled from: the
/// vendor bundle's own packs plus the user's workspace packs, resolved
/// together so a workspace pack can depend on either.
pub struct CustomBundle {
    bundle: Bundle,
    /// Every pack found under the workspace, resolved against
    /// `bundle.packs` as a seed.
    pub workspace_packs: Vec<ResolvedPack>,
    /// `bundle.packs ∪ workspace_packs`, keyed by pack name, last writer
    /// (workspace) wins on collision.
    ///
    /// Part of `CustomBundle`'s state per spec.md §3's Ownership section
    /// ("the composite map available-packs ... keyed by name"); nothing in
    /// this crate's own pipeline reads it back (selection, planning and
    /// rewriting all walk `workspace_packs`/`ResolvedPack.dependencies`
    /// instead), so it's exposed here for callers that want the same
    /// name -> pack lookup the source tool keeps, not consumed internally.
    pub available_packs: IndexMap<String, ResolvedPack>,
}

impl CustomBundle {
    /// Load `bundle_path`, then discover and resolve every pack visible
    /// from `workspace_path`.
    pub fn load(bundle_path: &Utf8Path, workspace_path: &Utf8Path) -> Result<Self> {
        let bundle = Bundle::load(bundle_path)?;
        let workspace_dir = resolve_workspace_dir(workspace_path);

        tracing::info!(workspace = %workspace_dir, "listing codeql packs in workspace");
        let raw_packs = bundle.codeql.pack_ls(&workspace_dir)?;
        if raw_packs.is_empty() {
            return Err(BundleError::ResolverFailure {
                name: workspace_dir.to_string(),
                reason: ResolverFailureReason::EmptyWorkspace,
            });
        }
        for pack in &raw_packs {
            if pack.manifest.scope().is_none() {
                return Err(BundleError::InvalidPack {
                    path: pack.path.clone(),
                    reason: format!(
                        "{} has no scope; workspace packs must be scoped to be bundled",
                        pack.manifest.name
                    ),
                    cause: None,
                });
            }
        }

        let mut resolver = PackResolver::new(raw_packs.clone(), bundle.packs.clone());
        let workspace_packs = raw_packs
            .iter()
            .map(|pack| resolver.resolve(pack))
            .collect::<Result<Vec<_>>>()?;

        let mut available_packs = IndexMap::new();
        for pack in bundle.packs.iter().chain(workspace_packs.iter()) {
            available_packs.insert(pack.name().to_owned(), pack.clone());
        }

        Ok(Self {
            bundle,
            workspace_packs,
            available_packs,
        })
    }

    /// Select the subset of `workspace_packs` named in `names` (or all of
    /// them if `names` is empty), failing if a requested name isn't found.
    pub fn select(&self, names: &[String]) -> Result<Vec<ResolvedPack>> {
        if names.is_empty() {
            return Ok(self.workspace_packs.clone());
        }
        let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
        let selected: Vec<ResolvedPack> = self
            .workspace_packs
            .iter()
            .filter(|pack| wanted.contains(pack.name()))
            .cloned()
            .collect();
        let found: HashSet<&str> = selected.iter().map(|pack| pack.name()).collect();
        let missing: Vec<&str> = wanted.difference(&found).copied().collect();
        if !missing.is_empty() {
            let mut missing = missing;
            missing.sort_unstable();
            return Err(BundleError::InvalidPack {
                path: self.bundle.dir.clone(),
                reason: format!(
                    "the workspace doesn't contain the requested pack(s): {}",
                    missing.join(", ")
                ),
                cause: None,
            });
        }
        Ok(selected)
    }

    /// Compute the composition plan and rewrite every pack it names, in
    /// topological order, against a copy of the vendor bundle.
    pub fn add_packs(&self, selected: &[ResolvedPack], no_precompile: bool) -> Result<()> {
        let workspace_paths: HashSet<Utf8PathBuf> = self
            .workspace_packs
            .iter()
            .map(|pack| pack.pack.path.clone())
            .collect();
        let plan = planner::plan(
            selected,
            |pack| workspace_paths.contains(&pack.pack.path),
            &self.bundle.packs,
        )?;

        let scratch_dir = self
            .bundle
            .dir
            .parent()
            .expect("the bundle root always has a scratch-directory parent")
            .to_owned();
        let ctx = rewriter::RewriteContext {
            codeql: &self.bundle.codeql,
            bundle_dir: self.bundle.dir.clone(),
            qlpacks_dir: self.bundle.qlpacks_dir(),
            scratch_dir,
            no_precompile,
        };
        rewriter::apply(&ctx, &plan)
    }

    /// Write the composed bundle to `output_path`, per spec.md §4.6.
    pub fn archive(&self, output_path: &Utf8Path, platforms: &[Platform]) -> Result<()> {
        if platforms.is_empty() {
            archive::archive_single(&self.bundle.dir, output_path)
        } else {
            archive::archive_per_platform(
                &self.bundle.dir,
                &self.bundle.languages,
                output_path,
                platforms,
                &self.bundle.platforms,
            )
        }
    }
}

/// If `path` points directly at `codeql-workspace.yml`, the workspace root
/// is its parent directory; otherwise `path` already is the workspace root.
fn resolve_workspace_dir(path: &Utf8Path) -> Utf8PathBuf {
    if path.file_name() == Some("codeql-workspace.yml") {
        path.parent().unwrap_or(path).to_owned()
    } else {
        path.to_owned()
    }
}

/// Run the full pipeline described in spec.md §2 for `options`.
pub fn compose(options: &ComposeOptions) -> Result<()> {
    // `--code-scanning-config` is validated for existence only; copying the
    // files/certs it references is the external installer spec.md §1 names
    // as out of scope, so nothing downstream reads this path further.
    if let Some(config) = &options.code_scanning_config {
        if !config.is_file() {
            return Err(BundleError::IOFailure {
                context: format!("reading --code-scanning-config {config}"),
                cause: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "code scanning config file not found",
                ),
            });
        }
    }

    let custom_bundle = CustomBundle::load(&options.bundle_path, &options.workspace_path)?;
    tracing::info!(
        count = custom_bundle.workspace_packs.len(),
        "found workspace packs"
    );

    let selected = custom_bundle.select(&options.packs)?;
    tracing::info!(
        packs = %selected.iter().map(ResolvedPack::name).collect::<Vec<_>>().join(", "),
        "composing custom bundle"
    );

    custom_bundle.add_packs(&selected, options.no_precompile)?;
    custom_bundle.archive(&options.output_path, &options.platforms)?;
    tracing::info!(output = %options.output_path, "finished composing custom bundle");
    Ok(())
}
