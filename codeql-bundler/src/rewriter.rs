//! The Pack Rewriter: executes one [`PlanNode`](crate::planner::PlanNode)
//! at a time, copying each pack out of its original location, rewriting its
//! manifest, and delegating (re)compilation to the [`CodeQl`] adapter.
//!
//! Each `rewrite_*` function below mirrors one pack-kind handler from the
//! composition step this was distilled from; see `planner.rs` for how the
//! build order and customization bookkeeping are produced.

use camino::{Utf8Path, Utf8PathBuf};
use codeql_bundle_schema::{PackKind, PackManifest, ResolvedPack};
use indexmap::IndexMap;

use crate::codeql::CodeQl;
use crate::errors::{BundleError, Result};
use crate::fs_util;
use crate::planner::CompositionPlan;

/// Everything the rewriter needs to know about the bundle it's modifying.
pub struct RewriteContext<'a> {
    /// The CLI Adapter bound to this bundle's `codeql` executable.
    pub codeql: &'a CodeQl,
    /// Root of the unpacked bundle.
    pub bundle_dir: Utf8PathBuf,
    /// The bundle's `qlpacks` directory — the destination of every
    /// `pack bundle`/`pack create` call.
    pub qlpacks_dir: Utf8PathBuf,
    /// Scratch directory scope packs are copied into before rewriting.
    pub scratch_dir: Utf8PathBuf,
    /// When true, `--qlx` is never appended to `pack create`.
    pub no_precompile: bool,
}

/// Apply every step of `plan`, in order, to the bundle described by `ctx`.
pub fn apply(ctx: &RewriteContext, plan: &CompositionPlan) -> Result<()> {
    for node in &plan.order {
        let pack = &node.pack;
        match pack.kind {
            PackKind::Customization => rewrite_customization_pack(ctx, pack)?,
            PackKind::Library => {
                if pack.pack.manifest.scope() == Some("codeql") {
                    let customizations = plan
                        .customizations_of
                        .get(&pack.pack.path)
                        .cloned()
                        .unwrap_or_default();
                    rewrite_stdlib_pack(ctx, pack, &customizations)?;
                } else {
                    rewrite_library_pack(ctx, pack)?;
                }
            }
            PackKind::Query => rewrite_query_pack(ctx, pack)?,
        }
    }
    Ok(())
}

/// Copy a resolved pack's directory into the scratch area at
/// `<scratch>/temp/<scope>/<pack-name>/<version>/`, returning the path to
/// its copied manifest.
///
/// The extra `temp` segment keeps the copy out of the way of a `codeql`
/// scope directory that the bundle's own `qlpacks/codeql` tree occupies.
fn copy_pack(ctx: &RewriteContext, pack: &ResolvedPack) -> Result<Utf8PathBuf> {
    let scope = pack.pack.manifest.scope().unwrap_or("_unscoped");
    let name = pack.pack.manifest.pack_name();
    let version = pack.pack.manifest.version.to_string();
    let dest_dir = ctx
        .scratch_dir
        .join("temp")
        .join(scope)
        .join(name)
        .join(&version);
    fs_util::copy_dir_all(pack.pack.dir(), &dest_dir)?;
    let manifest_file_name = pack
        .pack
        .path
        .file_name()
        .expect("a manifest path has a file name");
    Ok(dest_dir.join(manifest_file_name))
}

fn read_manifest(path: &Utf8Path) -> Result<PackManifest> {
    let raw = std::fs::read_to_string(path)?;
    PackManifest::from_yaml_str(&raw).map_err(|cause| BundleError::ConfigError {
        path: path.to_owned(),
        cause,
    })
}

fn write_manifest(path: &Utf8Path, manifest: &PackManifest) -> Result<()> {
    let raw = manifest.to_yaml_string().map_err(|cause| BundleError::ConfigError {
        path: path.to_owned(),
        cause,
    })?;
    std::fs::write(path, raw)?;
    Ok(())
}

fn rewrite_customization_pack(ctx: &RewriteContext, pack: &ResolvedPack) -> Result<()> {
    tracing::info!(name = pack.name(), "bundling customization pack");
    let manifest_path = copy_pack(ctx, pack)?;

    // Strip the dependency on the stdlib it targets, or pack_bundle would
    // try (and fail) to resolve a pack this tool is about to delete.
    let mut manifest = read_manifest(&manifest_path)?;
    manifest.dependencies = IndexMap::new();
    write_manifest(&manifest_path, &manifest)?;

    let copy = copied_pack(pack, manifest_path, manifest);
    ctx.codeql
        .pack_bundle(&copy.pack, &ctx.qlpacks_dir, &[])
}

fn rewrite_library_pack(ctx: &RewriteContext, pack: &ResolvedPack) -> Result<()> {
    tracing::info!(name = pack.name(), "bundling library pack");
    ctx.codeql.pack_bundle(&pack.pack, &ctx.qlpacks_dir, &[])
}

fn rewrite_stdlib_pack(
    ctx: &RewriteContext,
    pack: &ResolvedPack,
    customizations: &[ResolvedPack],
) -> Result<()> {
    tracing::info!(name = pack.name(), "customizing standard library pack");
    let manifest_path = copy_pack(ctx, pack)?;
    let mut manifest = read_manifest(&manifest_path)?;
    for customization in customizations {
        manifest.dependencies.insert(
            customization.name().to_owned(),
            customization.version().to_string(),
        );
    }
    write_manifest(&manifest_path, &manifest)?;

    let copy = copied_pack(pack, manifest_path.clone(), manifest);
    if !copy.customizations_module_path().is_file() {
        add_customization_support(&copy)?;
    }

    let customizations_path = copy.customizations_module_path();
    let mut contents = std::fs::read_to_string(&customizations_path)?;
    for customization in customizations {
        contents.push_str(&format!("import {}.Customizations\n", customization.module_name()));
    }
    std::fs::write(&customizations_path, contents)?;

    // Remove the original pack (its scope/version tree, two levels up from
    // the manifest) before bundling the rewritten copy over it.
    fs_util::remove_dir_all_if_exists(
        pack.pack
            .dir()
            .parent()
            .unwrap_or_else(|| pack.pack.dir()),
    )?;
    ctx.codeql.pack_bundle(&copy.pack, &ctx.qlpacks_dir, &[])
}

/// Give a standard library pack that has no `Customizations.qll` one,
/// inferring its target language from its own `<language>-all` pack name
/// and prepending `import Customizations` to `<language>.qll`.
fn add_customization_support(pack: &ResolvedPack) -> Result<()> {
    if pack.pack.manifest.scope() != Some("codeql") || !pack.pack.manifest.library {
        return Ok(());
    }
    let target_language = pack
        .pack
        .manifest
        .pack_name()
        .strip_suffix("-all")
        .unwrap_or(pack.pack.manifest.pack_name());
    let language_module_path = pack.pack.dir().join(format!("{target_language}.qll"));
    if !language_module_path.is_file() {
        return Err(BundleError::InvalidPack {
            path: pack.pack.path.clone(),
            reason: format!(
                "cannot customize {}: no 'Customizations' library and no {target_language}.qll \
                 to infer one from",
                pack.name()
            ),
            cause: None,
        });
    }

    let original = std::fs::read_to_string(&language_module_path)?;
    let mut lines: Vec<&str> = original.lines().collect();
    let first_import = lines
        .iter()
        .position(|line| line.starts_with("import"))
        .ok_or_else(|| BundleError::InvalidPack {
            path: pack.pack.path.clone(),
            reason: format!(
                "cannot customize {}: no import statement in {target_language}.qll",
                pack.name()
            ),
            cause: None,
        })?;
    lines.insert(first_import, "import Customizations");
    let mut rewritten = lines.join("\n");
    rewritten.push('\n');
    std::fs::write(&language_module_path, rewritten)?;

    let customizations_path = pack.customizations_module_path();
    std::fs::write(&customizations_path, format!("import {target_language}\n"))?;
    Ok(())
}

fn rewrite_query_pack(ctx: &RewriteContext, pack: &ResolvedPack) -> Result<()> {
    if pack.pack.manifest.scope() == Some("codeql") {
        rewrite_stdlib_query_pack(ctx, pack)
    } else {
        rewrite_workspace_query_pack(ctx, pack)
    }
}

fn rewrite_stdlib_query_pack(ctx: &RewriteContext, pack: &ResolvedPack) -> Result<()> {
    tracing::info!(name = pack.name(), "recreating standard query pack");
    let manifest_path = copy_pack(ctx, pack)?;
    let manifest = read_manifest(&manifest_path)?;
    let copy = copied_pack(pack, manifest_path, manifest);

    std::fs::remove_file(copy.lock_file_path()).ok();
    fs_util::remove_dir_all_if_exists(&copy.dependency_cache_path())?;
    fs_util::remove_dir_all_if_exists(&copy.compilation_cache_path())?;
    if ctx.codeql.supports_qlx()? {
        for qlx_file in fs_util::find_files_with_extension(copy.pack.dir(), "qlx")? {
            std::fs::remove_file(qlx_file)?;
        }
    }

    fs_util::remove_dir_all_if_exists(
        pack.pack
            .dir()
            .parent()
            .unwrap_or_else(|| pack.pack.dir()),
    )?;

    ctx.codeql.pack_create(
        &copy.pack,
        &ctx.qlpacks_dir,
        &[ctx.bundle_dir.clone()],
        !ctx.no_precompile,
    )
}

fn rewrite_workspace_query_pack(ctx: &RewriteContext, pack: &ResolvedPack) -> Result<()> {
    tracing::info!(name = pack.name(), "bundling query pack");
    let manifest_path = copy_pack(ctx, pack)?;
    let mut manifest = read_manifest(&manifest_path)?;
    manifest.dependencies = pack
        .dependencies
        .iter()
        .map(|dep| (dep.name().to_owned(), dep.version().to_string()))
        .collect();
    write_manifest(&manifest_path, &manifest)?;

    let copy = copied_pack(pack, manifest_path, manifest);
    ctx.codeql.pack_create(&copy.pack, &ctx.qlpacks_dir, &[], !ctx.no_precompile)
}

/// Build a [`ResolvedPack`] identical to `pack` but pointing at its copied
/// manifest and carrying the (possibly rewritten) manifest contents.
fn copied_pack(pack: &ResolvedPack, path: Utf8PathBuf, manifest: PackManifest) -> ResolvedPack {
    ResolvedPack {
        pack: codeql_bundle_schema::Pack { path, manifest },
        kind: pack.kind,
        dependencies: pack.dependencies.clone(),
    }
}
