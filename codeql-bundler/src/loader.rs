//! The Bundle Loader: copies (or unpacks) a CodeQL bundle into a scratch
//! directory, detects which platforms it ships tools for, and resolves its
//! own packs so later components have a seed to resolve workspace packs
//! against.

use std::collections::HashSet;

use camino::{Utf8Path, Utf8PathBuf};
use codeql_bundle_schema::ResolvedPack;
use temp_dir::TempDir;

use crate::codeql::CodeQl;
use crate::errors::{BundleError, Result};
use crate::fs_util;
use crate::platform::Platform;
use crate::resolver::PackResolver;

/// A loaded CodeQL bundle, unpacked into a scratch directory for the
/// duration of this process.
///
/// The scratch directory is removed when this value is dropped, mirroring
/// the source tool's `TemporaryDirectory`/`__del__` teardown.
pub struct Bundle {
    _scratch: TempDir,
    /// Root of the unpacked bundle (a `codeql` executable plus `qlpacks/`).
    pub dir: Utf8PathBuf,
    /// The bundle's own `codeql` CLI.
    pub codeql: CodeQl,
    /// Platforms this bundle ships prebuilt native tools for.
    pub platforms: HashSet<Platform>,
    /// Every pack already inside the bundle, fully resolved.
    pub packs: Vec<ResolvedPack>,
    /// Extractor languages `codeql resolve languages` reports.
    pub languages: Vec<String>,
}

impl Bundle {
    /// Load a bundle from a directory or a `.tar.gz` archive of one.
    pub fn load(bundle_path: &Utf8Path) -> Result<Self> {
        let scratch = TempDir::new().map_err(|cause| BundleError::IOFailure {
            context: "creating a scratch directory for the bundle".to_owned(),
            cause,
        })?;
        let scratch_root = Utf8Path::from_path(scratch.path())
            .ok_or_else(|| BundleError::InvalidBundle {
                path: bundle_path.to_owned(),
                reason: "scratch directory path is not valid UTF-8".to_owned(),
            })?
            .to_owned();

        let dir = if bundle_path.is_dir() {
            let name = bundle_path.file_name().unwrap_or("codeql");
            let dest = scratch_root.join(name);
            fs_util::copy_dir_all(bundle_path, &dest)?;
            dest
        } else if bundle_path.is_file()
            && bundle_path.as_str().ends_with(".tar.gz")
        {
            tracing::info!(path = %bundle_path, "unpacking bundle archive");
            let file = std::fs::File::open(bundle_path)?;
            let decoder = flate2::read::GzDecoder::new(file);
            let mut archive = tar::Archive::new(decoder);
            archive.unpack(&scratch_root).map_err(|cause| BundleError::IOFailure {
                context: format!("extracting {bundle_path}"),
                cause,
            })?;
            scratch_root.join("codeql")
        } else {
            return Err(BundleError::InvalidBundle {
                path: bundle_path.to_owned(),
                reason: "expected a directory or a .tar.gz archive".to_owned(),
            });
        };

        let platforms: HashSet<Platform> = Platform::ALL
            .into_iter()
            .filter(|platform| {
                dir.join("cpp")
                    .join("tools")
                    .join(platform.tools_dir_name())
                    .exists()
            })
            .collect();

        let host = Platform::host().ok_or_else(|| BundleError::InvalidBundle {
            path: bundle_path.to_owned(),
            reason: "running on an operating system this tool doesn't recognize".to_owned(),
        })?;
        if !platforms.contains(&host) {
            return Err(BundleError::UnsupportedPlatform {
                platforms: host.to_string(),
            });
        }

        let exe_name = if cfg!(windows) { "codeql.exe" } else { "codeql" };
        let codeql = CodeQl::new(dir.join(exe_name));

        tracing::info!("validating bundled codeql CLI version");
        codeql.unpacked_location()?;
        let version = codeql.version()?;
        tracing::info!(%version, "found codeql CLI");

        let raw_packs = codeql.pack_ls(&dir)?;
        let mut resolver = PackResolver::new(raw_packs.clone(), vec![]);
        let packs = raw_packs
            .iter()
            .map(|pack| resolver.resolve(pack))
            .collect::<Result<Vec<_>>>()?;

        let languages = codeql.resolve_languages()?;

        Ok(Self {
            _scratch: scratch,
            dir,
            codeql,
            platforms,
            packs,
            languages,
        })
    }

    /// The bundle's `qlpacks` directory.
    pub fn qlpacks_dir(&self) -> Utf8PathBuf {
        self.dir.join("qlpacks")
    }

    /// Whether this bundle ships native tools for `platform`.
    pub fn supports_platform(&self, platform: Platform) -> bool {
        self.platforms.contains(&platform)
    }
}
