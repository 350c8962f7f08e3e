//! The CLI Adapter: the single seam through which this tool shells out to
//! the `codeql` executable that ships inside a bundle.
//!
//! Every method here maps to one `codeql` subcommand invoked with
//! `--format=json`, mirroring `CodeQL` in the tool this was distilled from.
//! Output is always parsed, never scraped from human-readable text.

use std::cell::RefCell;

use camino::{Utf8Path, Utf8PathBuf};
use semver::Version;
use serde::Deserialize;

use crate::errors::{BundleError, Result};
use codeql_bundle_schema::Pack;

/// The minimum `codeql` version that supports `--qlx` precompiled queries.
const MIN_QLX_VERSION: Version = Version::new(2, 11, 4);

/// A handle to a `codeql` executable, plus its memoized version.
pub struct CodeQl {
    exe: Utf8PathBuf,
    version: RefCell<Option<Version>>,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    version: String,
    #[serde(rename = "unpackedLocation")]
    unpacked_location: Utf8PathBuf,
}

#[derive(Debug, Deserialize)]
struct PackLsOutput {
    packs: indexmap::IndexMap<Utf8PathBuf, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ResolveLanguagesOutput(indexmap::IndexMap<String, serde_json::Value>);

impl CodeQl {
    /// Wrap a path to a `codeql` executable. Does not invoke it.
    pub fn new(exe: impl Into<Utf8PathBuf>) -> Self {
        Self {
            exe: exe.into(),
            version: RefCell::new(None),
        }
    }

    fn cmd(&self, summary: impl Into<String>) -> procwrap::Cmd {
        let mut cmd = procwrap::Cmd::new(self.exe.as_str(), summary);
        cmd.log(tracing::Level::DEBUG);
        cmd
    }

    fn run_json<T: for<'de> Deserialize<'de>>(
        &self,
        summary: &str,
        args: &[&str],
    ) -> Result<T> {
        let mut cmd = self.cmd(summary.to_owned());
        for arg in args {
            cmd.arg(arg);
        }
        let output = cmd
            .output()
            .map_err(|cause| BundleError::CLIFailure {
                summary: summary.to_owned(),
                cause,
            })?;
        serde_json::from_slice(&output.stdout).map_err(|cause| BundleError::CLIOutput {
            summary: summary.to_owned(),
            cause,
        })
    }

    fn version_info(&self) -> Result<VersionInfo> {
        self.run_json("read codeql version", &["version", "--format=json"])
    }

    /// The `codeql` binary's own semantic version, memoized after first call.
    pub fn version(&self) -> Result<Version> {
        if let Some(version) = self.version.borrow().as_ref() {
            return Ok(version.clone());
        }
        let info = self.version_info()?;
        let version = Version::parse(&info.version).map_err(|_| BundleError::InvalidBundle {
            path: self.exe.clone(),
            reason: format!("codeql reported an unparseable version {:?}", info.version),
        })?;
        *self.version.borrow_mut() = Some(version.clone());
        Ok(version)
    }

    /// Where `codeql` thinks its own unpacked distribution lives.
    pub fn unpacked_location(&self) -> Result<Utf8PathBuf> {
        Ok(self.version_info()?.unpacked_location)
    }

    /// Whether this `codeql` is new enough to compile packs with `--qlx`.
    pub fn supports_qlx(&self) -> Result<bool> {
        Ok(self.version()? >= MIN_QLX_VERSION)
    }

    /// List every pack visible from `workspace` (a directory containing a
    /// `codeql-workspace.yml`, or a single pack directory).
    pub fn pack_ls(&self, workspace: &Utf8Path) -> Result<Vec<Pack>> {
        let summary = format!("list codeql packs under {workspace}");
        let out: PackLsOutput =
            self.run_json(&summary, &["pack", "ls", "--format=json", workspace.as_str()])?;
        out.packs
            .into_keys()
            .map(|manifest_path| load_pack(&manifest_path))
            .collect()
    }

    /// Bundle a library pack (and any additional packs on its resolve path)
    /// into `output_path`. Fails if `pack` isn't a library pack.
    pub fn pack_bundle(
        &self,
        pack: &Pack,
        output_path: &Utf8Path,
        additional_packs: &[Utf8PathBuf],
    ) -> Result<()> {
        if !pack.manifest.library {
            return Err(BundleError::InvalidPack {
                path: pack.path.clone(),
                reason: format!("{} is not a library pack, cannot bundle it", pack.manifest.name),
                cause: None,
            });
        }
        let summary = format!("bundle library pack {}", pack.manifest.name);
        let mut cmd = self.cmd(summary.clone());
        cmd.arg("pack")
            .arg("bundle")
            .arg("--format=json")
            .arg(format!("--pack-path={output_path}"));
        if !additional_packs.is_empty() {
            cmd.arg(format!(
                "--additional-packs={}",
                join_paths(additional_packs)
            ));
        }
        cmd.arg("--").arg(pack.dir().as_str());
        cmd.output().map_err(|cause| BundleError::CLIFailure { summary, cause })?;
        Ok(())
    }

    /// Compile a query pack (and any additional packs on its resolve path)
    /// into `output_path`. Fails if `pack` is a library pack.
    ///
    /// `--qlx` is appended whenever [`CodeQl::supports_qlx`] is true, unless
    /// `precompile` is `false`.
    pub fn pack_create(
        &self,
        pack: &Pack,
        output_path: &Utf8Path,
        additional_packs: &[Utf8PathBuf],
        precompile: bool,
    ) -> Result<()> {
        if pack.manifest.library {
            return Err(BundleError::InvalidPack {
                path: pack.path.clone(),
                reason: format!("{} is a library pack, cannot compile it", pack.manifest.name),
                cause: None,
            });
        }
        let summary = format!("compile query pack {}", pack.manifest.name);
        let mut cmd = self.cmd(summary.clone());
        cmd.arg("pack")
            .arg("create")
            .arg("--format=json")
            .arg(format!("--output={output_path}"))
            .arg("--threads=0")
            .arg("--no-default-compilation-cache");
        if precompile && self.supports_qlx()? {
            cmd.arg("--qlx");
        }
        if !additional_packs.is_empty() {
            cmd.arg(format!(
                "--additional-packs={}",
                join_paths(additional_packs)
            ));
        }
        cmd.arg("--").arg(pack.dir().as_str());
        cmd.output().map_err(|cause| BundleError::CLIFailure { summary, cause })?;
        Ok(())
    }

    /// The set of extractor languages this bundle's `codeql` can resolve.
    pub fn resolve_languages(&self) -> Result<Vec<String>> {
        let out: ResolveLanguagesOutput =
            self.run_json("resolve languages", &["resolve", "languages", "--format=json"])?;
        Ok(out.0.into_keys().collect())
    }
}

fn join_paths(paths: &[Utf8PathBuf]) -> String {
    paths
        .iter()
        .map(Utf8PathBuf::as_str)
        .collect::<Vec<_>>()
        .join(if cfg!(windows) { ";" } else { ":" })
}

fn load_pack(manifest_path: &Utf8Path) -> Result<Pack> {
    let raw = std::fs::read_to_string(manifest_path).map_err(|cause| BundleError::IOFailure {
        context: format!("reading pack manifest {manifest_path}"),
        cause,
    })?;
    let manifest =
        codeql_bundle_schema::PackManifest::from_yaml_str(&raw).map_err(|cause| {
            BundleError::ConfigError {
                path: manifest_path.to_owned(),
                cause,
            }
        })?;
    Ok(Pack {
        path: manifest_path.to_owned(),
        manifest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_qlx_version_matches_upstream_cutoff() {
        assert_eq!(MIN_QLX_VERSION, Version::new(2, 11, 4));
    }
}
