//! The Archiver: packs a composed bundle into one or more `.tar.gz`
//! archives.
//!
//! With no platforms requested, the whole bundle directory is archived
//! once under the `codeql/` arcname, following the same
//! `GzBuilder`/`tar::Builder` pattern a Rust packaging tool already uses
//! for its own release artifacts. With platforms requested, one archive is
//! built per platform, each excluding the native tool subtrees for every
//! *other* platform; the archives are built concurrently, one worker
//! thread per platform.

use camino::{Utf8Path, Utf8PathBuf};
use flate2::{write::GzEncoder, Compression};
use itertools::iproduct;

use crate::errors::{BundleError, Result};
use crate::platform::Platform;

/// Archive `bundle_dir` as a single, platform-agnostic `.tar.gz` at
/// `output_path` (or `output_path/codeql-bundle.tar.gz` if `output_path` is
/// a directory).
pub fn archive_single(bundle_dir: &Utf8Path, output_path: &Utf8Path) -> Result<()> {
    let output_path = if output_path.is_dir() {
        output_path.join("codeql-bundle.tar.gz")
    } else {
        output_path.to_owned()
    };
    tracing::debug!(output = %output_path, "archiving bundle");
    let file = std::fs::File::create(&output_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut tar = tar::Builder::new(encoder);
    tar.append_dir_all("codeql", bundle_dir)
        .map_err(|cause| BundleError::IOFailure {
            context: format!("archiving {bundle_dir} into {output_path}"),
            cause,
        })?;
    tar.into_inner()
        .map_err(|cause| BundleError::IOFailure {
            context: format!("finishing archive {output_path}"),
            cause,
        })?
        .finish()
        .map_err(|cause| BundleError::IOFailure {
            context: format!("flushing archive {output_path}"),
            cause,
        })?;
    Ok(())
}

/// Archive `bundle_dir` once per platform in `platforms`, as
/// `<output_dir>/codeql-bundle-<platform>.tar.gz`, skipping the other
/// platforms' native tool subtrees. `bundle_platforms` is the set of
/// platforms the bundle actually ships, used to reject unsupported
/// requests before doing any work.
pub fn archive_per_platform(
    bundle_dir: &Utf8Path,
    languages: &[String],
    output_dir: &Utf8Path,
    platforms: &[Platform],
    bundle_platforms: &std::collections::HashSet<Platform>,
) -> Result<()> {
    if !output_dir.is_dir() {
        return Err(BundleError::InvalidBundle {
            path: output_dir.to_owned(),
            reason: "output path must be a directory when archiving for multiple platforms"
                .to_owned(),
        });
    }

    let unsupported: Vec<String> = platforms
        .iter()
        .filter(|p| !bundle_platforms.contains(p))
        .map(Platform::to_string)
        .collect();
    if !unsupported.is_empty() {
        return Err(BundleError::UnsupportedPlatform {
            platforms: unsupported.join(", "),
        });
    }

    std::thread::scope(|scope| -> Result<()> {
        let mut handles = Vec::with_capacity(platforms.len());
        for &platform in platforms {
            let output_path = output_dir.join(format!("codeql-bundle-{platform}.tar.gz"));
            handles.push((
                platform,
                scope.spawn(move || archive_for_platform(bundle_dir, languages, &output_path, platform)),
            ));
        }
        for (platform, handle) in handles {
            handle
                .join()
                .map_err(|_| BundleError::IOFailure {
                    context: format!("archiving for platform {platform}"),
                    cause: std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "archiver thread panicked",
                    ),
                })??;
        }
        Ok(())
    })
}

fn archive_for_platform(
    bundle_dir: &Utf8Path,
    languages: &[String],
    output_path: &Utf8Path,
    platform: Platform,
) -> Result<()> {
    tracing::debug!(output = %output_path, %platform, "archiving bundle for platform");
    let exclusions = exclusion_paths(platform, languages);

    let file = std::fs::File::create(output_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut tar = tar::Builder::new(encoder);

    for entry in walkdir::WalkDir::new(bundle_dir).sort_by_file_name() {
        let entry = entry.map_err(|err| BundleError::IOFailure {
            context: format!("walking {bundle_dir}"),
            cause: std::io::Error::new(std::io::ErrorKind::Other, err.to_string()),
        })?;
        let path = Utf8Path::from_path(entry.path()).ok_or_else(|| BundleError::IOFailure {
            context: format!("walking {bundle_dir}"),
            cause: std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "non-UTF-8 path inside bundle",
            ),
        })?;
        let relative = path
            .strip_prefix(bundle_dir)
            .expect("walkdir entries are always under the root it was given");
        if relative.as_str().is_empty() {
            continue;
        }
        if is_excluded(relative, &exclusions) {
            continue;
        }
        if entry.file_type().is_dir() {
            continue;
        }
        let arcname = Utf8PathBuf::from("codeql").join(relative);
        tar.append_path_with_name(path, &arcname)
            .map_err(|cause| BundleError::IOFailure {
                context: format!("adding {path} to archive {output_path}"),
                cause,
            })?;
    }

    tar.into_inner()
        .map_err(|cause| BundleError::IOFailure {
            context: format!("finishing archive {output_path}"),
            cause,
        })?
        .finish()
        .map_err(|cause| BundleError::IOFailure {
            context: format!("flushing archive {output_path}"),
            cause,
        })?;
    Ok(())
}

fn nonplatform_tool_subpaths(platform: Platform) -> Vec<Utf8PathBuf> {
    const LINUX: [&str; 2] = ["linux64", "linux"];
    const OSX: [&str; 2] = ["osx64", "macos"];
    const WIN: [&str; 2] = ["win64", "windows"];

    let others: &[&str] = match platform {
        Platform::Linux => &[OSX[0], OSX[1], WIN[0], WIN[1]],
        Platform::Windows => &[OSX[0], OSX[1], LINUX[0], LINUX[1]],
        Platform::MacOs => &[LINUX[0], LINUX[1], WIN[0], WIN[1]],
    };
    others.iter().map(|s| Utf8PathBuf::from(*s)).collect()
}

fn exclusion_paths(platform: Platform, languages: &[String]) -> Vec<Utf8PathBuf> {
    let relative_tools_paths: Vec<Utf8PathBuf> = languages
        .iter()
        .map(|lang| Utf8PathBuf::from(lang).join("tools"))
        .chain(std::iter::once(Utf8PathBuf::from("tools")))
        .collect();
    let subpaths = nonplatform_tool_subpaths(platform);

    let mut exclusions: Vec<Utf8PathBuf> = iproduct!(&relative_tools_paths, &subpaths)
        .map(|(tools_path, subpath)| tools_path.join(subpath))
        .collect();

    if platform == Platform::Windows {
        exclusions.push(Utf8PathBuf::from("swift/qltest"));
        exclusions.push(Utf8PathBuf::from("swift/resource-dir"));
    } else {
        exclusions.push(Utf8PathBuf::from("codeql.exe"));
    }

    match platform {
        Platform::Linux => {
            exclusions.push(Utf8PathBuf::from("swift/qltest/osx64"));
            exclusions.push(Utf8PathBuf::from("swift/resource-dir/osx64"));
        }
        Platform::MacOs => {
            exclusions.push(Utf8PathBuf::from("swift/qltest/linux64"));
            exclusions.push(Utf8PathBuf::from("swift/resource-dir/linux64"));
        }
        _ => {}
    }

    exclusions
}

fn is_excluded(relative_path: &Utf8Path, exclusions: &[Utf8PathBuf]) -> bool {
    exclusions.iter().any(|excluded| relative_path.starts_with(excluded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linux_excludes_macos_and_windows_tool_subtrees() {
        let exclusions = exclusion_paths(Platform::Linux, &["cpp".to_owned()]);
        let osx = Utf8PathBuf::from("cpp/tools/osx64");
        let win = Utf8PathBuf::from("tools/win64");
        assert!(is_excluded(&osx, &exclusions));
        assert!(is_excluded(&win, &exclusions));
        assert!(!is_excluded(&Utf8PathBuf::from("cpp/tools/linux64"), &exclusions));
    }

    #[test]
    fn windows_excludes_codeql_binary_of_other_platforms_and_swift_qltest() {
        let exclusions = exclusion_paths(Platform::Windows, &[]);
        assert!(is_excluded(&Utf8PathBuf::from("swift/qltest"), &exclusions));
        assert!(is_excluded(&Utf8PathBuf::from("swift/resource-dir"), &exclusions));
        assert!(!exclusions.contains(&Utf8PathBuf::from("codeql.exe")));
    }

    #[test]
    fn non_windows_excludes_codeql_exe() {
        let exclusions = exclusion_paths(Platform::Linux, &[]);
        assert!(exclusions.contains(&Utf8PathBuf::from("codeql.exe")));
    }
}
