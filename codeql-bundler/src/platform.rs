//! The set of operating systems a bundle ships prebuilt tools for.

use std::fmt;
use std::str::FromStr;

/// A platform a CodeQL bundle can ship an archive for.
///
/// Mirrors the three `tools/<platform>` subtrees a bundle's `cpp/tools`
/// (and friends) directories are keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// `tools/linux64`.
    Linux,
    /// `tools/win64`.
    Windows,
    /// `tools/osx64`.
    MacOs,
}

impl Platform {
    /// All platforms, in a stable order.
    pub const ALL: [Platform; 3] = [Platform::Linux, Platform::Windows, Platform::MacOs];

    /// The `tools/<this>` directory name used inside a bundle.
    pub fn tools_dir_name(self) -> &'static str {
        match self {
            Platform::Linux => "linux64",
            Platform::Windows => "win64",
            Platform::MacOs => "osx64",
        }
    }

    /// The platform the host process is currently running on, if it's one
    /// of the three bundle platforms.
    pub fn host() -> Option<Platform> {
        if cfg!(target_os = "linux") {
            Some(Platform::Linux)
        } else if cfg!(target_os = "windows") {
            Some(Platform::Windows)
        } else if cfg!(target_os = "macos") {
            Some(Platform::MacOs)
        } else {
            None
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tools_dir_name())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linux64" | "linux" => Ok(Platform::Linux),
            "win64" | "windows" => Ok(Platform::Windows),
            "osx64" | "macos" | "osx" => Ok(Platform::MacOs),
            other => Err(format!(
                "unknown platform {other:?}, expected one of linux64, win64, osx64"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_long_and_tools_dir_spellings() {
        assert_eq!("linux".parse::<Platform>().unwrap(), Platform::Linux);
        assert_eq!("linux64".parse::<Platform>().unwrap(), Platform::Linux);
        assert_eq!("windows".parse::<Platform>().unwrap(), Platform::Windows);
        assert_eq!("osx64".parse::<Platform>().unwrap(), Platform::MacOs);
    }

    #[test]
    fn rejects_unknown_platform() {
        assert!("amiga".parse::<Platform>().is_err());
    }
}
