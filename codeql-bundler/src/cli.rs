//! All the clap stuff for parsing/documenting the cli.

use camino::Utf8PathBuf;
use clap::{
    builder::{PossibleValuesParser, TypedValueParser},
    Parser,
};
use tracing::level_filters::LevelFilter;

use codeql_bundler::compose::ComposeOptions;
use codeql_bundler::platform::Platform;

#[derive(Parser, Clone, Debug)]
#[clap(version)]
#[clap(bin_name = "codeql-bundler")]
/// Fuse user-authored CodeQL packs into a custom CodeQL bundle.
pub struct Cli {
    /// Path to a CodeQL bundle downloaded from
    /// https://github.com/github/codeql-action/releases: a directory, or a
    /// `.tar.gz` archive of one.
    #[clap(long, short, value_name = "PATH")]
    pub bundle: Utf8PathBuf,

    /// Path to store the custom CodeQL bundle. A directory when bundling
    /// for multiple `--platform`s, otherwise a file (or a directory, in
    /// which case `codeql-bundle.tar.gz` is created inside it).
    #[clap(long, short, value_name = "PATH")]
    pub output: Utf8PathBuf,

    /// Path to a directory containing a `codeql-workspace.yml` file, or to
    /// that file itself. Defaults to the current directory.
    #[clap(long, short, value_name = "PATH")]
    pub workspace: Option<Utf8PathBuf>,

    /// Skip `--qlx` precompilation when recreating query packs, even if the
    /// bundled `codeql` supports it.
    #[clap(long)]
    pub no_precompile: bool,

    /// How verbose logging should be.
    #[clap(long, short)]
    #[clap(default_value_t = LevelFilter::WARN)]
    #[clap(value_parser = PossibleValuesParser::new(["off", "error", "warn", "info", "debug", "trace"]).map(|s| s.parse::<LevelFilter>().expect("possible values are valid")))]
    pub log: LevelFilter,

    /// Produce a `.tar.gz` archive specialized for this platform; repeat to
    /// build several. Omit to produce a single platform-agnostic archive.
    #[clap(long, value_delimiter(','))]
    pub platform: Vec<Platform>,

    /// Path to an additional-files-and-certificates config. Validated for
    /// existence only; installing its contents is outside this tool's
    /// scope.
    #[clap(long, value_name = "PATH")]
    pub code_scanning_config: Option<Utf8PathBuf>,

    /// Names of the workspace packs to add; all of them if omitted.
    pub packs: Vec<String>,
}

impl Cli {
    /// The workspace path to resolve packs from, defaulting to the current
    /// directory.
    pub fn workspace_path(&self) -> Utf8PathBuf {
        self.workspace.clone().unwrap_or_else(|| {
            Utf8PathBuf::from_path_buf(std::env::current_dir().expect("current dir is readable"))
                .expect("current dir is valid UTF-8")
        })
    }

    /// Build the [`ComposeOptions`] this invocation describes.
    pub fn to_options(&self) -> ComposeOptions {
        ComposeOptions {
            bundle_path: self.bundle.clone(),
            output_path: self.output.clone(),
            workspace_path: self.workspace_path(),
            packs: self.packs.clone(),
            platforms: self.platform.clone(),
            no_precompile: self.no_precompile,
            code_scanning_config: self.code_scanning_config.clone(),
        }
    }
}
