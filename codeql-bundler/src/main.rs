#![deny(missing_docs)]

//! CLI binary interface for codeql-bundler.

use clap::Parser;

use cli::Cli;

mod cli;

fn main() {
    let cli = Cli::parse();
    cliapp::CliAppBuilder::new("codeql-bundler")
        .verbose(cli.log)
        .start(cli, real_main);
}

fn real_main(app: &cliapp::CliApp<Cli>) -> Result<(), miette::Report> {
    let options = app.config.to_options();
    codeql_bundler::compose::compose(&options)?;
    Ok(())
}
