//! Binary entry point: parses [`cclint::cli::Cli`], loads
//! [`cclint::config::Config`], runs [`cclint::driver`] once per source file,
//! and prints the merged report in the requested format.
//!
//! Grounded on `thag_rs`'s `main` shape (`Cli::parse()` then a fallible body
//! that bubbles up through `?`), with the exit-code mapping from `spec.md`
//! §6 (0 clean / 1 diagnostics emitted / 2 fatal) layered on top since a
//! plain `Result`-returning `main` can't express three distinct codes.

use std::fs;
use std::process::ExitCode;

use clap::Parser;

use cclint::cli::Cli;
use cclint::config::Config;
use cclint::diagnostics::DiagnosticSink;
use cclint::driver;
use cclint::errors::CcResult;
use cclint::logging::{self, Verbosity};
use cclint::source::SourceBuffer;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else if cli.verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    };
    logging::init(verbosity);

    match run(&cli) {
        Ok(result) => report(&cli, result),
        Err(err) => {
            eprintln!("cclint: {err}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: &Cli) -> CcResult<(SourceBuffer, Vec<DiagnosticSink>)> {
    let mut config = Config::load(&cli.config)?;
    apply_cli_overrides(cli, &mut config);

    let mut source = SourceBuffer::new();
    for path in &cli.files {
        let text = fs::read_to_string(path)?;
        source.add_file(path, text);
    }

    let sinks = driver::analyze_files(&source, &config);
    Ok((source, sinks))
}

fn apply_cli_overrides(cli: &Cli, config: &mut Config) {
    if let Some(severity) = cli.severity {
        config.severity = Some(severity.into());
    }
    if cli.show_all {
        config.show_all = true;
    }
    config.disabled.retain(|id| !cli.enabled_ids().contains(id));
    config.disabled.extend(cli.disabled_ids());
    for (name, value) in cli.defines() {
        config.predefined.insert(name, value);
    }
    config.include_paths.extend(cli.include.iter().cloned());
    if let Some(max_configs) = cli.max_configs {
        config.max_configs = max_configs;
    }
}

fn report(cli: &Cli, (source, sinks): (SourceBuffer, Vec<DiagnosticSink>)) -> ExitCode {
    let mut merged = DiagnosticSink::new();
    for sink in sinks {
        merged.extend(sink);
    }
    let rendered = if cli.xml { merged.to_xml(&source) } else { merged.to_plain(&source) };
    if !rendered.is_empty() {
        println!("{rendered}");
    }
    if merged.is_empty() {
        ExitCode::from(0)
    } else {
        ExitCode::from(1)
    }
}
