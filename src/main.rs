//! bengal-core: the incremental build core of a static site generator.
//!
//! This binary wires the CLI surface (§6) onto the orchestrator, build
//! cache, and pipeline modules. Markdown rendering and HTML templating
//! are out of scope (§1) — [`build::PassthroughParser`] and
//! [`build::PassthroughTemplateEngine`] stand in for those external
//! collaborators so the core's own contracts can be exercised end to end.

mod build;
mod cache;
mod cli;
mod collections;
mod config;
mod hash;
mod logger;
mod orchestrate;
mod paths;
mod pipeline;
mod postprocess;
mod schema;
mod utils;
mod watch;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::SiteConfig;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {}
    }

    let root = std::env::current_dir().unwrap_or_default();
    let config_path = root.join(&cli.config);
    let config = match SiteConfig::load(&root, &config_path) {
        Ok(config) => apply_cli_overrides(config, &cli),
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::from(2);
        }
    };

    match run(&config, &cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(3)
        }
    }
}

/// Content/output directory overrides from the CLI take precedence over
/// `bengal.toml`, matching the documented resolution order.
fn apply_cli_overrides(mut config: SiteConfig, cli: &Cli) -> SiteConfig {
    if let Some(content) = &cli.content {
        config.build.content_dir = content.to_string_lossy().into_owned();
    }
    if let Some(output) = &cli.output {
        config.build.output_dir = output.to_string_lossy().into_owned();
    }
    config
}

fn run(config: &SiteConfig, cli: &Cli) -> Result<ExitCode> {
    match &cli.command {
        Commands::Build { args } => {
            let report = cli::build::run(config, args)?;
            log!("build"; "built {} page(s){}", report.pages_built, if report.forced_full_rebuild { " (full)" } else { "" });
            for warning in &report.warnings {
                log!("build"; "warning: {warning}");
            }
            Ok(if report.warnings.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(3)
            })
        }
        Commands::Serve { args } => {
            cli::serve::run(config, args)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Validate { args } => {
            let report = cli::validate::run(config, args)?;
            if report.ok() {
                log!("validate"; "{} file(s) checked, all valid", report.files_checked);
                Ok(ExitCode::SUCCESS)
            } else {
                log!("validate"; "{} of {} file(s) failed validation", report.files_failed, report.files_checked);
                Ok(if args.warn_only {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::from(1)
                })
            }
        }
    }
}
