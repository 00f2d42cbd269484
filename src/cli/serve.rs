//! `serve` subcommand: builds once, then watches content/templates/assets
//! and rebuilds on every debounced batch of filesystem events, using the
//! full-rebuild classifier to decide between a full and incremental pass.

use super::args::BuildArgs;
use super::build;
use crate::config::SiteConfig;
use crate::log;
use crate::orchestrate::{ClassifierPredicates, classify};
use crate::watch::{build_watcher, run_debounced};
use anyhow::Result;

pub fn run(config: &SiteConfig, args: &BuildArgs) -> Result<()> {
    let initial = build::run(config, args)?;
    log!("serve"; "initial build: {} page(s){}", initial.pages_built, if initial.forced_full_rebuild { " (full)" } else { "" });

    let roots = vec![
        config.content_dir(),
        config.root.join("templates"),
        config.root.join("themes"),
        config.root.join("assets"),
    ];
    let (_watcher, rx, mut roots_mgr) = build_watcher(roots)?;

    log!("serve"; "watching for changes under {}", config.root.display());
    run_debounced(&rx, crate::watch::DEFAULT_DEBOUNCE, |events| {
        roots_mgr.maintain(&mut notify::recommended_watcher(|_: notify::Result<notify::Event>| {}).unwrap());

        let shared_dirs = &config.build.shared_dirs;
        let predicates = ClassifierPredicates {
            is_template: &|p: &str| p.contains("/templates/") || p.starts_with("templates/"),
            autodoc_requires_regeneration: &|_: &str| false,
            is_shared_content: &|p: &str| shared_dirs.iter().any(|dir| p.starts_with(dir.as_str())),
            is_version_config: &|p: &str| p == "bengal.toml" && config.versioning.enabled,
        };
        let decision = classify(&events, &predicates);
        log!("serve"; "rebuild triggered ({}): {}", events.len(), decision.reason.label());

        let rebuild_args = BuildArgs {
            force: decision.full_rebuild,
            incremental: !decision.full_rebuild,
            forced_paths: events.iter().map(|e| e.path.clone()).collect(),
            ..args.clone()
        };
        match build::run(config, &rebuild_args) {
            Ok(report) => log!("serve"; "rebuilt {} page(s)", report.pages_built),
            Err(e) => log!("serve"; "rebuild failed: {e}"),
        }
    });

    Ok(())
}
