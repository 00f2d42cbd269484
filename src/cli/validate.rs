//! `validate` subcommand: runs schema validation over content without
//! building anything (§6). Exit code 1 on errors unless `--warn-only`.

use super::args::ValidateArgs;
use super::common;
use crate::collections::{Collection, CollectionRouter};
use crate::config::SiteConfig;
use crate::schema::{SchemaRegistry, validate_with_depth};
use anyhow::Result;

pub struct ValidateReport {
    pub files_checked: usize,
    pub files_failed: usize,
}

impl ValidateReport {
    pub fn ok(&self) -> bool {
        self.files_failed == 0
    }
}

pub fn run(config: &SiteConfig, args: &ValidateArgs) -> Result<ValidateReport> {
    let collections: Vec<Collection> = config
        .collections
        .iter()
        .cloned()
        .map(crate::collections::CollectionDecl::into_collection)
        .collect();
    let router = CollectionRouter::new(collections);
    let registry = SchemaRegistry::new();

    let content_dir = config.content_dir();
    let mut files = common::discover_content_files(&content_dir);
    if !args.paths.is_empty() {
        let wanted: Vec<String> = args
            .paths
            .iter()
            .map(|p| crate::paths::to_posix(p))
            .collect();
        files.retain(|f| wanted.iter().any(|w| f.source_path.starts_with(w.as_str())));
    }

    let mut files_checked = 0;
    let mut files_failed = 0;

    for file in &files {
        let Some(collection) = router.route(&file.source_path) else {
            continue;
        };
        files_checked += 1;
        let result = validate_with_depth(
            &collection.schema,
            &file.metadata,
            &registry,
            config.build.max_schema_depth,
        );
        if result.is_valid() {
            continue;
        }
        files_failed += 1;
        println!("{} [{}]", file.source_path, collection.name);
        for error in &result.errors {
            println!("  {}: {}", error.field, error.message);
        }
    }

    Ok(ValidateReport {
        files_checked,
        files_failed,
    })
}
