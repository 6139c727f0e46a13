//! Sync pass orchestration.
//!
//! Coordinates the full flow: directory walk → parse → prune → sectionize →
//! checksum, producing the discovered document set, then hands it to the
//! reconciler. Parse and read failures are isolated per document, collected,
//! and reported alongside the reconciler's own failures at the end of the
//! pass; the process exits non-zero if any document failed.

use anyhow::{bail, Result};
use tracing::warn;

use crate::checksum::checksum;
use crate::config::Config;
use crate::gateway::create_gateway;
use crate::markup;
use crate::migrate;
use crate::models::DiscoveredDocument;
use crate::reconcile::{Reconciler, SyncMode};
use crate::section::sectionize;
use crate::store::Store;
use crate::walker::walk_tree;

/// Result of the discovery phase: parsed documents plus per-file failures.
pub struct Discovery {
    pub documents: Vec<DiscoveredDocument>,
    pub failures: Vec<(String, String)>,
}

/// Walk the source tree and build the discovered document set.
pub fn discover(config: &Config) -> Result<Discovery> {
    let files = walk_tree(
        &config.source.root,
        &config.source.include_globs,
        &config.source.exclude_globs,
    )?;

    let mut documents = Vec::new();
    let mut failures = Vec::new();

    for file in files {
        let raw = match std::fs::read(&file.abs_path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(path = %file.path, %err, "skipping unreadable file");
                failures.push((file.path, err.to_string()));
                continue;
            }
        };

        let text = String::from_utf8_lossy(&raw);
        let parsed = match markup::parse(&file.path, &text) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(path = %file.path, %err, "skipping unparseable file");
                failures.push((file.path, err.to_string()));
                continue;
            }
        };

        let pruned = markup::prune(parsed.blocks);
        let sections = sectionize(&pruned, &parsed.lines);

        documents.push(DiscoveredDocument {
            path: file.path,
            checksum: checksum(&raw),
            parent_path: file.parent_path,
            meta: parsed.meta,
            sections,
        });
    }

    Ok(Discovery {
        documents,
        failures,
    })
}

pub async fn run_sync(config: &Config, mode: SyncMode, dry_run: bool) -> Result<()> {
    let discovery = discover(config)?;

    if dry_run {
        let total_sections: usize = discovery.documents.iter().map(|d| d.sections.len()).sum();
        let total_tokens: i64 = discovery
            .documents
            .iter()
            .flat_map(|d| &d.sections)
            .map(|s| s.token_count)
            .sum();
        println!("sync (dry-run)");
        println!("  documents found: {}", discovery.documents.len());
        println!("  sections: {}", total_sections);
        println!("  estimated tokens: {}", total_tokens);
        println!("  parse failures: {}", discovery.failures.len());
        for (path, err) in &discovery.failures {
            println!("    {}: {}", path, err);
        }
        return Ok(());
    }

    let store = Store::open(&config.db.path).await?;
    migrate::run_migrations(store.pool()).await?;
    let gateway = create_gateway(&config.embedding)?;

    // Files the walk found but discovery could not read or parse keep
    // their persisted rows; only genuinely absent paths are swept.
    let failed_paths: Vec<String> = discovery
        .failures
        .iter()
        .map(|(path, _)| path.clone())
        .collect();

    let reconciler = Reconciler::new(&store, gateway.as_ref());
    let mut summary = reconciler
        .run(&discovery.documents, &failed_paths, mode)
        .await?;

    // Discovery failures join the reconciler's per-document failures.
    let mut failures = discovery.failures;
    failures.append(&mut summary.failures);

    let mode_name = match mode {
        SyncMode::Incremental => "incremental",
        SyncMode::Full => "full",
    };
    println!("sync {}", mode_name);
    println!("  discovered: {}", summary.discovered);
    println!("  inserted: {}", summary.inserted);
    println!("  updated: {}", summary.updated);
    println!("  parent updates: {}", summary.parent_updates);
    println!("  unchanged: {}", summary.unchanged);
    println!("  deleted: {}", summary.deleted);
    if summary.dangling_parents_nulled > 0 {
        println!(
            "  dangling parents nulled: {}",
            summary.dangling_parents_nulled
        );
    }
    if config.embedding.is_enabled() {
        println!("  embedding tokens: {}", summary.total_tokens);
    }

    store.close().await;

    if !failures.is_empty() {
        println!("  failed documents:");
        for (path, err) in &failures {
            println!("    {}: {}", path, err);
        }
        bail!("{} document(s) failed during sync", failures.len());
    }

    println!("ok");
    Ok(())
}
