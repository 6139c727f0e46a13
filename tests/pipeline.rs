//! End-to-end pipeline tests: filesystem tree → discovery → reconciliation
//! against an in-memory store with a deterministic stub gateway.

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use async_trait::async_trait;
use docsync::config::{Config, DbConfig, EmbeddingConfig, SourceConfig};
use docsync::error::Result;
use docsync::gateway::{EmbeddingBatch, EmbeddingGateway};
use docsync::migrate::run_migrations;
use docsync::reconcile::{Reconciler, SyncMode};
use docsync::store::Store;
use docsync::sync::discover;

/// Deterministic gateway: vectors derived from the text bytes.
struct StubGateway;

#[async_trait]
impl EmbeddingGateway for StubGateway {
    fn model_name(&self) -> &str {
        "stub"
    }
    fn dims(&self) -> usize {
        2
    }
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingBatch> {
        let vectors = texts
            .iter()
            .map(|t| {
                let sum: u32 = t.bytes().map(u32::from).sum();
                vec![t.len() as f32, sum as f32]
            })
            .collect();
        Ok(EmbeddingBatch {
            vectors,
            total_tokens: texts.iter().map(|t| t.len() as i64 / 4).sum(),
        })
    }
}

fn config_for(root: &Path) -> Config {
    Config {
        db: DbConfig {
            path: root.join("db.sqlite"),
        },
        source: SourceConfig {
            root: root.join("docs"),
            include_globs: vec!["**/*.md".to_string(), "**/*.mdx".to_string()],
            exclude_globs: vec![],
        },
        embedding: EmbeddingConfig::default(),
    }
}

async fn test_store() -> Store {
    let store = Store::open_in_memory().await.unwrap();
    run_migrations(store.pool()).await.unwrap();
    store
}

#[tokio::test]
async fn test_guide_tree_first_and_second_pass() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(docs.join("guide")).unwrap();
    fs::write(docs.join("guide.mdx"), "Hello").unwrap();
    fs::write(docs.join("guide/usage.mdx"), "## Usage\nText").unwrap();

    let config = config_for(tmp.path());
    let store = test_store().await;
    let gateway = StubGateway;
    let reconciler = Reconciler::new(&store, &gateway);

    let discovery = discover(&config).unwrap();
    let s1 = reconciler
        .run(&discovery.documents, &[], SyncMode::Incremental)
        .await
        .unwrap();
    assert_eq!(s1.inserted, 2);
    assert!(s1.failures.is_empty());

    let persisted = store.load_documents().await.unwrap();
    assert_eq!(
        persisted.get("guide/usage.mdx").unwrap().parent_path.as_deref(),
        Some("guide.mdx")
    );

    // Preamble section for guide.mdx, slugged section for usage.mdx.
    let rows: Vec<(String, Option<String>, Option<String>, String)> = sqlx::query_as(
        "SELECT documents.path, sections.slug, sections.heading, sections.content
         FROM sections JOIN documents ON documents.id = sections.document_id
         ORDER BY documents.path",
    )
    .fetch_all(store.pool())
    .await
    .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], ("guide.mdx".into(), None, None, "Hello".into()));
    assert_eq!(
        rows[1],
        (
            "guide/usage.mdx".into(),
            Some("usage".into()),
            Some("Usage".into()),
            "## Usage\nText".into()
        )
    );

    // No file changes: everything reclassifies Unchanged.
    let discovery = discover(&config).unwrap();
    let s2 = reconciler
        .run(&discovery.documents, &[], SyncMode::Incremental)
        .await
        .unwrap();
    assert_eq!(s2.inserted, 0);
    assert_eq!(s2.unchanged, 2);
}

#[tokio::test]
async fn test_single_byte_change_reclassifies_changed() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join("a.md"), "# Title\n\nHello").unwrap();

    let config = config_for(tmp.path());
    let store = test_store().await;
    let gateway = StubGateway;
    let reconciler = Reconciler::new(&store, &gateway);

    let first = discover(&config).unwrap();
    reconciler
        .run(&first.documents, &[], SyncMode::Incremental)
        .await
        .unwrap();

    fs::write(docs.join("a.md"), "# Title\n\nHellp").unwrap();
    let second = discover(&config).unwrap();
    assert_ne!(first.documents[0].checksum, second.documents[0].checksum);

    let summary = reconciler
        .run(&second.documents, &[], SyncMode::Incremental)
        .await
        .unwrap();
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.unchanged, 0);
}

#[tokio::test]
async fn test_deleted_file_removed_from_store() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join("keep.md"), "# Keep").unwrap();
    fs::write(docs.join("drop.md"), "# Drop").unwrap();

    let config = config_for(tmp.path());
    let store = test_store().await;
    let gateway = StubGateway;
    let reconciler = Reconciler::new(&store, &gateway);

    let discovery = discover(&config).unwrap();
    reconciler
        .run(&discovery.documents, &[], SyncMode::Incremental)
        .await
        .unwrap();

    fs::remove_file(docs.join("drop.md")).unwrap();
    let discovery = discover(&config).unwrap();
    let summary = reconciler
        .run(&discovery.documents, &[], SyncMode::Incremental)
        .await
        .unwrap();
    assert_eq!(summary.deleted, 1);

    let persisted = store.load_documents().await.unwrap();
    assert!(!persisted.contains_key("drop.md"));

    let orphans: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sections WHERE document_id NOT IN (SELECT id FROM documents)",
    )
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_eq!(orphans, 0);
}

#[tokio::test]
async fn test_parse_failure_keeps_persisted_document() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join("a.md"), "# Title\n\nBody").unwrap();

    let config = config_for(tmp.path());
    let store = test_store().await;
    let gateway = StubGateway;
    let reconciler = Reconciler::new(&store, &gateway);

    let discovery = discover(&config).unwrap();
    reconciler
        .run(&discovery.documents, &[], SyncMode::Incremental)
        .await
        .unwrap();

    // A save mid-edit leaves an unterminated fence. The document fails
    // discovery but is still on disk; the sweep must not remove it.
    fs::write(docs.join("a.md"), "```\nnever closed").unwrap();
    let discovery = discover(&config).unwrap();
    assert_eq!(discovery.failures.len(), 1);
    let failed: Vec<String> = discovery
        .failures
        .iter()
        .map(|(path, _)| path.clone())
        .collect();
    let summary = reconciler
        .run(&discovery.documents, &failed, SyncMode::Incremental)
        .await
        .unwrap();
    assert_eq!(summary.deleted, 0);

    let persisted = store.load_documents().await.unwrap();
    assert!(persisted.contains_key("a.md"));

    // Once the file parses again, the next pass reclassifies it Changed.
    fs::write(docs.join("a.md"), "# Title\n\nFixed body").unwrap();
    let discovery = discover(&config).unwrap();
    assert!(discovery.failures.is_empty());
    let summary = reconciler
        .run(&discovery.documents, &[], SyncMode::Incremental)
        .await
        .unwrap();
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.deleted, 0);
}

#[tokio::test]
async fn test_mdx_meta_and_pruning_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(
        docs.join("page.mdx"),
        "import { Tab } from 'ui'\n\nexport const meta = {\n  title: 'Page',\n  build: buildId(),\n}\n\n# Page [#start]\n\n<Tab>\n  widget\n</Tab>\n\nActual prose.",
    )
    .unwrap();

    let config = config_for(tmp.path());
    let discovery = discover(&config).unwrap();
    assert!(discovery.failures.is_empty());

    let page = &discovery.documents[0];
    assert_eq!(
        page.meta,
        Some(serde_json::json!({"title": "Page"}))
    );
    assert_eq!(page.sections.len(), 1);
    assert_eq!(page.sections[0].slug.as_deref(), Some("start"));
    assert_eq!(page.sections[0].heading.as_deref(), Some("Page"));
    assert_eq!(page.sections[0].content, "# Page [#start]\n\nActual prose.");
}

#[tokio::test]
async fn test_full_refresh_twice_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join("a.md"), "# One\n\nalpha\n\n# Two\n\nbeta").unwrap();
    fs::write(docs.join("b.md"), "plain preamble").unwrap();

    let config = config_for(tmp.path());
    let store = test_store().await;
    let gateway = StubGateway;
    let reconciler = Reconciler::new(&store, &gateway);

    let snapshot = |store: &Store| {
        let pool = store.pool().clone();
        async move {
            let rows: Vec<(String, Option<String>, String, i64, Vec<u8>)> = sqlx::query_as(
                "SELECT documents.path, sections.slug, sections.content,
                        sections.token_count, sections.embedding
                 FROM sections JOIN documents ON documents.id = sections.document_id
                 ORDER BY documents.path, sections.slug",
            )
            .fetch_all(&pool)
            .await
            .unwrap();
            rows
        }
    };

    let discovery = discover(&config).unwrap();
    reconciler
        .run(&discovery.documents, &[], SyncMode::Full)
        .await
        .unwrap();
    let first = snapshot(&store).await;

    let discovery = discover(&config).unwrap();
    reconciler
        .run(&discovery.documents, &[], SyncMode::Full)
        .await
        .unwrap();
    let second = snapshot(&store).await;

    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
}
