//! Three-way reconciliation of discovered documents against the store.
//!
//! Each discovered document is classified against the persisted set by path:
//!
//! | Persisted match | Checksum | Parent | Classification |
//! |-----------------|----------|--------|----------------|
//! | none            | -        | -      | `Insert`       |
//! | found           | equal    | equal  | `Unchanged`    |
//! | found           | equal    | differs| `ParentOnly`   |
//! | found           | differs  | any    | `Changed`      |
//!
//! One classification function feeds one apply dispatcher, shared by both
//! sync modes. Incremental mode isolates per-document failures and runs a
//! deletion sweep at the end; full-refresh mode deletes the entire persisted
//! set up front and inserts everything discovered, bypassing checksums.

use chrono::Utc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::gateway::EmbeddingGateway;
use crate::models::{DiscoveredDocument, Section, StoredDocument};
use crate::store::Store;

/// How a pass treats the persisted set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Change-detection-guided partial re-sync.
    Incremental,
    /// Destructive total re-sync; recovery path when incremental state is
    /// untrustworthy.
    Full,
}

/// Outcome of classifying one discovered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Insert,
    Unchanged,
    ParentOnly,
    Changed,
}

/// Classify one discovered document against its persisted row, if any.
pub fn classify(
    discovered: &DiscoveredDocument,
    persisted: Option<&StoredDocument>,
) -> Classification {
    match persisted {
        None => Classification::Insert,
        Some(stored) => {
            if stored.checksum != discovered.checksum {
                Classification::Changed
            } else if stored.parent_path != discovered.parent_path {
                Classification::ParentOnly
            } else {
                Classification::Unchanged
            }
        }
    }
}

/// Counters and per-document failures for one sync pass.
#[derive(Debug, Default)]
pub struct PassSummary {
    pub discovered: usize,
    pub inserted: usize,
    pub updated: usize,
    pub parent_updates: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub dangling_parents_nulled: u64,
    pub total_tokens: i64,
    /// `(path, error)` for every isolated per-document failure.
    pub failures: Vec<(String, String)>,
}

/// Drives one reconciliation pass. Holds borrowed handles: the store and
/// gateway are constructed by the caller and passed in, never ambient.
pub struct Reconciler<'a> {
    store: &'a Store,
    gateway: &'a dyn EmbeddingGateway,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a Store, gateway: &'a dyn EmbeddingGateway) -> Self {
        Self { store, gateway }
    }

    /// Run one pass over the discovered set. Documents are processed
    /// strictly sequentially per path; the returned summary carries any
    /// isolated failures (the pass itself still returns `Ok`).
    ///
    /// `skip_paths` lists paths the walk found but discovery could not
    /// turn into documents (unreadable or unparseable files). Those files
    /// still exist on disk, so their persisted rows are exempt from the
    /// deletion sweep and survive until a later pass re-reads them.
    pub async fn run(
        &self,
        discovered: &[DiscoveredDocument],
        skip_paths: &[String],
        mode: SyncMode,
    ) -> Result<PassSummary> {
        let version = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();

        // A path appearing twice would make two classifications apply to
        // one document in a single pass. Correct discovery never produces
        // this, so it aborts as a bug rather than being skipped.
        let mut seen = std::collections::HashSet::new();
        for doc in discovered {
            if !seen.insert(doc.path.as_str()) {
                return Err(SyncError::Invariant(format!(
                    "path discovered twice in one pass: {}",
                    doc.path
                )));
            }
        }
        for path in skip_paths {
            seen.insert(path.as_str());
        }

        let mut summary = PassSummary {
            discovered: discovered.len(),
            ..Default::default()
        };

        let persisted = match mode {
            SyncMode::Full => {
                // Destructive phase: failure here is fatal and surfaced
                // immediately. Anything after it works on an empty store.
                self.store.delete_all().await?;
                std::collections::HashMap::new()
            }
            SyncMode::Incremental => self.store.load_documents().await?,
        };

        for doc in discovered {
            let classification = classify(doc, persisted.get(doc.path.as_str()));
            debug!(path = %doc.path, ?classification, "classified document");

            let result = self
                .apply(classification, doc, persisted.get(doc.path.as_str()), &version, now, &mut summary)
                .await;

            if let Err(err) = result {
                if !err.is_isolable() {
                    return Err(err);
                }
                error!(path = %doc.path, %err, "document failed; continuing pass");
                summary.failures.push((doc.path.clone(), err.to_string()));
            }
        }

        // Deletion sweep: anything persisted but not discovered this pass.
        for (path, stored) in &persisted {
            if !seen.contains(path.as_str()) {
                match self.store.delete_document(&stored.id).await {
                    Ok(()) => summary.deleted += 1,
                    Err(err) => {
                        error!(path = %path, %err, "delete failed; continuing pass");
                        summary.failures.push((path.clone(), err.to_string()));
                    }
                }
            }
        }

        // Parent references are plain path strings; a parent that failed
        // its own insert this pass would leave children pointing at
        // nothing. Null those references; the next successful pass
        // restores them via ParentOnly.
        summary.dangling_parents_nulled = self.store.null_dangling_parents().await?;

        Ok(summary)
    }

    /// Single apply dispatcher consumed by both sync modes.
    async fn apply(
        &self,
        classification: Classification,
        doc: &DiscoveredDocument,
        stored: Option<&StoredDocument>,
        version: &str,
        now: i64,
        summary: &mut PassSummary,
    ) -> Result<()> {
        match classification {
            Classification::Insert => {
                let embedded = self.embed_sections(doc, summary).await?;
                let id = self.store.insert_document(doc, version, now).await?;
                let sections = attach_document_id(embedded, &id);
                if let Err(err) = self.store.replace_sections(&id, &sections).await {
                    // Roll back the document row so the next pass retries
                    // the insert instead of classifying it Unchanged.
                    if let Err(cleanup_err) = self.store.delete_document(&id).await {
                        warn!(path = %doc.path, %cleanup_err, "orphaned document row after failed section write");
                    }
                    return Err(err);
                }
                summary.inserted += 1;
            }
            Classification::Unchanged => {
                let stored = expect_stored(stored, doc)?;
                self.store.touch_document(&stored.id, version, now).await?;
                summary.unchanged += 1;
            }
            Classification::ParentOnly => {
                let stored = expect_stored(stored, doc)?;
                self.store
                    .update_parent(&stored.id, doc.parent_path.as_deref(), version, now)
                    .await?;
                summary.parent_updates += 1;
            }
            Classification::Changed => {
                let stored = expect_stored(stored, doc)?;
                let embedded = self.embed_sections(doc, summary).await?;
                let sections = attach_document_id(embedded, &stored.id);
                // Sections first: if the document update below fails, the
                // old checksum survives and the next pass redoes Changed.
                self.store.replace_sections(&stored.id, &sections).await?;
                self.store.update_document(&stored.id, doc, version, now).await?;
                summary.updated += 1;
            }
        }
        Ok(())
    }

    /// Embed all of a document's sections in one gateway call.
    ///
    /// Sections are sorted by slug (preamble first) for the request so a
    /// given content set always produces the same request ordering; the
    /// returned vectors are mapped back to document order by index.
    async fn embed_sections(
        &self,
        doc: &DiscoveredDocument,
        summary: &mut PassSummary,
    ) -> Result<Vec<Section>> {
        if doc.sections.is_empty() {
            return Ok(Vec::new());
        }

        let mut order: Vec<usize> = (0..doc.sections.len()).collect();
        order.sort_by(|&a, &b| doc.sections[a].slug.cmp(&doc.sections[b].slug));

        let texts: Vec<String> = order
            .iter()
            .map(|&i| doc.sections[i].content.clone())
            .collect();

        let batch = self.gateway.embed(&texts).await?;
        if batch.vectors.len() != texts.len() {
            return Err(SyncError::Gateway(format!(
                "gateway returned {} vectors for {} sections",
                batch.vectors.len(),
                texts.len()
            )));
        }
        summary.total_tokens += batch.total_tokens;

        let dims = self.gateway.dims();
        let mut embeddings: Vec<Option<Vec<f32>>> = vec![None; doc.sections.len()];
        for (rank, &idx) in order.iter().enumerate() {
            let vector = &batch.vectors[rank];
            if dims > 0 && vector.len() != dims {
                return Err(SyncError::Gateway(format!(
                    "expected {}-dimensional vector, got {}",
                    dims,
                    vector.len()
                )));
            }
            embeddings[idx] = Some(vector.clone());
        }

        Ok(doc
            .sections
            .iter()
            .zip(embeddings)
            .map(|(input, embedding)| Section {
                id: Uuid::new_v4().to_string(),
                document_id: String::new(),
                slug: input.slug.clone(),
                heading: input.heading.clone(),
                content: input.content.clone(),
                token_count: input.token_count,
                embedding: embedding.unwrap_or_default(),
            })
            .collect())
    }
}

fn attach_document_id(mut sections: Vec<Section>, document_id: &str) -> Vec<Section> {
    for section in &mut sections {
        section.document_id = document_id.to_string();
    }
    sections
}

fn expect_stored<'s>(
    stored: Option<&'s StoredDocument>,
    doc: &DiscoveredDocument,
) -> Result<&'s StoredDocument> {
    stored.ok_or_else(|| {
        SyncError::Invariant(format!(
            "classification requires a persisted row for {}, but none was loaded",
            doc.path
        ))
    })
}
