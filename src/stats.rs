//! Database statistics and health overview.
//!
//! Provides a quick summary of what's indexed: document and section counts,
//! last refresh times, and a per-document breakdown. Used by `docsync status`
//! to give confidence that sync passes are working as expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::store::Store;

/// Run the status command: query the database and print a summary.
pub async fn run_status(config: &Config) -> Result<()> {
    let store = Store::open(&config.db.path).await?;
    let pool = store.pool();

    let total_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(pool)
        .await?;

    let total_sections: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sections")
        .fetch_one(pool)
        .await?;

    let last_refresh: Option<i64> = sqlx::query_scalar("SELECT MAX(updated_at) FROM documents")
        .fetch_one(pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("docsync - Store Status");
    println!("======================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  Documents:     {}", total_docs);
    println!("  Sections:      {}", total_sections);
    println!(
        "  Last refresh:  {}",
        match last_refresh {
            Some(ts) => format_ts_relative(ts),
            None => "never".to_string(),
        }
    );

    let doc_rows = sqlx::query(
        r#"
        SELECT
            d.path,
            d.parent_path,
            COUNT(s.id) AS section_count,
            SUM(s.token_count) AS token_count
        FROM documents d
        LEFT JOIN sections s ON s.document_id = d.id
        GROUP BY d.id
        ORDER BY d.path
        "#,
    )
    .fetch_all(pool)
    .await?;

    if !doc_rows.is_empty() {
        println!();
        println!("  By document:");
        println!(
            "  {:<48} {:>8} {:>8}   {}",
            "PATH", "SECTIONS", "TOKENS", "PARENT"
        );
        println!("  {}", "-".repeat(88));

        for row in &doc_rows {
            let path: String = row.get("path");
            let parent: Option<String> = row.get("parent_path");
            let section_count: i64 = row.get("section_count");
            let token_count: Option<i64> = row.get("token_count");
            println!(
                "  {:<48} {:>8} {:>8}   {}",
                path,
                section_count,
                token_count.unwrap_or(0),
                parent.as_deref().unwrap_or("-")
            );
        }
    }

    println!();

    store.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
