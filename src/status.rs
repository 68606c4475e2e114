// System status display — row counts, edge counts, last run times.

use anyhow::Result;
use chrono::{TimeZone, Utc};
use std::path::Path;
use std::sync::Arc;

use crate::db::Store;

/// Display engine status to the terminal.
pub async fn show(store: &Arc<dyn Store>, db_path: &str) -> Result<()> {
    if !Path::new(db_path).exists() {
        println!("Database: not initialized");
        println!("\nRun `kindred init` to set up the database.");
        return Ok(());
    }

    let file_size = std::fs::metadata(db_path)
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|_| "unknown".to_string());
    println!("Database: {} ({})", db_path, file_size);

    let stats = store.stats().await?;
    println!(
        "Dataset: {} users, {} businesses, {} ratings",
        stats.users, stats.businesses, stats.ratings
    );

    println!(
        "User similarity: {} edges (last run: {})",
        stats.user_edges,
        format_run_time(stats.last_user_update)
    );
    println!(
        "Business similarity: {} edges (last run: {})",
        stats.business_edges,
        format_run_time(stats.last_business_update)
    );

    if stats.user_edges == 0 && stats.ratings > 0 {
        println!("\nRun `kindred recompute users` to build the similarity graph.");
    }

    Ok(())
}

fn format_run_time(millis: Option<i64>) -> String {
    match millis.and_then(|ms| Utc.timestamp_millis_opt(ms).single()) {
        Some(ts) => ts.format("%Y-%m-%d %H:%M UTC").to_string(),
        None => "never".to_string(),
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes_ranges() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_format_run_time_never() {
        assert_eq!(format_run_time(None), "never");
    }

    #[test]
    fn test_format_run_time_known_instant() {
        // 2023-11-14 22:13:20 UTC
        let formatted = format_run_time(Some(1_700_000_000_000));
        assert!(formatted.starts_with("2023-11-14"));
        assert!(formatted.ends_with("UTC"));
    }
}
