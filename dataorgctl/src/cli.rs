use anyhow::Result;
use console::style;
use dataorg::utils::{format_bytes, format_duration};
use dataorg::{Config, DataorgError, Migration, StatsSnapshot};

pub async fn handle_run(config: Config, format: &str) -> Result<()> {
    let migration = Migration::new(config)?;
    let summary = migration.run().await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!(
        "{} Migrated {} up to row {}",
        style("✓").green(),
        style(&summary.input_id).cyan(),
        summary.last_row
    );
    if summary.resumed_from > 0 {
        println!("  Resumed after row {}", summary.resumed_from);
    }
    println!(
        "  Rows: {} processed, {} skipped, {} quarantined",
        summary.rows_processed, summary.rows_skipped, summary.rows_quarantined
    );
    print_stats(&summary.stats);
    println!("  Elapsed: {}", format_duration(summary.elapsed.as_secs() as i64));

    if summary.stats.files_failed > 0 {
        println!(
            "{} {} files failed; see {}",
            style("⚠").yellow(),
            summary.stats.files_failed,
            migration.config().log_dir().join("failed.log").display()
        );
    }
    Ok(())
}

pub fn handle_preview(config: Config, limit: Option<usize>, format: &str) -> Result<()> {
    let migration = Migration::new(config)?;
    let previews = migration.preview(limit)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&previews)?);
        return Ok(());
    }

    if previews.is_empty() {
        println!("{} No rows found", style("ℹ").blue());
        return Ok(());
    }

    println!("{:<6} {:<38} {}", "Row", "GUID", "Target");
    println!("{}", "-".repeat(100));
    for preview in previews {
        let id = preview.id.as_deref().unwrap_or("-");
        let target = match (&preview.target_dir, preview.source_exists) {
            (None, _) => style("skipped: no GUID".to_string()).dim(),
            (Some(_), false) => style("skipped: no source folder".to_string()).dim(),
            (Some(dir), true) if preview.quarantined => {
                style(format!("{} (quarantine)", dir.display())).yellow()
            }
            (Some(dir), true) => style(dir.display().to_string()).green(),
        };
        println!("{:<6} {:<38} {}", preview.index, id, target);
    }
    Ok(())
}

pub async fn handle_status(config: Config, format: &str) -> Result<()> {
    let migration = Migration::new(config)?;
    let status = migration.status().await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{} Migration status: {}", style("📋").blue(), style(&status.input_id).cyan());
    if status.checkpoint == 0 {
        println!("  Checkpoint: not started");
    } else {
        println!("  Checkpoint: row {}", status.checkpoint);
    }
    print_stats(&status.stats);
    Ok(())
}

pub async fn handle_reset(config: Config, format: &str) -> Result<()> {
    let migration = Migration::new(config)?;
    migration.reset().await?;

    if format == "json" {
        println!("{}", serde_json::json!({ "input_id": migration.input_id(), "checkpoint": 0 }));
    } else {
        println!(
            "{} Checkpoint cleared for {}; the next run starts at row 1",
            style("✓").green(),
            style(migration.input_id()).cyan()
        );
    }
    Ok(())
}

pub fn print_error(error: &DataorgError) {
    eprintln!("{} {}", style("✗").red(), error);
    eprintln!("  {}", style(error.suggested_action()).dim());
}

fn print_stats(stats: &StatsSnapshot) {
    println!(
        "  Files: {} copied ({}), {} failed, {} skipped, {} duplicates",
        stats.files_copied,
        format_bytes(stats.bytes_copied),
        stats.files_failed,
        stats.files_skipped,
        stats.duplicate_files
    );
    println!("  Folders skipped: {}", stats.folders_skipped);
}
