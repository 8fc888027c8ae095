use anyhow::Result;
use autopush_core::push_manager::PushManager;
use autopush_core::results::{BatchReport, IterationOutcome, StopReason};
use colored::*;

pub async fn execute(manager: &PushManager) -> Result<()> {
    let settings = manager.settings();
    println!(
        "{} {} {}",
        "Pushing".bold(),
        manager.repo().display().to_string().cyan(),
        format!("(every {}s)", settings.repeat.interval.as_secs()).bright_black()
    );
    println!();

    let report = manager
        .run_batch()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run batch: {}", e))?;

    print_report(&report);

    match report.stopped {
        Some(StopReason::Timeout) => Err(anyhow::anyhow!("Batch stopped after a timeout")),
        Some(StopReason::Failure) => Err(anyhow::anyhow!("Batch stopped after a failed push")),
        None => Ok(()),
    }
}

fn print_report(report: &BatchReport) {
    println!("{}", planned_line(report).bright_black());
    for iteration in &report.iterations {
        let status = match &iteration.outcome {
            IterationOutcome::Sequence(outcome) if outcome.is_success() => "✓".green().bold(),
            IterationOutcome::Sequence(outcome) if outcome.is_timeout() => "⏱".yellow().bold(),
            IterationOutcome::Sequence(_) => "✗".red().bold(),
            IterationOutcome::Skipped => "-".bright_black().bold(),
        };
        let detail = match &iteration.outcome {
            IterationOutcome::Sequence(outcome) => outcome.to_string(),
            IterationOutcome::Skipped => "no changes, skipped".to_string(),
        };
        println!(
            "{} {} {}",
            status,
            format!("#{}", iteration.index).bold(),
            detail
        );
    }

    println!();
    println!(
        "{} {} succeeded, {} skipped, {} failed of {} planned",
        "Summary:".bold(),
        report.succeeded().to_string().green(),
        report.skipped(),
        report.failed().to_string().red(),
        report.planned
    );
}

/// Jitter is applied inside the batch, so the count comes from the report
fn planned_line(report: &BatchReport) -> String {
    format!("{} run(s) planned", report.planned)
}
