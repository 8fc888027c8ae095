use anyhow::Result;
use autopush_core::push_manager::PushManager;
use colored::*;

pub async fn execute(manager: &PushManager) -> Result<()> {
    let report = manager
        .check()
        .await
        .map_err(|e| anyhow::anyhow!("Preflight failed: {}", e))?;

    let settings = manager.settings();
    println!("{} {}", "Repository:".bold(), manager.repo().display());
    println!(
        "{} {} <{}>",
        "Identity:".bold(),
        report.identity.name,
        report.identity.email
    );
    println!(
        "{} {}",
        "Changes:".bold(),
        if report.has_changes {
            "pending".yellow()
        } else {
            "clean".bright_black()
        }
    );
    println!(
        "{} add {}s, commit {}s, push {}s, overall {}s",
        "Timeouts:".bold(),
        settings.timeouts.add.as_secs(),
        settings.timeouts.commit.as_secs(),
        settings.timeouts.push.as_secs(),
        settings.timeouts.overall.as_secs()
    );
    println!();
    println!("{} {}", "✓".green().bold(), "Ready to push".green().bold());
    Ok(())
}
