use anyhow::Result;
use autopush_core::push_manager::PushManager;
use colored::*;

pub async fn execute(manager: &PushManager, message: Option<&str>) -> Result<()> {
    println!(
        "{} {}",
        "Pushing once".bold(),
        manager.repo().display().to_string().cyan()
    );

    let outcome = manager
        .run_once(message)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to push: {}", e))?;

    if !outcome.is_success() {
        return Err(anyhow::anyhow!("{}", outcome));
    }

    println!(
        "{} {}",
        "✓".green().bold(),
        "Changes committed and pushed".green().bold()
    );
    Ok(())
}
