//! Initialize command.

use console::style;

use crate::config::Settings;

/// Initialize the data directory and database.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let ctx = settings.create_db_context()?;
    ctx.init_schema().await?;
    println!("  {} Database ready", style("✓").green());

    let documents = ctx.documents().count().await?;
    if documents == 0 {
        println!(
            "{} No documents yet; run `arcus serve` and upload a plan with `arcus upload`",
            style("!").yellow()
        );
    } else {
        println!("  {} {} documents stored", style("→").cyan(), documents);
    }

    println!(
        "{} Initialized arcus in {}",
        style("✓").green(),
        settings.data_dir.display()
    );

    Ok(())
}
