//! Document inspection commands.

use console::style;

use crate::config::Settings;
use crate::models::{DocumentStatus, LayerKey};

fn status_label(status: DocumentStatus) -> console::StyledObject<&'static str> {
    match status {
        DocumentStatus::Complete => style(status.as_str()).green(),
        DocumentStatus::Ingesting => style(status.as_str()).yellow(),
        DocumentStatus::Failed => style(status.as_str()).red(),
    }
}

/// List stored documents for every owner.
pub async fn cmd_list(settings: &Settings, format: &str) -> anyhow::Result<()> {
    let ctx = settings.create_db_context()?;
    let documents = ctx.documents().list(None).await?;

    if documents.is_empty() {
        println!("{} No documents found", style("!").yellow());
        return Ok(());
    }

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&documents)?);
        }
        _ => {
            println!(
                "{:<36}  {:<10}  {:>5}  {:<16}  Name",
                "ID", "Status", "Pages", "Updated"
            );
            println!("{}", "-".repeat(90));
            for doc in &documents {
                println!(
                    "{:<36}  {:<10}  {:>5}  {:<16}  {}",
                    doc.id,
                    status_label(doc.status),
                    doc.page_count,
                    doc.updated_at.format("%Y-%m-%d %H:%M"),
                    doc.name
                );
            }
            println!("\n{} documents", documents.len());
        }
    }

    Ok(())
}

/// Show one document with per-layer coverage.
pub async fn cmd_show(settings: &Settings, id: &str) -> anyhow::Result<()> {
    let ctx = settings.create_db_context()?;
    let Some(doc) = ctx.documents().get(id).await? else {
        println!("{} Document not found: {}", style("✗").red(), id);
        return Ok(());
    };

    println!("\n{}", style(&doc.name).bold());
    println!("{}", "-".repeat(60));
    println!("{:<14} {}", "ID:", doc.id);
    println!("{:<14} {}", "Owner:", doc.owner_id);
    println!("{:<14} {}", "Status:", status_label(doc.status));
    println!("{:<14} {}", "Revision:", doc.revision);
    println!("{:<14} {}", "Current page:", doc.canvas.current_page);
    if let (Some(index), Some(total)) = (doc.canvas.chunk_index, doc.canvas.total_chunks) {
        println!("{:<14} {}/{}", "Last chunk:", index + 1, total);
    }
    println!(
        "{:<14} {}",
        "Updated:",
        doc.updated_at.format("%Y-%m-%d %H:%M:%S")
    );

    let pages = doc.canvas.page_count();
    println!("\n{}", style("Layers").bold());
    for key in LayerKey::ALL {
        let filled = (0..pages)
            .filter(|&page| doc.canvas.entry(key, page).is_some())
            .count();
        let marker = if filled == 0 {
            style("·").dim()
        } else if filled == pages {
            style("✓").green()
        } else {
            style("~").yellow()
        };
        println!("  {} {:<30} {}/{}", marker, key.as_str(), filled, pages);
    }

    Ok(())
}

/// Delete a document. Without `owner` the stored owner is used.
pub async fn cmd_delete(settings: &Settings, id: &str, owner: Option<&str>) -> anyhow::Result<()> {
    let ctx = settings.create_db_context()?;
    let repo = ctx.documents();

    let owner = match owner {
        Some(owner) => owner.to_string(),
        None => match repo.get(id).await? {
            Some(doc) => doc.owner_id,
            None => {
                println!("{} Document not found: {}", style("✗").red(), id);
                return Ok(());
            }
        },
    };

    if repo.delete(&owner, id).await? {
        println!("{} Deleted document {}", style("✓").green(), id);
    } else {
        println!(
            "{} No document {} owned by {}",
            style("✗").red(),
            id,
            owner
        );
    }
    Ok(())
}
