//! Layer resolution from the command line.

use console::style;

use crate::config::Settings;
use crate::layers;
use crate::models::ViewerToggles;

/// Shorten data URLs, which can run to megabytes.
fn describe_image(image: &str) -> String {
    match image.split_once(',') {
        Some((header, payload)) if header.starts_with("data:") => {
            format!("{},… ({} bytes)", header, payload.len())
        }
        _ => image.to_string(),
    }
}

/// Print the key and image the viewer would show for `page`.
pub async fn cmd_resolve(
    settings: &Settings,
    id: &str,
    page: Option<usize>,
    toggles: ViewerToggles,
) -> anyhow::Result<()> {
    let ctx = settings.create_db_context()?;
    let doc = ctx
        .documents()
        .get(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Document not found: {}", id))?;

    let page = page.unwrap_or(doc.canvas.current_page);
    let availability = layers::availability(&doc.canvas, page, toggles);
    println!(
        "{} Page {} of {} with {} categories shown",
        style("→").cyan(),
        page,
        doc.canvas.page_count(),
        availability.count()
    );

    match layers::resolve_image(page, &doc.canvas, toggles) {
        Some(view) => {
            println!("  {:<10} {}", "Resolved:", style(view.resolved).bold());
            if view.fell_back() {
                println!(
                    "  {} No {} entry on this page, showing {}",
                    style("!").yellow(),
                    view.resolved,
                    view.source
                );
            }
            println!("  {:<10} {}", "Image:", describe_image(view.image));
            Ok(())
        }
        None => {
            println!("{} No image for page {}", style("✗").red(), page);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_image_shortens_data_urls() {
        assert_eq!(
            describe_image("data:image/png;base64,AAAA"),
            "data:image/png;base64,… (4 bytes)"
        );
        assert_eq!(
            describe_image("https://cdn.example.com/p0.png"),
            "https://cdn.example.com/p0.png"
        );
    }
}
