//! Upload command: render a PDF locally and send it to a server in batches.

use std::path::Path;

use anyhow::Context;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Settings;
use crate::ingest::{
    cancel, plan_batches, HttpIngestClient, IngestError, Transmitter, UploadReport,
};
use crate::services::rasterizer::render_pages;
use crate::services::PdftoppmRasterizer;

/// Flags that override the configured ingest settings for one upload.
#[derive(Debug, Default)]
pub struct UploadOptions {
    pub name: Option<String>,
    pub chunk_size: Option<usize>,
    pub concurrency: Option<usize>,
    pub api_url: Option<String>,
    pub user: Option<String>,
}

fn progress_bar(len: u64, message: &'static str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            )?
            .progress_chars("#>-"),
    );
    pb.set_message(message);
    Ok(pb)
}

/// Print the result of a finished upload. Missing batches leave the document
/// `ingesting` on the server, so they fail the command.
fn report_outcome(report: &UploadReport) -> anyhow::Result<()> {
    if report.is_complete() {
        println!(
            "{} Uploaded document {} ({})",
            style("✓").green(),
            report.document_id,
            report.status.as_str()
        );
        return Ok(());
    }

    eprintln!(
        "{} Uploaded document {} with {} of {} batches missing: {:?}",
        style("!").yellow(),
        report.document_id,
        report.failed_batches.len(),
        report.total_batches,
        report.failed_batches
    );
    anyhow::bail!(
        "Upload of {} is incomplete: {} batch(es) failed",
        report.document_id,
        report.failed_batches.len()
    )
}

/// Upload a PDF as a new document.
pub async fn cmd_upload(
    settings: &Settings,
    file: &Path,
    options: UploadOptions,
) -> anyhow::Result<()> {
    let user = options
        .user
        .or_else(|| settings.user_id.clone())
        .ok_or_else(|| anyhow::anyhow!("No owner id: pass --user or set ARCUS_USER_ID"))?;
    let api_url = options.api_url.unwrap_or_else(|| settings.api_url.clone());
    let name = options
        .name
        .or_else(|| {
            file.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "Untitled".to_string());

    let mut ingest = settings.ingest.clone();
    if let Some(chunk_size) = options.chunk_size {
        ingest.chunk_size = chunk_size;
    }
    if let Some(concurrency) = options.concurrency {
        ingest.concurrency = concurrency;
    }

    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    println!(
        "{} Rendering {} ({} bytes)",
        style("→").cyan(),
        file.display(),
        bytes.len()
    );
    let render_bar = progress_bar(0, "pages rendered")?;
    let pages = {
        let bar = render_bar.clone();
        let scale = ingest.render_scale;
        let max_dim = ingest.max_image_dimension;
        tokio::task::spawn_blocking(move || {
            render_pages(&PdftoppmRasterizer, &bytes, scale, max_dim, |done, total| {
                bar.set_length(u64::from(total));
                bar.set_position(u64::from(done));
            })
        })
        .await??
    };
    render_bar.finish_and_clear();

    let batches = plan_batches(&name, pages, ingest.chunk_size)?;
    let page_count: usize = batches.iter().map(|b| b.pages.len()).sum();
    println!(
        "{} Uploading '{}' to {}: {} pages in {} batches",
        style("→").cyan(),
        name,
        api_url,
        page_count,
        batches.len()
    );

    let client = HttpIngestClient::new(&api_url, &user, settings.request_timeout())?;
    let transmitter = Transmitter::new(client, ingest.transmitter_config());

    let (handle, signal) = cancel::channel();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let bar = progress_bar(100, "% uploaded")?;
    let result = transmitter
        .upload(&batches, &signal, |percent| {
            bar.set_position(u64::from(percent));
        })
        .await;
    ctrl_c.abort();

    match result {
        Ok(report) => {
            bar.finish_and_clear();
            report_outcome(&report)
        }
        Err(IngestError::Cancelled) => {
            bar.abandon();
            println!("{} Upload cancelled", style("!").yellow());
            Err(IngestError::Cancelled.into())
        }
        Err(e) => {
            bar.abandon();
            eprintln!("{} Upload failed: {}", style("✗").red(), e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentStatus;

    fn report(failed_batches: Vec<u32>) -> UploadReport {
        UploadReport {
            document_id: "doc".into(),
            total_batches: 5,
            failed_batches,
            status: DocumentStatus::Ingesting,
        }
    }

    #[test]
    fn test_complete_upload_succeeds() {
        let mut done = report(Vec::new());
        done.status = DocumentStatus::Complete;
        assert!(report_outcome(&done).is_ok());
    }

    #[test]
    fn test_tolerated_failures_fail_the_command() {
        let err = report_outcome(&report(vec![2, 4])).unwrap_err();
        assert!(err.to_string().contains("2 batch(es) failed"));
    }
}
