//! PDF page rasterization using poppler's command-line tools.

use std::borrow::Cow;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;

use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;

const PDFTOPPM_NOT_FOUND: &str =
    "pdftoppm not found. Install poppler-utils (apt install poppler-utils / brew install poppler)";

/// Resolution pdftoppm renders at for a scale of 1.0.
const BASE_DPI: f32 = 72.0;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("{0}")]
    ToolNotAvailable(String),

    #[error("not a PDF document")]
    NotPdf,

    #[error("page {page} out of range (document has {count} pages)")]
    PageOutOfRange { page: u32, count: u32 },

    #[error("rendering failed: {0}")]
    Render(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Opens a source document for page rendering.
pub trait PageRasterizer: Send + Sync {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn RasterDocument>, RasterError>;
}

/// An opened document. Pages are 0-based.
pub trait RasterDocument: Send {
    fn page_count(&self) -> u32;

    fn render(&self, page: u32, scale: f32) -> Result<DynamicImage, RasterError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PdftoppmRasterizer;

impl PageRasterizer for PdftoppmRasterizer {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn RasterDocument>, RasterError> {
        if !bytes.starts_with(b"%PDF") {
            return Err(RasterError::NotPdf);
        }

        let dir = TempDir::new()?;
        let path = dir.path().join("source.pdf");
        std::fs::write(&path, bytes)?;

        let page_count = pdf_page_count(&path)?;
        debug!("Opened PDF with {} pages", page_count);

        Ok(Box::new(PdftoppmDocument {
            dir,
            path,
            page_count,
        }))
    }
}

struct PdftoppmDocument {
    dir: TempDir,
    path: PathBuf,
    page_count: u32,
}

impl RasterDocument for PdftoppmDocument {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn render(&self, page: u32, scale: f32) -> Result<DynamicImage, RasterError> {
        if page >= self.page_count {
            return Err(RasterError::PageOutOfRange {
                page,
                count: self.page_count,
            });
        }

        // pdftoppm numbers pages from 1.
        let page_num = page + 1;
        let page_str = page_num.to_string();
        let dpi = ((BASE_DPI * scale).round() as u32).max(1).to_string();
        let output_dir = self.dir.path().join(format!("render-{}", page_num));
        std::fs::create_dir_all(&output_dir)?;

        let status = Command::new("pdftoppm")
            .args(["-png", "-r", &dpi, "-f", &page_str, "-l", &page_str])
            .arg(&self.path)
            .arg(output_dir.join("page"))
            .status();

        let image_path = match status {
            Ok(s) if s.success() => find_page_image(&output_dir, page_num).ok_or_else(|| {
                RasterError::Render(format!("No image generated for page {}", page_num))
            })?,
            Ok(_) => {
                return Err(RasterError::Render(
                    "pdftoppm failed to convert PDF page".to_string(),
                ))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RasterError::ToolNotAvailable(PDFTOPPM_NOT_FOUND.to_string()))
            }
            Err(e) => return Err(RasterError::Io(e)),
        };

        let img = image::open(&image_path)?;
        std::fs::remove_dir_all(&output_dir)?;
        Ok(img)
    }
}

fn pdf_page_count(path: &Path) -> Result<u32, RasterError> {
    let output = match Command::new("pdfinfo").arg(path).output() {
        Ok(output) => output,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RasterError::ToolNotAvailable(PDFTOPPM_NOT_FOUND.to_string()))
        }
        Err(e) => return Err(RasterError::Io(e)),
    };
    if !output.status.success() {
        return Err(RasterError::Render(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    parse_page_count(&String::from_utf8_lossy(&output.stdout))
        .ok_or_else(|| RasterError::Render("pdfinfo reported no page count".to_string()))
}

fn parse_page_count(info: &str) -> Option<u32> {
    info.lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|value| value.trim().parse().ok())
}

/// Find the image file for a specific page number.
///
/// pdftoppm pads the page number to the width of the document's page count.
fn find_page_image(dir: &Path, page_num: u32) -> Option<PathBuf> {
    for digits in [1, 2, 3, 4] {
        let path = dir.join(format!("page-{:0width$}.png", page_num, width = digits));
        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Shrink `img` so neither side exceeds `max_dim`, keeping the aspect ratio.
pub fn downscale(img: &DynamicImage, max_dim: u32) -> Cow<'_, DynamicImage> {
    let (w, h) = (img.width(), img.height());
    let largest = w.max(h);

    if max_dim == 0 || largest <= max_dim {
        return Cow::Borrowed(img);
    }

    let scale = max_dim as f32 / largest as f32;
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, max_dim);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, max_dim);

    debug!(
        from = format!("{w}x{h}"),
        to = format!("{new_w}x{new_h}"),
        "Downscaling oversized page"
    );

    Cow::Owned(img.resize_exact(new_w, new_h, FilterType::Triangle))
}

/// Encode an image as a `data:image/png;base64,...` URL.
pub fn encode_data_url(img: &DynamicImage) -> Result<String, RasterError> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)?;
    Ok(format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(buf.into_inner())
    ))
}

/// Render every page of `bytes` as a PNG data URL, calling `on_page` with
/// (rendered, total) after each page.
pub fn render_pages(
    rasterizer: &dyn PageRasterizer,
    bytes: &[u8],
    scale: f32,
    max_dim: u32,
    mut on_page: impl FnMut(u32, u32),
) -> Result<Vec<String>, RasterError> {
    let document = rasterizer.open(bytes)?;
    let total = document.page_count();
    let mut pages = Vec::with_capacity(total as usize);

    for page in 0..total {
        let img = document.render(page, scale)?;
        pages.push(encode_data_url(&downscale(&img, max_dim))?);
        on_page(page + 1, total);
    }
    Ok(pages)
}
