//! External collaborators: image hosting and PDF rasterization.

pub mod image_store;
pub mod rasterizer;

pub use image_store::{build_image_store, ImageStore, ImageStoreError};
pub use rasterizer::{PageRasterizer, PdftoppmRasterizer, RasterError};
