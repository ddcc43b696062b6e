//! Dataset manifest loading.
//!
//! The identity dataset is a JSON manifest: an ordered array of
//! `{"label": ..., "image": ..., "display": ...}` entries. Image paths are
//! resolved relative to the manifest file, so a dataset directory can be
//! moved as a unit.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("manifest read failed: {0}")]
    Read(#[from] std::io::Error),
    #[error("manifest parse failed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("image load failed: {0}")]
    Image(#[from] image::ImageError),
}

/// One identity source from the manifest, in manifest order.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetEntry {
    pub label: String,
    pub image: PathBuf,
    /// Optional display image for the authenticated profile view.
    #[serde(default)]
    pub display: Option<PathBuf>,
}

/// Load and parse the manifest, resolving relative paths against its
/// directory.
pub fn load_manifest(path: &Path) -> Result<Vec<DatasetEntry>, DatasetError> {
    let text = std::fs::read_to_string(path)?;
    let mut entries: Vec<DatasetEntry> = serde_json::from_str(&text)?;

    if let Some(dir) = path.parent() {
        for entry in entries.iter_mut() {
            if entry.image.is_relative() {
                entry.image = dir.join(&entry.image);
            }
            if let Some(display) = entry.display.as_mut() {
                if display.is_relative() {
                    *display = dir.join(&*display);
                }
            }
        }
    }

    tracing::info!(path = %path.display(), entries = entries.len(), "dataset manifest loaded");
    Ok(entries)
}

/// Load an image file as a grayscale pixel buffer.
pub fn load_grayscale(path: &Path) -> Result<(Vec<u8>, u32, u32), DatasetError> {
    let img = image::open(path)?.to_luma8();
    let (width, height) = img.dimensions();
    Ok((img.into_raw(), width, height))
}
