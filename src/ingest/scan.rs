/// Ingestion scan
///
/// Moves pending images through ingestion: the file is decoded to learn
/// its dimensions, a content hash is computed for placeholders, and a
/// thumbnail is written to the cache. Only after this does an image
/// become visible to anyone but its owner.

use image::imageops::FilterType;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::FeedError;
use crate::state::data::{ImageId, IngestionStatus};
use crate::state::library::Library;

/// Size of generated thumbnails (square bound)
pub const THUMBNAIL_SIZE: u32 = 256;

/// What one scan batch did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub scanned: usize,
    pub failed: usize,
    pub missing: usize,
}

impl ScanOutcome {
    pub fn total(&self) -> usize {
        self.scanned + self.failed + self.missing
    }
}

/// Result of scanning one file
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedImage {
    pub width: u32,
    pub height: u32,
    pub hash: String,
    pub thumbnail_path: PathBuf,
}

/// Get the thumbnail path for an image ID (doesn't generate, just returns the expected path)
pub fn thumbnail_path(thumbnail_dir: &Path, image_id: ImageId) -> PathBuf {
    thumbnail_dir.join(format!("{}.jpg", image_id))
}

/// Decode `path`, hash it and write its thumbnail
pub fn scan_image(
    path: &Path,
    image_id: ImageId,
    thumbnail_dir: &Path,
) -> Result<ScannedImage, FeedError> {
    let bytes = fs::read(path)?;
    let hash = blake3::hash(&bytes).to_hex().to_string();

    let img = image::load_from_memory(&bytes)?;
    let (width, height) = (img.width(), img.height());

    fs::create_dir_all(thumbnail_dir)?;
    let thumbnail = img.resize(THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Lanczos3);
    let thumbnail_path = thumbnail_path(thumbnail_dir, image_id);
    // JPEG has no alpha channel
    thumbnail.to_rgb8().save(&thumbnail_path)?;

    debug!("generated thumbnail: {}", thumbnail_path.display());

    Ok(ScannedImage {
        width,
        height,
        hash,
        thumbnail_path,
    })
}

/// Scan up to `batch_size` pending images
pub fn scan_pending(
    library: &Library,
    thumbnail_dir: &Path,
    batch_size: usize,
) -> Result<ScanOutcome, FeedError> {
    let mut outcome = ScanOutcome::default();

    for pending in library.get_pending_scans(batch_size)? {
        let path = Path::new(&pending.path);
        if !path.exists() {
            library.set_ingestion(pending.id, IngestionStatus::NotFound)?;
            outcome.missing += 1;
            continue;
        }

        match scan_image(path, pending.id, thumbnail_dir) {
            Ok(scanned) => {
                let thumbnail = scanned.thumbnail_path.to_string_lossy();
                library.mark_scanned(
                    pending.id,
                    scanned.width,
                    scanned.height,
                    &scanned.hash,
                    Some(&*thumbnail),
                )?;
                outcome.scanned += 1;
            }
            Err(err) => {
                warn!("scan of {} failed: {}", pending.path, err);
                library.set_ingestion(pending.id, IngestionStatus::Error)?;
                outcome.failed += 1;
            }
        }
    }

    if outcome.total() > 0 {
        info!(
            "scan batch: {} scanned, {} failed, {} missing",
            outcome.scanned, outcome.failed, outcome.missing
        );
    }

    Ok(outcome)
}

/// Async wrapper running a scan batch on the blocking pool
pub async fn scan_pending_async(
    db_path: PathBuf,
    thumbnail_dir: PathBuf,
    batch_size: usize,
) -> Result<ScanOutcome, FeedError> {
    tokio::task::spawn_blocking(move || {
        let library = Library::open(&db_path)?;
        scan_pending(&library, &thumbnail_dir, batch_size)
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_png(path: &Path, width: u32, height: u32) {
        RgbImage::from_pixel(width, height, Rgb([200, 30, 90]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_scan_image_reads_dimensions_and_writes_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("wide.png");
        write_png(&source, 600, 300);
        let thumbs = dir.path().join("thumbs");

        let scanned = scan_image(&source, 7, &thumbs).unwrap();

        assert_eq!((scanned.width, scanned.height), (600, 300));
        assert_eq!(scanned.thumbnail_path, thumbs.join("7.jpg"));
        let (tw, th) = image::image_dimensions(&scanned.thumbnail_path).unwrap();
        assert_eq!((tw, th), (256, 128));
        assert_eq!(scanned.hash.len(), 64);
    }

    #[test]
    fn test_scan_pending_sorts_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        let broken = dir.path().join("broken.png");
        write_png(&good, 10, 20);
        fs::write(&broken, b"definitely not an image").unwrap();

        let library = Library::open_in_memory().unwrap();
        let owner = library.ensure_user("ada").unwrap();
        let good_id = library
            .import_image(owner, &good.to_string_lossy(), "good.png")
            .unwrap()
            .unwrap();
        let broken_id = library
            .import_image(owner, &broken.to_string_lossy(), "broken.png")
            .unwrap()
            .unwrap();
        let gone_id = library
            .import_image(owner, &dir.path().join("gone.png").to_string_lossy(), "gone.png")
            .unwrap()
            .unwrap();

        let outcome = scan_pending(&library, &dir.path().join("thumbs"), 10).unwrap();

        assert_eq!(outcome, ScanOutcome { scanned: 1, failed: 1, missing: 1 });
        assert_eq!(library.ingestion_of(good_id).unwrap(), Some(IngestionStatus::Scanned));
        assert_eq!(library.ingestion_of(broken_id).unwrap(), Some(IngestionStatus::Error));
        assert_eq!(library.ingestion_of(gone_id).unwrap(), Some(IngestionStatus::NotFound));

        // Nothing left to do
        let again = scan_pending(&library, &dir.path().join("thumbs"), 10).unwrap();
        assert_eq!(again.total(), 0);
    }
}
