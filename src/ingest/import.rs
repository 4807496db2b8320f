/// Folder import
///
/// Walks a folder recursively and adds every image file to the catalog,
/// owned by the importing user and waiting for the ingestion scan. The
/// name of the folder an image sits in becomes one of its tags, so
/// category browsing groups images by folder.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::FeedError;
use crate::state::data::UserId;
use crate::state::library::Library;
use crate::state::query::slugify;

/// Supported image extensions (lowercase)
pub const IMAGE_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "webp", "gif", "bmp", "tif", "tiff"];

/// Result of a folder import operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportResult {
    pub imported_count: usize,
    pub skipped_count: usize,
}

/// Whether `path` looks like an image we can ingest
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Import all image files under `folder` for `owner`
pub fn import_folder(
    library: &Library,
    owner: UserId,
    folder: &Path,
) -> Result<ImportResult, FeedError> {
    let mut result = ImportResult::default();

    info!("scanning folder: {}", folder.display());

    for entry in WalkDir::new(folder)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() || !is_image_file(path) {
            continue;
        }

        let path_str = path.to_string_lossy().to_string();
        let filename = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let Some(image_id) = library.import_image(owner, &path_str, &filename)? else {
            result.skipped_count += 1;
            continue;
        };
        result.imported_count += 1;

        let folder_tag = path
            .parent()
            .and_then(Path::file_name)
            .map(|name| slugify(&name.to_string_lossy()))
            .filter(|tag| !tag.is_empty());
        if let Some(tag) = folder_tag {
            let tag_id = library.ensure_tag(&tag)?;
            library.tag_image(image_id, tag_id)?;
        }

        if result.imported_count % 100 == 0 {
            debug!("imported {} files...", result.imported_count);
        }
    }

    info!(
        "import complete: {} new, {} skipped",
        result.imported_count, result.skipped_count
    );

    Ok(result)
}

/// Async wrapper running the import on the blocking pool.
/// Opens its own connection since rusqlite::Connection is not Send.
pub async fn import_folder_async(
    db_path: PathBuf,
    owner: UserId,
    folder: PathBuf,
) -> Result<ImportResult, FeedError> {
    tokio::task::spawn_blocking(move || {
        let library = Library::open(&db_path)?;
        import_folder(&library, owner, &folder).inspect_err(|err| {
            warn!("import of {} failed: {}", folder.display(), err);
        })
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::IngestionStatus;

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("/a/b.PNG")));
        assert!(is_image_file(Path::new("c.jpeg")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("no_extension")));
    }

    #[test]
    fn test_import_walks_tags_and_skips_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let cats = dir.path().join("My Cats");
        std::fs::create_dir_all(&cats).unwrap();
        std::fs::write(cats.join("a.png"), b"not really a png").unwrap();
        std::fs::write(cats.join("b.JPG"), b"nor a jpg").unwrap();
        std::fs::write(cats.join("readme.txt"), b"ignored").unwrap();

        let library = Library::open_in_memory().unwrap();
        let owner = library.ensure_user("ada").unwrap();

        let first = import_folder(&library, owner, dir.path()).unwrap();
        assert_eq!(first, ImportResult { imported_count: 2, skipped_count: 0 });

        let again = import_folder(&library, owner, dir.path()).unwrap();
        assert_eq!(again, ImportResult { imported_count: 0, skipped_count: 2 });

        let pending = library.get_pending_scans(10).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(library.ingestion_of(pending[0].id).unwrap(), Some(IngestionStatus::Pending));

        let tag = library.ensure_tag("my-cats").unwrap();
        let tagged: i64 = library
            .conn
            .query_row("SELECT COUNT(*) FROM image_tags WHERE tag_id = ?1", [tag], |row| row.get(0))
            .unwrap();
        assert_eq!(tagged, 2);
    }
}
