use chrono::{TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, Result as SqlResult};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::data::{ImageId, IngestionStatus, TagId, UserId};
use super::query::Reaction;

/// The Library manages the SQLite catalog database.
/// It stores images, their owners, tags, reactions and the viewer's
/// hidden-content preferences and saved filters.
pub struct Library {
    pub(crate) conn: Connection,
    db_path: PathBuf,
}

/// An image waiting for the ingestion scan
#[derive(Debug, Clone, PartialEq)]
pub struct PendingImage {
    pub id: ImageId,
    pub path: String,
}

impl Library {
    /// Open (or create) the catalog at `db_path` and initialize its schema.
    pub fn open(db_path: &Path) -> SqlResult<Self> {
        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!("could not create {}: {}", parent.display(), err);
            }
        }

        let conn = Connection::open(db_path)?;
        let mut library = Library {
            conn,
            db_path: db_path.to_path_buf(),
        };
        library.init_schema()?;

        Ok(library)
    }

    /// In-memory catalog, used by tests
    #[cfg(test)]
    pub fn open_in_memory() -> SqlResult<Self> {
        let mut library = Library {
            conn: Connection::open_in_memory()?,
            db_path: PathBuf::from(":memory:"),
        };
        library.init_schema()?;
        Ok(library)
    }

    /// Initialize the database schema.
    /// Creates all necessary tables and indexes if they don't exist.
    fn init_schema(&mut self) -> SqlResult<()> {
        self.conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                username        TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS images (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id             INTEGER NOT NULL REFERENCES users(id),
                path                TEXT NOT NULL UNIQUE,
                filename            TEXT NOT NULL,
                width               INTEGER,
                height              INTEGER,
                hash                TEXT,
                nsfw                INTEGER NOT NULL DEFAULT 0,
                ingestion           TEXT NOT NULL DEFAULT 'Pending',
                thumbnail_path      TEXT,
                model_id            INTEGER,
                model_version_id    INTEGER,
                post_id             INTEGER,
                comment_count       INTEGER NOT NULL DEFAULT 0,
                imported_at         INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tags (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS image_tags (
                image_id        INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
                tag_id          INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (image_id, tag_id)
            );

            CREATE TABLE IF NOT EXISTS collection_images (
                collection_id   INTEGER NOT NULL,
                image_id        INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
                PRIMARY KEY (collection_id, image_id)
            );

            CREATE TABLE IF NOT EXISTS image_reactions (
                image_id        INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
                user_id         INTEGER NOT NULL REFERENCES users(id),
                reaction        TEXT NOT NULL,
                PRIMARY KEY (image_id, user_id, reaction)
            );

            CREATE TABLE IF NOT EXISTS hidden_preferences (
                user_id         INTEGER NOT NULL,
                kind            TEXT NOT NULL,
                target_id       INTEGER NOT NULL,
                PRIMARY KEY (user_id, kind, target_id)
            );

            CREATE TABLE IF NOT EXISTS filter_scopes (
                scope           TEXT PRIMARY KEY,
                filters_json    TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_images_imported_at
                ON images(imported_at DESC);
            CREATE INDEX IF NOT EXISTS idx_images_ingestion
                ON images(ingestion);
            CREATE INDEX IF NOT EXISTS idx_image_tags_tag_id
                ON image_tags(tag_id);",
        )?;

        info!("catalog schema initialized at {}", self.db_path.display());

        Ok(())
    }

    /// Get a count of images in the library
    pub fn image_count(&self) -> SqlResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))
    }

    /// Look up a user by name, creating it if needed
    pub fn ensure_user(&self, username: &str) -> SqlResult<UserId> {
        self.conn.execute(
            "INSERT OR IGNORE INTO users (username) VALUES (?1)",
            [username],
        )?;
        self.conn.query_row(
            "SELECT id FROM users WHERE username = ?1",
            [username],
            |row| row.get(0),
        )
    }

    /// Look up a tag by name, creating it if needed
    pub fn ensure_tag(&self, name: &str) -> SqlResult<TagId> {
        self.conn
            .execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", [name])?;
        self.conn
            .query_row("SELECT id FROM tags WHERE name = ?1", [name], |row| {
                row.get(0)
            })
    }

    /// Import a new image owned by `user_id`.
    /// Returns the new image ID, or None if the path is already in the catalog.
    pub fn import_image(
        &self,
        user_id: UserId,
        path: &str,
        filename: &str,
    ) -> SqlResult<Option<ImageId>> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO images (user_id, path, filename, imported_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![user_id, path, filename, Utc::now().timestamp()],
        )?;

        Ok((inserted > 0).then(|| self.conn.last_insert_rowid()))
    }

    /// Override the import time, used to seed deterministic catalogs
    #[cfg(test)]
    pub fn set_imported_at(&self, image_id: ImageId, timestamp: i64) -> SqlResult<()> {
        self.conn.execute(
            "UPDATE images SET imported_at = ?1 WHERE id = ?2",
            rusqlite::params![timestamp, image_id],
        )?;
        Ok(())
    }

    /// Attach a tag to an image
    pub fn tag_image(&self, image_id: ImageId, tag_id: TagId) -> SqlResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO image_tags (image_id, tag_id) VALUES (?1, ?2)",
            rusqlite::params![image_id, tag_id],
        )?;
        Ok(())
    }

    /// Record a reaction from `user_id`
    pub fn react(&self, image_id: ImageId, user_id: UserId, reaction: Reaction) -> SqlResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO image_reactions (image_id, user_id, reaction)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![image_id, user_id, reaction.as_str()],
        )?;
        Ok(())
    }

    /// Add an image to a collection
    #[cfg(test)]
    pub fn add_to_collection(&self, collection_id: i64, image_id: ImageId) -> SqlResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO collection_images (collection_id, image_id) VALUES (?1, ?2)",
            rusqlite::params![collection_id, image_id],
        )?;
        Ok(())
    }

    /// Set the model/post an image was generated for
    #[cfg(test)]
    pub fn set_origin(
        &self,
        image_id: ImageId,
        model_id: Option<i64>,
        model_version_id: Option<i64>,
        post_id: Option<i64>,
    ) -> SqlResult<()> {
        self.conn.execute(
            "UPDATE images SET model_id = ?1, model_version_id = ?2, post_id = ?3 WHERE id = ?4",
            rusqlite::params![model_id, model_version_id, post_id, image_id],
        )?;
        Ok(())
    }

    /// Flag or unflag an image as not safe for work
    pub fn set_nsfw(&self, image_id: ImageId, nsfw: bool) -> SqlResult<()> {
        self.conn.execute(
            "UPDATE images SET nsfw = ?1 WHERE id = ?2",
            rusqlite::params![nsfw, image_id],
        )?;
        Ok(())
    }

    /// Get images that still need the ingestion scan
    pub fn get_pending_scans(&self, limit: usize) -> SqlResult<Vec<PendingImage>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, path FROM images
             WHERE ingestion = 'Pending'
             ORDER BY id
             LIMIT ?1",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            Ok(PendingImage {
                id: row.get(0)?,
                path: row.get(1)?,
            })
        })?;

        rows.collect()
    }

    /// Store the scan results and mark the image as scanned
    pub fn mark_scanned(
        &self,
        image_id: ImageId,
        width: u32,
        height: u32,
        hash: &str,
        thumbnail_path: Option<&str>,
    ) -> SqlResult<()> {
        self.conn.execute(
            "UPDATE images
             SET width = ?1, height = ?2, hash = ?3, thumbnail_path = ?4, ingestion = 'Scanned'
             WHERE id = ?5",
            rusqlite::params![width, height, hash, thumbnail_path, image_id],
        )?;
        Ok(())
    }

    /// Set an image's ingestion status
    pub fn set_ingestion(&self, image_id: ImageId, status: IngestionStatus) -> SqlResult<()> {
        self.conn.execute(
            "UPDATE images SET ingestion = ?1 WHERE id = ?2",
            rusqlite::params![status.as_str(), image_id],
        )?;
        Ok(())
    }

    /// Current ingestion status of an image
    pub fn ingestion_of(&self, image_id: ImageId) -> SqlResult<Option<IngestionStatus>> {
        self.conn
            .query_row(
                "SELECT ingestion FROM images WHERE id = ?1",
                [image_id],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map(|status| status.map(|s| IngestionStatus::from_db(&s)))
    }

    /// Verify that pending source files still exist on disk.
    /// Marks missing ones as `NotFound`.
    pub fn verify_files(&self) -> SqlResult<usize> {
        let pending = self.get_pending_scans(usize::MAX >> 1)?;

        let mut missing = 0;
        for image in pending {
            if !Path::new(&image.path).exists() {
                self.set_ingestion(image.id, IngestionStatus::NotFound)?;
                missing += 1;
            }
        }

        if missing > 0 {
            warn!("marked {} missing files as not found", missing);
        }

        Ok(missing)
    }
}

/// Convert a stored unix timestamp, falling back to the epoch for
/// out-of-range values.
pub(crate) fn timestamp_to_utc(timestamp: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .unwrap_or_default()
}

// Implement Debug for better error messages
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}
