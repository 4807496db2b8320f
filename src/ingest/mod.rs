/// Ingestion of local image files into the catalog
///
/// - Recursive folder import (import.rs)
/// - Pending -> Scanned/Error/NotFound processing with thumbnails (scan.rs)

pub mod import;
pub mod scan;
