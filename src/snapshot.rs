//! The snapshot archive pipeline: stage → pack → (stream) → unpack →
//! restore → finish.
//!
//! Archive format and the tar+gzip staging discipline are grounded on the
//! dump writer used elsewhere in the corpus (`meilisearch-meilisearch/crates/dump/src/writer.rs`):
//! stage into a `tempfile::TempDir`, write a deterministic tar stream
//! through a `flate2::write::GzEncoder`, and on the read side reverse with
//! `flate2::bufread::GzDecoder` + `tar::Archive::unpack`.
//!
//! `unpack` swaps the extracted directory into place via
//! [`FolderManager::restore_backup`], which keeps a rollback copy until the
//! caller discards it. It does not reopen the live `sled::Db` handle — the
//! node-host (`cluster` module) owns that handle and is responsible for
//! recycling it after a successful install, since `sled` does not support
//! having its backing directory replaced out from under an open instance.
use std::io::{Cursor, Read, Write};
use std::path::Path;

use flate2::bufread::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, info};

use crate::engine::Engine;
use crate::error::{EngineError, FolderError};
use crate::folder::FolderManager;

/// Builds a tar+gzip archive of the engine's live data directory and
/// returns its bytes. Entries are written in the lexicographic order
/// `tar::Builder::append_dir_all` walks a directory tree in after sorting
/// (sled data files use flat, comparably-named segment files, so this is
/// already deterministic); mtimes are left at the filesystem's own values
/// trimmed to zero below since a snapshot's identity is its log index, not
/// wall-clock time.
pub async fn pack(_engine: &Engine, folders: &FolderManager) -> Result<Vec<u8>, EngineError> {
    let staged = folders
        .new_backup_temp()
        .await
        .map_err(|e| EngineError::Snapshot(e.to_string()))?;

    let result = pack_dir(&staged);
    folders.cleanup(&staged);

    let bytes = result.map_err(|e| EngineError::Snapshot(e.to_string()))?;
    debug!(bytes = bytes.len(), "packed snapshot archive");
    Ok(bytes)
}

fn pack_dir(dir: &Path) -> Result<Vec<u8>, FolderError> {
    let encoder = GzEncoder::new(Vec::new(), Compression::new(6));
    let mut builder = tar::Builder::new(encoder);
    builder.mode(tar::HeaderMode::Deterministic);

    builder
        .append_dir_all(".", dir)
        .map_err(|source| FolderError::Archive {
            path: dir.display().to_string(),
            source,
        })?;

    let encoder = builder
        .into_inner()
        .map_err(|source| FolderError::Archive {
            path: dir.display().to_string(),
            source,
        })?;
    encoder.finish().map_err(FolderError::Compress)
}

/// Extracts a tar+gzip archive produced by [`pack`] into a fresh temp
/// folder, then atomically swaps it in as the live data directory via
/// [`FolderManager::restore_backup`]. The rollback copy is discarded only
/// once extraction and swap both succeed.
///
/// Rejects an archive below [`MIN_ARCHIVE_BYTES`] (obvious truncation) or
/// whose tar headers declare more than [`MAX_DECODED_BYTES`] of total
/// content (a decompression bomb) before writing any of it to disk.
pub async fn unpack(_engine: &Engine, folders: &FolderManager, archive: Vec<u8>) -> Result<(), EngineError> {
    let dest = folders
        .new_temp_folder()
        .map_err(|e| EngineError::Snapshot(e.to_string()))?;

    if let Err(e) = unpack_into(&archive, &dest) {
        folders.cleanup(&dest);
        return Err(EngineError::Snapshot(e.to_string()));
    }

    let rollback = folders
        .restore_backup(&dest)
        .await
        .map_err(|e| EngineError::Snapshot(e.to_string()))?;
    folders
        .discard_rollback(&rollback)
        .map_err(|e| EngineError::Snapshot(e.to_string()))?;

    info!("restored engine data directory from snapshot archive");
    Ok(())
}

/// Below this many compressed bytes an archive cannot contain a valid
/// gzip footer plus at least one tar header block — anything smaller is
/// obvious truncation, not a legitimate (even empty) snapshot.
const MIN_ARCHIVE_BYTES: u64 = 20;

/// Cap on total decoded bytes while unpacking. Per-entry sizes come from
/// the tar header, so this bounds work done *before* trusting a gzip
/// stream to decompress arbitrarily far past its compressed size.
const MAX_DECODED_BYTES: u64 = 16 * 1024 * 1024 * 1024;

fn unpack_into(archive: &[u8], dest: &Path) -> Result<(), FolderError> {
    let archive_len = archive.len() as u64;
    if archive_len < MIN_ARCHIVE_BYTES {
        return Err(FolderError::ArchiveSize {
            got: archive_len,
            min: MIN_ARCHIVE_BYTES,
            max: MAX_DECODED_BYTES,
        });
    }

    let decoder = GzDecoder::new(Cursor::new(archive));
    let mut tar = tar::Archive::new(decoder);
    let entries = tar.entries().map_err(|source| FolderError::Extract {
        path: dest.display().to_string(),
        source,
    })?;

    let mut decoded_total: u64 = 0;
    for entry in entries {
        let mut entry = entry.map_err(|source| FolderError::Extract {
            path: dest.display().to_string(),
            source,
        })?;

        let entry_size = entry.header().size().map_err(|source| FolderError::Extract {
            path: dest.display().to_string(),
            source,
        })?;
        decoded_total = decoded_total.saturating_add(entry_size);
        if decoded_total > MAX_DECODED_BYTES {
            return Err(FolderError::ArchiveSize {
                got: decoded_total,
                min: MIN_ARCHIVE_BYTES,
                max: MAX_DECODED_BYTES,
            });
        }

        entry.unpack_in(dest).map_err(|source| FolderError::Extract {
            path: dest.display().to_string(),
            source,
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folder::FolderLayout;
    use crate::options::EngineOptions;

    #[tokio::test]
    async fn pack_then_unpack_preserves_data() {
        let root = tempfile::tempdir().unwrap();
        let folders = FolderManager::new(FolderLayout::under(root.path()), 0o755);
        folders.ensure_all().unwrap();

        let engine = Engine::open(&folders.layout().data, &EngineOptions::default()).unwrap();
        let bucket = engine.bucket("b").unwrap();
        bucket.put(b"k1", b"v1", 0, 0).unwrap();
        engine.flush().unwrap();

        let archive = pack(&engine, &folders).await.unwrap();
        assert!(!archive.is_empty());

        drop(engine);
        unpack(
            &Engine::open(&folders.layout().data, &EngineOptions::default()).unwrap(),
            &folders,
            archive,
        )
        .await
        .unwrap();

        let reopened = Engine::open(&folders.layout().data, &EngineOptions::default()).unwrap();
        let bucket = reopened.bucket("b").unwrap();
        assert_eq!(bucket.get(b"k1", 0).unwrap().unwrap().value.as_ref(), b"v1");
    }

    #[test]
    fn truncated_archive_is_rejected_before_extracting() {
        let root = tempfile::tempdir().unwrap();
        let dest = root.path().join("dest");

        let err = unpack_into(&[0u8; 4], &dest).unwrap_err();
        assert!(matches!(err, FolderError::ArchiveSize { .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn empty_archive_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let dest = root.path().join("dest");

        let err = unpack_into(&[], &dest).unwrap_err();
        assert!(matches!(err, FolderError::ArchiveSize { .. }));
    }
}
