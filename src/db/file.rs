use std::path::Path;

use anyhow::{anyhow, ensure, Result};
use crc::{Crc, CRC_32_BZIP2};

use super::database::{Database, DatabaseV1};

// Secrets are already ciphertext at the vault layer, so the file itself is
// just checksummed and compressed.

const MAX_DECOMPRESSED_LEN: usize = 1024 * 1024 * 1024;

fn crc() -> Crc<u32> {
    Crc::<u32>::new(&CRC_32_BZIP2)
}

/// Returns Ok(None) if the db file doesn't exist yet.
pub async fn load(path: &Path) -> Result<Option<DatabaseV1>> {
    log::info!("Loading database...");
    if !tokio::fs::try_exists(path).await? {
        return Ok(None);
    }

    let content_compressed = tokio::fs::read(path).await?;
    let content = zstd::bulk::decompress(&content_compressed, MAX_DECOMPRESSED_LEN)?;
    let crc = crc();
    let (parsed, remaining): (Database, &[u8]) =
        postcard::take_from_bytes_crc32(&content, crc.digest())?;
    let Database::V1(database) = parsed;
    ensure!(remaining.is_empty(), "Database file had trailing bytes");

    log::info!("Loading database...done");

    Ok(Some(database))
}

pub async fn save(db: DatabaseV1, path: &Path) -> Result<()> {
    log::info!("Saving database...");

    let crc = crc();
    let content = postcard::to_stdvec_crc32(&Database::V1(db), crc.digest())?;
    let content_compressed = zstd::bulk::compress(
        &content,
        zstd::compression_level_range().last().unwrap(),
    )?;

    // Write to a temporary file first so a failed write can't clobber the
    // existing database.
    let filename = path
        .file_name()
        .ok_or_else(|| anyhow!("Path has no filename"))?
        .to_str()
        .ok_or_else(|| anyhow!("Filename isn't valid utf-8"))?;
    let tmppath = path.with_file_name(format!("{}.temp", filename));
    tokio::fs::write(&tmppath, content_compressed).await?;
    tokio::fs::rename(&tmppath, path).await?;

    log::info!("Saving database...done");

    Ok(())
}
