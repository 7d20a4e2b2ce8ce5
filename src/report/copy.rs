use crate::errors::CopyError;
use std::fs::{self, File};
use std::io;
use std::path::Path;

/// Byte-for-byte copy of `src` to `dst`, creating parent directories and
/// truncating any existing destination. The destination is synced before
/// returning.
pub fn copy_template(src: &Path, dst: &Path) -> Result<u64, CopyError> {
    let metadata = fs::metadata(src).map_err(CopyError::Stat)?;
    if !metadata.is_file() {
        return Err(CopyError::NotRegularFile);
    }
    let mut source = File::open(src).map_err(CopyError::Open)?;

    if let Some(dir) = dst.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|source| CopyError::CreateDir {
            dir: dir.to_path_buf(),
            source,
        })?;
    }

    let mut destination = File::create(dst).map_err(CopyError::Create)?;
    let bytes = io::copy(&mut source, &mut destination).map_err(CopyError::Write)?;
    destination.sync_all().map_err(CopyError::Sync)?;
    Ok(bytes)
}

/// Runs [`copy_template`] on the blocking pool.
pub async fn copy_template_async(src: &Path, dst: &Path) -> Result<u64, CopyError> {
    let (src, dst) = (src.to_path_buf(), dst.to_path_buf());
    tokio::task::spawn_blocking(move || copy_template(&src, &dst))
        .await
        .map_err(|err| CopyError::Write(io::Error::other(err)))?
}
