//! Local file naming for downloads.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};

use crate::storage::StorageError;

/// Give up after this many " (n)" candidates.
const MAX_NAME_ATTEMPTS: u32 = 10_000;

const FALLBACK_NAME: &str = "download";

/// Make the last segment of a key safe to use as a local file name.
///
/// Letters, digits, spaces and `. - _ ( ) [ ] + , @ & = ! ~ '` are kept;
/// everything else becomes `_`. Trailing dots and spaces are dropped.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || " .-_()[]+,@&=!~'".contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim().trim_end_matches(|c: char| c == '.' || c == ' ');
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// `report.pdf` -> `report (n).pdf`; `n == 0` leaves the name alone.
pub fn numbered_name(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_string();
    }
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    match path.extension() {
        Some(ext) => format!("{stem} ({n}).{}", ext.to_string_lossy()),
        None => format!("{stem} ({n})"),
    }
}

/// Create a new file named `name` in `dir`, or `name (1)`, `name (2)`, ... if
/// taken. The existence check and the creation are one atomic step, so files
/// created moments ago by earlier downloads are never overwritten.
pub async fn create_unique_file(dir: &Path, name: &str) -> Result<(PathBuf, File), StorageError> {
    for n in 0..MAX_NAME_ATTEMPTS {
        let candidate = dir.join(numbered_name(name, n));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(StorageError::local(&candidate, e)),
        }
    }
    Err(StorageError::local(
        &dir.join(name),
        "Too many files with the same name",
    ))
}

/// Directory used when the preferred download directory is unusable.
pub fn fallback_download_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("s3q")
        .join("downloads")
}

/// Pick `preferred` if it exists or can be created, else `fallback`.
pub async fn resolve_download_dir(
    preferred: Option<&Path>,
    fallback: &Path,
) -> Result<PathBuf, StorageError> {
    if let Some(dir) = preferred {
        match tokio::fs::create_dir_all(dir).await {
            Ok(()) => return Ok(dir.to_path_buf()),
            Err(e) => log::warn!(
                "Download directory {} unavailable ({e}), using {}",
                dir.display(),
                fallback.display()
            ),
        }
    }

    tokio::fs::create_dir_all(fallback)
        .await
        .map_err(|e| StorageError::local(fallback, e))?;
    Ok(fallback.to_path_buf())
}
