use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDateTime;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::BackupError;

pub fn archive_file_name(prefix: &str, timestamp: NaiveDateTime) -> String {
    format!("{prefix}-{}.zip", timestamp.format("%Y-%m-%d-%H-%M-%S"))
}

/// Packs every file below `source_dir` into a zip at `destination`.
///
/// Entry names are relative to `source_dir`. The archive is assembled in a
/// temporary file next to `destination` and only moved into place once complete.
pub fn create_zip(source_dir: &Utf8Path, destination: &Utf8Path) -> Result<Utf8PathBuf, BackupError> {
    if destination.as_std_path().exists() {
        return Err(BackupError::OutputConflict(destination.to_path_buf()));
    }
    let parent = destination
        .parent()
        .ok_or_else(|| BackupError::Archive("invalid archive path".to_string()))?;
    let temp = tempfile::Builder::new()
        .prefix("storyblok-backup-zip")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| BackupError::Filesystem(err.to_string()))?;

    let mut writer = ZipWriter::new(temp);
    let options = SimpleFileOptions::default();
    for path in walk_dir(source_dir.as_std_path())? {
        let relative = path
            .strip_prefix(source_dir.as_std_path())
            .map_err(|err| BackupError::Archive(err.to_string()))?;
        let name = entry_name(relative)?;
        if path.is_dir() {
            writer
                .add_directory(name, options)
                .map_err(|err| BackupError::Archive(err.to_string()))?;
            continue;
        }
        writer
            .start_file(name, options)
            .map_err(|err| BackupError::Archive(err.to_string()))?;
        let mut file =
            File::open(&path).map_err(|err| BackupError::Filesystem(err.to_string()))?;
        io::copy(&mut file, &mut writer).map_err(|err| BackupError::Archive(err.to_string()))?;
    }
    let temp = writer
        .finish()
        .map_err(|err| BackupError::Archive(err.to_string()))?;
    temp.persist_noclobber(destination.as_std_path())
        .map_err(|err| BackupError::Filesystem(err.to_string()))?;
    Ok(destination.to_path_buf())
}

fn entry_name(relative: &Path) -> Result<String, BackupError> {
    let parts = relative
        .components()
        .map(|component| {
            component
                .as_os_str()
                .to_str()
                .ok_or_else(|| BackupError::Archive("non-utf8 file path in backup".to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join("/"))
}

/// Every path below `root`, sorted so archives come out in a stable order.
fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, BackupError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries =
            fs::read_dir(&path).map_err(|err| BackupError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| BackupError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    items.sort();
    Ok(items)
}
