use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::catalog::ResourceDescriptor;
use crate::error::BackupError;

pub const BACKUP_DIR: &str = "backup";

/// On-disk shape of one backup run: `<output>/backup/<folder>/<id>.json`.
#[derive(Debug, Clone)]
pub struct BackupLayout {
    output_dir: Utf8PathBuf,
    root: Utf8PathBuf,
}

impl BackupLayout {
    pub fn new(output_dir: impl Into<Utf8PathBuf>) -> Self {
        let output_dir = output_dir.into();
        let root = output_dir.join(BACKUP_DIR);
        Self { output_dir, root }
    }

    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Claims the output directory for a fresh run.
    ///
    /// An existing directory is a conflict unless `force` is set, in which case
    /// it is removed with everything in it.
    pub fn prepare<'a, I>(&self, force: bool, descriptors: I) -> Result<(), BackupError>
    where
        I: IntoIterator<Item = &'a ResourceDescriptor>,
    {
        if self.output_dir.as_std_path().exists() {
            if !force {
                return Err(BackupError::OutputConflict(self.output_dir.clone()));
            }
            fs::remove_dir_all(self.output_dir.as_std_path())
                .map_err(|err| BackupError::Filesystem(format!("remove {}: {err}", self.output_dir)))?;
        }
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| BackupError::Filesystem(format!("create {}: {err}", self.root)))?;
        for descriptor in descriptors {
            if let Some(folder) = descriptor.folder {
                let dir = self.root.join(folder);
                fs::create_dir_all(dir.as_std_path())
                    .map_err(|err| BackupError::Filesystem(format!("create {dir}: {err}")))?;
            }
        }
        Ok(())
    }

    pub fn json_path(&self, folder: Option<&str>, name: &str) -> Utf8PathBuf {
        let file = format!("{name}.json");
        match folder {
            Some(folder) => self.root.join(folder).join(file),
            None => self.root.join(file),
        }
    }

    pub fn space_path(&self, space_id: &str) -> Utf8PathBuf {
        self.json_path(None, &format!("space-{space_id}"))
    }

    pub fn datasource_entries_path(&self, folder: &str, datasource_id: &str) -> Utf8PathBuf {
        self.json_path(Some(folder), &format!("{datasource_id}_entries"))
    }

    pub fn binary_path(&self, folder: &str, file_name: &str) -> Utf8PathBuf {
        self.root.join(folder).join(file_name)
    }

    pub fn write_json<T: Serialize + ?Sized>(
        path: &Utf8Path,
        value: &T,
    ) -> Result<(), BackupError> {
        let mut content = serde_json::to_vec_pretty(value)
            .map_err(|err| BackupError::Filesystem(err.to_string()))?;
        content.push(b'\n');
        fs::write(path.as_std_path(), &content)
            .map_err(|err| BackupError::Filesystem(format!("write {path}: {err}")))
    }

    /// Opens a new file for writing, refusing to touch one that already exists.
    pub fn create_exclusive(path: &Utf8Path) -> Result<File, BackupError> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path.as_std_path())
            .map_err(|err| match err.kind() {
                ErrorKind::AlreadyExists => BackupError::OutputConflict(path.to_path_buf()),
                _ => BackupError::Filesystem(format!("create {path}: {err}")),
            })
    }
}

/// `<id>.<ext>` where the extension follows the last `.` of the source's final path segment.
/// A source without an extension is stored as a bare `<id>`.
pub fn asset_file_name(asset_id: &str, source: &str) -> String {
    let name = source
        .split(['?', '#'])
        .next()
        .unwrap_or(source)
        .rsplit('/')
        .next()
        .unwrap_or(source);
    match name.rsplit_once('.') {
        Some((_, extension)) if !extension.is_empty() => format!("{asset_id}.{extension}"),
        _ => asset_id.to_string(),
    }
}
