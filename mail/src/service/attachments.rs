use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use actix_web::web;
use anyhow::anyhow;
use chrono::Utc;
use common::{
    entities::letter::LetterKind,
    error::{self, AddCode},
};

use super::upload::Upload;

/// Stores letter attachments on disk as `<root>/<kind>/<unix seconds>_<file name>`.
///
/// Letters keep the path relative to the root, so the whole directory can be moved.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    root: PathBuf,
}

fn blocking_failed(err: actix_web::error::BlockingError) -> error::ServiceError {
    anyhow!("Blocking file task failed: {}", err).code(500)
}

fn clean_name(file_name: &str) -> String {
    let name = file_name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if name.is_empty() || name == "." || name == ".." {
        "attachment".to_string()
    } else {
        name.to_string()
    }
}

impl AttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a stored relative path to a file under the root, refusing anything that escapes it.
    pub fn resolve(&self, relative: &str) -> error::Result<PathBuf> {
        let path = Path::new(relative);
        let inside = path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !inside || relative.is_empty() {
            return Err(anyhow!("Invalid file path").code(400));
        }
        Ok(self.root.join(path))
    }

    pub async fn save(&self, kind: LetterKind, upload: Upload) -> error::Result<String> {
        let directory = self.root.join(kind.as_str());
        let name = clean_name(&upload.file_name);
        let stamp = Utc::now().timestamp();

        let stored = web::block(move || -> std::io::Result<String> {
            std::fs::create_dir_all(&directory)?;
            let mut file_name = format!("{}_{}", stamp, name);
            let mut attempt = 1;
            while directory.join(&file_name).exists() {
                file_name = format!("{}_{}_{}", stamp, attempt, name);
                attempt += 1;
            }
            std::fs::write(directory.join(&file_name), &upload.content)?;
            Ok(file_name)
        })
        .await
        .map_err(blocking_failed)??;

        let relative = format!("{}/{}", kind, stored);
        log::info!("Stored attachment {}", relative);
        Ok(relative)
    }

    /// Removes a stored attachment. A file that is already gone counts as removed.
    pub async fn remove(&self, relative: &str) -> error::Result<()> {
        let path = self.resolve(relative)?;
        let removed = web::block(move || match std::fs::remove_file(&path) {
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
            Ok(()) => Ok(true),
        })
        .await
        .map_err(blocking_failed)??;

        if removed {
            log::info!("Removed attachment {}", relative);
        } else {
            log::warn!("Attachment {} was already missing", relative);
        }
        Ok(())
    }
}
