use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::resolver::ContentId;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Sufijo de archivos a medio escribir
const PARTIAL_SUFFIX: &str = "part";

/// Archivo de audio almacenado localmente
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredFile {
    pub id: String,
    pub filename: String,
    pub path: PathBuf,
    pub size_mb: f64,
    pub created_at: Option<DateTime<Utc>>,
}

/// Almacenamiento de archivos descargados, un archivo por contenido
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn exists(&self, id: &ContentId) -> Result<bool, StorageError>;

    async fn get(&self, id: &ContentId) -> Result<Option<StoredFile>, StorageError>;

    /// Persists `data` as `<id>.<extension>`, replacing any previous file.
    async fn save(
        &self,
        id: &ContentId,
        extension: &str,
        data: Bytes,
    ) -> Result<StoredFile, StorageError>;

    async fn list(&self) -> Result<Vec<StoredFile>, StorageError>;

    /// Deletes every file stored for `id`.
    async fn delete(&self, id: &ContentId) -> Result<(), StorageError>;

    async fn clear_all(&self) -> Result<usize, StorageError>;
}

/// Store sobre un directorio local (`<id>.<ext>`)
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    dir: PathBuf,
}

impl LocalFileStore {
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|e| io_error(&dir, e))?;

        info!("📁 Storage inicializado en: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn describe(path: &Path) -> Result<Option<StoredFile>, StorageError> {
        let metadata = match fs::metadata(path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(path, e)),
        };

        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        let Some(id) = stored_id(path) else {
            return Ok(None);
        };

        Ok(Some(StoredFile {
            id: id.to_string(),
            filename: filename.to_string(),
            path: path.to_path_buf(),
            size_mb: metadata.len() as f64 / BYTES_PER_MB,
            created_at: metadata
                .created()
                .or_else(|_| metadata.modified())
                .ok()
                .map(DateTime::<Utc>::from),
        }))
    }

    /// Archivos completos del directorio, en orden de nombre
    async fn stored_paths(&self) -> Result<Vec<PathBuf>, StorageError> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;
        let mut paths = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.dir, e))?
        {
            let path = entry.path();
            if stored_id(&path).is_some() {
                paths.push(path);
            }
        }

        paths.sort();
        Ok(paths)
    }

    async fn paths_for(&self, id: &ContentId) -> Result<Vec<PathBuf>, StorageError> {
        Ok(self
            .stored_paths()
            .await?
            .into_iter()
            .filter(|path| stored_id(path) == Some(id.as_str()))
            .collect())
    }
}

/// Id del contenido a partir del nombre; ignora parciales y ocultos
fn stored_id(path: &Path) -> Option<&str> {
    if path.extension().and_then(|e| e.to_str()) == Some(PARTIAL_SUFFIX) {
        return None;
    }
    let name = path.file_name()?.to_str()?;
    if name.starts_with('.') {
        return None;
    }
    let stem = name.split('.').next()?;
    (!stem.is_empty()).then_some(stem)
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn exists(&self, id: &ContentId) -> Result<bool, StorageError> {
        Ok(!self.paths_for(id).await?.is_empty())
    }

    async fn get(&self, id: &ContentId) -> Result<Option<StoredFile>, StorageError> {
        for path in self.paths_for(id).await? {
            if let Some(file) = Self::describe(&path).await? {
                return Ok(Some(file));
            }
        }
        Ok(None)
    }

    async fn save(
        &self,
        id: &ContentId,
        extension: &str,
        data: Bytes,
    ) -> Result<StoredFile, StorageError> {
        let extension = safe_extension(extension);
        let target = self.dir.join(format!("{id}.{extension}"));
        let partial = self.dir.join(format!("{id}.{extension}.{PARTIAL_SUFFIX}"));

        // Se escribe primero a un parcial para no exponer archivos truncados
        fs::write(&partial, &data)
            .await
            .map_err(|e| io_error(&partial, e))?;

        for stale in self.paths_for(id).await? {
            if stale != target {
                debug!("🗑️ Reemplazando archivo anterior: {}", stale.display());
                fs::remove_file(&stale)
                    .await
                    .map_err(|e| io_error(&stale, e))?;
            }
        }

        fs::rename(&partial, &target)
            .await
            .map_err(|e| io_error(&target, e))?;

        info!(
            "💾 Guardado {} ({:.2} MB)",
            target.display(),
            data.len() as f64 / BYTES_PER_MB
        );

        Self::describe(&target)
            .await?
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })
    }

    async fn list(&self) -> Result<Vec<StoredFile>, StorageError> {
        let mut files = Vec::new();
        for path in self.stored_paths().await? {
            if let Some(file) = Self::describe(&path).await? {
                files.push(file);
            }
        }
        Ok(files)
    }

    async fn delete(&self, id: &ContentId) -> Result<(), StorageError> {
        let paths = self.paths_for(id).await?;
        if paths.is_empty() {
            return Err(StorageError::NotFound { id: id.to_string() });
        }

        for path in paths {
            fs::remove_file(&path)
                .await
                .map_err(|e| io_error(&path, e))?;
            info!("🗑️ Archivo eliminado: {}", path.display());
        }
        Ok(())
    }

    async fn clear_all(&self) -> Result<usize, StorageError> {
        let mut removed = 0;
        for path in self.stored_paths().await? {
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Error eliminando {}: {}", path.display(), e),
            }
        }

        info!("🧹 {} archivos eliminados", removed);
        Ok(removed)
    }
}

/// Extensión alfanumérica corta; cualquier otra cosa se guarda como `bin`
fn safe_extension(raw: &str) -> &str {
    let ext = raw.trim().trim_start_matches('.');
    if (1..=8).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        ext
    } else {
        if !ext.is_empty() {
            warn!("⚠️ Extensión no válida '{}', usando bin", raw);
        }
        "bin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    async fn store() -> (TempDir, LocalFileStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalFileStore::new(dir.path().join("audio")).await.unwrap();
        (dir, store)
    }

    fn id(raw: &str) -> ContentId {
        ContentId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let (_dir, store) = store().await;
        let song = id("abc");

        assert!(!store.exists(&song).await.unwrap());
        let saved = store
            .save(&song, "m4a", Bytes::from_static(&[0u8; 2048]))
            .await
            .unwrap();

        assert_eq!(saved.filename, "abc.m4a");
        assert_eq!(saved.id, "abc");
        assert!(saved.size_mb > 0.0);
        assert!(store.exists(&song).await.unwrap());
        assert_eq!(store.get(&song).await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn test_ids_do_not_match_by_prefix() {
        let (_dir, store) = store().await;
        store.save(&id("abc"), "m4a", Bytes::from_static(b"a")).await.unwrap();

        assert!(!store.exists(&id("ab")).await.unwrap());
        assert_eq!(store.get(&id("ab")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_replaces_other_extension() {
        let (_dir, store) = store().await;
        let song = id("abc");
        store.save(&song, "webm", Bytes::from_static(b"old")).await.unwrap();
        store.save(&song, ".m4a", Bytes::from_static(b"new")).await.unwrap();

        let files = store.list().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "abc.m4a");
    }

    #[tokio::test]
    async fn test_save_rejects_path_like_extension() {
        let (dir, store) = store().await;
        let song = id("abc");

        let saved = store
            .save(&song, "../escape", Bytes::from_static(b"x"))
            .await
            .unwrap();

        assert_eq!(saved.filename, "abc.bin");
        assert_eq!(saved.path, store.dir().join("abc.bin"));
        assert!(!dir.path().join("escape").exists());
        assert!(!dir.path().join("abc.").exists());
    }

    #[test]
    fn test_safe_extension() {
        assert_eq!(safe_extension("m4a"), "m4a");
        assert_eq!(safe_extension(".webm"), "webm");
        assert_eq!(safe_extension(""), "bin");
        assert_eq!(safe_extension("a/b"), "bin");
        assert_eq!(safe_extension("waytoolongext"), "bin");
    }

    #[tokio::test]
    async fn test_list_skips_partial_files() {
        let (_dir, store) = store().await;
        store.save(&id("a"), "m4a", Bytes::from_static(b"1")).await.unwrap();
        store.save(&id("b"), "opus", Bytes::from_static(b"2")).await.unwrap();
        fs::write(store.dir().join("c.m4a.part"), b"partial").await.unwrap();

        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let (_dir, store) = store().await;
        let err = store.delete(&id("nope")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_and_clear_all() {
        let (_dir, store) = store().await;
        for name in ["a", "b", "c"] {
            store.save(&id(name), "m4a", Bytes::from_static(b"x")).await.unwrap();
        }

        store.delete(&id("b")).await.unwrap();
        assert!(!store.exists(&id("b")).await.unwrap());

        assert_eq!(store.clear_all().await.unwrap(), 2);
        assert!(store.list().await.unwrap().is_empty());
    }
}
