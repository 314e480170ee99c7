use crate::error::{EngineError, IngestError};
use crate::models::{IndexConfig, VectorIndex};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

struct Catalog {
    /// Insertion order of index ids, so `list` renders consistently.
    order: Vec<String>,
    configs: HashMap<String, IndexConfig>,
}

/// Durable store holding one `IndexConfig` record and one `VectorIndex`
/// blob per index id.
///
/// The in-memory catalog is the single source of truth for `list`/`load`;
/// create and delete swap it under a write lock, so a lister never observes
/// a half-created or half-deleted index. Per-index mutexes serialize
/// mutating operations (delete vs. language write-back) on the same id.
pub struct IndexStore {
    data_dir: PathBuf,
    catalog: RwLock<Catalog>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IndexStore {
    /// Open a store rooted at `data_dir`, reloading any catalog persisted by
    /// earlier runs. Records are ordered by ingestion time.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;

        let mut configs = Vec::new();
        for entry in fs::read_dir(&data_dir)? {
            let path = entry?.path();
            let is_config = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(".config.json"));
            if !is_config {
                continue;
            }

            match fs::read_to_string(&path)
                .map_err(EngineError::Io)
                .and_then(|raw| serde_json::from_str::<IndexConfig>(&raw).map_err(Into::into))
            {
                Ok(config) => configs.push(config),
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unreadable config record");
                }
            }
        }

        configs.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.index_id.cmp(&right.index_id))
        });

        let order: Vec<String> = configs.iter().map(|config| config.index_id.clone()).collect();
        let configs: HashMap<String, IndexConfig> = configs
            .into_iter()
            .map(|config| (config.index_id.clone(), config))
            .collect();

        info!(indices = order.len(), dir = %data_dir.display(), "index store opened");

        Ok(Self {
            data_dir,
            catalog: RwLock::new(Catalog { order, configs }),
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn config_path(&self, index_id: &str) -> PathBuf {
        self.data_dir.join(format!("{index_id}.config.json"))
    }

    fn index_path(&self, index_id: &str) -> PathBuf {
        self.data_dir.join(format!("{index_id}.index.json"))
    }

    /// Serialization lock for mutating operations on one index id.
    pub async fn mutation_lock(&self, index_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(index_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn has_document_name(&self, name: &str) -> bool {
        let catalog = self.catalog.read().await;
        catalog
            .configs
            .values()
            .any(|config| config.document_name() == name)
    }

    /// Durably register a fully-built index. The blob and the config record
    /// are written before the catalog publishes the id, so a failure leaves
    /// no visible partial state.
    pub async fn register(
        &self,
        config: IndexConfig,
        index: VectorIndex,
    ) -> Result<(), IngestError> {
        let mut catalog = self.catalog.write().await;

        let name = config.document_name().to_string();
        if catalog
            .configs
            .values()
            .any(|existing| existing.document_name() == name)
        {
            return Err(IngestError::DuplicateDocument(name));
        }

        let index_path = self.index_path(&config.index_id);
        write_atomic(&index_path, &serde_json::to_vec_pretty(&index)?)?;

        if let Err(error) = write_atomic(
            &self.config_path(&config.index_id),
            &serde_json::to_vec_pretty(&config)?,
        ) {
            // Roll the blob back rather than leaving an orphan on disk.
            let _ = fs::remove_file(&index_path);
            return Err(error.into());
        }

        catalog.order.push(config.index_id.clone());
        catalog.configs.insert(config.index_id.clone(), config);
        Ok(())
    }

    /// All configs in insertion order.
    pub async fn list(&self) -> Vec<IndexConfig> {
        let catalog = self.catalog.read().await;
        catalog
            .order
            .iter()
            .filter_map(|index_id| catalog.configs.get(index_id))
            .cloned()
            .collect()
    }

    pub async fn load(&self, index_id: &str) -> Result<IndexConfig, EngineError> {
        let catalog = self.catalog.read().await;
        catalog
            .configs
            .get(index_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(index_id.to_string()))
    }

    pub async fn load_vector_index(&self, index_id: &str) -> Result<VectorIndex, EngineError> {
        {
            let catalog = self.catalog.read().await;
            if !catalog.configs.contains_key(index_id) {
                return Err(EngineError::NotFound(index_id.to_string()));
            }
        }

        let raw = fs::read_to_string(self.index_path(index_id)).map_err(|error| {
            EngineError::Store(format!("vector index blob unreadable for {index_id}: {error}"))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Remove the config record and the vector index together. Deleting an
    /// unknown id is a no-op success; the UI may race a double-click.
    pub async fn delete(&self, index_id: &str) -> Result<(), EngineError> {
        let lock = self.mutation_lock(index_id).await;
        let _guard = lock.lock().await;

        {
            let mut catalog = self.catalog.write().await;
            if catalog.configs.remove(index_id).is_none() {
                return Ok(());
            }
            catalog.order.retain(|id| id != index_id);
        }

        remove_if_present(&self.config_path(index_id))?;
        remove_if_present(&self.index_path(index_id))?;

        let mut locks = self.locks.lock().await;
        locks.remove(index_id);
        Ok(())
    }

    /// Write back a memoized language detection result. Callers serialize
    /// against delete through `mutation_lock`.
    pub async fn set_language(&self, index_id: &str, language: &str) -> Result<(), EngineError> {
        let mut catalog = self.catalog.write().await;
        let config = catalog
            .configs
            .get_mut(index_id)
            .ok_or_else(|| EngineError::NotFound(index_id.to_string()))?;

        config.language = Some(language.to_string());
        let snapshot = config.clone();
        write_atomic(
            &self.config_path(index_id),
            &serde_json::to_vec_pretty(&snapshot)?,
        )?;
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let staged = path.with_extension("json.tmp");
    fs::write(&staged, bytes)?;
    fs::rename(&staged, path)
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::IndexStore;
    use crate::error::{EngineError, IngestError};
    use crate::models::{Chunk, IndexConfig, VectorIndex};
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn config(index_id: &str, path: &str, minute: u32) -> IndexConfig {
        IndexConfig {
            index_id: index_id.to_string(),
            document_path: path.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, minute, 0).unwrap(),
            language: None,
        }
    }

    fn index(index_id: &str) -> VectorIndex {
        VectorIndex {
            index_id: index_id.to_string(),
            embedder_id: "char-ngram-3/16".to_string(),
            dimensions: 16,
            chunks: vec![Chunk {
                text: "some chunk text".to_string(),
                embedding: vec![0.5; 16],
                source_page: 1,
                chunk_offset: 0,
            }],
        }
    }

    #[tokio::test]
    async fn register_then_load_roundtrips() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(dir.path()).unwrap();

        store
            .register(config("id-1", "/docs/report.pdf", 0), index("id-1"))
            .await
            .unwrap();

        let loaded = store.load("id-1").await.unwrap();
        assert_eq!(loaded.document_name(), "report.pdf");

        let blob = store.load_vector_index("id-1").await.unwrap();
        assert_eq!(blob.chunks.len(), 1);
        assert_eq!(blob.embedder_id, "char-ngram-3/16");
    }

    #[tokio::test]
    async fn list_preserves_insertion_order() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(dir.path()).unwrap();

        store
            .register(config("id-b", "/docs/b.pdf", 1), index("id-b"))
            .await
            .unwrap();
        store
            .register(config("id-a", "/docs/a.pdf", 2), index("id-a"))
            .await
            .unwrap();

        let listed = store.list().await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].index_id, "id-b");
        assert_eq!(listed[1].index_id, "id-a");
    }

    #[tokio::test]
    async fn duplicate_document_name_is_rejected() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(dir.path()).unwrap();

        store
            .register(config("id-1", "/docs/report.pdf", 0), index("id-1"))
            .await
            .unwrap();

        let result = store
            .register(config("id-2", "/elsewhere/report.pdf", 1), index("id-2"))
            .await;
        assert!(matches!(result, Err(IngestError::DuplicateDocument(_))));

        // The existing index is untouched.
        assert_eq!(store.list().await.len(), 1);
        assert!(store.load("id-1").await.is_ok());
        assert!(matches!(
            store.load("id-2").await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_total() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(dir.path()).unwrap();

        store
            .register(config("id-1", "/docs/report.pdf", 0), index("id-1"))
            .await
            .unwrap();

        store.delete("id-1").await.unwrap();
        assert!(matches!(
            store.load("id-1").await,
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            store.load_vector_index("id-1").await,
            Err(EngineError::NotFound(_))
        ));
        assert!(store.list().await.is_empty());

        // Second delete of the same id is a no-op success.
        store.delete("id-1").await.unwrap();
        // So is deleting an id that never existed.
        store.delete("never-there").await.unwrap();
    }

    #[tokio::test]
    async fn catalog_survives_reopen_in_order() {
        let dir = tempdir().unwrap();
        {
            let store = IndexStore::open(dir.path()).unwrap();
            store
                .register(config("id-1", "/docs/first.pdf", 0), index("id-1"))
                .await
                .unwrap();
            store
                .register(config("id-2", "/docs/second.docx", 1), index("id-2"))
                .await
                .unwrap();
        }

        let reopened = IndexStore::open(dir.path()).unwrap();
        let listed = reopened.list().await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].index_id, "id-1");
        assert_eq!(listed[1].index_id, "id-2");
    }

    #[tokio::test]
    async fn language_write_back_is_durable() {
        let dir = tempdir().unwrap();
        {
            let store = IndexStore::open(dir.path()).unwrap();
            store
                .register(config("id-1", "/docs/report.pdf", 0), index("id-1"))
                .await
                .unwrap();
            store.set_language("id-1", "fr").await.unwrap();
        }

        let reopened = IndexStore::open(dir.path()).unwrap();
        let loaded = reopened.load("id-1").await.unwrap();
        assert_eq!(loaded.language.as_deref(), Some("fr"));
    }

    #[tokio::test]
    async fn set_language_on_missing_index_is_not_found() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.set_language("ghost", "fr").await,
            Err(EngineError::NotFound(_))
        ));
    }
}
