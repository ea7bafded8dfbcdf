use crate::app::ports::{EncryptionDirective, ObjectStoreError, ObjectStorePort, PutObject};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

/// Metadata written next to every object as `<key>.meta.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub content_type: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub encryption: EncryptionDirective,
    pub written_at: chrono::DateTime<chrono::Utc>,
}

/// Filesystem object store rooted at `root`; containers are directories.
///
/// Objects are written to a temporary sibling and renamed into place, so a
/// reader sees either the previous object or the complete new one.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn object_path(&self, container: &str, key: &str) -> Result<PathBuf, ObjectStoreError> {
        let relative = Path::new(container).join(key);
        let clean = !container.is_empty()
            && !container.contains('/')
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(ObjectStoreError::Invalid(format!(
                "unsafe object path '{}/{}'",
                container, key
            )));
        }
        Ok(self.root.join(relative))
    }

    pub async fn read_meta(&self, container: &str, key: &str) -> Result<ObjectMeta, ObjectStoreError> {
        let path = meta_path(&self.object_path(container, key)?);
        let raw = fs::read(&path).await?;
        serde_json::from_slice(&raw).map_err(|e| ObjectStoreError::Invalid(e.to_string()))
    }
}

fn meta_path(object: &Path) -> PathBuf {
    let mut name = object.file_name().unwrap_or_default().to_os_string();
    name.push(".meta.json");
    object.with_file_name(name)
}

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

fn temp_path(target: &Path) -> PathBuf {
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".tmp-{}-{}", std::process::id(), seq));
    target.with_file_name(name)
}

async fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), ObjectStoreError> {
    let tmp = temp_path(target);
    let committed = match fs::write(&tmp, bytes).await {
        Ok(()) => fs::rename(&tmp, target).await,
        Err(e) => Err(e),
    };
    if let Err(e) = committed {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl ObjectStorePort for FsObjectStore {
    async fn put(&self, object: PutObject) -> Result<(), ObjectStoreError> {
        let path = self.object_path(&object.container, &object.key)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let meta = ObjectMeta {
            content_type: object.content_type.to_string(),
            size_bytes: object.body.len() as u64,
            sha256: hex::encode(Sha256::digest(&object.body)),
            encryption: object.encryption,
            written_at: chrono::Utc::now(),
        };
        let meta_bytes =
            serde_json::to_vec_pretty(&meta).map_err(|e| ObjectStoreError::Invalid(e.to_string()))?;

        // body first: a sidecar must never describe bytes that are not on disk
        write_atomic(&path, &object.body).await?;
        let meta_file = meta_path(&path);
        if let Err(e) = write_atomic(&meta_file, &meta_bytes).await {
            let _ = fs::remove_file(&meta_file).await;
            return Err(e);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fs"
    }
}
