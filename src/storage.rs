use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::types::Site;

pub const SITES_FILE: &str = "sites.json";
pub const CONFIG_FILE: &str = "config.json";

/// Persistence for the site collection and key/value settings.
///
/// Collections are always read and written whole. Implementations must make a
/// write visible all at once and serialize concurrent writers.
#[async_trait]
pub trait SiteStore: Send + Sync {
    async fn get_sites(&self) -> Result<Vec<Site>>;
    async fn save_sites(&self, sites: &[Site]) -> Result<()>;
    async fn get_config(&self, key: &str) -> Result<Option<Value>>;
    async fn set_config(&self, key: &str, value: Value) -> Result<()>;

    /// Directory backing the store, if it lives on disk.
    fn data_dir(&self) -> Option<&Path> { None }
}

/// `sites.json` + `config.json` in one directory, replaced via temp file and rename.
pub struct JsonStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), write_lock: Mutex::new(()) }
    }

    /// Like `new`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(dir);
        tokio::fs::create_dir_all(&store.dir)
            .await
            .with_context(|| format!("creating data dir: {}", store.dir.display()))?;
        Ok(store)
    }

    async fn read_json<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        let path = self.dir.join(name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        match serde_json::from_slice(&bytes) {
            Ok(v) => Ok(v),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "unreadable store file, treating as empty");
                Ok(T::default())
            }
        }
    }

    // Caller holds `write_lock`.
    async fn replace_file<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating data dir: {}", self.dir.display()))?;
        let data = serde_json::to_vec_pretty(value)?;
        let target = self.dir.join(name);
        let tmp = self.dir.join(format!(".{name}.{}.tmp", std::process::id()));

        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, &target).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("writing {}", target.display()));
        }
        Ok(())
    }
}

#[async_trait]
impl SiteStore for JsonStore {
    async fn get_sites(&self) -> Result<Vec<Site>> {
        self.read_json(SITES_FILE).await
    }

    async fn save_sites(&self, sites: &[Site]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.replace_file(SITES_FILE, sites).await?;
        info!(count = sites.len(), "saved sites");
        Ok(())
    }

    async fn get_config(&self, key: &str) -> Result<Option<Value>> {
        let config: Map<String, Value> = self.read_json(CONFIG_FILE).await?;
        Ok(config.get(key).cloned())
    }

    async fn set_config(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut config: Map<String, Value> = self.read_json(CONFIG_FILE).await?;
        config.insert(key.to_string(), value);
        self.replace_file(CONFIG_FILE, &config).await
    }

    fn data_dir(&self) -> Option<&Path> { Some(&self.dir) }
}
