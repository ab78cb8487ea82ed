use anyhow::Result;
use async_trait::async_trait;
use shared::domain::ObjectId;
use storage::Storage;
use tokio::sync::Mutex;
use tracing::debug;

use crate::FragmentStore;

pub const DEFAULT_SESSION_KEY: &str = "default";

/// Process-local fragment, e.g. for tests or a host that persists the
/// fragment itself.
#[derive(Default)]
pub struct MemoryFragmentStore {
    value: Mutex<Option<ObjectId>>,
}

impl MemoryFragmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store from a raw fragment such as `#0xabc`.
    pub fn with_fragment(fragment: &str) -> Self {
        Self {
            value: Mutex::new(ObjectId::from_fragment(fragment)),
        }
    }

    pub async fn current(&self) -> Option<ObjectId> {
        self.value.lock().await.clone()
    }
}

#[async_trait]
impl FragmentStore for MemoryFragmentStore {
    async fn load(&self) -> Result<Option<ObjectId>> {
        Ok(self.value.lock().await.clone())
    }

    async fn save(&self, object_id: &ObjectId) -> Result<()> {
        *self.value.lock().await = Some(object_id.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.value.lock().await = None;
        Ok(())
    }
}

/// Fragment persisted in the local SQLite database under one session key.
pub struct SqliteFragmentStore {
    storage: Storage,
    session_key: String,
}

impl SqliteFragmentStore {
    pub fn new(storage: Storage, session_key: impl Into<String>) -> Self {
        Self {
            storage,
            session_key: session_key.into(),
        }
    }

    pub fn session_key(&self) -> &str {
        &self.session_key
    }
}

#[async_trait]
impl FragmentStore for SqliteFragmentStore {
    async fn load(&self) -> Result<Option<ObjectId>> {
        let fragment = self.storage.load_fragment(&self.session_key).await?;
        if let Some(fragment) = &fragment {
            debug!(
                session_key = %self.session_key,
                object_id = %fragment.object_id,
                updated_at = %fragment.updated_at,
                "fragment: loaded"
            );
        }
        Ok(fragment.map(|fragment| fragment.object_id))
    }

    async fn save(&self, object_id: &ObjectId) -> Result<()> {
        self.storage.save_fragment(&self.session_key, object_id).await
    }

    async fn clear(&self) -> Result<()> {
        let removed = self.storage.clear_fragment(&self.session_key).await?;
        debug!(session_key = %self.session_key, removed, "fragment: cleared");
        Ok(())
    }
}
