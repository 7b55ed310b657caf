//! Resource identity mapper
//!
//! Correlates local resources with their remote counterparts through a
//! [`MappingStore`]. The mapper is passive: it holds no locks, so two
//! concurrent misses for the same local id both run their resolver.

use skybridge_cloud::{
    MappingKey, MappingStore, RemoteFlavor, RemoteImage, RemoteServer, RemoteVolume,
    ResourceKind, ResourceMapping, Result,
};
use std::future::Future;
use std::sync::Arc;

/// Anything with a remote id
pub trait RemoteResource {
    fn remote_id(&self) -> &str;
}

impl RemoteResource for RemoteServer {
    fn remote_id(&self) -> &str {
        &self.id
    }
}

impl RemoteResource for RemoteVolume {
    fn remote_id(&self) -> &str {
        &self.id
    }
}

impl RemoteResource for RemoteImage {
    fn remote_id(&self) -> &str {
        &self.id
    }
}

impl RemoteResource for RemoteFlavor {
    fn remote_id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone)]
pub struct ResourceMapper {
    store: Arc<dyn MappingStore>,
}

impl ResourceMapper {
    pub fn new(store: Arc<dyn MappingStore>) -> Self {
        Self { store }
    }

    pub async fn lookup(
        &self,
        local_id: &str,
        project_id: &str,
        kind: ResourceKind,
    ) -> Result<Option<String>> {
        let key = MappingKey::new(local_id, project_id, kind);
        Ok(self.store.get(&key).await?.map(|m| m.remote_id))
    }

    /// Store a mapping, superseding any previous one for the same key
    pub async fn record(
        &self,
        local_id: &str,
        project_id: &str,
        kind: ResourceKind,
        remote_id: &str,
    ) -> Result<()> {
        let key = MappingKey::new(local_id, project_id, kind);
        tracing::debug!("Mapping {} -> {}", key, remote_id);
        self.store.put(ResourceMapping::new(key, remote_id)).await
    }

    /// Stored remote id, or the resolver's answer persisted as a new mapping
    pub async fn ensure_remote<F, Fut>(
        &self,
        local_id: &str,
        project_id: &str,
        kind: ResourceKind,
        resolver: F,
    ) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        if let Some(remote_id) = self.lookup(local_id, project_id, kind).await? {
            return Ok(remote_id);
        }

        let remote_id = resolver().await?;
        self.record(local_id, project_id, kind, &remote_id).await?;
        Ok(remote_id)
    }

    /// Resolve a remote resource, confirming a stored mapping before use
    ///
    /// A stored id is checked with `fetch`. When it is missing, or points at a
    /// resource that is gone, `search` runs and its match supersedes the
    /// stale mapping. `Ok(None)` means neither found anything.
    pub async fn resolve<T, F, FFut, S, SFut>(
        &self,
        local_id: &str,
        project_id: &str,
        kind: ResourceKind,
        fetch: F,
        search: S,
    ) -> Result<Option<T>>
    where
        T: RemoteResource,
        F: FnOnce(String) -> FFut,
        FFut: Future<Output = Result<Option<T>>>,
        S: FnOnce() -> SFut,
        SFut: Future<Output = Result<Option<T>>>,
    {
        let stored = self.lookup(local_id, project_id, kind).await?;

        if let Some(remote_id) = stored.clone() {
            if let Some(found) = fetch(remote_id.clone()).await? {
                return Ok(Some(found));
            }
            tracing::warn!(
                local_id,
                project = project_id,
                remote_id = %remote_id,
                "Stale {} mapping, remote resource is gone",
                kind
            );
        }

        let Some(found) = search().await? else {
            return Ok(None);
        };

        if stored.as_deref() != Some(found.remote_id()) {
            self.record(local_id, project_id, kind, found.remote_id())
                .await?;
        }
        Ok(Some(found))
    }
}
