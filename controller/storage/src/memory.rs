use crate::{
    refs::RefSource,
    store::{ConfigStore, SecretStore, Versioned},
    watcher::ListSource,
    Error, Object, Result,
};
use meridian_controller_core::{ResourceKind, ResourceRef, Secret, Status, Upstream};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-process store holding configuration objects, statuses, and secrets.
///
/// Every write bumps a per-object revision that is used as the object's
/// version for optimistic concurrency.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    revision: u64,
    objects: BTreeMap<(ResourceKind, String), (u64, serde_json::Value)>,
    statuses: BTreeMap<ResourceRef, Status>,
    secrets: BTreeMap<String, Secret>,
}

impl MemoryStore {
    pub fn put<T: Object>(&self, obj: T) {
        let mut inner = self.inner.write();
        inner.revision += 1;
        let revision = inner.revision;
        // Config types only have string-keyed maps.
        if let Ok(value) = serde_json::to_value(&obj) {
            inner
                .objects
                .insert((T::KIND, obj.name().to_string()), (revision, value));
        }
    }

    pub fn remove<T: Object>(&self, name: &str) {
        self.inner
            .write()
            .objects
            .remove(&(T::KIND, name.to_string()));
    }

    pub fn put_secret(&self, secret: Secret) {
        self.inner
            .write()
            .secrets
            .insert(secret.reference.clone(), secret);
    }

    pub fn remove_secret(&self, reference: &str) {
        self.inner.write().secrets.remove(reference);
    }

    pub fn status(&self, resource: &ResourceRef) -> Option<Status> {
        self.inner.read().statuses.get(resource).cloned()
    }

    fn get<T: Object>(&self, name: &str) -> Option<(u64, T)> {
        let inner = self.inner.read();
        let (revision, value) = inner.objects.get(&(T::KIND, name.to_string()))?;
        let obj = serde_json::from_value(value.clone()).ok()?;
        Some((*revision, obj))
    }
}

#[async_trait::async_trait]
impl<T: Object> ListSource<T> for MemoryStore {
    async fn list(&self) -> Result<Vec<T>> {
        let inner = self.inner.read();
        Ok(inner
            .objects
            .iter()
            .filter(|((kind, _), _)| *kind == T::KIND)
            .filter_map(|(_, (_, value))| serde_json::from_value(value.clone()).ok())
            .collect())
    }
}

#[async_trait::async_trait]
impl ConfigStore for MemoryStore {
    async fn read_upstream(&self, name: &str) -> Result<Versioned<Upstream>> {
        let (revision, value) = self.get::<Upstream>(name).ok_or_else(|| Error::NotFound {
            kind: ResourceKind::Upstream,
            name: name.to_string(),
        })?;
        Ok(Versioned {
            version: revision.to_string(),
            value,
        })
    }

    async fn write_upstream(
        &self,
        upstream: &Upstream,
        expected_version: &str,
    ) -> Result<Versioned<Upstream>> {
        let mut inner = self.inner.write();
        let key = (ResourceKind::Upstream, upstream.name.clone());
        let current = inner.objects.get(&key).map(|(r, _)| r.to_string());
        if current.as_deref() != Some(expected_version) {
            return Err(Error::Conflict {
                kind: ResourceKind::Upstream,
                name: upstream.name.clone(),
            });
        }

        let value = serde_json::to_value(upstream).map_err(|e| Error::Encode {
            name: upstream.name.clone(),
            message: e.to_string(),
        })?;
        inner.revision += 1;
        let revision = inner.revision;
        inner.objects.insert(key, (revision, value));
        Ok(Versioned {
            version: revision.to_string(),
            value: upstream.clone(),
        })
    }

    async fn write_status(&self, resource: &ResourceRef, status: &Status) -> Result<()> {
        self.inner
            .write()
            .statuses
            .insert(resource.clone(), status.clone());
        Ok(())
    }
}

#[async_trait::async_trait]
impl SecretStore for MemoryStore {
    async fn read_secret(&self, reference: &str) -> Result<Option<Secret>> {
        Ok(self.inner.read().secrets.get(reference).cloned())
    }

    async fn write_secret(&self, secret: &Secret) -> Result<()> {
        self.put_secret(secret.clone());
        Ok(())
    }
}

#[async_trait::async_trait]
impl RefSource for MemoryStore {
    type Item = Secret;

    async fn fetch(&self, reference: &str) -> Result<Option<Secret>> {
        Ok(self.inner.read().secrets.get(reference).cloned())
    }
}
