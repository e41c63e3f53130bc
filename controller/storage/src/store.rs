use crate::{backoff::backoff, Error, Result};
use meridian_controller_core::{ResourceKind, ResourceRef, Secret, Status, Upstream};
use std::time::Duration;
use tracing::{debug, info};

const UPDATE_ATTEMPTS: usize = 5;
const UPDATE_BACKOFF_BASE: Duration = Duration::from_millis(100);
const UPDATE_BACKOFF_MAX: Duration = Duration::from_secs(2);

/// A value paired with the opaque version it was read at.
#[derive(Clone, Debug, PartialEq)]
pub struct Versioned<T> {
    pub version: String,
    pub value: T,
}

/// The store that holds user configuration.
#[async_trait::async_trait]
pub trait ConfigStore: Send + Sync + 'static {
    async fn read_upstream(&self, name: &str) -> Result<Versioned<Upstream>>;

    /// Replaces an upstream, failing with [`Error::Conflict`] if it changed
    /// since `expected_version` was read.
    async fn write_upstream(
        &self,
        upstream: &Upstream,
        expected_version: &str,
    ) -> Result<Versioned<Upstream>>;

    /// Persists the status of a configuration object next to it.
    async fn write_status(&self, resource: &ResourceRef, status: &Status) -> Result<()>;
}

#[async_trait::async_trait]
pub trait SecretStore: Send + Sync + 'static {
    async fn read_secret(&self, reference: &str) -> Result<Option<Secret>>;

    async fn write_secret(&self, secret: &Secret) -> Result<()>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SecretUpdate {
    Created,
    Updated,
    Unchanged,
}

/// Applies `mutate` to the named upstream and writes it back, re-reading and
/// retrying with backoff when another writer got there first.
///
/// `mutate` returns false when it made no change, in which case nothing is
/// written.
///
/// Meant for function discovery, which records the functions it finds on an
/// upstream without clobbering concurrent edits.
pub async fn update_upstream_with_retry<S, F>(
    store: &S,
    name: &str,
    mut mutate: F,
) -> Result<Upstream>
where
    S: ConfigStore + ?Sized,
    F: FnMut(&mut Upstream) -> bool + Send,
{
    for attempt in 0..UPDATE_ATTEMPTS {
        let delay = backoff(attempt as u32, UPDATE_BACKOFF_BASE, UPDATE_BACKOFF_MAX);
        tokio::time::sleep(delay).await;

        let Versioned {
            version,
            value: mut upstream,
        } = store.read_upstream(name).await?;
        if !mutate(&mut upstream) {
            return Ok(upstream);
        }

        match store.write_upstream(&upstream, &version).await {
            Ok(Versioned { value, .. }) => return Ok(value),
            Err(Error::Conflict { .. }) => {
                debug!(%name, attempt, "Upstream changed concurrently; retrying");
            }
            Err(error) => return Err(error),
        }
    }

    Err(Error::RetriesExhausted {
        kind: ResourceKind::Upstream,
        name: name.to_string(),
        attempts: UPDATE_ATTEMPTS,
    })
}

/// Creates the secret if it is absent and overwrites it if its data differs.
///
/// Meant for function discovery, which stores the credentials an upstream's
/// functions are discovered with.
pub async fn ensure_secret<S>(store: &S, secret: &Secret) -> Result<SecretUpdate>
where
    S: SecretStore + ?Sized,
{
    match store.read_secret(&secret.reference).await? {
        None => {
            store.write_secret(secret).await?;
            info!(secret = %secret.reference, "Created secret");
            Ok(SecretUpdate::Created)
        }
        Some(existing) if existing.data != secret.data => {
            store.write_secret(secret).await?;
            info!(secret = %secret.reference, "Updated secret");
            Ok(SecretUpdate::Updated)
        }
        Some(_) => Ok(SecretUpdate::Unchanged),
    }
}
