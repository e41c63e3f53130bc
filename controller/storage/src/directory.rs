//! Local-directory backends.
//!
//! Configuration objects live at `<root>/<collection>/<name>.{yaml,yml,json}`
//! and their statuses at `<root>/status/<collection>/<name>.yaml`. Secrets are
//! YAML documents with a `data` map at `<secret-dir>/<ref>.yaml`; files are
//! read verbatim from `<file-dir>/<ref>`. Names and references must be a
//! single path component.

use crate::{
    endpoints::EndpointSource,
    refs::RefSource,
    store::{ConfigStore, SecretStore, Versioned},
    watcher::ListSource,
    Error, Object, Result,
};
use meridian_controller_core::{
    stable_hash, EndpointGroups, File, ResourceKind, ResourceRef, Secret, Status, Upstream,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Component, Path, PathBuf},
};
use tracing::{debug, trace};

#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
    writes: tokio::sync::Mutex<()>,
}

#[derive(Clone, Debug)]
pub struct DirectorySecretSource {
    root: PathBuf,
}

#[derive(Clone, Debug)]
pub struct DirectoryFileSource {
    root: PathBuf,
}

/// Reads endpoint groups from a single YAML document mapping upstream names
/// to `[{address, port}]` lists. A missing file means nothing was discovered.
#[derive(Clone, Debug)]
pub struct DirectoryEndpointSource {
    path: PathBuf,
}

#[derive(Default, Deserialize, Serialize)]
struct SecretDocument {
    #[serde(default)]
    data: BTreeMap<String, String>,
}

// === impl DirectoryStore ===

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            writes: tokio::sync::Mutex::new(()),
        }
    }

    fn collection(&self, kind: ResourceKind) -> PathBuf {
        self.root.join(kind.collection())
    }

    async fn load_all<T: Object>(&self) -> Result<Vec<(PathBuf, T)>> {
        let dir = self.collection(T::KIND);
        let mut objects = Vec::new();
        for path in list_documents(&dir).await? {
            let bytes = read(&path).await?;
            let obj = decode::<T>(&path, &bytes)?;
            trace!(path = %path.display(), name = %obj.name(), "Loaded");
            objects.push((path, obj));
        }
        Ok(objects)
    }

    async fn find<T: Object>(&self, name: &str) -> Result<(PathBuf, T)> {
        self.load_all::<T>()
            .await?
            .into_iter()
            .find(|(_, obj)| obj.name() == name)
            .ok_or_else(|| Error::NotFound {
                kind: T::KIND,
                name: name.to_string(),
            })
    }
}

#[async_trait::async_trait]
impl<T: Object> ListSource<T> for DirectoryStore {
    async fn list(&self) -> Result<Vec<T>> {
        Ok(self
            .load_all::<T>()
            .await?
            .into_iter()
            .map(|(_, obj)| obj)
            .collect())
    }
}

#[async_trait::async_trait]
impl ConfigStore for DirectoryStore {
    async fn read_upstream(&self, name: &str) -> Result<Versioned<Upstream>> {
        let (_, value) = self.find::<Upstream>(name).await?;
        Ok(Versioned {
            version: version_of(&value),
            value,
        })
    }

    async fn write_upstream(
        &self,
        upstream: &Upstream,
        expected_version: &str,
    ) -> Result<Versioned<Upstream>> {
        let _guard = self.writes.lock().await;

        let (path, current) = self.find::<Upstream>(&upstream.name).await?;
        if version_of(&current) != expected_version {
            return Err(Error::Conflict {
                kind: ResourceKind::Upstream,
                name: upstream.name.clone(),
            });
        }

        let bytes = encode(&path, &upstream.name, upstream)?;
        write_atomic(&path, &bytes).await?;
        debug!(upstream = %upstream.name, path = %path.display(), "Wrote upstream");
        Ok(Versioned {
            version: version_of(upstream),
            value: upstream.clone(),
        })
    }

    async fn write_status(&self, resource: &ResourceRef, status: &Status) -> Result<()> {
        let path = self
            .root
            .join("status")
            .join(resource.kind.collection())
            .join(format!("{}.yaml", document_name(&resource.name)?));
        let bytes = encode(&path, &resource.name, status)?;
        write_atomic(&path, &bytes).await
    }
}

// === impl DirectorySecretSource ===

impl DirectorySecretSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, reference: &str) -> Result<PathBuf> {
        Ok(self.root.join(format!("{}.yaml", document_name(reference)?)))
    }
}

#[async_trait::async_trait]
impl RefSource for DirectorySecretSource {
    type Item = Secret;

    async fn fetch(&self, reference: &str) -> Result<Option<Secret>> {
        let path = self.path(reference)?;
        let Some(bytes) = read_optional(&path).await? else {
            return Ok(None);
        };
        let SecretDocument { data } = decode(&path, &bytes)?;
        Ok(Some(Secret::new(reference, data)))
    }
}

#[async_trait::async_trait]
impl SecretStore for DirectorySecretSource {
    async fn read_secret(&self, reference: &str) -> Result<Option<Secret>> {
        self.fetch(reference).await
    }

    async fn write_secret(&self, secret: &Secret) -> Result<()> {
        let path = self.path(&secret.reference)?;
        let doc = SecretDocument {
            data: secret.data.clone(),
        };
        let bytes = encode(&path, &secret.reference, &doc)?;
        write_atomic(&path, &bytes).await
    }
}

// === impl DirectoryFileSource ===

impl DirectoryFileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait::async_trait]
impl RefSource for DirectoryFileSource {
    type Item = File;

    async fn fetch(&self, reference: &str) -> Result<Option<File>> {
        let path = self.root.join(document_name(reference)?);
        Ok(read_optional(&path).await?.map(|contents| File {
            reference: reference.to_string(),
            contents,
        }))
    }
}

// === impl DirectoryEndpointSource ===

impl DirectoryEndpointSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl EndpointSource for DirectoryEndpointSource {
    async fn load(&self) -> Result<EndpointGroups> {
        match read_optional(&self.path).await? {
            None => Ok(EndpointGroups::new()),
            Some(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(EndpointGroups::new()),
            Some(bytes) => decode(&self.path, &bytes),
        }
    }
}

// === helpers ===

/// Accepts only names that resolve to an entry directly under a root.
fn document_name(name: &str) -> Result<&str> {
    let mut components = Path::new(name).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single || name.contains(['/', '\\', '\0']) {
        return Err(Error::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(name)
}

fn version_of<T: serde::Serialize>(value: &T) -> String {
    format!("{:016x}", stable_hash(value))
}

async fn list_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(Error::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut paths = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(source) => {
                return Err(Error::Io {
                    path: dir.to_path_buf(),
                    source,
                })
            }
        };
        let path = entry.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(true);
        let document = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml" | "json")
        );
        if !hidden && document {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

async fn read(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(Error::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

// JSON documents are valid YAML, so one decoder covers every extension.
fn decode<T: serde::de::DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T> {
    serde_yaml::from_slice(bytes).map_err(|source| Error::Decode {
        path: path.to_path_buf(),
        source,
    })
}

fn encode<T: serde::Serialize>(path: &Path, name: &str, value: &T) -> Result<Vec<u8>> {
    let json = path.extension().and_then(|e| e.to_str()) == Some("json");
    let bytes = if json {
        serde_json::to_vec_pretty(value).map_err(|e| e.to_string())
    } else {
        serde_yaml::to_string(value)
            .map(String::into_bytes)
            .map_err(|e| e.to_string())
    };
    bytes.map_err(|message| Error::Encode {
        name: name.to_string(),
        message,
    })
}

/// Writes through a hidden temporary file so that pollers never observe a
/// partially-written document.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let io_err = |source| Error::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document");
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)
}
