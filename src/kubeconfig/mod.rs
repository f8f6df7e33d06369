//! Cluster credentials and the local kubeconfig store
//!
//! After a cluster is created its kubeconfig is fetched from the runtime,
//! flattened into [`Credentials`] for read-back, and optionally merged into the
//! user's kubeconfig file. Merging is update-or-insert by entry name, so
//! concurrent creations of differently named clusters never clobber each other.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::identity::ResourceIdentity;

/// Errors raised while reading, flattening or merging kubeconfigs
#[derive(Error, Debug)]
pub enum KubeconfigError {
    #[error("Failed to parse kubeconfig: {0}")]
    Parse(String),

    #[error("Failed to serialize kubeconfig: {0}")]
    Serialize(String),

    #[error("Kubeconfig has no {kind} entry named '{name}'")]
    MissingEntry { kind: &'static str, name: String },

    #[error("Failed to decode '{field}': {reason}")]
    Decode { field: String, reason: String },

    #[error("Failed to write kubeconfig {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Access credentials of a cluster, computed after creation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub client_certificate: String,
    pub client_key: String,
    pub cluster_ca_certificate: String,
    pub host: String,
    /// The whole kubeconfig document
    pub raw: String,
}

/// Kubeconfig document. Fields this crate does not touch are preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kubeconfig {
    #[serde(rename = "apiVersion", default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    #[serde(default)]
    pub users: Vec<NamedUser>,
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    #[serde(
        rename = "current-context",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub current_context: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

fn default_kind() -> String {
    "Config".to_string()
}

impl Default for Kubeconfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            clusters: Vec::new(),
            users: Vec::new(),
            contexts: Vec::new(),
            current_context: None,
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: ClusterEntry,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterEntry {
    pub server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority_data: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    pub user: UserEntry,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextEntry,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContextEntry {
    pub cluster: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// How a fetched kubeconfig is merged into the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOptions {
    pub switch_current_context: bool,
}

/// Default kubeconfig location: first entry of `$KUBECONFIG`, else ~/.kube/config
pub fn default_kubeconfig_path() -> PathBuf {
    std::env::var_os("KUBECONFIG")
        .and_then(|value| std::env::split_paths(&value).find(|p| !p.as_os_str().is_empty()))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".kube")
                .join("config")
        })
}

// ============================================================================
// SBIO: Pure business logic (no I/O)
// ============================================================================

/// Parse a kubeconfig document. Blank input is an empty kubeconfig.
pub fn parse_kubeconfig(content: &str) -> Result<Kubeconfig, KubeconfigError> {
    if content.trim().is_empty() {
        return Ok(Kubeconfig::default());
    }
    serde_yaml::from_str(content).map_err(|e| KubeconfigError::Parse(e.to_string()))
}

pub fn serialize_kubeconfig(config: &Kubeconfig) -> Result<String, KubeconfigError> {
    serde_yaml::to_string(config).map_err(|e| KubeconfigError::Serialize(e.to_string()))
}

/// Extract the credentials k3d issued for a cluster.
///
/// k3d names the cluster entry after the cluster identity and the user
/// `admin@<identity>`. Certificate data is decoded to PEM text.
pub fn flatten_credentials(
    identity: &ResourceIdentity,
    config: &Kubeconfig,
) -> Result<Credentials, KubeconfigError> {
    let cluster = config
        .clusters
        .iter()
        .find(|c| c.name == identity.as_str())
        .ok_or_else(|| KubeconfigError::MissingEntry {
            kind: "cluster",
            name: identity.to_string(),
        })?;
    let user_name = identity.kubeconfig_user();
    let user = config
        .users
        .iter()
        .find(|u| u.name == user_name)
        .ok_or(KubeconfigError::MissingEntry {
            kind: "user",
            name: user_name,
        })?;

    Ok(Credentials {
        client_certificate: decode_data(
            "client-certificate-data",
            user.user.client_certificate_data.as_deref(),
        )?,
        client_key: decode_data("client-key-data", user.user.client_key_data.as_deref())?,
        cluster_ca_certificate: decode_data(
            "certificate-authority-data",
            cluster.cluster.certificate_authority_data.as_deref(),
        )?,
        host: cluster.cluster.server.clone(),
        raw: serialize_kubeconfig(config)?,
    })
}

fn decode_data(field: &str, data: Option<&str>) -> Result<String, KubeconfigError> {
    let Some(data) = data else {
        return Ok(String::new());
    };
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| KubeconfigError::Decode {
            field: field.to_string(),
            reason: e.to_string(),
        })?;
    String::from_utf8(bytes).map_err(|e| KubeconfigError::Decode {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

/// Merge `incoming` into `existing`.
///
/// Clusters, users and contexts are replaced when a same-named entry exists and
/// appended otherwise; entries with other names are left alone. The current
/// context moves to the incoming one when asked to, or when none is set.
pub fn merge_kubeconfig(existing: &mut Kubeconfig, incoming: &Kubeconfig, options: MergeOptions) {
    upsert(&mut existing.clusters, &incoming.clusters, |c| &c.name);
    upsert(&mut existing.users, &incoming.users, |u| &u.name);
    upsert(&mut existing.contexts, &incoming.contexts, |c| &c.name);

    let target = incoming
        .current_context
        .clone()
        .or_else(|| incoming.contexts.first().map(|c| c.name.clone()));
    if let Some(target) = target {
        if options.switch_current_context || existing.current_context.is_none() {
            debug!(context = %target, "Switching current context");
            existing.current_context = Some(target);
        }
    }
}

fn upsert<T: Clone>(entries: &mut Vec<T>, incoming: &[T], name: impl Fn(&T) -> &String) {
    for entry in incoming {
        match entries.iter_mut().find(|e| name(e) == name(entry)) {
            Some(slot) => *slot = entry.clone(),
            None => entries.push(entry.clone()),
        }
    }
}

// ============================================================================
// I/O boundary
// ============================================================================

/// The local kubeconfig file, shared by every operation of the process
#[derive(Debug)]
pub struct KubeconfigStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl KubeconfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Read the store; a missing file is an empty kubeconfig
    pub async fn load(&self) -> Result<Kubeconfig, KubeconfigError> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    /// Merge a cluster's kubeconfig into the store and write it back atomically
    pub async fn merge(
        &self,
        incoming: &Kubeconfig,
        options: MergeOptions,
    ) -> Result<(), KubeconfigError> {
        let _guard = self.lock.lock().await;
        let mut config = self.read().await?;
        merge_kubeconfig(&mut config, incoming, options);
        self.write(&config).await?;
        info!(path = %self.path.display(), "Updated kubeconfig");
        Ok(())
    }

    async fn read(&self) -> Result<Kubeconfig, KubeconfigError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => parse_kubeconfig(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Kubeconfig::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, config: &Kubeconfig) -> Result<(), KubeconfigError> {
        let content = serialize_kubeconfig(config)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&dir).await?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || persist(&dir, &path, &content))
            .await
            .map_err(|e| KubeconfigError::Write {
                path: self.path.clone(),
                reason: e.to_string(),
            })?
    }
}

/// Write through a temp file in the same directory, then rename over `path`
fn persist(dir: &Path, path: &Path, content: &str) -> Result<(), KubeconfigError> {
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(content.as_bytes())?;
    file.persist(path).map_err(|e| KubeconfigError::Write {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{derive_id, ResourceKind};
    use std::sync::Arc;
    use tempfile::TempDir;

    // "CERT", "KEY" and "CA" base64-encoded
    const K3D_KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
  - name: k3d-bar
    cluster:
      server: https://0.0.0.0:6443
      certificate-authority-data: Q0E=
users:
  - name: admin@k3d-bar
    user:
      client-certificate-data: Q0VSVA==
      client-key-data: S0VZ
contexts:
  - name: k3d-bar
    context:
      cluster: k3d-bar
      user: admin@k3d-bar
current-context: k3d-bar
preferences: {}
"#;

    fn other_kubeconfig() -> Kubeconfig {
        parse_kubeconfig(
            r#"
apiVersion: v1
kind: Config
clusters:
  - name: prod
    cluster:
      server: https://prod.example.com
users:
  - name: prod-admin
    user:
      token: secret
contexts:
  - name: prod
    context:
      cluster: prod
      user: prod-admin
      namespace: default
current-context: prod
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_flatten_credentials() {
        let config = parse_kubeconfig(K3D_KUBECONFIG).unwrap();
        let creds = flatten_credentials(&derive_id(ResourceKind::Cluster, "bar"), &config).unwrap();
        assert_eq!(creds.client_certificate, "CERT");
        assert_eq!(creds.client_key, "KEY");
        assert_eq!(creds.cluster_ca_certificate, "CA");
        assert_eq!(creds.host, "https://0.0.0.0:6443");
        assert!(creds.raw.contains("admin@k3d-bar"));
    }

    #[test]
    fn test_flatten_is_idempotent() {
        let config = parse_kubeconfig(K3D_KUBECONFIG).unwrap();
        let id = derive_id(ResourceKind::Cluster, "bar");
        let first = flatten_credentials(&id, &config).unwrap();
        let reparsed = parse_kubeconfig(&first.raw).unwrap();
        assert_eq!(flatten_credentials(&id, &reparsed).unwrap(), first);
    }

    #[test]
    fn test_flatten_missing_cluster() {
        let config = parse_kubeconfig(K3D_KUBECONFIG).unwrap();
        let err = flatten_credentials(&derive_id(ResourceKind::Cluster, "other"), &config);
        assert!(matches!(
            err,
            Err(KubeconfigError::MissingEntry { kind: "cluster", .. })
        ));
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let config = parse_kubeconfig(K3D_KUBECONFIG).unwrap();
        assert!(config.extra.contains_key("preferences"));
        let out = serialize_kubeconfig(&config).unwrap();
        assert!(out.contains("preferences"));
    }

    #[test]
    fn test_merge_keeps_other_entries() {
        let mut existing = other_kubeconfig();
        let incoming = parse_kubeconfig(K3D_KUBECONFIG).unwrap();
        merge_kubeconfig(&mut existing, &incoming, MergeOptions::default());

        assert_eq!(existing.clusters.len(), 2);
        assert_eq!(existing.users.len(), 2);
        assert_eq!(existing.contexts.len(), 2);
        assert_eq!(existing.current_context.as_deref(), Some("prod"));
        assert_eq!(existing.contexts[0].context.namespace.as_deref(), Some("default"));
    }

    #[test]
    fn test_merge_updates_same_name_and_switches() {
        let mut existing = other_kubeconfig();
        let mut incoming = parse_kubeconfig(K3D_KUBECONFIG).unwrap();
        merge_kubeconfig(&mut existing, &incoming, MergeOptions::default());

        incoming.clusters[0].cluster.server = "https://127.0.0.1:7443".to_string();
        merge_kubeconfig(
            &mut existing,
            &incoming,
            MergeOptions {
                switch_current_context: true,
            },
        );
        assert_eq!(existing.clusters.len(), 2);
        assert_eq!(existing.clusters[1].cluster.server, "https://127.0.0.1:7443");
        assert_eq!(existing.current_context.as_deref(), Some("k3d-bar"));
    }

    #[test]
    fn test_merge_sets_context_when_none() {
        let mut existing = Kubeconfig::default();
        let incoming = parse_kubeconfig(K3D_KUBECONFIG).unwrap();
        merge_kubeconfig(&mut existing, &incoming, MergeOptions::default());
        assert_eq!(existing.current_context.as_deref(), Some("k3d-bar"));
    }

    #[tokio::test]
    async fn test_store_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config");
        let store = KubeconfigStore::new(&path);

        assert_eq!(store.load().await.unwrap(), Kubeconfig::default());

        let incoming = parse_kubeconfig(K3D_KUBECONFIG).unwrap();
        store.merge(&incoming, MergeOptions::default()).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("k3d-bar"));
    }

    #[tokio::test]
    async fn test_store_under_a_file_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("kube");
        std::fs::write(&blocker, "not a directory").unwrap();
        let store = KubeconfigStore::new(blocker.join("config"));

        let incoming = parse_kubeconfig(K3D_KUBECONFIG).unwrap();
        let err = store
            .merge(&incoming, MergeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, KubeconfigError::Io(_)));
    }

    #[tokio::test]
    async fn test_concurrent_merges_keep_both_clusters() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(KubeconfigStore::new(dir.path().join("config")));

        let bar = parse_kubeconfig(K3D_KUBECONFIG).unwrap();
        let baz = parse_kubeconfig(&K3D_KUBECONFIG.replace("k3d-bar", "k3d-baz")).unwrap();

        let (a, b) = tokio::join!(
            store.merge(&bar, MergeOptions::default()),
            store.merge(&baz, MergeOptions::default())
        );
        a.unwrap();
        b.unwrap();

        let merged = store.load().await.unwrap();
        let names: Vec<&str> = merged.clusters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"k3d-bar"));
        assert!(names.contains(&"k3d-baz"));
    }
}
