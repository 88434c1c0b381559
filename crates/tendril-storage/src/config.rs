//! Connection URLs
//!
//! `memory://` opens an empty in-process graph; `redb:///abs/path.redb` (or
//! `redb://./relative.redb`) opens an embedded store file. Credentials may
//! appear in the URL and are never printed.

use crate::error::{StorageError, StorageResult};
use crate::memory::MemoryStore;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tendril_core::GraphStore;
use url::Url;

/// Store backend named by the URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    #[cfg(feature = "redb")]
    Redb,
}

/// A parsed connection URL
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub backend: Backend,
    pub path: Option<PathBuf>,
    pub username: Option<String>,
    password: Option<String>,
}

impl ConnectionConfig {
    pub fn parse(raw: &str) -> StorageResult<Self> {
        let url = Url::parse(raw.trim())
            .map_err(|e| StorageError::Config(format!("{}: {}", redact(raw), e)))?;

        let username = Some(url.username().to_string()).filter(|u| !u.is_empty());
        let password = url.password().map(str::to_string);

        match url.scheme() {
            "memory" => Ok(Self {
                backend: Backend::Memory,
                path: None,
                username,
                password,
            }),
            #[cfg(feature = "redb")]
            "redb" => {
                let path = match url.host_str() {
                    None | Some("") | Some("localhost") => PathBuf::from(url.path()),
                    Some(".") => PathBuf::from(format!(".{}", url.path())),
                    Some(other) => {
                        return Err(StorageError::Config(format!(
                            "redb stores are local files, not hosts ({})",
                            other
                        )))
                    }
                };
                if path.as_os_str().is_empty() || url.path() == "/" {
                    return Err(StorageError::Config(format!(
                        "{} names no file",
                        redact(raw)
                    )));
                }
                Ok(Self {
                    backend: Backend::Redb,
                    path: Some(path),
                    username,
                    password,
                })
            }
            other => Err(StorageError::Config(format!(
                "unsupported scheme '{}' (expected memory:// or redb://)",
                other
            ))),
        }
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }
}

impl FromStr for ConnectionConfig {
    type Err = StorageError;

    fn from_str(s: &str) -> StorageResult<Self> {
        Self::parse(s)
    }
}

/// Prints the URL with any password replaced
impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.backend {
            Backend::Memory => "memory",
            #[cfg(feature = "redb")]
            Backend::Redb => "redb",
        };
        write!(f, "{}://", scheme)?;
        if let Some(user) = &self.username {
            write!(f, "{}", user)?;
            if self.password.is_some() {
                write!(f, ":***")?;
            }
            write!(f, "@")?;
        }
        if let Some(path) = &self.path {
            write!(f, "{}", path.display())?;
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionConfig({})", self)
    }
}

/// Replace the password of a raw URL string, for error messages
fn redact(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("***"));
            url.to_string()
        }
        Ok(url) => url.to_string(),
        Err(_) => "<unparseable url>".to_string(),
    }
}

/// Open the store a connection URL names
pub fn open_store(config: &ConnectionConfig) -> StorageResult<Arc<dyn GraphStore>> {
    tracing::info!("Opening store {}", config);
    match config.backend {
        Backend::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "redb")]
        Backend::Redb => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| StorageError::Config("redb URL without a path".to_string()))?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Ok(Arc::new(crate::redb::RedbStore::open(path)?))
        }
    }
}
