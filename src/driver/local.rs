//! Local-filesystem storage driver.
//!
//! `tokio::fs` throughout, a root directory per driver instance, and
//! conflict detection via `create_new` rather than a check-then-write race.
//! Writes land through a temp file and `tokio::fs::rename` so a crash mid
//! write never leaves a partial object visible under its final name.

use super::{DriverError, Namespace, StorageDriver};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Stores every namespace as files under a common root, one subdirectory
/// per namespace, preserving hierarchical keys as nested directories.
pub struct LocalDriver {
    root: PathBuf,
}

impl LocalDriver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, namespace: Namespace, key: &str) -> PathBuf {
        self.root.join(namespace.as_str()).join(format!("{key}.bali"))
    }

    async fn ensure_parent(path: &Path, namespace: Namespace, key: &str, method: &'static str) -> Result<(), DriverError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| DriverError::Io {
                namespace,
                key: key.to_string(),
                method,
                cause: e.to_string(),
            })?;
        }
        Ok(())
    }

    fn permissions_for(namespace: Namespace) -> u32 {
        if namespace.is_immutable() {
            0o400
        } else {
            0o600
        }
    }
}

#[async_trait]
impl StorageDriver for LocalDriver {
    async fn exists(&self, namespace: Namespace, key: &str) -> Result<bool, DriverError> {
        let path = self.path_for(namespace, key);
        Ok(fs::try_exists(&path).await.map_err(|e| DriverError::Io {
            namespace,
            key: key.to_string(),
            method: "exists",
            cause: e.to_string(),
        })?)
    }

    async fn read(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>, DriverError> {
        let path = self.path_for(namespace, key);
        match fs::read(&path).await {
            Ok(bytes) => {
                let trimmed = bytes.strip_suffix(b"\n").map(|b| b.to_vec()).unwrap_or(bytes);
                Ok(Some(trimmed))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DriverError::Io {
                namespace,
                key: key.to_string(),
                method: "read",
                cause: e.to_string(),
            }),
        }
    }

    async fn write(
        &self,
        namespace: Namespace,
        key: &str,
        bytes: Vec<u8>,
        allow_overwrite: bool,
        _digest: Option<&crate::model::Digest>,
    ) -> Result<(), DriverError> {
        // Local files carry no wire headers, so the citation digest has
        // nothing to attach to here; it is only meaningful to drivers that
        // ship an integrity header alongside the request.
        let path = self.path_for(namespace, key);
        Self::ensure_parent(&path, namespace, key, "write").await?;

        let mut envelope = bytes;
        if !envelope.ends_with(b"\n") {
            envelope.push(b'\n');
        }

        if !allow_overwrite {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
                .map_err(|e| {
                    if e.kind() == std::io::ErrorKind::AlreadyExists {
                        DriverError::Conflict {
                            namespace,
                            key: key.to_string(),
                        }
                    } else {
                        DriverError::Io {
                            namespace,
                            key: key.to_string(),
                            method: "write",
                            cause: e.to_string(),
                        }
                    }
                })?;
            file.write_all(&envelope).await.map_err(|e| DriverError::Io {
                namespace,
                key: key.to_string(),
                method: "write",
                cause: e.to_string(),
            })?;
        } else {
            let tmp_path = path.with_extension("bali.tmp");
            fs::write(&tmp_path, &envelope).await.map_err(|e| DriverError::Io {
                namespace,
                key: key.to_string(),
                method: "write",
                cause: e.to_string(),
            })?;
            fs::rename(&tmp_path, &path).await.map_err(|e| DriverError::Io {
                namespace,
                key: key.to_string(),
                method: "write",
                cause: e.to_string(),
            })?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(Self::permissions_for(namespace));
            let _ = fs::set_permissions(&path, perms).await;
        }

        Ok(())
    }

    async fn delete(&self, namespace: Namespace, key: &str) -> Result<bool, DriverError> {
        let path = self.path_for(namespace, key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(DriverError::Io {
                namespace,
                key: key.to_string(),
                method: "delete",
                cause: e.to_string(),
            }),
        }
    }

    async fn list(&self, namespace: Namespace, prefix: &str, max_keys: usize) -> Result<Vec<String>, DriverError> {
        let base = self.root.join(namespace.as_str());
        let mut keys = Vec::new();
        walk(&base, &base, prefix, max_keys, &mut keys).await.map_err(|e| DriverError::Io {
            namespace,
            key: prefix.to_string(),
            method: "list",
            cause: e.to_string(),
        })?;
        Ok(keys)
    }
}

fn walk<'a>(
    base: &'a Path,
    dir: &'a Path,
    prefix: &'a str,
    max_keys: usize,
    out: &'a mut Vec<String>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + 'a>> {
    Box::pin(async move {
        if out.len() >= max_keys {
            return Ok(());
        }
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            if out.len() >= max_keys {
                break;
            }
            let path = entry.path();
            if path.is_dir() {
                walk(base, &path, prefix, max_keys, out).await?;
            } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if let Some(stripped) = name.strip_suffix(".bali") {
                    let relative = path
                        .parent()
                        .unwrap_or(base)
                        .strip_prefix(base)
                        .unwrap_or(Path::new(""))
                        .to_string_lossy()
                        .to_string();
                    let key = if relative.is_empty() {
                        stripped.to_string()
                    } else {
                        format!("{relative}/{stripped}")
                    };
                    if key.starts_with(prefix) {
                        out.push(key);
                    }
                }
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let driver = LocalDriver::new(dir.path());
        driver
            .write(Namespace::Documents, "tag/v1.0.0", b"hello".to_vec(), false, None)
            .await
            .unwrap();
        let read = driver.read(Namespace::Documents, "tag/v1.0.0").await.unwrap();
        assert_eq!(read, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn write_without_overwrite_conflicts_on_second_write() {
        let dir = tempfile::tempdir().unwrap();
        let driver = LocalDriver::new(dir.path());
        driver
            .write(Namespace::Documents, "tag/v1.0.0", b"a".to_vec(), false, None)
            .await
            .unwrap();
        let second = driver.write(Namespace::Documents, "tag/v1.0.0", b"b".to_vec(), false, None).await;
        assert!(matches!(second, Err(DriverError::Conflict { .. })));
    }

    #[tokio::test]
    async fn delete_reports_prior_existence() {
        let dir = tempfile::tempdir().unwrap();
        let driver = LocalDriver::new(dir.path());
        assert_eq!(driver.delete(Namespace::Messages, "missing").await.unwrap(), false);
        driver.write(Namespace::Messages, "present", b"x".to_vec(), true, None).await.unwrap();
        assert_eq!(driver.delete(Namespace::Messages, "present").await.unwrap(), true);
    }

    #[tokio::test]
    async fn list_finds_keys_under_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let driver = LocalDriver::new(dir.path());
        driver.write(Namespace::Messages, "bag/v1.0.0/available/a", b"1".to_vec(), true, None).await.unwrap();
        driver.write(Namespace::Messages, "bag/v1.0.0/available/b", b"2".to_vec(), true, None).await.unwrap();
        driver.write(Namespace::Messages, "bag/v1.0.0/processing/c", b"3".to_vec(), true, None).await.unwrap();
        let keys = driver.list(Namespace::Messages, "bag/v1.0.0/available", 10).await.unwrap();
        assert_eq!(keys.len(), 2);
    }
}
