//! Model Provisioner (C1).
//!
//! Resumable, chunked model blob acquisition: one `Range` GET per call,
//! deliberately — rounds have bounded CPU/wall budgets, so a multi-gigabyte
//! download is cooperatively scheduled across many rounds rather than pulled
//! in one blocking streaming fetch.

use crate::error::{Error, Result};
use reqwest::header::RANGE;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub name: String,
    pub size: u64,
    pub sha256: String,
    pub source_url: String,
    pub chunk_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionStatus {
    Complete,
    Partial { downloaded: u64, total: u64 },
    Failed { reason: String },
}

pub struct ModelProvisioner {
    model_dir: PathBuf,
    client: reqwest::Client,
}

impl ModelProvisioner {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            client: reqwest::Client::new(),
        }
    }

    fn blob_path(&self, spec: &ModelSpec) -> PathBuf {
        self.model_dir.join(&spec.name)
    }

    fn sentinel_path(&self, spec: &ModelSpec) -> PathBuf {
        self.model_dir.join(format!("{}.verified", spec.name))
    }

    /// Called at the start of each non-readonly round. Advances the blob by
    /// at most one chunk and returns the resulting status.
    pub async fn ensure_available(&self, spec: &ModelSpec) -> Result<ProvisionStatus> {
        fs::create_dir_all(&self.model_dir).await?;
        let path = self.blob_path(spec);

        let current_len = match fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        if current_len == spec.size {
            return self.verify_or_delete(spec).await;
        }

        if current_len > spec.size {
            // Corrupt/oversized partial; discard and restart from scratch.
            fs::remove_file(&path).await.ok();
            return Ok(ProvisionStatus::Partial {
                downloaded: 0,
                total: spec.size,
            });
        }

        match self.fetch_one_chunk(spec, current_len).await {
            Ok(new_len) if new_len == spec.size => self.verify_or_delete(spec).await,
            Ok(new_len) => Ok(ProvisionStatus::Partial {
                downloaded: new_len,
                total: spec.size,
            }),
            Err(e) => {
                // Transient network failure: leave the partial file intact.
                tracing::warn!(error = %e, "model chunk fetch failed, will retry next round");
                Ok(ProvisionStatus::Partial {
                    downloaded: current_len,
                    total: spec.size,
                })
            }
        }
    }

    async fn fetch_one_chunk(&self, spec: &ModelSpec, from: u64) -> Result<u64> {
        let to = std::cmp::min(from + spec.chunk_size, spec.size).saturating_sub(1);
        let range = format!("bytes={from}-{to}");

        let response = self
            .client
            .get(&spec.source_url)
            .header(RANGE, range)
            .send()
            .await?;
        let bytes = response.error_for_status()?.bytes().await?;

        let path = self.blob_path(spec);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        Ok(from + bytes.len() as u64)
    }

    async fn verify_or_delete(&self, spec: &ModelSpec) -> Result<ProvisionStatus> {
        let sentinel = self.sentinel_path(spec);
        if fs::metadata(&sentinel).await.is_ok() {
            return Ok(ProvisionStatus::Complete);
        }

        let path = self.blob_path(spec);
        let actual = hash_file(&path).await?;
        if actual == spec.sha256 {
            fs::write(&sentinel, b"ok").await?;
            Ok(ProvisionStatus::Complete)
        } else {
            fs::remove_file(&path).await.ok();
            Err(Error::HashMismatch {
                expected: spec.sha256.clone(),
                actual,
            })
        }
    }
}

async fn hash_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path).await?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn verify_or_delete_accepts_matching_hash() {
        let dir = tempdir().unwrap();
        let provisioner = ModelProvisioner::new(dir.path());
        let spec = ModelSpec {
            name: "model.gguf".to_string(),
            size: 4,
            sha256: String::new(),
            source_url: "http://example.invalid/model.gguf".to_string(),
            chunk_size: 1024,
        };
        tokio::fs::write(provisioner.blob_path(&spec), b"test").await.unwrap();
        let expected = hash_file(&provisioner.blob_path(&spec)).await.unwrap();
        let spec = ModelSpec { sha256: expected, ..spec };

        let status = provisioner.verify_or_delete(&spec).await.unwrap();
        assert_eq!(status, ProvisionStatus::Complete);
        assert!(tokio::fs::metadata(provisioner.sentinel_path(&spec)).await.is_ok());
    }

    #[tokio::test]
    async fn verify_or_delete_rejects_mismatched_hash() {
        let dir = tempdir().unwrap();
        let provisioner = ModelProvisioner::new(dir.path());
        let spec = ModelSpec {
            name: "model.gguf".to_string(),
            size: 4,
            sha256: "deadbeef".to_string(),
            source_url: "http://example.invalid/model.gguf".to_string(),
            chunk_size: 1024,
        };
        tokio::fs::write(provisioner.blob_path(&spec), b"test").await.unwrap();

        let err = provisioner.verify_or_delete(&spec).await.unwrap_err();
        assert!(matches!(err, Error::HashMismatch { .. }));
        assert!(tokio::fs::metadata(provisioner.blob_path(&spec)).await.is_err());
    }

    #[tokio::test]
    async fn ensure_available_reports_complete_once_sentinel_written() {
        let dir = tempdir().unwrap();
        let provisioner = ModelProvisioner::new(dir.path());
        let spec = ModelSpec {
            name: "model.gguf".to_string(),
            size: 4,
            sha256: String::new(),
            source_url: "http://example.invalid/model.gguf".to_string(),
            chunk_size: 1024,
        };
        tokio::fs::create_dir_all(dir.path()).await.unwrap();
        tokio::fs::write(provisioner.blob_path(&spec), b"test").await.unwrap();
        let expected = hash_file(&provisioner.blob_path(&spec)).await.unwrap();
        let spec = ModelSpec { sha256: expected, ..spec };

        let status = provisioner.ensure_available(&spec).await.unwrap();
        assert_eq!(status, ProvisionStatus::Complete);

        // Second call should short-circuit via the sentinel without re-hashing.
        let status = provisioner.ensure_available(&spec).await.unwrap();
        assert_eq!(status, ProvisionStatus::Complete);
    }
}
