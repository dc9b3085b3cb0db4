//! Model file provisioning with download on first use

use crate::config::DetectorConfig;
use crate::error::{EyeError, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const MAX_MODEL_SIZE: usize = 2_000_000_000;
/// Smaller payloads are error pages or truncated transfers
const MIN_MODEL_SIZE: usize = 1024;
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(3600);

/// Makes sure the detector's model file is on disk before it is loaded
pub struct ModelManager {
    config: DetectorConfig,
}

impl ModelManager {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Path of the model file, downloading it from `model_url` if it is missing
    pub async fn ensure_model(&self) -> Result<PathBuf> {
        let model_path = &self.config.model_path;
        if model_path.is_file() {
            info!("Model already present at {:?}", model_path);
            return Ok(model_path.clone());
        }

        let url = self.config.model_url.as_deref().ok_or_else(|| {
            EyeError::Model(format!(
                "Model file {:?} not found and no model_url configured",
                model_path
            ))
        })?;
        if !url.starts_with("https://") {
            return Err(EyeError::Model(
                "Only HTTPS URLs are allowed for model downloads".to_string(),
            ));
        }

        info!("Downloading model from {}", url);
        let bytes = download(url).await?;

        match &self.config.model_sha256 {
            Some(expected) => {
                verify_checksum(&bytes, expected)?;
                info!("Verified model checksum");
            }
            None => info!("Downloaded {} bytes (checksum verification skipped)", bytes.len()),
        }

        store_model(model_path, &bytes)?;
        info!("Model saved to {:?}", model_path);
        Ok(model_path.clone())
    }
}

async fn download(url: &str) -> Result<Vec<u8>> {
    let client = reqwest::Client::builder().timeout(DOWNLOAD_TIMEOUT).build()?;
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(EyeError::Model(format!(
            "Failed to download model: HTTP {}",
            response.status()
        )));
    }
    if let Some(length) = response.content_length() {
        if length > MAX_MODEL_SIZE as u64 {
            return Err(EyeError::Model(format!(
                "Model too large: {} bytes (max {} bytes)",
                length, MAX_MODEL_SIZE
            )));
        }
    }

    let bytes = response.bytes().await?;
    check_size(bytes.len())?;
    Ok(bytes.to_vec())
}

fn check_size(len: usize) -> Result<()> {
    if len > MAX_MODEL_SIZE {
        return Err(EyeError::Model(format!(
            "Downloaded model too large: {} bytes (max {} bytes)",
            len, MAX_MODEL_SIZE
        )));
    }
    if len < MIN_MODEL_SIZE {
        return Err(EyeError::Model(
            "Downloaded file too small, likely corrupted".to_string(),
        ));
    }
    Ok(())
}

/// Compare the SHA-256 of `bytes` with a hex digest, ignoring case
pub fn verify_checksum(bytes: &[u8], expected: &str) -> Result<()> {
    let computed = hex::encode(Sha256::digest(bytes));
    if !computed.eq_ignore_ascii_case(expected) {
        return Err(EyeError::Model(format!(
            "Checksum mismatch: expected {}, got {}",
            expected, computed
        )));
    }
    Ok(())
}

/// Write through a sibling temp file and rename, so readers never see a partial model
pub fn store_model(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, bytes)?;
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(EyeError::Io(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> DetectorConfig {
        DetectorConfig {
            model_path: dir.path().join("models").join("best.onnx"),
            ..DetectorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_existing_model_is_used_as_is() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        store_model(&config.model_path, b"weights").unwrap();
        // would fail validation if a download were attempted
        config.model_url = Some("http://unused".to_string());

        let path = ModelManager::new(config.clone()).ensure_model().await.unwrap();
        assert_eq!(path, config.model_path);
        assert_eq!(fs::read(&path).unwrap(), b"weights");
    }

    #[tokio::test]
    async fn test_missing_model_without_url_fails() {
        let dir = TempDir::new().unwrap();
        let err = ModelManager::new(config_in(&dir)).ensure_model().await.unwrap_err();
        assert!(matches!(err, EyeError::Model(_)));
        assert!(err.to_string().contains("no model_url"));
    }

    #[tokio::test]
    async fn test_plain_http_url_is_refused() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.model_url = Some("http://models.example.com/best.onnx".to_string());

        let err = ModelManager::new(config.clone()).ensure_model().await.unwrap_err();
        assert!(err.to_string().contains("HTTPS"));
        assert!(!config.model_path.exists());
    }

    #[test]
    fn test_checksum_verification() {
        // sha256("abc")
        let digest = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert!(verify_checksum(b"abc", digest).is_ok());
        assert!(verify_checksum(b"abc", &digest.to_uppercase()).is_ok());

        let err = verify_checksum(b"abd", digest).unwrap_err();
        assert!(err.to_string().contains("Checksum mismatch"));
    }

    #[test]
    fn test_store_model_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("best.onnx");

        store_model(&path, &[7u8; 2048]).unwrap();

        assert_eq!(fs::read(&path).unwrap().len(), 2048);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_size_limits() {
        assert!(check_size(MIN_MODEL_SIZE - 1).is_err());
        assert!(check_size(MIN_MODEL_SIZE).is_ok());
        assert!(check_size(MAX_MODEL_SIZE + 1).is_err());
    }
}
