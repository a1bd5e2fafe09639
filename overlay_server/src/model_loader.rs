//! Locating, downloading and loading model files.
//!
use std::{
    fs::File,
    future::Future,
    io::Cursor,
    path::{Path, PathBuf},
};

use anyhow::Result;
use reqwest::Client;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::readiness::ModelSlot;

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model file {} not found and no download URL configured", .path.display())]
    Missing { path: PathBuf },
    #[error("failed to download model from {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("model file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to load ONNX model {}: {reason}", .path.display())]
    Onnx { path: PathBuf, reason: String },
    #[error("unexpected model outputs: {0}")]
    UnexpectedOutputs(String),
}

/// Default directory for downloaded models.
pub fn default_model_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("overlay_server")
        .join("models")
}

/// Where a model file lives and where to fetch it from if it is not there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSource {
    pub path: PathBuf,
    pub url: Option<String>,
}

impl ModelSource {
    pub fn new(path: impl Into<PathBuf>, url: Option<String>) -> Self {
        Self {
            path: path.into(),
            url,
        }
    }

    /// Relative paths are looked up in `model_dir`.
    pub fn in_dir(mut self, model_dir: &Path) -> Self {
        if self.path.is_relative() && !self.path.exists() {
            self.path = model_dir.join(&self.path);
        }
        self
    }

    /// Path of an existing model file, downloading it first if needed.
    pub async fn resolve(&self, client: &Client) -> Result<PathBuf, ModelLoadError> {
        if self.path.is_file() {
            log::debug!("Using model file {}", self.path.display());
            return Ok(self.path.clone());
        }

        let Some(url) = &self.url else {
            return Err(ModelLoadError::Missing {
                path: self.path.clone(),
            });
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        log::info!("Downloading {url} to {}", self.path.display());
        download_file(client, url, &self.path).await?;

        Ok(self.path.clone())
    }
}

/// Download a file from a URL to a given filepath.
///
/// The file is written next to the target and renamed at the end so that an
/// interrupted download never leaves a truncated model behind.
pub async fn download_file(
    client: &Client,
    url: &str,
    filepath: impl AsRef<Path>,
) -> Result<(), ModelLoadError> {
    let download_err = |source| ModelLoadError::Download {
        url: url.to_owned(),
        source,
    };

    let resp = client
        .get(url)
        .send()
        .await
        .and_then(|resp| resp.error_for_status())
        .map_err(download_err)?;
    let mut content = Cursor::new(resp.bytes().await.map_err(download_err)?);

    let filepath = filepath.as_ref();
    let partial = filepath.with_extension("part");
    let mut file = File::create(&partial)?;
    std::io::copy(&mut content, &mut file)?;
    std::fs::rename(&partial, filepath)?;

    Ok(())
}

/// Run `load` once and publish the model into `slot`.
///
/// On failure the slot is dropped unfilled; the readiness gate then never
/// opens. The error is returned through the task handle.
pub fn spawn_model_loader<M, F>(load: F, slot: ModelSlot<M>) -> JoinHandle<Result<()>>
where
    M: Send + Sync + 'static,
    F: Future<Output = Result<M>> + Send + 'static,
{
    tokio::spawn(async move {
        let model = load.await?;
        slot.fill(model);
        log::info!("Model loaded");
        Ok(())
    })
}
