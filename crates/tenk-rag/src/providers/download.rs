//! Hugging Face hub downloads for ONNX model files

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Local paths of a cached ONNX model and its tokenizer
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub model: PathBuf,
    pub tokenizer: PathBuf,
}

/// Make sure `onnx/model.onnx` and `tokenizer.json` from `hub_repo` exist in `cache_dir`
///
/// `err` wraps failures into the caller's error variant.
pub async fn ensure_model_files(
    hub_repo: &str,
    cache_dir: &Path,
    err: fn(String) -> Error,
) -> Result<ModelFiles> {
    std::fs::create_dir_all(cache_dir)
        .map_err(|e| Error::Config(format!("Failed to create cache directory: {}", e)))?;

    let files = ModelFiles {
        model: cache_dir.join("model.onnx"),
        tokenizer: cache_dir.join("tokenizer.json"),
    };

    if !files.model.exists() {
        let url = format!("https://huggingface.co/{}/resolve/main/onnx/model.onnx", hub_repo);
        download_file(&url, &files.model, err).await?;
    }
    if !files.tokenizer.exists() {
        let url = format!("https://huggingface.co/{}/resolve/main/tokenizer.json", hub_repo);
        download_file(&url, &files.tokenizer, err).await?;
    }

    Ok(files)
}

async fn download_file(url: &str, path: &Path, err: fn(String) -> Error) -> Result<()> {
    tracing::info!("Downloading {}", url);

    let response = reqwest::get(url)
        .await
        .map_err(|e| err(format!("Failed to download {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(err(format!(
            "Download of {} failed: HTTP {}",
            url,
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| err(format!("Failed to read bytes from {}: {}", url, e)))?;

    // An interrupted download must not look cached
    let partial = path.with_extension("part");
    std::fs::write(&partial, &bytes)
        .map_err(|e| err(format!("Failed to save {}: {}", path.display(), e)))?;
    std::fs::rename(&partial, path)
        .map_err(|e| err(format!("Failed to save {}: {}", path.display(), e)))?;

    tracing::info!("Saved {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}
