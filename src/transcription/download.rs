use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Read};
use std::path::Path;

const MODEL_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// Smallest plausible model file; anything shorter is an error page
const MIN_MODEL_BYTES: u64 = 1024 * 1024;

/// Maps a model name (e.g. `tiny.en-q8_0`) to its ggml filename
fn model_filename(model_name: &str) -> String {
    format!("ggml-{model_name}.bin")
}

fn model_url(model_name: &str) -> String {
    format!("{MODEL_BASE_URL}/{}", model_filename(model_name))
}

/// Ensures the model file exists, downloading it on first run
///
/// Returns true if the model was downloaded, false if it already existed.
///
/// # Errors
/// Returns error if the download or the final rename fails
pub fn ensure_model_downloaded(model_name: &str, model_path: &Path) -> Result<bool> {
    if model_path.exists() {
        tracing::debug!(path = %model_path.display(), "model present");
        return Ok(false);
    }

    tracing::info!(
        model = model_name,
        path = %model_path.display(),
        "model not found, starting download"
    );

    download_model(model_name, model_path)?;

    Ok(true)
}

fn download_model(model_name: &str, model_path: &Path) -> Result<()> {
    let url = model_url(model_name);

    if let Some(parent) = model_path.parent() {
        fs::create_dir_all(parent).context("failed to create model directory")?;
    }

    tracing::info!(url = %url, "downloading model");

    // Stream into a temp file, then rename so a partial download is never loaded
    let temp_path = model_path.with_extension("part");

    let mut response = reqwest::blocking::get(&url)
        .with_context(|| format!("failed to download model from {url}"))?;

    if !response.status().is_success() {
        anyhow::bail!("download failed with status {}: {}", response.status(), url);
    }

    let written = stream_to_file(&mut response, &temp_path)?;

    if written < MIN_MODEL_BYTES {
        let _ = fs::remove_file(&temp_path);
        anyhow::bail!("downloaded model is only {written} bytes: {url}");
    }

    fs::rename(&temp_path, model_path).with_context(|| {
        format!(
            "failed to rename {} to {}",
            temp_path.display(),
            model_path.display()
        )
    })?;

    tracing::info!(
        path = %model_path.display(),
        size = written,
        "model downloaded successfully"
    );

    Ok(())
}

/// Copies `source` into a new file at `path`, removing the file if the copy fails
fn stream_to_file(source: &mut impl Read, path: &Path) -> Result<u64> {
    let mut file = fs::File::create(path)
        .with_context(|| format!("failed to create temp file at {}", path.display()))?;
    let copied = io::copy(source, &mut file);
    drop(file);

    copied.or_else(|e| {
        let _ = fs::remove_file(path);
        Err(e).context("failed to write model to temp file")
    })
}
