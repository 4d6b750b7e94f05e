//! Intake: resolve user-supplied paths and URLs into queued images.
//!
//! Inputs may be image files, directories (their image files are taken in
//! file-name order, non-recursively), or `http(s)` URLs. Loading stops once
//! `max_items` images have been accepted; the rest are dropped without
//! error, matching the queue's silent truncation.

use crate::config::BatchConfig;
use crate::error::AnkiBatchError;
use crate::model::QueuedItem;
use crate::pipeline::encode::encode_image;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// File extensions picked up when an input is a directory.
const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "webp", "gif", "bmp"];

/// Where one image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Url(String),
    /// `explicit` is false for files discovered by listing a directory.
    File { path: PathBuf, explicit: bool },
}

impl Source {
    fn label(&self) -> String {
        match self {
            Source::Url(url) => url.clone(),
            Source::File { path, .. } => path.display().to_string(),
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load up to `config.max_items` images from `inputs`, in order.
///
/// Inputs are resolved one at a time, so nothing past the bound is touched:
/// a missing path or dead URL after the queue is full is never an error.
/// A named file that is not an image is a fatal error. A file found by
/// listing a directory that fails to decode is skipped with a warning.
pub async fn load_inputs(
    inputs: &[String],
    config: &BatchConfig,
) -> Result<Vec<QueuedItem>, AnkiBatchError> {
    let limit = config.max_items;
    let mut items = Vec::with_capacity(inputs.len().min(limit));

    for (index, input) in inputs.iter().enumerate() {
        if items.len() >= limit {
            debug!(
                "Queue bound reached: ignoring {} input(s) beyond {}",
                inputs.len() - index,
                limit
            );
            break;
        }

        for source in resolve_input(input)? {
            if items.len() >= limit {
                break;
            }
            if let Some(item) = load_source(&source, config).await? {
                items.push(item);
            }
        }
    }

    info!("Loaded {} image(s)", items.len());
    Ok(items)
}

/// Classify one input, expanding a directory into its image files.
fn resolve_input(input: &str) -> Result<Vec<Source>, AnkiBatchError> {
    if is_url(input) {
        return Ok(vec![Source::Url(input.to_string())]);
    }

    let path = PathBuf::from(input);
    if path.is_dir() {
        Ok(list_images(&path)?
            .into_iter()
            .map(|path| Source::File {
                path,
                explicit: false,
            })
            .collect())
    } else if path.exists() {
        Ok(vec![Source::File {
            path,
            explicit: true,
        }])
    } else {
        Err(AnkiBatchError::InputNotFound { path })
    }
}

/// Fetch and encode one image. `None` means a listed file was skipped.
async fn load_source(
    source: &Source,
    config: &BatchConfig,
) -> Result<Option<QueuedItem>, AnkiBatchError> {
    let bytes = match source {
        Source::Url(url) => download_url(url, config.download_timeout_secs).await?,
        Source::File { path, .. } => read_file(path).await?,
    };

    let label = source.label();
    let max_image_edge = config.max_image_edge;
    let encoded = tokio::task::spawn_blocking(move || encode_image(&bytes, max_image_edge))
        .await
        .map_err(|e| AnkiBatchError::Internal(format!("Encode task panicked: {e}")))?;

    match encoded {
        Ok(payload) => Ok(Some(QueuedItem::new(payload).with_source(label))),
        Err(e) => match source {
            Source::File {
                explicit: false, ..
            } => {
                warn!("Skipping {}: {}", label, e);
                Ok(None)
            }
            _ => {
                debug!("Rejecting {}: {}", label, e);
                Err(AnkiBatchError::NotAnImage {
                    source_name: label,
                })
            }
        },
    }
}

/// Image files directly inside `dir`, sorted by file name.
fn list_images(dir: &Path) -> Result<Vec<PathBuf>, AnkiBatchError> {
    let entries = std::fs::read_dir(dir).map_err(|e| io_error(dir, e))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_image_extension(p))
        .collect();
    files.sort();
    debug!("Found {} image(s) in {}", files.len(), dir.display());
    Ok(files)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

async fn read_file(path: &Path) -> Result<Vec<u8>, AnkiBatchError> {
    tokio::fs::read(path).await.map_err(|e| io_error(path, e))
}

fn io_error(path: &Path, e: std::io::Error) -> AnkiBatchError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => AnkiBatchError::PermissionDenied {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::NotFound => AnkiBatchError::InputNotFound {
            path: path.to_path_buf(),
        },
        _ => AnkiBatchError::Internal(format!("Failed to read '{}': {}", path.display(), e)),
    }
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, AnkiBatchError> {
    info!("Downloading image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AnkiBatchError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            AnkiBatchError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            AnkiBatchError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(AnkiBatchError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AnkiBatchError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    Ok(bytes.to_vec())
}
