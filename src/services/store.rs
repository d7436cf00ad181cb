//! Image store service
//!
//! Design files live in an opaque blob store addressed by [`ImageRef`]. The
//! masking algorithms never touch storage directly; the service layer loads
//! decoded images through [`ImageStore`] and hands back PNG bytes to persist.

use crate::{
    config::MaskingConfig,
    error::{MaskError, Result},
    types::ImageRef,
};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        RwLock,
    },
    time::Duration,
};

/// Environment variable overriding the default store root
pub const STORE_DIR_ENV: &str = "DESIGN_MASK_STORE_DIR";

/// Length of the content hash embedded in store keys
const KEY_HASH_LEN: usize = 16;

/// Distinguishes temporary files of concurrent writes within this process
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Read/write access to raster images by reference
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Load and decode the image behind `reference`
    ///
    /// # Errors
    /// - [`MaskError::SourceUnavailable`] when the reference cannot be fetched or decoded
    async fn load(&self, reference: &ImageRef) -> Result<DynamicImage>;

    /// Persist PNG bytes and return the reference of the stored blob
    async fn save_png(&self, png: Vec<u8>, hint: &str) -> Result<ImageRef>;

    /// Public location of `reference`, if the store can expose one
    fn url_for(&self, reference: &ImageRef) -> Option<String>;
}

/// Content-addressed key `<hint>-<sha256 prefix>.png`
#[must_use]
pub fn content_key(hint: &str, bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = format!("{:x}", hasher.finalize());
    let prefix = digest.get(..KEY_HASH_LEN).unwrap_or(&digest);
    format!("{}-{}.png", sanitize_hint(hint), prefix)
}

fn sanitize_hint(hint: &str) -> String {
    let cleaned: String = hint
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('-');
    if trimmed.is_empty() {
        "image".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Decode image bytes, detecting the format from content and falling back to
/// the extension of `reference`
fn decode_image(bytes: &[u8], reference: &str) -> Result<DynamicImage> {
    match image::load_from_memory(bytes) {
        Ok(image) => Ok(image),
        Err(content_err) => {
            log::debug!(
                "Content-based decoding failed for {}: {}. Attempting extension-based detection.",
                reference,
                content_err
            );
            let format = ImageFormat::from_path(reference).map_err(|_| {
                MaskError::source_error_with_context(reference, "decode image", &content_err.to_string())
            })?;
            image::load_from_memory_with_format(bytes, format).map_err(|ext_err| {
                MaskError::source_error_with_context(
                    reference,
                    "decode image",
                    &format!(
                        "content detection: {}; {:?} decoder: {} ({} bytes)",
                        content_err,
                        format,
                        ext_err,
                        bytes.len()
                    ),
                )
            })
        },
    }
}

/// Filesystem-backed, content-addressed image store
///
/// Keys written by [`ImageStore::save_png`] resolve under the store root.
/// Any other reference is read as a filesystem path, and `http(s)://`
/// references are fetched over the network.
#[derive(Debug, Clone)]
pub struct FileSystemImageStore {
    root: PathBuf,
    client: Client,
}

impl FileSystemImageStore {
    /// Create a store rooted at `root`
    ///
    /// # Errors
    /// - Failed to create the HTTP client
    pub fn new<P: Into<PathBuf>>(root: P, fetch_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| MaskError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            root: root.into(),
            client,
        })
    }

    /// Create a store from configuration, resolving the default root when none is set
    ///
    /// # Errors
    /// - No store directory could be determined
    /// - Failed to create the HTTP client
    pub fn from_config(config: &MaskingConfig) -> Result<Self> {
        let root = match &config.store_dir {
            Some(dir) => dir.clone(),
            None => Self::default_root()?,
        };
        Self::new(root, config.fetch_timeout)
    }

    /// `$DESIGN_MASK_STORE_DIR`, else the platform data directory
    ///
    /// # Errors
    /// - Failed to determine the user data directory
    pub fn default_root() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var(STORE_DIR_ENV) {
            return Ok(PathBuf::from(dir));
        }

        Ok(dirs::data_dir()
            .ok_or_else(|| {
                MaskError::invalid_config(format!(
                    "Failed to determine data directory. Set {} environment variable.",
                    STORE_DIR_ENV
                ))
            })?
            .join("design-mask")
            .join("store"))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem location of a local reference
    fn resolve(&self, reference: &ImageRef) -> PathBuf {
        let raw = Path::new(reference.as_str());
        let keyed = self.root.join(raw);
        if raw.components().count() == 1 && keyed.is_file() {
            keyed
        } else {
            raw.to_path_buf()
        }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        log::debug!("Fetching remote image: {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            let cause = if e.is_timeout() {
                "request timed out".to_string()
            } else {
                e.to_string()
            };
            MaskError::source_error_with_context(url, "fetch image", &cause)
        })?;

        if !response.status().is_success() {
            return Err(MaskError::source_error_with_context(
                url,
                "fetch image",
                &format!("HTTP error {}", response.status()),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MaskError::source_error_with_context(url, "read response body", &e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ImageStore for FileSystemImageStore {
    async fn load(&self, reference: &ImageRef) -> Result<DynamicImage> {
        let bytes = if reference.is_remote() {
            self.fetch(reference.as_str()).await?
        } else {
            let path = self.resolve(reference);
            log::debug!("Reading image: {}", path.display());
            tokio::fs::read(&path).await.map_err(|e| {
                MaskError::source_error_with_context(reference.as_str(), "read image file", &e.to_string())
            })?
        };

        let name = reference.to_string();
        tokio::task::spawn_blocking(move || decode_image(&bytes, &name))
            .await
            .map_err(|e| MaskError::internal(format!("Image decoding task failed: {}", e)))?
    }

    async fn save_png(&self, png: Vec<u8>, hint: &str) -> Result<ImageRef> {
        let key = content_key(hint, &png);
        let path = self.root.join(&key);

        if tokio::fs::try_exists(&path).await? {
            log::debug!("Store already holds {}", key);
            return Ok(ImageRef::new(key));
        }

        tokio::fs::create_dir_all(&self.root).await?;

        // Write to a temporary name first so readers never see a partial file
        let tmp = self.root.join(format!(
            ".{}.{}-{}.tmp",
            key,
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&tmp, &png).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            // A concurrent writer stored the same content first
            let _ = tokio::fs::remove_file(&tmp).await;
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Err(e.into());
            }
            log::debug!("Store already holds {} (concurrent write)", key);
            return Ok(ImageRef::new(key));
        }

        log::debug!("Stored {} ({} bytes) at {}", key, png.len(), path.display());
        Ok(ImageRef::new(key))
    }

    fn url_for(&self, reference: &ImageRef) -> Option<String> {
        if reference.is_remote() {
            return Some(reference.to_string());
        }
        let path = self.resolve(reference);
        let absolute = if path.is_absolute() {
            path
        } else {
            std::env::current_dir().ok()?.join(path)
        };
        absolute.is_file().then(|| format!("file://{}", absolute.display()))
    }
}

/// In-process image store
#[derive(Debug, Default)]
pub struct MemoryImageStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryImageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store encoded image bytes under an explicit key
    pub fn insert_bytes<K: Into<String>>(&self, key: K, bytes: Vec<u8>) -> Result<ImageRef> {
        let key = key.into();
        self.blobs
            .write()
            .map_err(|_| MaskError::internal("memory store lock poisoned"))?
            .insert(key.clone(), bytes);
        Ok(ImageRef::new(key))
    }

    /// Encode `image` as PNG and store it under `key`
    pub fn insert_image<K: Into<String>>(&self, key: K, image: &DynamicImage) -> Result<ImageRef> {
        let png = crate::services::png::encode_png(&image.to_rgba8(), Default::default())?;
        self.insert_bytes(key, png)
    }

    /// Raw bytes stored under `reference`
    #[must_use]
    pub fn get_bytes(&self, reference: &ImageRef) -> Option<Vec<u8>> {
        self.blobs.read().ok()?.get(reference.as_str()).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn load(&self, reference: &ImageRef) -> Result<DynamicImage> {
        let bytes = self.get_bytes(reference).ok_or_else(|| {
            MaskError::source_error_with_context(reference.as_str(), "load image", "no such key in memory store")
        })?;
        decode_image(&bytes, reference.as_str())
    }

    async fn save_png(&self, png: Vec<u8>, hint: &str) -> Result<ImageRef> {
        let key = content_key(hint, &png);
        self.insert_bytes(key, png)
    }

    fn url_for(&self, reference: &ImageRef) -> Option<String> {
        self.get_bytes(reference)
            .map(|_| format!("memory://{}", reference.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn sample() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 2, Rgb([200, 10, 10])))
    }

    #[test]
    fn test_content_key() {
        let a = content_key("Mask Image!", b"abc");
        assert!(a.starts_with("mask-image-"));
        assert!(a.ends_with(".png"));
        assert_eq!(a.len(), "mask-image-".len() + KEY_HASH_LEN + ".png".len());
        assert_eq!(a, content_key("Mask Image!", b"abc"));
        assert_ne!(a, content_key("Mask Image!", b"abd"));
        assert!(content_key("", b"abc").starts_with("image-"));
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryImageStore::new();
        let reference = store.insert_image("photo", &sample()).unwrap();

        let loaded = store.load(&reference).await.unwrap();
        assert_eq!(loaded.to_rgb8(), sample().to_rgb8());
        assert_eq!(store.url_for(&reference).as_deref(), Some("memory://photo"));
    }

    #[tokio::test]
    async fn test_memory_store_missing_key() {
        let store = MemoryImageStore::new();
        let err = store.load(&ImageRef::from("nope")).await.unwrap_err();
        assert!(matches!(err, MaskError::SourceUnavailable(_)));
        assert!(store.url_for(&ImageRef::from("nope")).is_none());
    }

    #[tokio::test]
    async fn test_undecodable_bytes_are_source_unavailable() {
        let store = MemoryImageStore::new();
        let reference = store.insert_bytes("junk.png", b"not an image".to_vec()).unwrap();
        let err = store.load(&reference).await.unwrap_err();
        assert!(matches!(err, MaskError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_memory_store_is_content_addressed() {
        let store = MemoryImageStore::new();
        let a = store.save_png(b"same".to_vec(), "mask").await.unwrap();
        let b = store.save_png(b"same".to_vec(), "mask").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }

    /// Serve one HTTP connection, answering with `response` or stalling when `None`
    async fn serve_once(response: Option<&'static [u8]>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut request = [0u8; 1024];
                let _ = socket.read(&mut request).await;
                match response {
                    Some(bytes) => {
                        let _ = socket.write_all(bytes).await;
                        let _ = socket.shutdown().await;
                    },
                    None => tokio::time::sleep(Duration::from_secs(10)).await,
                }
            }
        });
        format!("http://{addr}/shirt.png")
    }

    #[tokio::test]
    async fn test_http_error_status_is_source_unavailable() {
        let url = serve_once(Some(
            b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        ))
        .await;
        let temp = TempDir::new().unwrap();
        let store = FileSystemImageStore::new(temp.path(), Duration::from_secs(5)).unwrap();

        let err = store.load(&ImageRef::new(url)).await.unwrap_err();
        assert!(matches!(err, MaskError::SourceUnavailable(_)));
        assert!(err.to_string().contains("404"), "{err}");
    }

    #[tokio::test]
    async fn test_http_timeout_is_source_unavailable() {
        let url = serve_once(None).await;
        let temp = TempDir::new().unwrap();
        let store = FileSystemImageStore::new(temp.path(), Duration::from_millis(200)).unwrap();

        let err = store.load(&ImageRef::new(url)).await.unwrap_err();
        assert!(matches!(err, MaskError::SourceUnavailable(_)));
        assert!(err.to_string().contains("timed out"), "{err}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_of_same_content() {
        let temp = TempDir::new().unwrap();
        let store = FileSystemImageStore::new(temp.path(), Duration::from_secs(5)).unwrap();
        let png = crate::services::png::encode_png(&sample().to_rgba8(), Default::default()).unwrap();

        let saves = (0..16).map(|_| {
            let store = store.clone();
            let png = png.clone();
            tokio::spawn(async move { store.save_png(png, "tee-mask").await })
        });
        let keys: Vec<ImageRef> = join_all(saves)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        assert!(keys.windows(2).all(|pair| pair[0] == pair[1]));
        let entries: Vec<_> = std::fs::read_dir(temp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "temporary files left behind");
    }
}
