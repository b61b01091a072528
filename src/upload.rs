//! Upload intake and the media directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::http::StatusCode;
use bytes::{Bytes, BytesMut};
use rand::Rng;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::error::UploadError;

/// Largest accepted image, in bytes.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Multipart field carrying the image.
pub const IMAGE_FIELD: &str = "image";

/// URL prefix under which stored media is served.
pub const MEDIA_PREFIX: &str = "/media";

const NAME_ATTEMPTS: usize = 8;

/// An image read from the request and validated, not yet on disk.
#[derive(Debug, Clone)]
pub struct ImageCandidate {
    pub original_name: Option<String>,
    pub content_type: String,
    pub data: Bytes,
}

impl ImageCandidate {
    /// Extension for the stored file, taken from the original name when it
    /// has a sane one, otherwise from the MIME subtype.
    pub fn extension(&self) -> Option<String> {
        let from_name = self
            .original_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .filter(|ext| is_safe_extension(ext))
            .map(str::to_string);

        from_name.or_else(|| {
            let subtype = self.content_type.strip_prefix("image/")?;
            let subtype = subtype.split(';').next()?.trim();
            match subtype {
                "jpeg" => Some("jpg".to_string()),
                other if is_safe_extension(other) => Some(other.to_string()),
                _ => None,
            }
        })
    }
}

fn is_safe_extension(ext: &str) -> bool {
    !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

fn is_image(content_type: &str) -> bool {
    content_type
        .trim()
        .to_ascii_lowercase()
        .starts_with("image/")
}

fn malformed(err: MultipartError) -> UploadError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadError::TooLarge {
            limit: MAX_IMAGE_BYTES,
        }
    } else {
        UploadError::Malformed(err.body_text())
    }
}

/// Read the single `image` field from a multipart body.
///
/// The MIME type is checked before the body is read and the size while it is
/// streamed in, so nothing is written to disk for a rejected upload.
pub async fn read_image_field(multipart: &mut Multipart) -> Result<ImageCandidate, UploadError> {
    let mut image = None;

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        if name != IMAGE_FIELD {
            if field.file_name().is_some() {
                return Err(UploadError::UnexpectedField(name));
            }
            debug!("Ignoring form field `{}`", name);
            continue;
        }
        if image.is_some() {
            return Err(UploadError::MultipleFiles);
        }
        image = Some(read_image(field).await?);
    }

    image.ok_or(UploadError::MissingFile)
}

async fn read_image(mut field: Field<'_>) -> Result<ImageCandidate, UploadError> {
    let content_type = field.content_type().unwrap_or_default().to_string();
    if !is_image(&content_type) {
        return Err(UploadError::NotAnImage { content_type });
    }
    let original_name = field.file_name().map(str::to_string);

    let mut data = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(malformed)? {
        if data.len() + chunk.len() > MAX_IMAGE_BYTES {
            return Err(UploadError::TooLarge {
                limit: MAX_IMAGE_BYTES,
            });
        }
        data.extend_from_slice(&chunk);
    }
    if data.is_empty() {
        return Err(UploadError::MissingFile);
    }

    Ok(ImageCandidate {
        original_name,
        content_type,
        data: data.freeze(),
    })
}

/// `<prefix>-<unix millis>-<random>[.<ext>]`
pub fn unique_name(prefix: &str, extension: Option<&str>) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    match extension {
        Some(ext) => format!("{prefix}-{millis}-{suffix}.{ext}"),
        None => format!("{prefix}-{millis}-{suffix}"),
    }
}

pub fn media_url(filename: &str) -> String {
    format!("{MEDIA_PREFIX}/{filename}")
}

/// A file written to the media directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub filename: String,
    pub path: PathBuf,
}

impl StoredFile {
    pub fn url(&self) -> String {
        media_url(&self.filename)
    }
}

/// An image stored by intake.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file: StoredFile,
    pub content_type: String,
    pub size: usize,
}

/// Flat directory holding uploaded images and generated audio.
#[derive(Debug, Clone)]
pub struct MediaStore {
    dir: PathBuf,
}

impl MediaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    pub async fn dir_exists(&self) -> bool {
        tokio::fs::try_exists(&self.dir).await.unwrap_or(false)
    }

    pub async fn save_image(&self, image: &ImageCandidate) -> std::io::Result<UploadedImage> {
        let extension = image.extension();
        let file = self.write_new("image", extension.as_deref(), &image.data).await?;
        info!(
            "Stored upload {} ({} bytes, {})",
            file.filename,
            image.data.len(),
            image.content_type
        );
        Ok(UploadedImage {
            file,
            content_type: image.content_type.clone(),
            size: image.data.len(),
        })
    }

    pub async fn save_audio(&self, audio: &[u8]) -> std::io::Result<StoredFile> {
        let file = self.write_new("audio", Some("wav"), audio).await?;
        info!("Audio saved to {}", file.path.display());
        Ok(file)
    }

    /// Write `data` under a fresh name, never overwriting an existing file.
    async fn write_new(
        &self,
        prefix: &str,
        extension: Option<&str>,
        data: &[u8],
    ) -> std::io::Result<StoredFile> {
        self.ensure_dir().await?;

        for _ in 0..NAME_ATTEMPTS {
            let filename = unique_name(prefix, extension);
            let path = self.dir.join(&filename);
            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err),
            };

            let written = async {
                file.write_all(data).await?;
                file.flush().await
            }
            .await;

            return match written {
                Ok(()) => Ok(StoredFile { filename, path }),
                Err(err) => {
                    if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                        error!("Failed to remove partial file: {}", remove_err);
                    }
                    Err(err)
                }
            };
        }

        Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            "could not find a free media filename",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn candidate(name: Option<&str>, content_type: &str) -> ImageCandidate {
        ImageCandidate {
            original_name: name.map(str::to_string),
            content_type: content_type.to_string(),
            data: Bytes::from_static(b"\x89PNG fake"),
        }
    }

    #[test]
    fn extension_prefers_original_name() {
        assert_eq!(
            candidate(Some("holiday.PNG"), "image/png").extension().as_deref(),
            Some("PNG")
        );
        assert_eq!(
            candidate(Some("noext"), "image/jpeg").extension().as_deref(),
            Some("jpg")
        );
        assert_eq!(
            candidate(Some("weird.p/ng"), "image/webp").extension().as_deref(),
            Some("webp")
        );
        assert_eq!(candidate(None, "image/svg+xml").extension(), None);
    }

    #[test]
    fn image_mime_check() {
        assert!(is_image("image/png"));
        assert!(is_image("IMAGE/JPEG"));
        assert!(!is_image("application/pdf"));
        assert!(!is_image(""));
    }

    #[test]
    fn unique_names_have_expected_shape() {
        let name = unique_name("image", Some("png"));
        let parts: Vec<&str> = name.trim_end_matches(".png").split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "image");
        assert!(parts[1].parse::<i64>().is_ok());
        assert!(parts[2].parse::<u32>().unwrap() < 1_000_000_000);
        assert_eq!(media_url(&name), format!("/media/{name}"));
    }

    #[tokio::test]
    async fn concurrent_saves_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MediaStore::new(dir.path().join("uploads")));
        let image = candidate(Some("cat.png"), "image/png");

        let mut handles = Vec::new();
        for _ in 0..64 {
            let store = Arc::clone(&store);
            let image = image.clone();
            handles.push(tokio::spawn(async move {
                store.save_image(&image).await.unwrap().file.filename
            }));
        }

        let mut names = HashSet::new();
        for handle in handles {
            names.insert(handle.await.unwrap());
        }
        assert_eq!(names.len(), 64);
        assert_eq!(std::fs::read_dir(store.dir()).unwrap().count(), 64);
    }

    #[tokio::test]
    async fn audio_is_written_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());

        let file = store.save_audio(b"RIFF1234WAVE").await.unwrap();
        assert!(file.filename.starts_with("audio-"));
        assert!(file.filename.ends_with(".wav"));
        assert_eq!(std::fs::read(&file.path).unwrap(), b"RIFF1234WAVE");
        assert!(store.dir_exists().await);
    }
}
