use crate::config::{FileConfig, YapperPaths};
use crate::error::{CoreError, CoreResult};
use anyhow::Context;
use blake3::Hasher;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Image gate for attachment names and stored refs.
pub fn is_image_ref(name: &str) -> bool {
    extension_of(name)
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// A stored ref is `<uuid>.<image extension>` and nothing else.
fn is_valid_stored_ref(stored_ref: &str) -> bool {
    match stored_ref.split_once('.') {
        Some((stem, ext)) => {
            Uuid::parse_str(stem).is_ok() && IMAGE_EXTENSIONS.contains(&ext)
        }
        None => false,
    }
}

/// Local-disk adapter for post attachments. Files are named by UUID under
/// the uploads directory; the core only ever sees the returned ref.
#[derive(Clone)]
pub struct AttachmentService {
    paths: YapperPaths,
    config: FileConfig,
}

#[derive(Debug, Clone)]
pub struct SaveUploadInput {
    pub original_name: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredAttachment {
    pub stored_ref: String,
    pub mime: String,
    pub size_bytes: u64,
    pub checksum: String,
}

#[derive(Debug, Clone)]
pub struct AttachmentDownload {
    pub absolute_path: PathBuf,
    pub mime: String,
}

impl AttachmentService {
    pub fn new(paths: YapperPaths, config: FileConfig) -> Self {
        Self { paths, config }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.config.max_upload_bytes
    }

    pub async fn save_upload(&self, input: SaveUploadInput) -> CoreResult<StoredAttachment> {
        if input.data.is_empty() {
            return Err(CoreError::validation("Uploaded file is empty."));
        }
        let size_bytes = input.data.len() as u64;
        if size_bytes > self.config.max_upload_bytes {
            return Err(CoreError::validation(format!(
                "Uploaded file exceeds {} bytes.",
                self.config.max_upload_bytes
            )));
        }
        let name = input.original_name.as_deref().unwrap_or_default();
        if !is_image_ref(name) {
            return Err(CoreError::validation(
                "Only jpg, jpeg, png, gif and webp images are accepted.",
            ));
        }
        let sniffed = infer::get(&input.data)
            .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
            .filter(|kind| IMAGE_EXTENSIONS.contains(&kind.extension()))
            .ok_or_else(|| CoreError::validation("Uploaded file is not a supported image."))?;

        let stored_ref = format!("{}.{}", Uuid::new_v4(), sniffed.extension());
        let absolute_path = self.paths.uploads_dir.join(&stored_ref);
        fs::create_dir_all(&self.paths.uploads_dir)
            .await
            .with_context(|| {
                format!(
                    "failed to create upload directory {}",
                    self.paths.uploads_dir.display()
                )
            })?;
        fs::write(&absolute_path, &input.data)
            .await
            .with_context(|| {
                format!("failed to write upload to {}", absolute_path.display())
            })?;

        let mut hasher = Hasher::new();
        hasher.update(&input.data);
        let checksum = format!("blake3:{}", hasher.finalize().to_hex());
        tracing::info!(stored_ref = %stored_ref, size_bytes, "attachment stored");

        Ok(StoredAttachment {
            stored_ref,
            mime: sniffed.mime_type().to_string(),
            size_bytes,
            checksum,
        })
    }

    pub async fn open(&self, stored_ref: &str) -> CoreResult<AttachmentDownload> {
        if !is_valid_stored_ref(stored_ref) {
            return Err(CoreError::not_found("File not found."));
        }
        let absolute_path = self.paths.uploads_dir.join(stored_ref);
        if fs::metadata(&absolute_path).await.is_err() {
            tracing::warn!(path = %absolute_path.display(), "attachment missing on disk");
            return Err(CoreError::not_found("File not found."));
        }
        let mime = infer::get_from_path(&absolute_path)
            .ok()
            .flatten()
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        Ok(AttachmentDownload {
            absolute_path,
            mime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::runtime::Runtime;

    const PNG_HEADER: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52,
    ];

    #[test]
    fn image_gate_checks_extension() {
        assert!(is_image_ref("cat.PNG"));
        assert!(is_image_ref("a.b.jpeg"));
        assert!(!is_image_ref("notes.txt"));
        assert!(!is_image_ref("png"));
    }

    #[test]
    fn save_and_open_image() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let temp = tempdir().expect("tempdir");
            let paths = YapperPaths::from_base_dir(temp.path()).expect("paths");
            let service = AttachmentService::new(paths, FileConfig::default());

            let stored = service
                .save_upload(SaveUploadInput {
                    original_name: Some("cat.png".into()),
                    data: PNG_HEADER.to_vec(),
                })
                .await
                .expect("save");
            assert!(stored.stored_ref.ends_with(".png"));
            assert_eq!(stored.mime, "image/png");
            assert!(stored.checksum.starts_with("blake3:"));

            let download = service.open(&stored.stored_ref).await.expect("open");
            assert!(download.absolute_path.exists());
            assert!(matches!(
                service.open("../../etc/passwd").await,
                Err(CoreError::NotFound(_))
            ));
        });
    }

    #[test]
    fn rejects_non_images() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let temp = tempdir().expect("tempdir");
            let paths = YapperPaths::from_base_dir(temp.path()).expect("paths");
            let service = AttachmentService::new(paths, FileConfig::default());

            let disguised = service
                .save_upload(SaveUploadInput {
                    original_name: Some("cat.png".into()),
                    data: b"plain text pretending".to_vec(),
                })
                .await;
            assert!(matches!(disguised, Err(CoreError::Validation(_))));

            let wrong_ext = service
                .save_upload(SaveUploadInput {
                    original_name: Some("cat.txt".into()),
                    data: PNG_HEADER.to_vec(),
                })
                .await;
            assert!(matches!(wrong_ext, Err(CoreError::Validation(_))));
        });
    }
}
