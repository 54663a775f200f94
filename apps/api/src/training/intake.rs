//! Document Intake: turns an uploaded file into content the model can read.
//!
//! Images become base64 data URIs, PDFs become extracted text, and anything
//! else must already be UTF-8 text.

use async_trait::async_trait;
use base64::Engine as _;
use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

use crate::models::document::{resolve_mime, DocumentContent, DocumentKind};

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn kind(&self) -> DocumentKind {
        DocumentKind::detect(&self.file_name, self.content_type.as_deref())
    }
}

#[derive(Debug, Error)]
#[error("Could not read '{file_name}': {details}")]
pub struct IntakeError {
    pub file_name: String,
    pub details: String,
}

impl IntakeError {
    fn new(file: &UploadedFile, details: impl Into<String>) -> Self {
        Self {
            file_name: file.file_name.clone(),
            details: details.into(),
        }
    }
}

/// Carried in `AppState` as `Arc<dyn DocumentIntake>`.
#[async_trait]
pub trait DocumentIntake: Send + Sync {
    async fn process(&self, file: &UploadedFile) -> Result<DocumentContent, IntakeError>;
}

/// In-process intake with no external services.
pub struct LocalIntake;

#[async_trait]
impl DocumentIntake for LocalIntake {
    async fn process(&self, file: &UploadedFile) -> Result<DocumentContent, IntakeError> {
        if file.bytes.is_empty() {
            return Err(IntakeError::new(file, "the file is empty"));
        }

        let content = match file.kind() {
            DocumentKind::Image => DocumentContent::Image {
                data_uri: image_data_uri(file),
            },
            DocumentKind::Pdf => {
                let bytes = file.bytes.clone();
                let text = tokio::task::spawn_blocking(move || pdf_text(&bytes))
                    .await
                    .map_err(|e| IntakeError::new(file, format!("PDF worker failed: {e}")))?
                    .map_err(|details| IntakeError::new(file, details))?;
                DocumentContent::Text { text }
            }
            DocumentKind::Text | DocumentKind::Csv | DocumentKind::Document | DocumentKind::Other => {
                let text = std::str::from_utf8(&file.bytes)
                    .map_err(|_| IntakeError::new(file, "unsupported file type (not UTF-8 text)"))?;
                DocumentContent::Text {
                    text: text.to_string(),
                }
            }
        };

        if let DocumentContent::Text { text } = &content {
            if text.trim().is_empty() {
                return Err(IntakeError::new(file, "no readable text found"));
            }
        }

        debug!(
            "Intake converted '{}' ({:?}, {} bytes)",
            file.file_name,
            file.kind(),
            file.bytes.len()
        );
        Ok(content)
    }
}

fn image_data_uri(file: &UploadedFile) -> String {
    let mime = resolve_mime(&file.file_name, file.content_type.as_deref());
    let encoded = base64::engine::general_purpose::STANDARD.encode(&file.bytes);
    format!("data:{mime};base64,{encoded}")
}

fn pdf_text(bytes: &[u8]) -> Result<String, String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| format!("PDF text extraction failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, content_type: Option<&str>, bytes: &'static [u8]) -> UploadedFile {
        UploadedFile {
            file_name: name.to_string(),
            content_type: content_type.map(str::to_string),
            bytes: Bytes::from_static(bytes),
        }
    }

    #[tokio::test]
    async fn test_image_becomes_data_uri() {
        let file = upload("receipt.jpg", None, b"\xff\xd8\xff\xe0");
        let content = LocalIntake.process(&file).await.unwrap();
        assert_eq!(
            content,
            DocumentContent::Image {
                data_uri: "data:image/jpeg;base64,/9j/4A==".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_untyped_tiff_and_heic_become_images() {
        let tiff = upload("scan.tiff", None, b"II*\x00");
        match LocalIntake.process(&tiff).await.unwrap() {
            DocumentContent::Image { data_uri } => {
                assert!(data_uri.starts_with("data:image/tiff;base64,"))
            }
            other => panic!("expected image, got {other:?}"),
        }

        let heic = upload("photo.heic", Some("application/octet-stream"), b"\x00\x00\x00\x18ftypheic");
        assert_eq!(heic.kind(), DocumentKind::Image);
        let content = LocalIntake.process(&heic).await.unwrap();
        assert!(content.as_str().starts_with("data:image/hei"));
    }

    #[tokio::test]
    async fn test_text_passes_through() {
        let file = upload("rows.csv", Some("text/csv"), b"sku,qty\nA1,2\n");
        let content = LocalIntake.process(&file).await.unwrap();
        assert_eq!(content.as_str(), "sku,qty\nA1,2\n");
    }

    #[tokio::test]
    async fn test_binary_garbage_is_rejected_with_details() {
        let file = upload("blob.bin", None, b"\xff\xfe\x00\x81");
        let err = LocalIntake.process(&file).await.unwrap_err();
        assert_eq!(err.file_name, "blob.bin");
        assert!(err.details.contains("unsupported"));
    }

    #[tokio::test]
    async fn test_empty_and_blank_files_are_rejected() {
        assert!(LocalIntake.process(&upload("a.txt", None, b"")).await.is_err());
        let err = LocalIntake
            .process(&upload("a.txt", None, b"  \n "))
            .await
            .unwrap_err();
        assert_eq!(err.details, "no readable text found");
    }

    #[tokio::test]
    async fn test_corrupt_pdf_is_an_intake_error() {
        let file = upload("scan.pdf", Some("application/pdf"), b"not really a pdf");
        assert!(LocalIntake.process(&file).await.is_err());
    }
}
