use serde::{Deserialize, Serialize};

/// Coarse classification of an uploaded file, from its MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Image,
    Pdf,
    Text,
    Csv,
    Document,
    Other,
}

const OCTET_STREAM: &str = "application/octet-stream";

/// The declared content type unless it is missing or generic, else a guess
/// from the file name. Parameters such as `; charset=utf-8` are dropped.
pub fn resolve_mime(file_name: &str, content_type: Option<&str>) -> String {
    let declared = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty() && ct != OCTET_STREAM);
    declared.unwrap_or_else(|| {
        mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    })
}

impl DocumentKind {
    pub fn detect(file_name: &str, content_type: Option<&str>) -> Self {
        Self::from_mime(&resolve_mime(file_name, content_type))
    }

    pub fn from_mime(mime: &str) -> Self {
        match mime {
            m if m.starts_with("image/") => DocumentKind::Image,
            "application/pdf" => DocumentKind::Pdf,
            "text/csv" => DocumentKind::Csv,
            "application/json" => DocumentKind::Text,
            m if m.starts_with("text/") => DocumentKind::Text,
            "application/msword"
            | "application/rtf"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "application/vnd.oasis.opendocument.text" => DocumentKind::Document,
            _ => DocumentKind::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Image => "image",
            DocumentKind::Pdf => "pdf",
            DocumentKind::Text => "text",
            DocumentKind::Csv => "csv",
            DocumentKind::Document => "document",
            DocumentKind::Other => "other",
        }
    }
}

/// Normalized document content handed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentContent {
    /// Base64 data URI (`data:image/png;base64,...`).
    Image { data_uri: String },
    Text { text: String },
}

impl DocumentContent {
    /// The stored form: the data URI for images, the text otherwise.
    pub fn as_str(&self) -> &str {
        match self {
            DocumentContent::Image { data_uri } => data_uri,
            DocumentContent::Text { text } => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_prefers_mime_type() {
        assert_eq!(
            DocumentKind::detect("scan.bin", Some("image/png")),
            DocumentKind::Image
        );
        assert_eq!(
            DocumentKind::detect("invoice", Some("application/pdf")),
            DocumentKind::Pdf
        );
        assert_eq!(
            DocumentKind::detect("rows", Some("text/csv")),
            DocumentKind::Csv
        );
    }

    #[test]
    fn test_detect_falls_back_to_extension() {
        assert_eq!(
            DocumentKind::detect("Receipt.JPG", Some("application/octet-stream")),
            DocumentKind::Image
        );
        assert_eq!(DocumentKind::detect("notes.md", None), DocumentKind::Text);
        assert_eq!(
            DocumentKind::detect("contract.docx", None),
            DocumentKind::Document
        );
        assert_eq!(DocumentKind::detect("archive", None), DocumentKind::Other);
    }

    #[test]
    fn test_untyped_images_are_guessed_from_name() {
        for name in ["scan.tiff", "scan.tif", "photo.heic", "logo.svg"] {
            assert_eq!(DocumentKind::detect(name, None), DocumentKind::Image, "{name}");
        }
        assert_eq!(resolve_mime("scan.TIF", Some(OCTET_STREAM)), "image/tiff");
    }

    #[test]
    fn test_declared_type_parameters_are_dropped() {
        assert_eq!(
            resolve_mime("notes", Some("Text/Plain; charset=utf-8")),
            "text/plain"
        );
        assert_eq!(resolve_mime("mystery", None), OCTET_STREAM);
    }
}
