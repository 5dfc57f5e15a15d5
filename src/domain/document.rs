use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const UPLOAD_ENDPOINT: &str = "/api/upload";

pub const PDF_MIME: &str = "application/pdf";
pub const MAX_UPLOAD_BYTES: u64 = 150 * 1024 * 1024;

pub const UPLOAD_FAILED_MESSAGE: &str = "Une erreur est survenue lors du téléversement";
pub const NON_PDF_SKIPPED_MESSAGE: &str =
    "Certains fichiers ont été ignorés. Seuls les fichiers PDF sont acceptés.";
pub const NOTHING_TO_UPLOAD_MESSAGE: &str = "Aucun nouveau fichier à téléverser";

/// Body of a successful `/api/upload` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadOutcome {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub document_name: String,
    #[serde(default)]
    pub text_chunks_count: u64,
    #[serde(default)]
    pub images_count: u64,
}

/// A local file ready to be sent as the `file` part of a multipart upload.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub mime: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Success { outcome: UploadOutcome },
    Error { message: String },
}

impl UploadStatus {
    pub fn label(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "En attente",
            UploadStatus::Uploading => "En cours...",
            UploadStatus::Success { .. } => "Téléversé",
            UploadStatus::Error { .. } => "Erreur",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, UploadStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadTask {
    pub id: String,
    pub file: PdfFile,
    pub status: UploadStatus,
}

pub fn format_file_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    if bytes < 1024 * 1024 {
        return format!("{:.2} KB", bytes as f64 / 1024.0);
    }
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}
