use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::domain::document::{PdfFile, MAX_UPLOAD_BYTES, PDF_MIME};
use crate::domain::error::Result;

const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// Why a candidate file was not queued for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRejection {
    NotPdf,
    TooLarge { size: u64 },
    Unreadable(String),
}

/// Checks that `path` is a readable PDF within the upload size limit.
pub fn inspect_pdf(path: &Path) -> std::result::Result<PdfFile, FileRejection> {
    let metadata = fs::metadata(path).map_err(|e| FileRejection::Unreadable(e.to_string()))?;
    if !metadata.is_file() {
        return Err(FileRejection::Unreadable(format!(
            "{} is not a regular file",
            path.display()
        )));
    }

    let has_pdf_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if !has_pdf_extension || !has_pdf_signature(path)? {
        return Err(FileRejection::NotPdf);
    }

    let size = metadata.len();
    if size > MAX_UPLOAD_BYTES {
        return Err(FileRejection::TooLarge { size });
    }

    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "document.pdf".to_string());

    Ok(PdfFile {
        name,
        path: path.to_path_buf(),
        size,
        mime: PDF_MIME.to_string(),
    })
}

fn has_pdf_signature(path: &Path) -> std::result::Result<bool, FileRejection> {
    let mut file = fs::File::open(path).map_err(|e| FileRejection::Unreadable(e.to_string()))?;
    let mut header = [0u8; 5];
    match file.read_exact(&mut header) {
        Ok(()) => Ok(header == PDF_SIGNATURE),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(FileRejection::Unreadable(e.to_string())),
    }
}

/// Writes a diagnosis report, creating parent directories as needed.
pub fn save_report(path: &Path, content: &str) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, content)?;
    Ok(path.to_path_buf())
}

fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.as_os_str().is_empty() && !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}
