use std::path::PathBuf;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::document::{
    UploadOutcome, UploadStatus, UploadTask, NON_PDF_SKIPPED_MESSAGE, NOTHING_TO_UPLOAD_MESSAGE,
    UPLOAD_FAILED_MESSAGE,
};
use crate::domain::error::AppError;
use crate::infrastructure::api_client::TechniciaApi;
use crate::infrastructure::storage::{inspect_pdf, FileRejection};

/// Ordered list of files waiting for, or done with, `/api/upload`.
#[derive(Debug, Default)]
pub struct UploadQueue {
    tasks: Vec<UploadTask>,
    notice: Option<String>,
    processing_details: Option<UploadOutcome>,
    is_uploading: bool,
}

/// What one `upload_all` pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub uploaded: usize,
    pub failed: usize,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> &[UploadTask] {
        &self.tasks
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn processing_details(&self) -> Option<&UploadOutcome> {
        self.processing_details.as_ref()
    }

    pub fn is_uploading(&self) -> bool {
        self.is_uploading
    }

    /// Queues every acceptable PDF among `paths` and returns how many were added.
    pub fn add_files<I>(&mut self, paths: I) -> usize
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut added = 0;
        let mut skipped = false;
        for path in paths {
            match inspect_pdf(&path) {
                Ok(file) => {
                    self.tasks.push(UploadTask {
                        id: Uuid::new_v4().to_string(),
                        file,
                        status: UploadStatus::Pending,
                    });
                    added += 1;
                }
                Err(rejection) => {
                    warn!(path = %path.display(), reason = ?rejection, "Skipping file");
                    if matches!(rejection, FileRejection::Unreadable(_)) {
                        self.notice = Some(format!("Impossible de lire {}", path.display()));
                    } else {
                        skipped = true;
                    }
                }
            }
        }
        if skipped {
            self.notice = Some(NON_PDF_SKIPPED_MESSAGE.to_string());
        }
        added
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != id);
        self.tasks.len() != before
    }

    /// Puts a failed task back in the pending state.
    pub fn retry(&mut self, id: &str) -> bool {
        match self.tasks.iter_mut().find(|task| task.id == id) {
            Some(task) if matches!(task.status, UploadStatus::Error { .. }) => {
                task.status = UploadStatus::Pending;
                true
            }
            _ => false,
        }
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    /// Uploads pending tasks one at a time, in queue order.
    pub async fn upload_all(&mut self, api: &dyn TechniciaApi) -> BatchSummary {
        let mut summary = BatchSummary::default();
        if !self.tasks.iter().any(|task| task.status.is_pending()) {
            self.notice = Some(NOTHING_TO_UPLOAD_MESSAGE.to_string());
            return summary;
        }

        self.is_uploading = true;
        self.notice = None;

        for index in 0..self.tasks.len() {
            if !self.tasks[index].status.is_pending() {
                continue;
            }
            self.tasks[index].status = UploadStatus::Uploading;
            let file = self.tasks[index].file.clone();

            match api.upload_document(&file).await {
                Ok(outcome) => {
                    info!(
                        document = %outcome.document_name,
                        chunks = outcome.text_chunks_count,
                        images = outcome.images_count,
                        "Document processed"
                    );
                    self.processing_details = Some(outcome.clone());
                    self.tasks[index].status = UploadStatus::Success { outcome };
                    summary.uploaded += 1;
                }
                Err(e) => {
                    error!(error = %e, file = %file.name, "Upload failed");
                    let message = failure_message(&e);
                    // The banner shows the most recent failure.
                    self.notice = Some(message.clone());
                    self.tasks[index].status = UploadStatus::Error { message };
                    summary.failed += 1;
                }
            }
        }

        self.is_uploading = false;
        summary
    }
}

fn failure_message(error: &AppError) -> String {
    match error {
        AppError::ApiError { message, .. } | AppError::ValidationError(message) => message.clone(),
        _ => UPLOAD_FAILED_MESSAGE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::test_support::FakeApi;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_pdf(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"%PDF-1.7\n%fake manual\n").unwrap();
        path
    }

    #[test]
    fn test_add_files_skips_non_pdf() {
        let dir = TempDir::new().unwrap();
        let pdf = write_pdf(dir.path(), "manuel.pdf");
        let txt = dir.path().join("notes.txt");
        fs::write(&txt, "notes").unwrap();

        let mut queue = UploadQueue::new();
        assert_eq!(queue.add_files(vec![pdf, txt]), 1);
        assert_eq!(queue.tasks().len(), 1);
        assert!(queue.tasks()[0].status.is_pending());
        assert_eq!(queue.notice(), Some(NON_PDF_SKIPPED_MESSAGE));
    }

    #[tokio::test]
    async fn test_upload_all_with_nothing_pending() {
        let api = FakeApi::with_steps(1);
        let mut queue = UploadQueue::new();
        let summary = queue.upload_all(&api).await;
        assert_eq!(summary, BatchSummary::default());
        assert_eq!(queue.notice(), Some(NOTHING_TO_UPLOAD_MESSAGE));
        assert!(api.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_batch() {
        let dir = TempDir::new().unwrap();
        let paths = vec![
            write_pdf(dir.path(), "a.pdf"),
            write_pdf(dir.path(), "b.pdf"),
            write_pdf(dir.path(), "c.pdf"),
        ];
        let api = FakeApi::with_steps(1);
        api.fail_file("b.pdf");

        let mut queue = UploadQueue::new();
        queue.add_files(paths);
        let summary = queue.upload_all(&api).await;

        assert_eq!(summary, BatchSummary { uploaded: 2, failed: 1 });
        assert_eq!(
            *api.uploads.lock().unwrap(),
            vec!["a.pdf".to_string(), "b.pdf".to_string(), "c.pdf".to_string()]
        );
        assert_eq!(
            queue.tasks()[1].status,
            UploadStatus::Error {
                message: "b.pdf est illisible".to_string()
            }
        );
        assert_eq!(queue.processing_details().unwrap().document_name, "c.pdf");
        assert_eq!(queue.notice(), Some("b.pdf est illisible"));
        assert!(!queue.is_uploading());
    }

    #[tokio::test]
    async fn test_retry_reuploads_only_failed_task() {
        let dir = TempDir::new().unwrap();
        let api = FakeApi::with_steps(1);
        let mut queue = UploadQueue::new();
        queue.add_files(vec![write_pdf(dir.path(), "a.pdf"), write_pdf(dir.path(), "b.pdf")]);

        api.fail_next_call();
        queue.upload_all(&api).await;
        let failed_id = queue.tasks()[0].id.clone();
        assert!(!queue.retry(&queue.tasks()[1].id.clone()));
        assert!(queue.retry(&failed_id));

        let summary = queue.upload_all(&api).await;
        assert_eq!(summary, BatchSummary { uploaded: 1, failed: 0 });
        assert_eq!(api.uploads.lock().unwrap().len(), 3);
        assert!(queue
            .tasks()
            .iter()
            .all(|task| matches!(task.status, UploadStatus::Success { .. })));
    }

    #[test]
    fn test_remove_task() {
        let dir = TempDir::new().unwrap();
        let mut queue = UploadQueue::new();
        queue.add_files(vec![write_pdf(dir.path(), "a.pdf")]);
        let id = queue.tasks()[0].id.clone();
        assert!(queue.remove(&id));
        assert!(!queue.remove(&id));
        assert!(queue.tasks().is_empty());
    }
}
