use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:80";
pub const DEFAULT_USER_ID: &str = "user-123";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ApiConfig {
    pub base_url: String,
    pub user_id: String,
    pub upload_timeout_secs: u64,
    pub question_timeout_secs: u64,
    pub diagnosis_timeout_secs: u64,
    /// Pause between workflow scenarios when the whole suite runs.
    pub suite_pause_secs: u64,
    pub log_level: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            upload_timeout_secs: 60,
            question_timeout_secs: 30,
            diagnosis_timeout_secs: 45,
            suite_pause_secs: 5,
            log_level: "info".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn endpoint_url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn question_timeout(&self) -> Duration {
        Duration::from_secs(self.question_timeout_secs)
    }

    pub fn diagnosis_timeout(&self) -> Duration {
        Duration::from_secs(self.diagnosis_timeout_secs)
    }
}
