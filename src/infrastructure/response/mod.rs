use once_cell::sync::Lazy;
use regex::Regex;

static HTML_TAG_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

static WHITESPACE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

const MAX_ERROR_TEXT_CHARS: usize = 300;

/// Fields a backend may use to carry a readable failure reason, in lookup order.
const ERROR_MESSAGE_FIELDS: [&str; 3] = ["message", "detail", "error"];

/// Pulls a user-facing message out of an error response body.
///
/// JSON bodies are searched for `message`, `detail` then `error` (string
/// values, or `detail[0].msg` for validation error lists). Non-JSON bodies
/// are stripped of markup and truncated. Returns `None` when nothing
/// readable is present.
pub fn extract_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        for field in ERROR_MESSAGE_FIELDS {
            match &json[field] {
                serde_json::Value::String(text) if !text.trim().is_empty() => {
                    return Some(text.trim().to_string());
                }
                serde_json::Value::Array(items) => {
                    if let Some(msg) = items
                        .iter()
                        .filter_map(|item| item["msg"].as_str())
                        .find(|msg| !msg.trim().is_empty())
                    {
                        return Some(msg.trim().to_string());
                    }
                }
                _ => {}
            }
        }
        return None;
    }

    let text = clean_error_text(trimmed);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn clean_error_text(text: &str) -> String {
    let stripped = HTML_TAG_PATTERN.replace_all(text, " ");
    let collapsed = WHITESPACE_PATTERN.replace_all(&stripped, " ");
    let collapsed = collapsed.trim();
    if collapsed.chars().count() > MAX_ERROR_TEXT_CHARS {
        let truncated: String = collapsed.chars().take(MAX_ERROR_TEXT_CHARS).collect();
        format!("{}...", truncated)
    } else {
        collapsed.to_string()
    }
}

/// First `max_chars` characters of `text`, with an ellipsis when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_message_field() {
        let body = r#"{"success": false, "message": "Fichier corrompu"}"#;
        assert_eq!(extract_error_message(body).as_deref(), Some("Fichier corrompu"));
    }

    #[test]
    fn test_extract_fastapi_detail() {
        let body = r#"{"detail": "File too large"}"#;
        assert_eq!(extract_error_message(body).as_deref(), Some("File too large"));
    }

    #[test]
    fn test_extract_validation_detail_list() {
        let body = r#"{"detail": [{"loc": ["body", "file"], "msg": "field required"}]}"#;
        assert_eq!(extract_error_message(body).as_deref(), Some("field required"));
    }

    #[test]
    fn test_json_without_message_fields() {
        assert_eq!(extract_error_message(r#"{"status": 500}"#), None);
        assert_eq!(extract_error_message("   "), None);
    }

    #[test]
    fn test_html_error_page_is_cleaned() {
        let body = "<html><body><h1>502 Bad Gateway</h1>\n\n<hr>nginx</body></html>";
        assert_eq!(
            extract_error_message(body).as_deref(),
            Some("502 Bad Gateway nginx")
        );
    }

    #[test]
    fn test_preview_cuts_on_char_boundary() {
        assert_eq!(preview("système", 3), "sys...");
        assert_eq!(preview("court", 10), "court");
    }
}
