use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::validation::not_blank;

pub const QUESTION_ENDPOINT: &str = "/api/question";

pub const FALLBACK_ANSWER: &str =
    "Je n'ai pas pu trouver d'information pertinente sur ce sujet.";
pub const ERROR_REPLY: &str =
    "Désolé, je n'ai pas pu traiter votre demande. Veuillez réessayer ultérieurement.";
pub const SEND_FAILED_BANNER: &str =
    "Une erreur est survenue lors de l'envoi du message. Veuillez réessayer.";

pub const SUGGESTED_QUESTIONS: [&str; 4] = [
    "Comment fonctionne le circuit hydraulique principal ?",
    "Quelle est la procédure de maintenance du filtre ?",
    "Quels sont les symptômes d'une défaillance de la pompe ?",
    "Où se trouve le capteur de pression P3 sur le schéma ?",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub is_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRequest {
    #[validate(custom(function = "not_blank", message = "La question est vide."))]
    pub question: String,
    pub user_id: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResponse {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub images: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_images_default_to_empty() {
        let response: QuestionResponse =
            serde_json::from_value(json!({"answer": "La pompe principale..."})).unwrap();
        assert!(response.images.is_empty());
    }

    #[test]
    fn test_question_request_field_names() {
        let request = QuestionRequest {
            question: "Pourquoi ?".to_string(),
            user_id: "user-123".to_string(),
            session_id: "session-1".to_string(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({"question": "Pourquoi ?", "userId": "user-123", "sessionId": "session-1"}));
    }
}
