use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::chat::{
    ChatMessage, QuestionRequest, QuestionResponse, Sender, ERROR_REPLY, FALLBACK_ANSWER,
    SEND_FAILED_BANNER, SUGGESTED_QUESTIONS,
};
use crate::domain::error::{AppError, Result};
use crate::infrastructure::api_client::TechniciaApi;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatState {
    pub user_id: String,
    /// Sent with every question of this conversation.
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
    pub input: String,
    pub is_loading: bool,
    pub error: Option<String>,
    next_id: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    InputChanged(String),
    SuggestionSelected(usize),
    SendRequested { at: DateTime<Utc> },
    ReplyReceived { response: QuestionResponse, at: DateTime<Utc> },
    ReplyFailed { at: DateTime<Utc> },
    ErrorDismissed,
}

impl ChatState {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            messages: Vec::new(),
            input: String::new(),
            is_loading: false,
            error: None,
            next_id: 1,
        }
    }

    /// The question the last `SendRequested` accepted, if it is still awaiting a reply.
    pub fn pending_question(&self) -> Option<&str> {
        if !self.is_loading {
            return None;
        }
        self.messages
            .last()
            .filter(|message| message.sender == Sender::User)
            .map(|message| message.content.as_str())
    }

    fn push(&mut self, content: String, sender: Sender, at: DateTime<Utc>, images: Vec<String>, is_error: bool) {
        self.messages.push(ChatMessage {
            id: self.next_id,
            content,
            sender,
            timestamp: at,
            images,
            is_error,
        });
        self.next_id += 1;
    }
}

pub fn reduce(mut state: ChatState, event: ChatEvent) -> ChatState {
    match event {
        ChatEvent::InputChanged(input) => {
            if !state.is_loading {
                state.input = input;
            }
        }
        ChatEvent::SuggestionSelected(index) => {
            if let Some(question) = SUGGESTED_QUESTIONS.get(index) {
                if !state.is_loading {
                    state.input = question.to_string();
                }
            }
        }
        ChatEvent::SendRequested { at } => {
            if state.is_loading || state.input.trim().is_empty() {
                return state;
            }
            let question = std::mem::take(&mut state.input);
            state.push(question, Sender::User, at, Vec::new(), false);
            state.is_loading = true;
            state.error = None;
        }
        ChatEvent::ReplyReceived { response, at } => {
            if !state.is_loading {
                return state;
            }
            let content = if response.answer.trim().is_empty() {
                FALLBACK_ANSWER.to_string()
            } else {
                response.answer
            };
            state.push(content, Sender::Assistant, at, response.images, false);
            state.is_loading = false;
        }
        ChatEvent::ReplyFailed { at } => {
            if !state.is_loading {
                return state;
            }
            state.push(ERROR_REPLY.to_string(), Sender::Assistant, at, Vec::new(), true);
            state.is_loading = false;
            state.error = Some(SEND_FAILED_BANNER.to_string());
        }
        ChatEvent::ErrorDismissed => state.error = None,
    }
    state
}

pub struct ChatController {
    api: Arc<dyn TechniciaApi>,
    state: ChatState,
}

impl ChatController {
    pub fn new(api: Arc<dyn TechniciaApi>, user_id: impl Into<String>) -> Self {
        Self {
            api,
            state: ChatState::new(user_id, format!("session-{}", Uuid::new_v4())),
        }
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn dispatch(&mut self, event: ChatEvent) {
        let state = std::mem::replace(&mut self.state, ChatState::new("", ""));
        self.state = reduce(state, event);
    }

    /// Sends `question` and returns the assistant message appended for it.
    /// Failures still append an error-flagged reply before returning `Err`.
    pub async fn ask(&mut self, question: &str) -> Result<ChatMessage> {
        self.dispatch(ChatEvent::InputChanged(question.to_string()));
        self.send().await
    }

    pub async fn send(&mut self) -> Result<ChatMessage> {
        self.dispatch(ChatEvent::SendRequested { at: Utc::now() });
        let question = self
            .state
            .pending_question()
            .map(|q| q.to_string())
            .ok_or_else(|| AppError::ValidationError("La question est vide.".to_string()))?;

        let request = QuestionRequest {
            question,
            user_id: self.state.user_id.clone(),
            session_id: self.state.session_id.clone(),
        };

        match self.api.ask_question(&request).await {
            Ok(response) => {
                info!(
                    session_id = %request.session_id,
                    answer_len = response.answer.len(),
                    images = response.images.len(),
                    "Answer received"
                );
                self.dispatch(ChatEvent::ReplyReceived {
                    response,
                    at: Utc::now(),
                });
                self.last_message()
            }
            Err(e) => {
                error!(error = %e, session_id = %request.session_id, "Failed to send question");
                self.dispatch(ChatEvent::ReplyFailed { at: Utc::now() });
                Err(e)
            }
        }
    }

    fn last_message(&self) -> Result<ChatMessage> {
        self.state
            .messages
            .last()
            .cloned()
            .ok_or_else(|| AppError::Internal("Conversation is empty".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::test_support::FakeApi;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_blank_input_is_not_sent() {
        let state = ChatState::new("user-123", "s");
        let state = reduce(state, ChatEvent::InputChanged("   ".into()));
        let state = reduce(state, ChatEvent::SendRequested { at: now() });
        assert!(state.messages.is_empty());
        assert!(!state.is_loading);
    }

    #[test]
    fn test_send_appends_user_message_and_clears_input() {
        let state = ChatState::new("user-123", "s");
        let state = reduce(state, ChatEvent::InputChanged("Où est le filtre ?".into()));
        let state = reduce(state, ChatEvent::SendRequested { at: now() });
        assert!(state.input.is_empty());
        assert!(state.is_loading);
        assert_eq!(state.pending_question(), Some("Où est le filtre ?"));

        let state = reduce(state, ChatEvent::InputChanged("typed while waiting".into()));
        let state = reduce(state, ChatEvent::SendRequested { at: now() });
        assert_eq!(state.messages.len(), 1);
        assert!(state.input.is_empty());
    }

    #[test]
    fn test_blank_answer_uses_fallback() {
        let state = ChatState::new("user-123", "s");
        let state = reduce(state, ChatEvent::InputChanged("Question".into()));
        let state = reduce(state, ChatEvent::SendRequested { at: now() });
        let state = reduce(
            state,
            ChatEvent::ReplyReceived {
                response: QuestionResponse {
                    answer: "  ".into(),
                    images: Vec::new(),
                },
                at: now(),
            },
        );
        assert_eq!(state.messages[1].content, FALLBACK_ANSWER);
        assert!(!state.messages[1].is_error);
    }

    #[test]
    fn test_failure_adds_error_reply_and_banner() {
        let state = ChatState::new("user-123", "s");
        let state = reduce(state, ChatEvent::InputChanged("Question".into()));
        let state = reduce(state, ChatEvent::SendRequested { at: now() });
        let state = reduce(state, ChatEvent::ReplyFailed { at: now() });
        assert_eq!(state.messages.len(), 2);
        assert!(state.messages[1].is_error);
        assert_eq!(state.messages[1].content, ERROR_REPLY);
        assert_eq!(state.error.as_deref(), Some(SEND_FAILED_BANNER));

        let state = reduce(state, ChatEvent::ErrorDismissed);
        assert!(state.error.is_none());
    }

    #[test]
    fn test_suggestion_fills_input() {
        let state = ChatState::new("user-123", "s");
        let state = reduce(state, ChatEvent::SuggestionSelected(1));
        assert_eq!(state.input, SUGGESTED_QUESTIONS[1]);
        let state = reduce(state, ChatEvent::SuggestionSelected(42));
        assert_eq!(state.input, SUGGESTED_QUESTIONS[1]);
    }

    #[tokio::test]
    async fn test_messages_stay_paired_in_order() {
        let api = Arc::new(FakeApi::with_steps(1));
        let mut controller = ChatController::new(api.clone(), "user-123");

        controller.ask("Première question").await.unwrap();
        api.fail_next_call();
        assert!(controller.ask("Deuxième question").await.is_err());
        let reply = controller.ask("Troisième question").await.unwrap();
        assert_eq!(reply.images, vec!["/images/schema-1.png".to_string()]);

        let messages = &controller.state().messages;
        assert_eq!(messages.len(), 6);
        for pair in messages.chunks(2) {
            assert_eq!(pair[0].sender, Sender::User);
            assert_eq!(pair[1].sender, Sender::Assistant);
            assert!(pair[0].id < pair[1].id);
        }
        assert_eq!(messages[2].content, "Deuxième question");
        assert!(messages[3].is_error);

        let questions = api.questions.lock().unwrap();
        assert_eq!(questions.len(), 3);
        assert!(questions.iter().all(|q| q.session_id == controller.state().session_id));
    }

    #[tokio::test]
    async fn test_blank_question_makes_no_call() {
        let api = Arc::new(FakeApi::with_steps(1));
        let mut controller = ChatController::new(api.clone(), "user-123");
        assert!(controller.ask("  ").await.unwrap_err().is_validation());
        assert!(api.questions.lock().unwrap().is_empty());
    }
}
