pub mod use_cases;

pub use use_cases::chat_session::ChatController;
pub use use_cases::diagnostic_flow::DiagnosticController;
pub use use_cases::upload_queue::UploadQueue;
pub use use_cases::workflow_suite::WorkflowSuite;
