pub mod chat_session;
pub mod diagnostic_flow;
pub mod upload_queue;
pub mod workflow_suite;

#[cfg(test)]
pub(crate) mod test_support;
