pub mod cli;
pub mod mock_server;
pub mod shell;
