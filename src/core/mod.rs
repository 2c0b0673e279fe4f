pub mod app;
pub mod chat_stream;
pub mod config;
pub mod conversation;
pub mod credentials;
pub mod error;
pub mod message;
pub mod requestor;
pub mod session;
pub mod store;
pub mod stream_decoder;
pub mod transport;
pub mod turn;
