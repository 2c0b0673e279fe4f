//! Parley is a full-screen terminal client for OpenAI-compatible chat APIs.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns conversations, the per-conversation turn state machine,
//!   the streaming requestor, persistence, and configuration.
//! - [`ui`] renders the terminal interface, keeps the navigation stack of
//!   views, and runs the event loop that feeds worker results back into the
//!   app.
//! - [`api`] defines the chat completion payloads sent to and decoded from
//!   the server.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`], which builds an [`core::app::App`] and hands
//! it to [`ui::event_loop::run_chat`] for interactive sessions.

pub mod api;
pub mod cli;
pub mod core;
pub mod ui;
pub mod utils;
