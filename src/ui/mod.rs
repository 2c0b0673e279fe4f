//! Terminal UI layer for interactive chat sessions.
//!
//! Key submodules include:
//! - [`event_loop`]: the loop that owns the app, forwards terminal input, and
//!   spawns stream workers via [`crate::core::chat_stream`].
//! - [`navigation`]: the view stack and the [`navigation::View`] trait.
//! - [`views`]: the chat list, chat, and modal screens.
//! - [`wrap`]: width-aware text wrapping for the transcript.
//!
//! Ownership boundary: this layer presents and captures interaction state, while
//! [`crate::core`] owns domain logic and backend coordination.

pub mod event_loop;
pub mod lifecycle;
pub mod navigation;
pub mod views;
pub mod wrap;
