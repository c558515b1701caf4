//! Streaming chat-completion client.
//!
//! Builds a provider JSON request from a multi-turn [`conversation`],
//! streams the response over SSE-style `data:` lines, and fans normalized
//! events out to subscribers with cooperative mid-stream cancellation.
//! See [`client::ChatClient`] for the entry point.

pub mod attachment;
pub mod client;
pub mod config;
pub mod conversation;
pub mod functions;
pub mod paths;
