//! PageChat Library
//!
//! Streaming chat session controller for an embedded page assistant: builds
//! page-aware queries, decodes the backend's newline-delimited event stream
//! and keeps the conversation transcript that the widget renders.

pub mod app;
pub mod backend;
pub mod context;
pub mod dispatch;
pub mod host;
pub mod session;
pub mod stream;
pub mod transcript;
pub mod types;
