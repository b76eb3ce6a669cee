//! Engine session client library.
//!
//! Provides typed push-frame parsing, WebSocket channel management,
//! HTTP API wrappers, polling fallback, and the session orchestrator
//! for tracking generation jobs on a remote engine.

pub mod api;
pub mod channel;
pub mod messages;
pub mod poller;
pub mod resolver;
pub mod session;
