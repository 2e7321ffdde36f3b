//! Purpose: Batched JSON API client with per-model stores.
//! Exports: `api` (multiplexer, envelopes, transports), `model` (stores), `ApiContext`, `ApiConfig`.
//! Role: Library backing the `jig` CLI and embedding applications.
//! Invariants: All API traffic flows through one `Multiplexer` per `ApiContext`.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod config;
pub mod context;
pub mod core;
mod json;
pub mod model;

pub use config::ApiConfig;
pub use context::{ApiContext, ContextBuilder};
pub use crate::core::completion::{Completion, CompletionState};
pub use crate::core::ids::WindowId;
