//! The RPC facade: typed request/response DTOs for every endpoint, a
//! per-client event stream, the cancellation registry, and the session
//! orchestration that ties resolver, fetch pipeline and assembler
//! together. The transport is the embedder's choice (in-process calls
//! or a localhost HTTP/SSE pair); events serialize to SSE frames via
//! [`airlift_core::SessionEvent::to_sse`].

pub mod dtos;
pub mod facade;
pub mod telemetry;

pub use dtos::*;
pub use facade::Engine;
