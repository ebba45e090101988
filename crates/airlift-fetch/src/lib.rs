//! The fetch pipeline: a bounded-concurrency scheduler that drives
//! `adapter.fetch` over a resolved flat list, with pause, cancellation,
//! per-artifact retry and throttled progress events.

pub mod pipeline;

pub use airlift_adapters::FetchedFile;
pub use pipeline::{ArtifactResult, FetchPipeline, FetchReport, ProgressSink};
