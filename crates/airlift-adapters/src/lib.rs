//! Ecosystem adapters: one implementation of the [`EcosystemAdapter`]
//! contract per supported package manager.
//!
//! The resolver and fetch pipeline depend only on the contract; every
//! ecosystem-specific rule (wheel tags, POM inheritance, EVR ordering,
//! OCI manifest lists, ...) lives behind it.

pub mod adapter;
pub mod apk;
pub mod apt;
pub mod conda;
pub mod docker;
pub mod maven;
pub mod npm;
pub mod pip;
pub mod yum;

pub use adapter::{
    AdapterContext, AdapterSet, DependencySpec, EcosystemAdapter, FetchOutcome, FetchedFile,
    ProgressFn, SearchHit, VersionEntry,
};
pub use apk::ApkAdapter;
pub use apt::AptAdapter;
pub use conda::CondaAdapter;
pub use docker::DockerAdapter;
pub use maven::MavenAdapter;
pub use npm::NpmAdapter;
pub use pip::PipAdapter;
pub use yum::YumAdapter;
