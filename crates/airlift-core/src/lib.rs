//! Core data model for the airlift bundle engine.
//!
//! Everything that crosses a component boundary is defined here: the
//! ecosystem set, package requests, resolved artifacts, dependency trees,
//! target platform profiles, session events, the cancellation token, and
//! the strongly-typed bundle configuration.

pub mod artifact;
pub mod cancel;
pub mod config;
pub mod ecosystem;
pub mod events;
pub mod platform;
pub mod request;
pub mod tree;

pub use artifact::{AuxKind, AuxiliaryFile, RepoDescriptor, ResolvedArtifact};
pub use cancel::{CancelToken, PauseGate};
pub use config::{BundleConfig, DistRef, DockerRegistry, OutputFormat};
pub use ecosystem::Ecosystem;
pub use events::SessionEvent;
pub use platform::{Arch, PlatformProfile, TargetOs};
pub use request::{PackageRequest, VersionSpec};
pub use tree::{Conflict, DependencyNode, DependencyTree, FailedPackage};
