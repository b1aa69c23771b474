//! Versioned persistence of selected model bundles
//!
//! - [`InMemoryArtifactStore`] for tests and single-process use
//! - [`LocalArtifactStore`] for a directory of bincode bundles with a JSON index

mod store;

pub use store::{
    ArtifactStore, ArtifactUri, DeployedModel, InMemoryArtifactStore, IndexEntry,
    LocalArtifactStore, VersionSelector, VersionTag,
};
