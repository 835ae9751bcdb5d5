//! Upstream release catalogs and verified artifact metadata
//!
//! A `DependencySource` per ecosystem lists releases through the
//! `ordering` module and resolves artifacts through the `integrity`
//! module. `factory` maps ecosystem names to sources.

pub mod batch;
pub mod clients;
pub mod error;
pub mod factory;
pub mod integrity;
pub mod metadata;
pub mod ordering;
pub mod quirks;
pub mod source;
pub mod sources;
pub mod types;

pub use error::DependencyError;
pub use factory::DependencyFactory;
pub use source::DependencySource;
pub use types::{Digest, DigestAlgorithm, ResolvedVersion, VersionRef};
