//! Container image references and registry checks.

mod reference;
mod registry;

pub use reference::{DockerImageRef, DEFAULT_TAG};
#[cfg(feature = "http-registry")]
pub use registry::HttpRegistryClient;
pub use registry::{DockerImageValidator, RegistryClient};

#[cfg(test)]
pub(crate) use registry::MockRegistryClient;
