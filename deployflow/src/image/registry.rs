//! Registry existence checks.

use super::DockerImageRef;
use crate::config::RegistryConfig;
use crate::errors::{InvalidImageFormatError, RegistryUnreachableError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// A read-only HTTP capability against an image registry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Issues a single GET and returns the response status code.
    ///
    /// Errors are transport-level failures only (DNS, connect, timeout).
    async fn get_status(&self, url: &str) -> anyhow::Result<u16>;
}

/// A [`RegistryClient`] backed by `reqwest`.
#[cfg(feature = "http-registry")]
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    client: reqwest::Client,
}

#[cfg(feature = "http-registry")]
impl HttpRegistryClient {
    /// Creates a client with the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialised.
    pub fn new(config: &RegistryConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { client })
    }
}

#[cfg(feature = "http-registry")]
#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn get_status(&self, url: &str) -> anyhow::Result<u16> {
        let response = self.client.get(url).send().await?;
        Ok(response.status().as_u16())
    }
}

/// Parses image references and checks their existence in a registry.
#[derive(Clone)]
pub struct DockerImageValidator {
    client: Arc<dyn RegistryClient>,
    config: RegistryConfig,
}

impl DockerImageValidator {
    /// Creates a validator over any registry client.
    #[must_use]
    pub fn new(client: Arc<dyn RegistryClient>, config: RegistryConfig) -> Self {
        Self { client, config }
    }

    /// Creates a validator that talks HTTP to the configured registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryUnreachableError`] if the HTTP client cannot be
    /// initialised.
    #[cfg(feature = "http-registry")]
    pub fn http(config: RegistryConfig) -> Result<Self, RegistryUnreachableError> {
        let client = HttpRegistryClient::new(&config)
            .map_err(|e| RegistryUnreachableError::new(config.base_url.clone(), e.into()))?;
        Ok(Self::new(Arc::new(client), config))
    }

    /// Returns the registry configuration.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Parses an image string. See [`DockerImageRef::parse`].
    ///
    /// # Errors
    ///
    /// Returns [`InvalidImageFormatError`] for malformed strings.
    pub fn parse_ref(&self, raw: &str) -> Result<DockerImageRef, InvalidImageFormatError> {
        DockerImageRef::parse(raw)
    }

    /// Checks whether `image` exists. A 404 is a normal "absent" answer.
    ///
    /// The query is issued exactly once; there is no retry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryUnreachableError`] on transport failure or on any
    /// status other than 200 and 404.
    pub async fn exists_in_registry(
        &self,
        image: &DockerImageRef,
    ) -> Result<bool, RegistryUnreachableError> {
        let url = self.config.tag_url(&image.repository, &image.tag);
        debug!(url = %url, image = %image, "Checking image in registry");

        let status = self.client.get_status(&url).await.map_err(|e| {
            warn!(url = %url, error = %e, "Registry request failed");
            RegistryUnreachableError::new(url.clone(), e)
        })?;

        match status {
            200 => Ok(true),
            404 => Ok(false),
            other => Err(RegistryUnreachableError::new(
                url,
                anyhow::anyhow!("unexpected status {other}"),
            )),
        }
    }
}

impl std::fmt::Debug for DockerImageValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerImageValidator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
