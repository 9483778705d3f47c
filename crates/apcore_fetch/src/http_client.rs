//! The pluggable HTTP transport capability.
//!
//! The core never links a concrete transport into its fetch logic; hosts
//! supply an [`HttpClient`]. [`ReqwestHttpClient`] is the production
//! implementation; tests substitute a fake that never touches the network.

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use url::Url;

/// Streams the body of a GET request into a writer.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Issues a GET request to `url` and writes its body into `writer` as it
    /// arrives. Implementations should surface a non-2xx response as an
    /// [`std::io::Error`] rather than writing partial content and succeeding.
    async fn download(
        &self,
        url: &Url,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> std::io::Result<()>;
}

/// A [`reqwest`]-backed [`HttpClient`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Builds a client from a caller-configured [`reqwest::Client`] (proxy,
    /// timeouts, TLS settings and the like are the host's concern).
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn download(
        &self,
        url: &Url,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> std::io::Result<()> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(to_io_error)?
            .error_for_status()
            .map_err(to_io_error)?;

        let mut stream = response.bytes_stream();
        use futures::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(to_io_error)?;
            writer.write_all(&chunk).await?;
        }
        writer.flush().await
    }
}

fn to_io_error(e: reqwest::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e)
}
