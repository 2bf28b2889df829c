use std::io;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, Url};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;

use crate::context::RequestContext;
use crate::transport::{MAX_RESPONSE_BODY, SafeTransport, TransportError};

/// Streaming response body, already capped at [`MAX_RESPONSE_BODY`].
pub type PageBody = Pin<Box<dyn AsyncRead + Send>>;

pub struct FetchedPage {
    pub status: u16,
    pub body: PageBody,
}

impl std::fmt::Debug for FetchedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedPage")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Issues a GET for `url`. Any status is returned as is; only transport
    /// failures are errors.
    async fn fetch(&self, ctx: &RequestContext, url: &str) -> Result<FetchedPage, TransportError>;
}

/// Fetches pages over the safe transport.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    transport: SafeTransport,
}

impl HttpFetcher {
    pub fn new(transport: SafeTransport, timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            client: transport.page_client(timeout)?,
            transport,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, ctx: &RequestContext, url: &str) -> Result<FetchedPage, TransportError> {
        let url = Url::parse(url)?;
        self.transport.check_destination(&url)?;

        log::info!("fetching {url}");
        let request = self.client.get(url).header(ACCEPT, "text/html");
        let response = ctx
            .run(request.send())
            .await?
            .map_err(TransportError::from_reqwest)?;

        let status = response.status().as_u16();
        let stream = response.bytes_stream().map_err(io::Error::other);
        let body = StreamReader::new(stream).take(MAX_RESPONSE_BODY);

        Ok(FetchedPage {
            status,
            body: Box::pin(body),
        })
    }
}
