use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RANGE;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;

use crate::context::RequestContext;
use crate::transport::{SafeTransport, TransportError};

/// Upper bound on links probed for a single page.
pub const MAX_LINKS: usize = 1000;

#[async_trait]
pub trait Prober: Send + Sync {
    /// Returns how many of `links` look broken. Never fails as a whole.
    async fn probe(&self, ctx: &RequestContext, links: Vec<String>) -> usize;
}

#[async_trait]
impl<T: Prober + ?Sized> Prober for Arc<T> {
    async fn probe(&self, ctx: &RequestContext, links: Vec<String>) -> usize {
        (**self).probe(ctx, links).await
    }
}

enum ProbeOutcome {
    Status(StatusCode),
    Failed,
    Canceled,
}

impl ProbeOutcome {
    fn is_inaccessible(&self) -> bool {
        match self {
            ProbeOutcome::Status(status) => status.as_u16() >= 400,
            ProbeOutcome::Failed => true,
            ProbeOutcome::Canceled => false,
        }
    }
}

/// Checks links with a fixed pool of workers pulling from a shared queue.
#[derive(Debug, Clone)]
pub struct LinkProber {
    client: Client,
    transport: SafeTransport,
    concurrency: usize,
}

impl LinkProber {
    pub fn new(
        transport: SafeTransport,
        concurrency: usize,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let concurrency = concurrency.max(1);
        Ok(Self {
            client: transport.probe_client(timeout, concurrency)?,
            transport,
            concurrency,
        })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// HEAD first; servers that refuse HEAD get a one byte ranged GET.
    async fn check_link(&self, ctx: &RequestContext, link: &str) -> bool {
        if ctx.is_done() {
            return false;
        }

        let url = match Url::parse(link) {
            Ok(url) => url,
            Err(err) => {
                log::debug!("link {link} is malformed: {err}");
                return true;
            }
        };

        let outcome = match self.send(ctx, self.client.head(url.clone()), &url).await {
            ProbeOutcome::Status(status)
                if status == StatusCode::FORBIDDEN || status == StatusCode::METHOD_NOT_ALLOWED =>
            {
                let get = self.client.get(url.clone()).header(RANGE, "bytes=0-0");
                self.send(ctx, get, &url).await
            }
            outcome => outcome,
        };

        let inaccessible = outcome.is_inaccessible();
        match &outcome {
            ProbeOutcome::Status(status) => log::debug!("link {link} -> {status}"),
            ProbeOutcome::Failed => log::debug!("link {link} -> request failed"),
            ProbeOutcome::Canceled => log::debug!("link {link} -> canceled"),
        }
        inaccessible
    }

    async fn send(&self, ctx: &RequestContext, request: RequestBuilder, url: &Url) -> ProbeOutcome {
        if let Err(violation) = self.transport.check_destination(url) {
            log::debug!("link {url} refused: {violation}");
            return ProbeOutcome::Failed;
        }
        match ctx.run(request.send()).await {
            Ok(Ok(response)) => ProbeOutcome::Status(response.status()),
            Ok(Err(err)) => {
                // a failure caused by the context ending is not the link's fault
                if ctx.is_done() {
                    ProbeOutcome::Canceled
                } else {
                    log::debug!("link {url} failed: {}", TransportError::from_reqwest(err));
                    ProbeOutcome::Failed
                }
            }
            Err(_) => ProbeOutcome::Canceled,
        }
    }
}

#[async_trait]
impl Prober for LinkProber {
    async fn probe(&self, ctx: &RequestContext, mut links: Vec<String>) -> usize {
        links.truncate(MAX_LINKS);
        let total = links.len();
        if total == 0 {
            return 0;
        }

        let (job_tx, job_rx) = mpsc::channel::<String>(total);
        let (result_tx, mut result_rx) = mpsc::channel::<bool>(total);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let workers = total.min(self.concurrency);
        let mut pool = JoinSet::new();
        for _ in 0..workers {
            let prober = self.clone();
            let ctx = ctx.clone();
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            pool.spawn(async move {
                loop {
                    let next = job_rx.lock().await.recv().await;
                    let Some(link) = next else {
                        break;
                    };
                    let inaccessible = prober.check_link(&ctx, &link).await;
                    if result_tx.send(inaccessible).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        for link in links {
            if job_tx.send(link).await.is_err() {
                break;
            }
        }
        drop(job_tx);

        let mut inaccessible = 0;
        while let Some(broken) = result_rx.recv().await {
            if broken {
                inaccessible += 1;
            }
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(err) = joined {
                log::error!("link probe worker failed: {err}");
            }
        }

        log::info!("probed {total} links with {workers} workers, {inaccessible} inaccessible");
        inaccessible
    }
}
