use async_trait::async_trait;
use reqwest::Url;

use crate::context::RequestContext;
use crate::data_models::AnalysisResult;
use crate::errors::{AppError, ErrorKind, MSG_INVALID_URL, MSG_UNSUPPORTED_SCHEME};
use crate::extractor;
use crate::fetcher::Fetcher;
use crate::prober::{MAX_LINKS, Prober};

/// Anything that can turn a URL into an [`AnalysisResult`].
#[async_trait]
pub trait PageAnalyzer: Send + Sync {
    async fn analyze(&self, ctx: &RequestContext, target_url: &str) -> Result<AnalysisResult, AppError>;
}

/// Accepts only absolute http(s) URLs with a host.
pub fn validate_url(raw: &str) -> Result<Url, AppError> {
    let url = Url::parse(raw).map_err(|err| AppError::invalid_input(MSG_INVALID_URL).with_cause(err))?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(AppError::invalid_input(MSG_INVALID_URL));
    }
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::invalid_input(MSG_UNSUPPORTED_SCHEME));
    }
    Ok(url)
}

/// Runs the fetch, extract and probe stages for one page.
pub struct Engine<F, P> {
    fetcher: F,
    prober: P,
}

impl<F: Fetcher, P: Prober> Engine<F, P> {
    pub fn new(fetcher: F, prober: P) -> Self {
        Self { fetcher, prober }
    }

    async fn run_stages(&self, ctx: &RequestContext, target_url: &str) -> Result<AnalysisResult, AppError> {
        let base = validate_url(target_url)?;

        let fetched = self
            .fetcher
            .fetch(ctx, target_url)
            .await
            .map_err(AppError::unreachable)?;
        if fetched.status >= 400 {
            return Err(AppError::upstream_status(fetched.status));
        }

        let body = ctx.guard_reader(fetched.body);
        let page = ctx
            .run(extractor::extract(body, &base))
            .await
            .map_err(AppError::parsing_failed)?
            .map_err(AppError::parsing_failed)?;

        let links = page.link_set(MAX_LINKS);
        let inaccessible = self.prober.probe(ctx, links).await;

        Ok(AnalysisResult::new(target_url.to_string(), page, inaccessible))
    }
}

#[async_trait]
impl<F: Fetcher, P: Prober> PageAnalyzer for Engine<F, P> {
    async fn analyze(&self, ctx: &RequestContext, target_url: &str) -> Result<AnalysisResult, AppError> {
        match self.run_stages(ctx, target_url).await {
            Ok(result) => {
                tracing::info!(
                    url = %target_url,
                    title = %result.title,
                    html_version = %result.html_version,
                    has_login_form = result.has_login_form,
                    internal_links = result.links.internal_count,
                    external_links = result.links.external_count,
                    inaccessible_links = result.links.inaccessible_count,
                    "analysis complete"
                );
                Ok(result)
            }
            Err(err) => {
                let err = if ctx.deadline_exceeded() && err.kind != ErrorKind::Timeout {
                    AppError::timed_out(err)
                } else {
                    err
                };
                match err.upstream_status {
                    Some(status) => tracing::error!(
                        url = %target_url,
                        kind = %err.kind,
                        target_status = status,
                        error = %err,
                        "analysis failed"
                    ),
                    None => tracing::error!(
                        url = %target_url,
                        kind = %err.kind,
                        error = %err,
                        "analysis failed"
                    ),
                }
                Err(err)
            }
        }
    }
}
