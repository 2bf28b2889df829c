use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Why a [`RequestContext`] is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation signal plus an optional deadline, threaded through every
/// stage of an analysis.
///
/// Clones share the same token, so cancelling one cancels them all. Children
/// made with [`RequestContext::with_timeout`] are cancelled with their parent
/// but never the other way round.
#[derive(Debug, Clone)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

impl RequestContext {
    /// A context that is never done unless cancelled by hand.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A child context whose deadline is the earlier of the parent's and `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < candidate => parent,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancels this context when the returned guard is dropped.
    pub fn cancel_on_drop(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// `None` while the context is live.
    pub fn err(&self) -> Option<ContextError> {
        if self.deadline_exceeded() {
            Some(ContextError::DeadlineExceeded)
        } else if self.token.is_cancelled() {
            Some(ContextError::Canceled)
        } else {
            None
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => self.err().unwrap_or(ContextError::Canceled),
                _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                ContextError::Canceled
            }
        }
    }

    /// Runs `fut` unless the context finishes first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, ContextError> {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            out = fut => Ok(out),
        }
    }

    /// Wraps a reader so reads fail as soon as the context is done.
    pub fn guard_reader<R>(&self, inner: R) -> ContextReader<R> {
        let ctx = self.clone();
        ContextReader {
            inner,
            done: Box::pin(async move { ctx.done().await }),
        }
    }
}

/// Reader returned by [`RequestContext::guard_reader`].
pub struct ContextReader<R> {
    inner: R,
    done: Pin<Box<dyn Future<Output = ContextError> + Send>>,
}

impl<R: AsyncRead + Unpin> AsyncRead for ContextReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Poll::Ready(err) = self.done.as_mut().poll(cx) {
            return Poll::Ready(Err(io::Error::other(err)));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}
