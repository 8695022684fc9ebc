//! Outbound call executor shared by the relay and the aggregator.
//!
//! Wraps the pooled hyper client. One call, one optional timeout, no
//! retries; redirects are returned to the caller like any other response.
//! [`DeadlineBody`] carries the same timeout into a streamed response body.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use hyper::body::{Body as HttpBody, Bytes, Frame, Incoming, SizeHint};
use hyper::{Request, Response};
use tokio::time::{Instant, Sleep};

use crate::error::ProxyError;
use crate::server::HttpClient;

#[derive(Clone)]
pub struct Executor {
    client: HttpClient,
}

impl Executor {
    #[must_use]
    pub const fn new(client: HttpClient) -> Self {
        Self { client }
    }

    /// Send `request` and wait for the response head. The body is returned
    /// unread so callers can stream it.
    pub async fn send(
        &self,
        request: Request<Body>,
        timeout: Option<Duration>,
    ) -> Result<Response<Incoming>, ProxyError> {
        let call = self.client.request(request);
        let result = match timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                ProxyError::BackendUnavailable(format!(
                    "request timed out after {}ms",
                    limit.as_millis()
                ))
            })?,
            None => call.await,
        };
        result.map_err(|e| ProxyError::BackendUnavailable(error_chain(&e)))
    }
}

/// Backend response body that fails once `deadline` passes. A backend that
/// sends its head and then stalls cannot hold the call open past the
/// timeout the head was already subject to.
pub struct DeadlineBody {
    inner: Incoming,
    deadline: Pin<Box<Sleep>>,
    limit: Duration,
}

impl DeadlineBody {
    #[must_use]
    pub fn new(inner: Incoming, deadline: Instant, limit: Duration) -> Self {
        Self {
            inner,
            deadline: Box::pin(tokio::time::sleep_until(deadline)),
            limit,
        }
    }
}

impl HttpBody for DeadlineBody {
    type Data = Bytes;
    type Error = ProxyError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, ProxyError>>> {
        let this = self.get_mut();

        if let Poll::Ready(frame) = Pin::new(&mut this.inner).poll_frame(cx) {
            return Poll::Ready(frame.map(|result| {
                result.map_err(|e| ProxyError::BackendUnavailable(format!("body read error: {e}")))
            }));
        }

        match this.deadline.as_mut().poll(cx) {
            Poll::Ready(()) => Poll::Ready(Some(Err(ProxyError::BackendUnavailable(format!(
                "response body not finished after {}ms",
                this.limit.as_millis()
            ))))),
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// hyper_util's client error only names the failing stage; the cause
/// (refused connection, DNS failure, ...) sits in its source chain.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
