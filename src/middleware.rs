//! Access log for HTTP exchanges, written through the `requests` logger.

use std::{
    future::Future,
    net::SocketAddr,
    pin::Pin,
    sync::Arc,
    task::{ready, Context, Poll},
    time::{Duration, Instant},
};

use http::{header::CONTENT_LENGTH, HeaderMap, Request, Response, StatusCode};
use hyper::body::{Body, Buf, Frame, SizeHint};
use pin_project_lite::pin_project;
use tower::Layer;
use tower_service::Service;

use crate::{logging::Registry, utils::pad_end};

pub const REQUESTS_LOGGER: &str = "requests";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// What the access log knows about one finished exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exchange {
    pub status: u16,
    pub method: String,
    pub id: String,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub response_time: Option<Duration>,
    pub url: String,
    pub user_id: Option<String>,
    pub ip: String,
}

impl Exchange {
    pub fn line(&self) -> String {
        let time = match self.response_time {
            Some(time) => time.as_millis().to_string(),
            None => "n/a".to_string(),
        };

        format!(
            "{} {} id:{} in:{} out:{} time:{} {} ({}/{})",
            self.status,
            pad_end(&self.method, 4),
            pad_end(&self.id, 10),
            pad_end(self.bytes_read, 5),
            pad_end(self.bytes_written, 5),
            pad_end(time, 3),
            self.url,
            self.user_id.as_deref().unwrap_or("-"),
            self.ip,
        )
    }
}

/// Writes `exchange` at info level to the `requests` logger. A missing
/// logger is reported on the registry's error channel.
pub fn log_request(registry: &Registry, exchange: &Exchange) {
    match registry.get(REQUESTS_LOGGER) {
        Some(logger) => logger.info(exchange.line()),
        None => registry.errors().report(
            REQUESTS_LOGGER,
            &eyre::eyre!("no '{}' logger configured", REQUESTS_LOGGER),
        ),
    }
}

/// Request extension with the id to log, takes precedence over the
/// `x-request-id` header.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Request extension carrying the authenticated user.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub String);

/// Request extension carrying the peer address.
#[derive(Debug, Clone, Copy)]
pub struct RemoteAddr(pub SocketAddr);

#[derive(Clone)]
pub struct RequestLogLayer {
    registry: Arc<Registry>,
}

impl RequestLogLayer {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

impl<S> Layer<S> for RequestLogLayer {
    type Service = RequestLog<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLog {
            inner,
            registry: self.registry.clone(),
        }
    }
}

/// Logs every exchange once the inner service produced its response.
#[derive(Clone)]
pub struct RequestLog<S> {
    inner: S,
    registry: Arc<Registry>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestLog<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    ReqBody: Body,
    ResBody: Body,
{
    type Response = Response<LoggedBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let pending = Pending::from_request(&request);

        ResponseFuture {
            inner: self.inner.call(request),
            pending: Some(pending),
            registry: self.registry.clone(),
        }
    }
}

struct Pending {
    method: String,
    id: String,
    url: String,
    user_id: Option<String>,
    ip: String,
    bytes_read: u64,
    started: Instant,
}

impl Pending {
    fn from_request<B: Body>(request: &Request<B>) -> Self {
        let extensions = request.extensions();
        let id = extensions
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .or_else(|| {
                request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

        Self {
            method: request.method().to_string(),
            id,
            url: request.uri().to_string(),
            user_id: extensions.get::<AuthenticatedUser>().map(|u| u.0.clone()),
            ip: extensions
                .get::<RemoteAddr>()
                .map(|addr| addr.0.ip().to_string())
                .unwrap_or_else(|| "-".to_string()),
            bytes_read: body_length(request.headers(), request.body()),
            started: Instant::now(),
        }
    }

    fn into_completion(self, status: StatusCode, registry: Arc<Registry>) -> Completion {
        Completion {
            exchange: Some(Exchange {
                status: status.as_u16(),
                method: self.method,
                id: self.id,
                bytes_read: self.bytes_read,
                bytes_written: 0,
                response_time: None,
                url: self.url,
                user_id: self.user_id,
                ip: self.ip,
            }),
            started: self.started,
            registry,
        }
    }
}

fn body_length<B: Body>(headers: &HeaderMap, body: &B) -> u64 {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .or_else(|| body.size_hint().exact())
        .unwrap_or(0)
}

/// Writes the access line exactly once, when the body ends or is dropped.
struct Completion {
    exchange: Option<Exchange>,
    started: Instant,
    registry: Arc<Registry>,
}

impl Completion {
    fn record(&mut self, bytes: u64) {
        if let Some(exchange) = self.exchange.as_mut() {
            exchange.bytes_written += bytes;
        }
    }

    fn finish(&mut self) {
        if let Some(mut exchange) = self.exchange.take() {
            exchange.response_time = Some(self.started.elapsed());
            log_request(&self.registry, &exchange);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.finish();
    }
}

pin_project! {
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        pending: Option<Pending>,
        registry: Arc<Registry>,
    }
}

impl<F, B, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
    B: Body,
{
    type Output = Result<Response<LoggedBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = ready!(this.inner.poll(cx));
        let pending = this.pending.take();

        match result {
            Ok(response) => {
                let completion =
                    pending.map(|p| p.into_completion(response.status(), this.registry.clone()));
                Poll::Ready(Ok(response.map(|body| LoggedBody {
                    inner: body,
                    completion,
                })))
            }
            Err(err) => {
                // no response will be sent, log the exchange as a server error
                if let Some(pending) = pending {
                    pending
                        .into_completion(StatusCode::INTERNAL_SERVER_ERROR, this.registry.clone())
                        .finish();
                }
                Poll::Ready(Err(err))
            }
        }
    }
}

pin_project! {
    /// Response body that counts the bytes it hands out and logs the
    /// exchange once the last frame went through.
    pub struct LoggedBody<B> {
        #[pin]
        inner: B,
        completion: Option<Completion>,
    }
}

impl<B: Body> Body for LoggedBody<B> {
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        let frame = ready!(this.inner.poll_frame(cx));

        if let Some(completion) = this.completion.as_mut() {
            match &frame {
                Some(Ok(frame)) => {
                    if let Some(data) = frame.data_ref() {
                        completion.record(data.remaining() as u64);
                    }
                }
                Some(Err(_)) | None => completion.finish(),
            }
        }

        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
