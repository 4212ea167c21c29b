use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::executor::block_on;
use futures_util::future::poll_fn;
use futures_util::StreamExt;
use log::error;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task;
use tower_service::Service;

use crate::body::Body;
use crate::http::{header, HeaderMap, HeaderValue, Request, Response, StatusCode};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Sink a handler writes its response into.
///
/// Headers should be populated before the first `write`; the first `write` commits a `200` status
/// when none was set explicitly.
pub trait ResponseWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap;

    fn write_header(&mut self, status: StatusCode);

    fn write(&mut self, bytes: &[u8]);
}

/// Application logic invoked once per request.
pub trait Handler: Send + Sync {
    fn serve(&self, request: Request, writer: &mut dyn ResponseWriter);
}

pub type BoxHandler = Arc<dyn Handler>;

/// Handler backed by a closure. Build one with [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F> {
    f: F,
}

pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: Fn(Request, &mut dyn ResponseWriter) + Send + Sync,
{
    HandlerFn { f }
}

impl<F> Handler for HandlerFn<F>
where
    F: Fn(Request, &mut dyn ResponseWriter) + Send + Sync,
{
    fn serve(&self, request: Request, writer: &mut dyn ResponseWriter) {
        (self.f)(request, writer)
    }
}

/// Default handler used when the application supplies none: every request gets a plain 404.
#[derive(Clone, Copy, Debug, Default)]
pub struct NotFound;

impl Handler for NotFound {
    fn serve(&self, _request: Request, writer: &mut dyn ResponseWriter) {
        let headers = writer.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        writer.write_header(StatusCode::NOT_FOUND);
        writer.write(b"404 page not found\n");
    }
}

/// Runs a `tower_service::Service` as a [`Handler`].
///
/// The service is cloned for every request and driven to completion on the calling thread. Inside
/// a multi-threaded tokio runtime the worker is handed off first, so services awaiting tokio timers
/// or I/O keep making progress. Service errors are rendered as `500 Internal Server Error` with the
/// error text as body.
#[derive(Clone, Debug)]
pub struct ServiceHandler<S> {
    service: S,
}

impl<S> ServiceHandler<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn into_inner(self) -> S {
        self.service
    }
}

impl<S> Handler for ServiceHandler<S>
where
    S: Service<Request, Response = Response> + Clone + Send + Sync,
    S::Error: fmt::Display,
{
    fn serve(&self, request: Request, writer: &mut dyn ResponseWriter) {
        let mut service = self.service.clone();
        drive(async move {
            let result = async {
                poll_fn(|cx| service.poll_ready(cx)).await?;
                service.call(request).await
            }
            .await;

            match result {
                Ok(response) => forward_response(writer, response).await,
                Err(err) => {
                    error!("service failed to produce a response: {err}");
                    writer
                        .headers_mut()
                        .insert(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
                    writer.write_header(StatusCode::INTERNAL_SERVER_ERROR);
                    writer.write(err.to_string().as_bytes());
                }
            }
        });
    }
}

/// Run `future` to completion from synchronous handler code.
fn drive<F: Future>(future: F) -> F::Output {
    match Handle::try_current() {
        Ok(handle) if matches!(handle.runtime_flavor(), RuntimeFlavor::MultiThread) => {
            task::block_in_place(move || handle.block_on(future))
        }
        // A current-thread runtime cannot give up its only worker.
        _ => block_on(future),
    }
}

/// Copy a complete response into `writer`.
///
/// Streaming bodies are forwarded chunk by chunk; a failing chunk ends the body early.
pub fn write_response(writer: &mut dyn ResponseWriter, response: Response) {
    drive(forward_response(writer, response))
}

async fn forward_response(writer: &mut dyn ResponseWriter, response: Response) {
    let (parts, body) = response.into_parts();
    writer.headers_mut().extend(parts.headers);
    writer.write_header(parts.status);

    match body {
        Body::Once(bytes) => writer.write(&bytes),
        Body::Stream(mut stream) => {
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => writer.write(&bytes),
                    Err(err) => {
                        error!("response stream failed, truncating body: {err}");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{request_builder, response_builder, Method};
    use bytes::Bytes;
    use futures_util::stream;
    use std::future::{ready, Ready};
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    #[derive(Default)]
    struct CapturingWriter {
        status: Option<StatusCode>,
        headers: HeaderMap,
        body: Vec<u8>,
    }

    impl ResponseWriter for CapturingWriter {
        fn headers_mut(&mut self) -> &mut HeaderMap {
            &mut self.headers
        }

        fn write_header(&mut self, status: StatusCode) {
            self.status.get_or_insert(status);
        }

        fn write(&mut self, bytes: &[u8]) {
            self.status.get_or_insert(StatusCode::OK);
            self.body.extend_from_slice(bytes);
        }
    }

    fn request(path: &str) -> Request {
        request_builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())
            .expect("request")
    }

    #[derive(Clone)]
    struct EchoPath;

    impl Service<Request> for EchoPath {
        type Response = Response;
        type Error = String;
        type Future = Ready<Result<Response, String>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, request: Request) -> Self::Future {
            if request.uri().path() == "/fail" {
                return ready(Err("backend unavailable".to_string()));
            }
            let response = response_builder()
                .status(StatusCode::ACCEPTED)
                .header("x-path", request.uri().path())
                .body(Body::text(request.uri().path()))
                .map_err(|err| err.to_string());
            ready(response)
        }
    }

    #[test]
    fn not_found_writes_plain_404() {
        let mut writer = CapturingWriter::default();
        NotFound.serve(request("/missing"), &mut writer);

        assert_eq!(writer.status, Some(StatusCode::NOT_FOUND));
        assert_eq!(writer.headers[header::CONTENT_TYPE], TEXT_PLAIN);
        assert_eq!(writer.headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(writer.body, b"404 page not found\n");
    }

    #[test]
    fn handler_fn_receives_request_and_writer() {
        let handler = handler_fn(|request: Request, writer: &mut dyn ResponseWriter| {
            writer
                .headers_mut()
                .insert("x-method", HeaderValue::from_static("GET"));
            writer.write(request.uri().path().as_bytes());
        });

        let mut writer = CapturingWriter::default();
        handler.serve(request("/pets"), &mut writer);

        assert_eq!(writer.status, Some(StatusCode::OK));
        assert_eq!(writer.headers["x-method"], "GET");
        assert_eq!(writer.body, b"/pets");
    }

    #[test]
    fn service_handler_copies_response() {
        let handler = ServiceHandler::new(EchoPath);
        let mut writer = CapturingWriter::default();
        handler.serve(request("/pets/luna"), &mut writer);

        assert_eq!(writer.status, Some(StatusCode::ACCEPTED));
        assert_eq!(writer.headers["x-path"], "/pets/luna");
        assert_eq!(writer.body, b"/pets/luna");
    }

    #[test]
    fn service_handler_renders_errors_as_500() {
        let handler = ServiceHandler::new(EchoPath);
        let mut writer = CapturingWriter::default();
        handler.serve(request("/fail"), &mut writer);

        assert_eq!(writer.status, Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(writer.body, b"backend unavailable");
    }

    /// Service whose future is pending once before it answers.
    #[derive(Clone)]
    struct Deferred;

    impl Service<Request> for Deferred {
        type Response = Response;
        type Error = String;
        type Future = Pin<Box<dyn Future<Output = Result<Response, String>>>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, request: Request) -> Self::Future {
            Box::pin(async move {
                let mut yielded = false;
                poll_fn(|cx| {
                    if yielded {
                        Poll::Ready(())
                    } else {
                        yielded = true;
                        cx.waker().wake_by_ref();
                        Poll::Pending
                    }
                })
                .await;
                response_builder()
                    .body(Body::text(format!("later {}", request.uri().path())))
                    .map_err(|err| err.to_string())
            })
        }
    }

    #[derive(Clone)]
    struct Sleepy;

    impl Service<Request> for Sleepy {
        type Response = Response;
        type Error = String;
        type Future = Pin<Box<dyn Future<Output = Result<Response, String>>>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _request: Request) -> Self::Future {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                response_builder()
                    .body(Body::text("rested"))
                    .map_err(|err| err.to_string())
            })
        }
    }

    #[test]
    fn service_handler_waits_for_pending_future() {
        let handler = ServiceHandler::new(Deferred);
        let mut writer = CapturingWriter::default();
        handler.serve(request("/slow"), &mut writer);

        assert_eq!(writer.status, Some(StatusCode::OK));
        assert_eq!(writer.body, b"later /slow");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn service_handler_lets_tokio_timers_fire_on_a_single_worker() {
        let served = tokio::spawn(async {
            let mut writer = CapturingWriter::default();
            ServiceHandler::new(Sleepy).serve(request("/"), &mut writer);
            writer.body
        });

        let body = tokio::time::timeout(Duration::from_secs(5), served)
            .await
            .expect("handler finished")
            .expect("task joined");
        assert_eq!(body, b"rested");
    }

    #[test]
    fn write_response_drains_streaming_body() {
        let response = response_builder()
            .status(StatusCode::OK)
            .body(Body::stream(stream::iter(vec![
                Bytes::from_static(b"chunk-1,"),
                Bytes::from_static(b"chunk-2"),
            ])))
            .expect("response");

        let mut writer = CapturingWriter::default();
        write_response(&mut writer, response);
        assert_eq!(writer.body, b"chunk-1,chunk-2");
    }

    #[test]
    fn write_response_truncates_on_stream_error() {
        let response = response_builder()
            .body(Body::from_stream(stream::iter(vec![
                Ok(Bytes::from_static(b"partial")),
                Err(io::Error::other("reset")),
                Ok(Bytes::from_static(b"never")),
            ])))
            .expect("response");

        let mut writer = CapturingWriter::default();
        write_response(&mut writer, response);
        assert_eq!(writer.body, b"partial");
    }

    #[test]
    fn write_response_keeps_repeated_headers() {
        let response = response_builder()
            .header(header::SET_COOKIE, "a=1")
            .header(header::SET_COOKIE, "b=2")
            .body(Body::empty())
            .expect("response");

        let mut writer = CapturingWriter::default();
        write_response(&mut writer, response);
        let cookies: Vec<_> = writer.headers.get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
    }
}
