//! Platform-neutral HTTP primitives shared by the AlbGate adapters.

pub mod body;
pub mod handler;
pub mod http;

pub use body::Body;
pub use handler::{
    handler_fn, write_response, BoxHandler, Handler, HandlerFn, NotFound, ResponseWriter,
    ServiceHandler,
};
pub use crate::http::{
    request_builder, response_builder, Extensions, HeaderMap, HeaderName, HeaderValue, Method,
    Request, Response, StatusCode, Uri,
};
