use std::fmt;

use bytes::Bytes;
use futures_util::stream::{LocalBoxStream, Stream, StreamExt};

/// HTTP body carried by translated requests and handler responses.
///
/// Requests built from a load balancer event are always `Once`: the payload arrives in full inside
/// the event. Handlers bridged from services may still answer with a `Stream`, which is drained
/// when the response is recorded.
pub enum Body {
    Once(Bytes),
    Stream(LocalBoxStream<'static, Result<Bytes, anyhow::Error>>),
}

impl Body {
    pub fn empty() -> Self {
        Self::Once(Bytes::new())
    }

    /// Body fed by a fallible chunk stream. The first error ends the body.
    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + 'static,
        anyhow::Error: From<E>,
    {
        Self::Stream(stream.map(|chunk| chunk.map_err(anyhow::Error::from)).boxed_local())
    }

    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Bytes> + 'static,
    {
        Self::from_stream(stream.map(Ok::<Bytes, anyhow::Error>))
    }

    pub fn text<S>(text: S) -> Self
    where
        S: Into<String>,
    {
        Self::Once(Bytes::from(text.into()))
    }

    /// Buffered payload. Panics for streaming bodies, which never reach a translated request.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Once(bytes) => bytes.as_ref(),
            Body::Stream(_) => panic!("streaming body does not expose in-memory bytes"),
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Body::Stream(_))
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Once(bytes) => f
                .debug_struct("Body::Once")
                .field("len", &bytes.len())
                .finish(),
            Body::Stream(_) => f.debug_tuple("Body::Stream").finish(),
        }
    }
}

impl From<Bytes> for Body {
    fn from(value: Bytes) -> Self {
        Body::Once(value)
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Body::Once(Bytes::from(value))
    }
}

impl From<&[u8]> for Body {
    fn from(value: &[u8]) -> Self {
        Body::Once(Bytes::copy_from_slice(value))
    }
}

impl From<&str> for Body {
    fn from(value: &str) -> Self {
        Body::text(value)
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Body::text(value)
    }
}
