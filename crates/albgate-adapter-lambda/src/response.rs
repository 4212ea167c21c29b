use std::collections::BTreeMap;
use std::io;

use albgate_core::handler::ResponseWriter;
use albgate_core::http::header::CONTENT_ENCODING;
use albgate_core::http::{HeaderMap, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::BytesMut;
use log::{debug, warn};

use crate::event::TargetGroupResponse;

/// In-memory [`ResponseWriter`] that buffers one handler response and turns it into the reply
/// envelope with [`ResponseRecorder::end`].
///
/// A recorder serves exactly one invocation; `end` consumes it.
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status the reply will carry: the first one written, else `200`.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Finalise the recorded response.
    ///
    /// Repeated header values are joined with `", "`. The body is sent as text when it is valid
    /// UTF-8 and not content-encoded, and as base64 otherwise.
    pub fn end(self) -> TargetGroupResponse {
        let status = self.status();
        let body = self.body.freeze();

        let mut headers = BTreeMap::new();
        for name in self.headers.keys() {
            let values: Vec<&str> = self
                .headers
                .get_all(name)
                .iter()
                .filter_map(|value| match value.to_str() {
                    Ok(text) => Some(text),
                    Err(_) => {
                        debug!("skipping non-text value of response header {name}");
                        None
                    }
                })
                .collect();
            if !values.is_empty() {
                headers.insert(name.as_str().to_string(), values.join(", "));
            }
        }

        let text = if is_content_encoded(&self.headers) {
            None
        } else {
            std::str::from_utf8(&body).ok()
        };
        let (body, is_base64_encoded) = match text {
            Some(text) => (text.to_string(), false),
            None => (STANDARD.encode(&body), true),
        };

        TargetGroupResponse {
            status_code: status.as_u16(),
            status_description: Some(status_description(status)),
            headers,
            body,
            is_base64_encoded,
        }
    }
}

impl ResponseWriter for ResponseRecorder {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        match self.status {
            Some(current) => warn!("ignoring status {status}; response already committed with {current}"),
            None => self.status = Some(status),
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        self.status.get_or_insert(StatusCode::OK);
        self.body.extend_from_slice(bytes);
    }
}

impl io::Write for ResponseRecorder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ResponseWriter::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn is_content_encoded(headers: &HeaderMap) -> bool {
    headers.get_all(CONTENT_ENCODING).iter().any(|value| {
        value
            .to_str()
            .map(|coding| !coding.trim().eq_ignore_ascii_case("identity"))
            .unwrap_or(true)
    })
}

fn status_description(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}
