use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;

use albgate_core::body::Body;
use albgate_core::http::header::{CONTENT_LENGTH, HOST};
use albgate_core::http::{Extensions, HeaderMap, HeaderName, HeaderValue, Method, Request, Uri};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use log::{debug, warn};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS, NON_ALPHANUMERIC};

use crate::context::{with_target_group_context, LambdaRequestContext};
use crate::error::GatewayError;
use crate::event::TargetGroupRequest;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Bytes a path may carry on the wire but `Uri` refuses. `%` is left alone so existing escapes
/// survive.
const PATH_UNSAFE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Everything except unreserved characters and `/`.
const PATH_STRICT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Translate a load balancer event into a core request.
///
/// `base` becomes the request's extensions, extended with the event's routing block so handlers
/// can read it through [`crate::target_group_context`]. Only a body flagged as base64 that does
/// not decode is an error; anything else the `http` types cannot hold is normalised and logged.
pub fn into_core_request(
    base: Extensions,
    event: TargetGroupRequest,
) -> Result<Request, GatewayError> {
    let TargetGroupRequest {
        http_method,
        path,
        query_string_parameters,
        headers,
        body,
        is_base64_encoded,
        request_context,
    } = event;

    let body = decode_body(body, is_base64_encoded)?;
    let method = parse_method(&http_method);
    let uri = build_uri(&path, &query_string_parameters);

    let mut header_map = copy_headers(&headers);
    if body.is_empty() {
        header_map.remove(CONTENT_LENGTH);
    } else {
        header_map.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    }

    let connection = LambdaRequestContext {
        host: header_map
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        remote_addr: forwarded_client(&header_map),
    };

    debug!(
        "translated {} {} ({} bytes, client {:?})",
        method,
        uri,
        body.len(),
        connection.remote_addr
    );

    let mut request = Request::new(Body::from(body));
    *request.method_mut() = method;
    *request.uri_mut() = uri;
    *request.headers_mut() = header_map;
    *request.extensions_mut() = with_target_group_context(base, request_context);
    LambdaRequestContext::insert(&mut request, connection);

    Ok(request)
}

/// Empty means `GET`. A method that is not a valid token also falls back to `GET`.
fn parse_method(raw: &str) -> Method {
    if raw.is_empty() {
        return Method::GET;
    }
    Method::from_bytes(raw.as_bytes()).unwrap_or_else(|err| {
        warn!("treating unrepresentable method {raw:?} as GET: {err}");
        Method::GET
    })
}

/// Path as sent, followed by the query parameters sorted by name.
fn build_uri(path: &str, query: &HashMap<String, String>) -> Uri {
    let mut path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };

    let query = encode_query(query);
    let target = |path: &str| match &query {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };

    if let Ok(uri) = target(&path).parse::<Uri>() {
        return uri;
    }

    let escaped = utf8_percent_encode(&path, PATH_UNSAFE).to_string();
    debug!("escaping path {path:?} as {escaped:?}");
    path = escaped;
    if let Ok(uri) = target(&path).parse::<Uri>() {
        return uri;
    }

    // Only unreserved bytes, `/` and `%XX` escapes remain, which always parse.
    let strict = utf8_percent_encode(&path, PATH_STRICT).to_string();
    target(&strict).parse::<Uri>().unwrap_or_else(|err| {
        warn!("dropping unusable path {strict:?}: {err}");
        Uri::from_static("/")
    })
}

fn encode_query(query: &HashMap<String, String>) -> Option<String> {
    if query.is_empty() {
        return None;
    }
    let sorted: BTreeMap<&str, &str> = query
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    match serde_urlencoded::to_string(sorted) {
        Ok(encoded) => Some(encoded),
        Err(err) => {
            warn!("dropping query parameters that cannot be encoded: {err}");
            None
        }
    }
}

fn decode_body(body: String, is_base64_encoded: bool) -> Result<Bytes, GatewayError> {
    if is_base64_encoded {
        Ok(Bytes::from(STANDARD.decode(body.as_bytes())?))
    } else {
        Ok(Bytes::from(body))
    }
}

/// Headers the `http` types cannot represent are skipped.
fn copy_headers(headers: &HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = match HeaderName::from_bytes(name.as_bytes()) {
            Ok(header_name) => header_name,
            Err(err) => {
                debug!("skipping header {name:?}: {err}");
                continue;
            }
        };
        match HeaderValue::from_bytes(value.as_bytes()) {
            Ok(header_value) => {
                map.append(header_name, header_value);
            }
            Err(err) => debug!("skipping value of header {name:?}: {err}"),
        }
    }
    map
}

/// First hop of the `X-Forwarded-For` chain, i.e. the original client.
fn forwarded_client(headers: &HeaderMap) -> Option<IpAddr> {
    let chain = headers.get(X_FORWARDED_FOR)?.to_str().ok()?;
    let first = chain.split(',').next()?.trim();
    match first.parse() {
        Ok(addr) => Some(addr),
        Err(_) => {
            debug!("ignoring unparseable forwarded client address {first:?}");
            None
        }
    }
}
