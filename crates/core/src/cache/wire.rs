//! HTTP/1.x wire format for stored exchanges.
//!
//! A saved exchange is two independent messages: the request (request line
//! in absolute form, headers, blank line, body) and the response (status
//! line, headers, blank line, body). Bodies are fully buffered, so framing
//! is always expressed with `Content-Length`; `Transfer-Encoding` is
//! dropped on save and rejected on load.

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, HOST, HeaderName, HeaderValue, TRANSFER_ENCODING};
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri, Version};

use crate::Error;
use crate::exchange::Exchange;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Serialize an exchange into `(request, response)` wire bytes.
///
/// # Errors
///
/// Returns `Error::InvalidInput` if the exchange has no originating
/// request, or that request has no absolute URL.
pub fn save(exchange: &Exchange) -> Result<(Bytes, Bytes), Error> {
    let request = exchange
        .request()
        .ok_or_else(|| Error::InvalidInput("response has no originating request".into()))?;

    if request.uri().authority().is_none() {
        return Err(Error::InvalidInput(format!("originating request has no absolute URL: {}", request.uri())));
    }

    Ok((encode_request(request), encode_response(&exchange.response, request.method())))
}

/// Parse wire bytes produced by [`save`] back into an exchange.
///
/// # Errors
///
/// Returns `Error::Malformed` if either message is truncated or invalid.
pub fn load(request: &[u8], response: &[u8]) -> Result<Exchange, Error> {
    let request = decode_request(request)?;
    let response = decode_response(response, request.method())?;
    Ok(Exchange::new(request, response))
}

fn encode_request(request: &Request<Bytes>) -> Bytes {
    let body = request.body();
    let mut buf = BytesMut::with_capacity(256 + body.len());

    buf.put_slice(request.method().as_str().as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(request.uri().to_string().as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(version_str(request.version()).as_bytes());
    buf.put_slice(b"\r\n");

    if !request.headers().contains_key(HOST)
        && let Some(authority) = request.uri().authority()
    {
        put_header(&mut buf, HOST.as_str(), authority.as_str().as_bytes());
    }

    let declared = put_headers(&mut buf, request.headers());
    if declared || !body.is_empty() {
        put_header(&mut buf, CONTENT_LENGTH.as_str(), body.len().to_string().as_bytes());
    }

    buf.put_slice(b"\r\n");
    buf.put_slice(body);
    buf.freeze()
}

fn encode_response(response: &Response<Bytes>, method: &Method) -> Bytes {
    let body = response.body();
    let status = response.status();
    let mut buf = BytesMut::with_capacity(256 + body.len());

    buf.put_slice(version_str(response.version()).as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(status.as_str().as_bytes());
    if let Some(reason) = status.canonical_reason() {
        buf.put_u8(b' ');
        buf.put_slice(reason.as_bytes());
    }
    buf.put_slice(b"\r\n");

    if is_bodyless(method, status) {
        // Content-Length here describes the representation, not this message.
        for (name, value) in response.headers() {
            if *name != TRANSFER_ENCODING {
                put_header(&mut buf, name.as_str(), value.as_bytes());
            }
        }
    } else {
        let declared = put_headers(&mut buf, response.headers());
        if declared || !body.is_empty() {
            put_header(&mut buf, CONTENT_LENGTH.as_str(), body.len().to_string().as_bytes());
        }
    }

    buf.put_slice(b"\r\n");
    if !is_bodyless(method, status) {
        buf.put_slice(body);
    }
    buf.freeze()
}

/// Writes all headers except framing ones. Returns whether the message
/// declared any framing header.
fn put_headers(buf: &mut BytesMut, headers: &HeaderMap) -> bool {
    let mut declared = false;
    for (name, value) in headers {
        if *name == CONTENT_LENGTH || *name == TRANSFER_ENCODING {
            declared = true;
            continue;
        }
        put_header(buf, name.as_str(), value.as_bytes());
    }
    declared
}

fn put_header(buf: &mut BytesMut, name: &str, value: &[u8]) {
    buf.put_slice(name.as_bytes());
    buf.put_slice(b": ");
    buf.put_slice(value);
    buf.put_slice(b"\r\n");
}

fn decode_request(bytes: &[u8]) -> Result<Request<Bytes>, Error> {
    let (start_line, headers, rest) = split_message(bytes, "request")?;

    let mut parts = start_line.split(|b| *b == b' ');
    let (Some(method), Some(target), Some(version), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed("request", "invalid request line"));
    };

    let method = Method::from_bytes(method).map_err(|_| malformed("request", "invalid method"))?;
    let uri = Uri::try_from(target).map_err(|e| malformed("request", &e.to_string()))?;
    let version = parse_version(version).ok_or_else(|| malformed("request", "unsupported protocol version"))?;

    let body = match content_length(&headers, "request")? {
        Some(len) => take_body(rest, len, "request")?,
        None => Bytes::new(),
    };

    let mut request = Request::new(body);
    *request.method_mut() = method;
    *request.uri_mut() = uri;
    *request.version_mut() = version;
    *request.headers_mut() = headers;
    Ok(request)
}

fn decode_response(bytes: &[u8], method: &Method) -> Result<Response<Bytes>, Error> {
    let (status_line, headers, rest) = split_message(bytes, "response")?;

    let mut parts = status_line.splitn(3, |b| *b == b' ');
    let (Some(version), Some(code)) = (parts.next(), parts.next()) else {
        return Err(malformed("response", "invalid status line"));
    };

    let version = parse_version(version).ok_or_else(|| malformed("response", "unsupported protocol version"))?;
    let status = StatusCode::from_bytes(code).map_err(|_| malformed("response", "invalid status code"))?;

    let body = if is_bodyless(method, status) {
        Bytes::new()
    } else {
        match content_length(&headers, "response")? {
            Some(len) => take_body(rest, len, "response")?,
            None => Bytes::copy_from_slice(rest),
        }
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.version_mut() = version;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Splits a message into its start line, parsed headers, and the bytes
/// following the blank line.
fn split_message<'a>(bytes: &'a [u8], what: &str) -> Result<(&'a [u8], HeaderMap, &'a [u8]), Error> {
    let end = bytes
        .windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
        .ok_or_else(|| malformed(what, "truncated headers"))?;

    let head = &bytes[..end];
    let rest = &bytes[end + HEAD_TERMINATOR.len()..];

    let mut lines = head.split(|b| *b == b'\n').map(|line| line.strip_suffix(b"\r").unwrap_or(line));
    let start_line = lines.next().filter(|line| !line.is_empty()).ok_or_else(|| malformed(what, "empty start line"))?;

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.first().is_some_and(|b| *b == b' ' || *b == b'\t') {
            return Err(malformed(what, "folded header lines are not supported"));
        }
        let colon = line
            .iter()
            .position(|b| *b == b':')
            .ok_or_else(|| malformed(what, "header missing ':' separator"))?;
        let name = HeaderName::from_bytes(line[..colon].trim_ascii())
            .map_err(|_| malformed(what, "invalid header name"))?;
        let value = HeaderValue::from_bytes(line[colon + 1..].trim_ascii())
            .map_err(|_| malformed(what, "invalid header value"))?;
        headers.append(name, value);
    }

    if headers.contains_key(TRANSFER_ENCODING) {
        return Err(malformed(what, "transfer-encoding is not supported in stored messages"));
    }

    Ok((start_line, headers, rest))
}

fn content_length(headers: &HeaderMap, what: &str) -> Result<Option<usize>, Error> {
    headers
        .get(CONTENT_LENGTH)
        .map(|value| {
            value
                .to_str()
                .ok()
                .and_then(|value| value.trim().parse::<usize>().ok())
                .ok_or_else(|| malformed(what, "invalid content-length"))
        })
        .transpose()
}

fn take_body(rest: &[u8], len: usize, what: &str) -> Result<Bytes, Error> {
    if rest.len() < len {
        return Err(malformed(what, &format!("truncated body: expected {len} bytes, found {}", rest.len())));
    }
    Ok(Bytes::copy_from_slice(&rest[..len]))
}

fn is_bodyless(method: &Method, status: StatusCode) -> bool {
    *method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

fn parse_version(raw: &[u8]) -> Option<Version> {
    match raw {
        b"HTTP/0.9" => Some(Version::HTTP_09),
        b"HTTP/1.0" => Some(Version::HTTP_10),
        b"HTTP/1.1" => Some(Version::HTTP_11),
        b"HTTP/2.0" | b"HTTP/2" => Some(Version::HTTP_2),
        b"HTTP/3.0" | b"HTTP/3" => Some(Version::HTTP_3),
        _ => None,
    }
}

fn malformed(what: &str, reason: &str) -> Error {
    Error::Malformed(format!("{what}: {reason}"))
}
