// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Raw HTTP/1.1 framing for the scrape relay wire protocol.
//!
//! The relay does not use a structured schema on the wire. A pending scrape
//! is handed to the agent as the bytes of a literal HTTP request (the poll
//! response body), and the agent hands the outcome back as the bytes of a
//! literal HTTP response (the push request body).
//!
//! This crate converts between those byte buffers and the typed
//! [`http::Request`] / [`http::Response`] values, so nothing beyond the
//! poll and push boundaries has to deal with framing.
//!
//! - [`decode_request`] / [`encode_response`] are the agent side.
//! - [`encode_request`] / [`decode_response`] are the relay side, used by
//!   relays and by tests that stand in for one.

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{
    HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode, Uri, Version,
};
use thiserror::Error;

/// Maximum number of header lines accepted in a single message.
const MAX_HEADERS: usize = 128;

/// Errors produced while reading or writing a framed HTTP message.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("malformed HTTP message: {0}")]
    Parse(#[from] httparse::Error),

    #[error("incomplete HTTP message")]
    Incomplete,

    #[error("missing {0}")]
    Missing(&'static str),

    #[error("invalid method: {0}")]
    InvalidMethod(#[from] http::method::InvalidMethod),

    #[error("invalid request target: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),

    #[error("invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("invalid status code: {0}")]
    InvalidStatus(#[from] http::status::InvalidStatusCode),

    #[error("invalid Content-Length: {0}")]
    InvalidContentLength(String),

    #[error("invalid chunked body")]
    InvalidChunk,

    #[error("body truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// Parse a raw HTTP request.
///
/// Absolute-form targets (`GET http://host:9100/metrics HTTP/1.1`, as written
/// by a forwarding proxy) are used verbatim. Origin-form targets are joined
/// with the `Host` header under the `http` scheme.
pub fn decode_request(buf: &[u8]) -> Result<Request<Bytes>, FramingError> {
    let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut raw_headers);
    let head_len = match parsed.parse(buf)? {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return Err(FramingError::Incomplete),
    };

    let method = Method::from_bytes(
        parsed
            .method
            .ok_or(FramingError::Missing("method"))?
            .as_bytes(),
    )?;
    let target = parsed.path.ok_or(FramingError::Missing("request target"))?;
    let version = version_from(parsed.version);
    let headers = collect_headers(parsed.headers)?;
    let uri = request_uri(target, &headers)?;
    let body = read_body(&headers, &buf[head_len..], false)?;

    let mut request = Request::new(body);
    *request.method_mut() = method;
    *request.uri_mut() = uri;
    *request.version_mut() = version;
    *request.headers_mut() = headers;
    Ok(request)
}

/// Parse a raw HTTP response.
///
/// Without `Content-Length` or chunked encoding the remainder of the buffer
/// is the body, matching read-until-close semantics.
pub fn decode_response(buf: &[u8]) -> Result<Response<Bytes>, FramingError> {
    let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Response::new(&mut raw_headers);
    let head_len = match parsed.parse(buf)? {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return Err(FramingError::Incomplete),
    };

    let status = StatusCode::from_u16(parsed.code.ok_or(FramingError::Missing("status code"))?)?;
    let version = version_from(parsed.version);
    let headers = collect_headers(parsed.headers)?;
    let body = read_body(&headers, &buf[head_len..], true)?;

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.version_mut() = version;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Serialize a request in absolute form, the way a forwarding proxy writes it.
pub fn encode_request(request: &Request<Bytes>) -> Bytes {
    let body = request.body();
    let mut out = BytesMut::with_capacity(256 + body.len());

    out.put_slice(request.method().as_str().as_bytes());
    out.put_u8(b' ');
    out.put_slice(request.uri().to_string().as_bytes());
    out.put_slice(b" HTTP/1.1\r\n");

    if !request.headers().contains_key(HOST) {
        if let Some(authority) = request.uri().authority() {
            write_header(&mut out, "Host", authority.as_str().as_bytes());
        }
    }
    write_headers(&mut out, request.headers());
    if !body.is_empty() {
        write_header(&mut out, "Content-Length", body.len().to_string().as_bytes());
    }
    out.put_slice(b"\r\n");
    out.put_slice(body);
    out.freeze()
}

/// Serialize a response with an explicit `Content-Length`.
///
/// The body is always fully buffered, so any `Transfer-Encoding` or
/// `Connection` header carried over from the original exchange is dropped.
pub fn encode_response(response: &Response<Bytes>) -> Bytes {
    let body = response.body();
    let status = response.status();
    let mut out = BytesMut::with_capacity(256 + body.len());

    out.put_slice(
        format!(
            "HTTP/1.1 {} {}\r\n",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )
        .as_bytes(),
    );
    write_headers(&mut out, response.headers());
    write_header(&mut out, "Content-Length", body.len().to_string().as_bytes());
    out.put_slice(b"\r\n");
    out.put_slice(body);
    out.freeze()
}

/// Render a header name in canonical MIME form (`x-foo-bar` -> `X-Foo-Bar`).
pub fn canonical_name(name: &HeaderName) -> String {
    let mut upper = true;
    name.as_str()
        .chars()
        .map(|c| {
            let out = if upper { c.to_ascii_uppercase() } else { c };
            upper = c == '-';
            out
        })
        .collect()
}

fn version_from(minor: Option<u8>) -> Version {
    match minor {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    }
}

fn collect_headers(raw: &[httparse::Header<'_>]) -> Result<HeaderMap, FramingError> {
    let mut headers = HeaderMap::with_capacity(raw.len());
    for header in raw {
        let name = HeaderName::from_bytes(header.name.as_bytes())?;
        let value = HeaderValue::from_bytes(header.value)?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn request_uri(target: &str, headers: &HeaderMap) -> Result<Uri, FramingError> {
    if !target.starts_with('/') {
        return Ok(target.parse()?);
    }

    let host = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|host| !host.is_empty())
        .ok_or(FramingError::Missing("Host header"))?;
    Ok(format!("http://{}{}", host, target).parse()?)
}

fn read_body(headers: &HeaderMap, rest: &[u8], until_close: bool) -> Result<Bytes, FramingError> {
    if is_chunked(headers) {
        return decode_chunked(rest);
    }

    if let Some(value) = headers.get(CONTENT_LENGTH) {
        let expected: usize = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| {
                FramingError::InvalidContentLength(
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })?;
        if rest.len() < expected {
            return Err(FramingError::Truncated {
                expected,
                actual: rest.len(),
            });
        }
        return Ok(Bytes::copy_from_slice(&rest[..expected]));
    }

    if until_close {
        Ok(Bytes::copy_from_slice(rest))
    } else {
        Ok(Bytes::new())
    }
}

fn is_chunked(headers: &HeaderMap) -> bool {
    headers.get_all(TRANSFER_ENCODING).iter().any(|value| {
        value
            .to_str()
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false)
    })
}

fn decode_chunked(mut rest: &[u8]) -> Result<Bytes, FramingError> {
    let mut body = BytesMut::new();
    loop {
        let (consumed, size) = match httparse::parse_chunk_size(rest) {
            Ok(httparse::Status::Complete(chunk)) => chunk,
            Ok(httparse::Status::Partial) => return Err(FramingError::Incomplete),
            Err(_) => return Err(FramingError::InvalidChunk),
        };
        let size = usize::try_from(size).map_err(|_| FramingError::InvalidChunk)?;
        rest = &rest[consumed..];

        // Trailers after the last chunk are not used on this wire.
        if size == 0 {
            return Ok(body.freeze());
        }
        let end = size.checked_add(2).ok_or(FramingError::InvalidChunk)?;
        if rest.len() < end {
            return Err(FramingError::Incomplete);
        }
        body.extend_from_slice(&rest[..size]);
        if &rest[size..end] != b"\r\n" {
            return Err(FramingError::InvalidChunk);
        }
        rest = &rest[end..];
    }
}

fn write_headers(out: &mut BytesMut, headers: &HeaderMap) {
    for (name, value) in headers {
        if name == CONTENT_LENGTH || name == TRANSFER_ENCODING || name == CONNECTION {
            continue;
        }
        write_header(out, &canonical_name(name), value.as_bytes());
    }
}

fn write_header(out: &mut BytesMut, name: &str, value: &[u8]) {
    out.put_slice(name.as_bytes());
    out.put_slice(b": ");
    out.put_slice(value);
    out.put_slice(b"\r\n");
}
