//! A buffered HTTP response paired with the request that produced it.

use bytes::Bytes;
use http::{Request, Response, StatusCode};

/// A response together with its originating request.
///
/// The request is optional only so that callers can hand over a response
/// whose origin was lost; such exchanges are rejected as invalid input by
/// the cache rather than by the type system.
#[derive(Debug)]
pub struct Exchange {
    pub request: Option<Request<Bytes>>,
    pub response: Response<Bytes>,
}

impl Exchange {
    pub fn new(request: Request<Bytes>, response: Response<Bytes>) -> Self {
        Self { request: Some(request), response }
    }

    /// A response with no originating request attached.
    pub fn without_request(response: Response<Bytes>) -> Self {
        Self { request: None, response }
    }

    pub fn request(&self) -> Option<&Request<Bytes>> {
        self.request.as_ref()
    }

    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn body(&self) -> &Bytes {
        self.response.body()
    }

    /// Split into the owned response and request.
    pub fn into_parts(self) -> (Response<Bytes>, Option<Request<Bytes>>) {
        (self.response, self.request)
    }
}
