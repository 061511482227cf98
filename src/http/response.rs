//! Relaying upstream responses to the caller.

use axum::{
    body::Body,
    response::{IntoResponse, Response},
};

use crate::gateway::forwarder::UpstreamResponse;

impl IntoResponse for UpstreamResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
