//! Conversion of dispatch results into HTTP responses

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::error;

use archivelink_dispatch::{CommandResponse, DispatchResult};

/// A dispatch result on its way out
pub struct GatewayResponse(pub DispatchResult);

impl IntoResponse for GatewayResponse {
    fn into_response(self) -> Response {
        let reply = match self.0 {
            DispatchResult::Redirect(location) => CommandResponse::redirect(location),
            DispatchResult::Reply(reply) => reply,
        };

        let status =
            StatusCode::from_u16(reply.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut builder = Response::builder().status(status);
        if let Some(content_type) = reply.content_type() {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        for (name, value) in reply.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder
            .body(Body::from(reply.into_body()))
            .unwrap_or_else(|err| {
                error!(error = %err, "Response could not be encoded");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect() {
        let response = GatewayResponse(DispatchResult::Redirect(
            "http://primary:80/cs?create&contRep=K1".into(),
        ))
        .into_response();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers()[header::LOCATION],
            "http://primary:80/cs?create&contRep=K1"
        );
    }

    #[test]
    fn test_error_reply_headers() {
        let response = GatewayResponse(DispatchResult::Reply(CommandResponse::error(
            401,
            "Signature verification failed: signature required",
        )))
        .into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()["x-errordescription"],
            "Signature verification failed: signature required"
        );
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=UTF-8"
        );
    }

    #[test]
    fn test_error_echoing_control_bytes_keeps_status() {
        let reply = CommandResponse::error(400, "Unknown permission letter '\u{1}' in '\u{1}'");
        let response = GatewayResponse(DispatchResult::Reply(reply)).into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()["x-errordescription"],
            "Unknown permission letter ' ' in ' '"
        );
    }

    #[test]
    fn test_unencodable_header_becomes_500() {
        let reply = CommandResponse::text(200, "ok").with_header("X-Bad", "line\nbreak");
        let response = GatewayResponse(DispatchResult::Reply(reply)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
