use axum::{extract::Request, http::header, middleware::Next, response::Response};
use uuid::Uuid;

use crate::server::registry::RegistryAuth;

/// Request ID stored in request extensions for correlating proxy and upstream logs
#[derive(Clone, Debug)]
pub struct RequestId(pub Uuid);

/// Middleware that generates and injects a unique request ID for each request.
///
/// The request ID is:
/// - Generated as a UUID v4
/// - Stored in request extensions for use by handlers
/// - Added to response headers as `x-request-id` for client-side debugging
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = RequestId(Uuid::new_v4());

    request.extensions_mut().insert(request_id.clone());

    let mut response = next.run(request).await;

    response.headers_mut().insert(
        header::HeaderName::from_static("x-request-id"),
        header::HeaderValue::from_str(&request_id.0.to_string())
            .unwrap_or_else(|_| header::HeaderValue::from_static("invalid")),
    );

    response
}

/// Request metadata for log context. Never carries credentials.
#[derive(Debug)]
pub struct RequestMeta {
    pub request_id: Option<Uuid>,
    pub uri: String,
    pub auth_mode: Option<&'static str>,
}

impl RequestMeta {
    pub fn from_request(request: &Request) -> Self {
        let request_id = request.extensions().get::<RequestId>().map(|rid| rid.0);

        let uri = request.uri().to_string();

        let auth_mode = request
            .extensions()
            .get::<RegistryAuth>()
            .map(RegistryAuth::mode);

        Self {
            request_id,
            uri,
            auth_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::registry::{RegistryLocator, SecretToken};
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        routing::get,
        Router,
    };
    use tower::ServiceExt; // for `oneshot`

    async fn test_handler() -> &'static str {
        "Hello, World!"
    }

    #[tokio::test]
    async fn test_request_id_middleware_adds_header() {
        let app = Router::new()
            .route("/", get(test_handler))
            .layer(axum::middleware::from_fn(request_id_middleware));

        let request = HttpRequest::builder()
            .uri("/")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let request_id_str = response.headers()["x-request-id"].to_str().unwrap();
        assert!(uuid::Uuid::parse_str(request_id_str).is_ok());
    }

    #[test]
    fn test_request_meta_from_request() {
        let request_id = RequestId(Uuid::new_v4());
        let mut request = HttpRequest::builder()
            .uri("/v2/library/nginx/tags/list?n=5")
            .body(Body::empty())
            .unwrap();

        request.extensions_mut().insert(request_id.clone());
        request.extensions_mut().insert(RegistryAuth::Basic {
            locator: RegistryLocator::parse("docker;docker-hub;registry.hub.docker.com").unwrap(),
            token: SecretToken::new("hvs.secret"),
        });

        let meta = RequestMeta::from_request(&request);

        assert_eq!(meta.request_id, Some(request_id.0));
        assert_eq!(meta.uri, "/v2/library/nginx/tags/list?n=5");
        assert_eq!(meta.auth_mode, Some("basic"));
        assert!(!format!("{:?}", meta).contains("hvs.secret"));
    }
}
