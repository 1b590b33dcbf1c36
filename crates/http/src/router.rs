use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Request, State},
    response::{IntoResponse, Response},
    routing::get,
};
use engine::{RequestEnvelope, SignatureRouter, Variant};

/// Build the axum router for the configured variant. Everything funnels
/// into the catch-all handler; the subscribe variant additionally exposes
/// the sidecar's topic discovery endpoint.
pub fn app_router(state: Arc<SignatureRouter>) -> Router {
    let router = match state.variant() {
        Variant::Subscribe => Router::new()
            .route("/dapr/subscribe", get(handle_subscriptions))
            .fallback(handle_request),
        _ => Router::new().fallback(handle_request),
    };
    router.with_state(state)
}

async fn handle_subscriptions(State(state): State<Arc<SignatureRouter>>) -> impl IntoResponse {
    Json(state.subscriptions())
}

async fn handle_request(
    State(state): State<Arc<SignatureRouter>>,
    request: Request,
) -> Response {
    let envelope = match flatten(request).await {
        Ok(envelope) => envelope,
        Err(response) => return response,
    };
    tracing::debug!("request {} {}", envelope.method, envelope.url);

    let response = state.handle(envelope).await;
    tracing::debug!("response {}", response.status);

    let mut builder = Response::builder().status(response.status);
    for (name, value) in &response.headers {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|err| {
            tracing::error!("failed to build response: {err}");
            Response::builder()
                .status(500)
                .body(Body::empty())
                .unwrap()
        })
}

/// Lower the transport request into the engine's envelope. Header names are
/// lowercased, the body is read fully.
async fn flatten(request: Request) -> Result<RequestEnvelope, Response> {
    let method = request.method().as_str().to_string();
    let url = request.uri().to_string();

    let mut headers = Vec::with_capacity(request.headers().len());
    for (name, value) in request.headers() {
        headers.push((
            name.as_str().to_string(),
            value.to_str().unwrap_or("").to_string(),
        ));
    }

    let body = match axum::body::to_bytes(request.into_body(), usize::MAX).await {
        Ok(bytes) if bytes.is_empty() => None,
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).to_string()),
        Err(err) => {
            tracing::error!("failed to read request body: {err}");
            return Err(Response::builder()
                .status(400)
                .body(Body::empty())
                .unwrap());
        }
    };

    Ok(RequestEnvelope {
        url,
        method,
        headers,
        body,
    })
}
