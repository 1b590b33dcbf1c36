use std::net::SocketAddr;
use std::sync::Arc;

use engine::SignatureRouter;

use crate::router::app_router;

/// Bind and serve until the process exits. Callers must finish validation
/// and function loading before this runs; nothing is accepted earlier.
pub async fn serve(state: Arc<SignatureRouter>, port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("serving on {addr}");
    axum::serve(listener, app_router(state)).await
}
