use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    http::{header::CONTENT_TYPE, Method},
    Router,
};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio::{net::TcpListener, signal::ctrl_c};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{routes, state::AppState};

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    routes::routes()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

const TLS_DRAIN: Duration = Duration::from_secs(10);

/// HTTPS listener settings, with the certificate chain and key as PEM bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct TlsListener {
    pub port: u16,
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
}

/// Serves plain HTTP on `port`, and HTTPS as well when `tls` is given. Both
/// listeners stop on the same shutdown signal.
pub async fn serve(state: Arc<AppState>, port: u16, tls: Option<TlsListener>) -> anyhow::Result<()> {
    let app = router(state);
    let handle = Handle::new();

    let secure = {
        let app = app.clone();
        let handle = handle.clone();
        async move {
            match tls {
                Some(tls) => serve_tls(app, tls, handle).await,
                None => Ok(()),
            }
        }
    };

    let plain = async move {
        let address = format!("0.0.0.0:{port}");
        info!("Binding to {address}");

        let listener = TcpListener::bind(&address).await?;
        info!("Server running on {address}");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                handle.graceful_shutdown(Some(TLS_DRAIN));
            })
            .await?;
        Ok::<(), anyhow::Error>(())
    };

    tokio::try_join!(plain, secure)?;
    info!("Server shut down");
    Ok(())
}

async fn serve_tls(app: Router, tls: TlsListener, handle: Handle) -> anyhow::Result<()> {
    let config = RustlsConfig::from_pem(tls.cert, tls.key).await?;
    let address = SocketAddr::from(([0, 0, 0, 0], tls.port));
    info!("Secure server running on {address}");

    axum_server::bind_rustls(address, config)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(error) => {
                warn!("Failed to listen for Ctrl+C: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(error) => {
                warn!("Failed to install terminate handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreadable_certificates_fail_fast() {
        let tls = TlsListener {
            port: 0,
            cert: b"not a certificate".to_vec(),
            key: b"not a key".to_vec(),
        };
        let result = serve_tls(Router::new(), tls, Handle::new()).await;
        assert!(result.is_err());
    }
}
