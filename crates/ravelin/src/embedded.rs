//! Embedded hosting: the host process owns the listener and lifecycle,
//! we only provide the request handle.
//!
//! The host passes its listener down the LISTEN_FDS convention: fd 3 is
//! an already-bound socket inherited across exec. Traffic arrives in
//! plain HTTP; the host terminates TLS.

use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use crate::error::AppError;
use crate::server::{self, ServiceState};

const INHERITED_FD: std::os::fd::RawFd = 3;

/// A non-blocking handle to the compile service for embedded hosting.
///
/// Construction does not bind, listen, or block; the host decides when
/// and where requests flow.
pub struct EmbeddedService {
    state: Arc<ServiceState>,
}

impl EmbeddedService {
    pub fn new(state: Arc<ServiceState>) -> Self {
        Self { state }
    }

    /// Answer one request. The host calls this from its own loop.
    pub async fn handle<B>(
        &self,
        req: hyper::Request<B>,
    ) -> hyper::Response<http_body_util::Full<bytes::Bytes>>
    where
        B: hyper::body::Body,
    {
        match server::handle(Arc::clone(&self.state), req).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }

    /// Serve plain HTTP on a listener the host already bound.
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        tracing::info!(addr = ?listener.local_addr().ok(), "serving on inherited listener");
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            };

            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { server::handle(state, req).await }
                });
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::debug!(peer = %peer, error = %e, "connection error");
                }
            });
        }
    }
}

/// Adopt the listener a supervising host handed down on fd 3.
pub fn inherited_listener() -> Result<TcpListener, AppError> {
    use std::os::fd::FromRawFd;

    let count: u32 = std::env::var("LISTEN_FDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    if count == 0 {
        return Err(AppError::NoInheritedListener);
    }

    // SAFETY: the host guarantees fd 3 is a listening socket it will
    // not touch again; we take sole ownership of it here.
    let std_listener = unsafe { std::net::TcpListener::from_raw_fd(INHERITED_FD) };
    std_listener.set_nonblocking(true)?;
    Ok(TcpListener::from_std(std_listener)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};
    use hyper::{Method, Request, StatusCode};
    use ravelin_compiler::ManifestCompiler;

    use crate::fileserving::{FileBucket, FileServer};
    use crate::ssl::CaMode;

    fn service(confdir: &std::path::Path) -> EmbeddedService {
        let manifest_dir = confdir.join("nodes");
        fs::create_dir_all(&manifest_dir).unwrap();
        EmbeddedService::new(Arc::new(ServiceState {
            compiler: Arc::new(ManifestCompiler::new(manifest_dir, "production", None)),
            file_server: FileServer::new(),
            bucket: FileBucket::new(confdir.join("bucket")),
            ca_mode: CaMode::None,
        }))
    }

    #[tokio::test]
    async fn construction_does_not_block_and_requests_route() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let request = Request::builder()
            .method(Method::GET)
            .uri("/status")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = service.handle(request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "running");
    }

    #[tokio::test]
    async fn serves_on_a_host_provided_listener() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(service.serve(listener));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        stream
            .write_all(b"GET /status HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
    }

    #[test]
    fn missing_environment_means_no_inherited_listener() {
        std::env::remove_var("LISTEN_FDS");
        assert!(matches!(
            inherited_listener(),
            Err(AppError::NoInheritedListener)
        ));
    }
}
