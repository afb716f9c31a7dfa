//! The persistent compile service: TLS accept loop and the request
//! surface shared with embedded hosting.
//!
//! Service-path compiles run without a migration collector; validation
//! only applies to the one-shot flow.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use ravelin_compiler::{CatalogCompiler, COMPILER_VERSION};

use crate::fileserving::{FileBucket, FileServer, FileServingError};
use crate::ssl::CaMode;

/// Shared state behind every service request.
pub struct ServiceState {
    pub compiler: Arc<dyn CatalogCompiler>,
    pub file_server: FileServer,
    pub bucket: FileBucket,
    pub ca_mode: CaMode,
}

/// TLS network server bound to the configured address and port.
pub struct Server {
    addr: SocketAddr,
    tls: Arc<rustls::ServerConfig>,
    state: Arc<ServiceState>,
}

impl Server {
    pub fn new(addr: SocketAddr, tls: Arc<rustls::ServerConfig>, state: Arc<ServiceState>) -> Self {
        Self { addr, tls, state }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Accept and serve connections until the process terminates.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("failed to bind to {}", self.addr))?;
        tracing::info!(addr = %self.addr, "compile service listening");

        let acceptor = TlsAcceptor::from(self.tls.clone());
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            };

            let acceptor = acceptor.clone();
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                let tls_stream = match acceptor.accept(stream).await {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::debug!(peer = %peer, error = %e, "TLS handshake failed");
                        return;
                    }
                };

                let io = TokioIo::new(tls_stream);
                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { handle(state, req).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::debug!(peer = %peer, error = %e, "connection error");
                }
            });
        }
    }
}

/// Route one request. Shared by the self-managed server and the
/// embedded handle.
pub async fn handle<B>(
    state: Arc<ServiceState>,
    req: Request<B>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: hyper::body::Body,
{
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();
    let segments: Vec<&str> = path.trim_matches('/').splitn(3, '/').collect();

    let response = match (&parts.method, segments.as_slice()) {
        (&Method::GET, ["status"]) => status_response(&state),
        (&Method::GET, ["catalog", node]) => catalog_response(&state, node),
        (&Method::GET, ["file_content", mount, rest]) => {
            match state.file_server.content(mount, rest) {
                Ok(bytes) => raw_response(bytes),
                Err(e) => file_error_response(e),
            }
        }
        (&Method::GET, ["file_metadata", mount, rest]) => {
            match state.file_server.metadata(mount, rest) {
                Ok(meta) => json_response(
                    StatusCode::OK,
                    &serde_json::to_value(&meta).unwrap_or_default(),
                ),
                Err(e) => file_error_response(e),
            }
        }
        (&Method::PUT, ["file_bucket"]) => match body.collect().await {
            Ok(collected) => bucket_store_response(&state, &collected.to_bytes()),
            Err(_) => json_response(
                StatusCode::BAD_REQUEST,
                &serde_json::json!({"error": "failed to read request body"}),
            ),
        },
        (&Method::GET, ["file_bucket", digest]) => match state.bucket.retrieve(digest) {
            Ok(Some(bytes)) => raw_response(bytes),
            Ok(None) => not_found(),
            Err(e) => file_error_response(e),
        },
        _ => not_found(),
    };

    Ok(response)
}

fn status_response(state: &ServiceState) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "status": "running",
            "version": COMPILER_VERSION,
            "ca": state.ca_mode.as_str(),
        }),
    )
}

fn catalog_response(state: &ServiceState, node: &str) -> Response<Full<Bytes>> {
    match state.compiler.find_catalog(node, None) {
        Ok(Some(catalog)) => json_response(StatusCode::OK, &catalog.to_resource_view()),
        Ok(None) => json_response(
            StatusCode::NOT_FOUND,
            &serde_json::json!({"error": "node not found", "node": node}),
        ),
        Err(e) => {
            tracing::error!(node, error = %e, "catalog compilation failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &serde_json::json!({"error": "compilation failed"}),
            )
        }
    }
}

fn bucket_store_response(state: &ServiceState, bytes: &[u8]) -> Response<Full<Bytes>> {
    match state.bucket.store(bytes) {
        Ok(digest) => json_response(
            StatusCode::OK,
            &serde_json::json!({"checksum": format!("sha256:{digest}")}),
        ),
        Err(e) => {
            tracing::error!(error = %e, "file bucket write failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &serde_json::json!({"error": "bucket write failed"}),
            )
        }
    }
}

fn file_error_response(error: FileServingError) -> Response<Full<Bytes>> {
    let status = match error {
        FileServingError::UnknownMount(_) | FileServingError::NotFound(_) => {
            StatusCode::NOT_FOUND
        }
        FileServingError::IllegalPath(_) => StatusCode::BAD_REQUEST,
        FileServingError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_response(status, &serde_json::json!({"error": error.to_string()}))
}

fn json_response(status: StatusCode, body: &serde_json::Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

fn raw_response(bytes: Vec<u8>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/octet-stream")
        .body(Full::new(Bytes::from(bytes)))
        .unwrap()
}

fn not_found() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({"error": "not found"}),
    )
}
