//! Serves the files of one directory with range support.
//!
//! ```sh
//! cargo run --example serve -- ./media
//! curl -i -H 'Range: bytes=0-99' http://localhost:3000/files/clip.mp4
//! ```
//!
//! Set `RESPONDER_CONFIG` to a JSON file to override cache lifetimes.

use std::io;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use axum_range_responder::{KnownSize, RangeRequest, RangeResponder, Ranged, ResourceDescriptor, ResponderConfig};
use tokio::fs::File;
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
struct AppState {
    root: Arc<PathBuf>,
    responder: RangeResponder,
}

#[tokio::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,axum_range_responder=debug")))
        .init();

    let root = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("test"));
    let config = match std::env::var_os("RESPONDER_CONFIG") {
        Some(path) => load_config(FsPath::new(&path))?,
        None => ResponderConfig::default(),
    };

    let state = AppState {
        root: Arc::new(root),
        responder: RangeResponder::new(config),
    };

    let router = Router::new()
        .route("/files/{name}", get(get_file).head(get_file))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!(root = %state.root.display(), addr = %listener.local_addr()?, "serving files");
    axum::serve(listener, router).await
}

fn load_config(path: &FsPath) -> io::Result<ResponderConfig> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

async fn get_file(
    State(state): State<AppState>,
    method: Method,
    Path(name): Path<String>,
    request: RangeRequest,
) -> Response {
    if name.contains(['/', '\\']) || name.starts_with('.') {
        return (StatusCode::BAD_REQUEST, "invalid file name").into_response();
    }

    let path = state.root.join(&name);
    let file = match File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return (StatusCode::NOT_FOUND, "file not found").into_response();
        }
        Err(e) => return internal_error(&path, e),
    };

    let descriptor = match file.metadata().await {
        Ok(metadata) => match ResourceDescriptor::from_metadata(&metadata, name) {
            Ok(descriptor) => descriptor,
            Err(e) => return internal_error(&path, e),
        },
        Err(e) => return internal_error(&path, e),
    };

    match KnownSize::file(file).await {
        Ok(body) => Ranged::new(descriptor, request, body)
            .responder(state.responder.clone())
            .head_only(method == Method::HEAD)
            .into_response(),
        Err(e) => internal_error(&path, e),
    }
}

fn internal_error(path: &FsPath, error: io::Error) -> Response {
    tracing::error!(path = %path.display(), %error, "failed to open file");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}
