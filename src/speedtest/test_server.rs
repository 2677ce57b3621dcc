//! Local HTTP server for transfer tests.
//!
//! Routes:
//! - `GET /bytes/{size}` streams `size` zero bytes in paced chunks
//! - `POST /upload` accepts any body
//! - `GET|POST /status/{code}` answers with the given status
//! - `GET /slow/{ms}` answers 200 after a delay

use crate::speedtest::endpoints::Endpoint;
use crate::speedtest::probe::split_sizes;
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use futures::{stream, StreamExt};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Chunks a download body is streamed in.
const BODY_CHUNKS: usize = 8;

/// Pause before each body chunk and before each upload answer. Keeps local
/// transfers below the plausibility ceiling.
const PACE: Duration = Duration::from_millis(5);

#[derive(Default)]
struct Counters {
    requests: AtomicUsize,
    received: AtomicU64,
}

pub(crate) struct TestServer {
    addr: SocketAddr,
    counters: Arc<Counters>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let counters = Arc::new(Counters::default());

        let app = Router::new()
            .route("/bytes/{size}", get(stream_bytes))
            .route("/upload", post(accept_upload))
            .route("/status/{code}", get(status).post(status))
            .route("/slow/{ms}", get(slow))
            .layer(DefaultBodyLimit::disable())
            .with_state(Arc::clone(&counters));

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, counters }
    }

    /// Endpoint for a path on this server, e.g. `/bytes/{bytes}`.
    pub fn endpoint(&self, path: &str) -> Endpoint {
        Endpoint::new(format!("http://{}{}", self.addr, path)).unwrap()
    }

    /// Requests answered by the transfer routes.
    pub fn requests(&self) -> usize {
        self.counters.requests.load(Ordering::SeqCst)
    }

    /// Upload body bytes received.
    pub fn received(&self) -> u64 {
        self.counters.received.load(Ordering::SeqCst)
    }
}

async fn stream_bytes(
    State(counters): State<Arc<Counters>>,
    Path(size): Path<u64>,
) -> Body {
    counters.requests.fetch_add(1, Ordering::SeqCst);

    let chunks = stream::iter(split_sizes(size, BODY_CHUNKS)).then(|len| async move {
        sleep(PACE).await;
        Ok::<_, Infallible>(Bytes::from(vec![0u8; len as usize]))
    });

    Body::from_stream(chunks)
}

async fn accept_upload(
    State(counters): State<Arc<Counters>>,
    body: Bytes,
) -> StatusCode {
    counters.requests.fetch_add(1, Ordering::SeqCst);
    counters.received.fetch_add(body.len() as u64, Ordering::SeqCst);

    sleep(PACE * 4).await;
    StatusCode::OK
}

async fn status(
    State(counters): State<Arc<Counters>>,
    Path(code): Path<u16>,
    _body: Bytes,
) -> StatusCode {
    counters.requests.fetch_add(1, Ordering::SeqCst);
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn slow(Path(ms): Path<u64>) -> StatusCode {
    sleep(Duration::from_millis(ms)).await;
    StatusCode::OK
}
