//! SmartMarks RPC Server — JSON-RPC over stdin/stdout.
//!
//! Protocol: one JSON object per line (newline-delimited JSON).
//! Request:  {"id":1, "method":"organize.batch", "params":{}}
//! Response: {"id":1, "result":{...}} or {"id":1, "error":"..."}
//! Event:    {"event":"organize", "data":{"type":"progress", ...}}
//!
//! Requests run as local tasks, so `organize.pause` is answered while a batch
//! is still in flight. When stdin closes, a running batch is paused and the
//! open requests finish before the cache is flushed. Logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::{JoinSet, LocalSet};
use tracing::{error, info, warn};

use smartmarks::app::App;
use smartmarks::logging;
use smartmarks::rpc_handler::handle_method;
use smartmarks::services::event_sink::ChannelEventSink;

const DB_FILE: &str = "smartmarks.db";

/// Hourly sweep of expired classifications.
const EVICTION_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Simple rate limiter: max requests per one-second window.
struct RateLimiter {
    window_start: Instant,
    request_count: u32,
    max_per_second: u32,
}

impl RateLimiter {
    fn new(max_per_second: u32) -> Self {
        Self { window_start: Instant::now(), request_count: 0, max_per_second }
    }

    /// Returns true if the request is allowed, false if rate-limited.
    fn check(&mut self) -> bool {
        if self.window_start.elapsed().as_secs() >= 1 {
            self.window_start = Instant::now();
            self.request_count = 0;
        }
        self.request_count += 1;
        self.request_count <= self.max_per_second
    }
}

/// Prefers SMARTMARKS_DATA_DIR, falls back to the executable's directory.
fn database_path() -> PathBuf {
    if let Ok(dir) = std::env::var("SMARTMARKS_DATA_DIR") {
        PathBuf::from(dir).join(DB_FILE)
    } else if let Ok(exe) = std::env::current_exe() {
        exe.parent().unwrap_or(Path::new(".")).join(DB_FILE)
    } else {
        PathBuf::from(DB_FILE)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    logging::init_tracing();

    let db_path = database_path();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let app = match App::new(
        db_path.to_str().unwrap_or(DB_FILE),
        Arc::new(ChannelEventSink::new(event_tx)),
    ) {
        Ok(app) => Arc::new(app),
        Err(e) => {
            error!(error = %e, path = %db_path.display(), "failed to initialize SmartMarks");
            std::process::exit(1);
        }
    };
    app.startup();
    info!(path = %db_path.display(), "database opened");

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();

    let local = LocalSet::new();
    local
        .run_until(async move {
            // Single writer so responses and events never interleave mid-line.
            tokio::task::spawn_local(async move {
                let mut stdout = tokio::io::stdout();
                while let Some(message) = out_rx.recv().await {
                    let line = format!("{}\n", message);
                    if stdout.write_all(line.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
                        break;
                    }
                }
            });

            let events_out = out_tx.clone();
            tokio::task::spawn_local(async move {
                while let Some(event) = event_rx.recv().await {
                    let data = serde_json::to_value(&event).unwrap_or(Value::Null);
                    if events_out.send(json!({"event": "organize", "data": data})).is_err() {
                        break;
                    }
                }
            });

            let sweeper = app.clone();
            tokio::task::spawn_local(async move {
                let mut interval = tokio::time::interval(EVICTION_INTERVAL);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    sweeper.cache.evict_expired();
                }
            });

            let _ = out_tx.send(json!({"event": "ready", "version": env!("CARGO_PKG_VERSION")}));

            // Max 200 RPC requests per second
            let mut rate_limiter = RateLimiter::new(200);
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            let mut requests: JoinSet<()> = JoinSet::new();

            loop {
                let next = tokio::select! {
                    Some(done) = requests.join_next(), if !requests.is_empty() => {
                        if let Err(e) = done {
                            warn!(error = %e, "request task failed");
                        }
                        continue;
                    }
                    next = lines.next_line() => next,
                };
                let line = match next {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "stdin read failed");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }

                let req: Value = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(e) => {
                        let _ = out_tx.send(json!({"id": null, "error": format!("parse error: {}", e)}));
                        continue;
                    }
                };
                let id = req.get("id").cloned().unwrap_or(Value::Null);

                if !rate_limiter.check() {
                    let _ = out_tx.send(json!({"id": id, "error": "rate limit exceeded"}));
                    continue;
                }

                let method = req.get("method").and_then(|v| v.as_str()).unwrap_or("").to_string();
                let params = req.get("params").cloned().unwrap_or(json!({}));

                let app = app.clone();
                let out = out_tx.clone();
                requests.spawn_local(async move {
                    let response = match handle_method(&app, &method, &params).await {
                        Ok(val) => json!({"id": id, "result": val}),
                        Err(err) => json!({"id": id, "error": err}),
                    };
                    let _ = out.send(response);
                });
            }

            info!(in_flight = requests.len(), "stdin closed, shutting down");
            app.shutdown_after(requests).await;
        })
        .await;
}
