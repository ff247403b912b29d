use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crossbeam_channel as channel;
use tracing::{debug, info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;
use tungstenite::HandshakeError;

use crate::analysis::{AnalyzerConfig, StreamAnalyzer};
use crate::cli::Listen;
use crate::metrics::{Counters, RateAverager};
use crate::net::http;
use crate::net::session::{serve, Session, SessionError};
use crate::state::SharedState;
use crate::tui::run_tui;
#[cfg(feature = "mdns")]
use libmdns as _mdns;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run_listen(listen: Listen) -> Result<()> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    {
        let stop = stop_flag.clone();
        let _ = ctrlc::set_handler(move || {
            stop.store(true, Ordering::Relaxed);
        });
    }

    run_listen_with_shutdown(listen, stop_flag)
}

/// Everything a connection thread needs. Cloned per connection.
#[derive(Clone)]
struct ConnContext {
    config: AnalyzerConfig,
    path: Arc<str>,
    allowed_origins: Arc<[String]>,
    shared: Arc<SharedState>,
    counters: Arc<Counters>,
    stop: Arc<AtomicBool>,
    events: Option<channel::Sender<String>>,
}

impl ConnContext {
    fn event(&self, msg: String) {
        if let Some(tx) = &self.events {
            let _ = tx.send(msg);
        }
    }
}

pub(crate) fn run_listen_with_shutdown(listen: Listen, stop_flag: Arc<AtomicBool>) -> Result<()> {
    let config = AnalyzerConfig::from(&listen.analyzer);
    config.validate().context("Invalid analyzer configuration")?;
    if !listen.path.starts_with('/') {
        bail!("WebSocket path must start with '/': {}", listen.path);
    }
    info!(host = %listen.host, path = %listen.path, "Starting pulsegw");

    let shared_state = Arc::new(SharedState::new());
    let counters = Arc::new(Counters::default());

    // Dashboard replaces console logging; connection events go to its event pane
    let (event_tx, tui_handle) = if listen.tui {
        let (tx, rx) = channel::unbounded::<String>();
        let shared_for_tui = Arc::clone(&shared_state);
        let counters_for_tui = Arc::clone(&counters);
        let stop_for_tui = stop_flag.clone();
        let handle = thread::spawn(move || {
            if let Err(e) = run_tui(shared_for_tui, counters_for_tui, rx, stop_for_tui.clone()) {
                warn!(?e, "Dashboard failed");
                stop_for_tui.store(true, Ordering::Relaxed);
            }
        });
        (Some(tx), Some(handle))
    } else {
        spawn_metrics_reporter(Arc::clone(&counters), Arc::clone(&shared_state), stop_flag.clone());
        (None, None)
    };

    let listener = TcpListener::bind(listen.host)
        .with_context(|| format!("Binding TCP listener at {}", listen.host))?;
    listener
        .set_nonblocking(true)
        .context("Setting TCP listener non-blocking mode")?;

    #[cfg(feature = "mdns")]
    let _mdns_guard = if listen.no_mdns { None } else { advertise(&listen) };

    let ctx = ConnContext {
        config,
        path: Arc::from(listen.path.as_str()),
        allowed_origins: Arc::from(listen.allow_origins.clone()),
        shared: Arc::clone(&shared_state),
        counters: Arc::clone(&counters),
        stop: stop_flag.clone(),
        events: event_tx,
    };

    let mut workers: Vec<JoinHandle<()>> = Vec::new();
    loop {
        if stop_flag.load(Ordering::Relaxed) {
            break;
        }
        let (stream, addr) = match listener.accept() {
            Ok(conn) => conn,
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                // avoid busy loop
                thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(e) => {
                warn!(?e, "Accept failed");
                continue;
            }
        };
        debug!(%addr, "Accepted connection");

        workers.retain(|h| !h.is_finished());
        let conn_ctx = ctx.clone();
        workers.push(thread::spawn(move || {
            if let Err(e) = handle_connection(stream, addr, &conn_ctx) {
                warn!(?e, %addr, "Connection failed");
            }
        }));
    }

    // Shutdown
    info!("Shutting down");
    for handle in workers {
        let _ = handle.join();
    }
    shared_state.dispose();
    if let Some(handle) = tui_handle {
        let _ = handle.join();
    }

    Ok(())
}

fn handle_connection(stream: TcpStream, addr: SocketAddr, ctx: &ConnContext) -> Result<()> {
    // Accepted sockets may inherit the listener's non-blocking mode
    stream.set_nonblocking(false).context("Setting connection blocking mode")?;
    if let Err(e) = stream.set_nodelay(true) {
        warn!(?e, %addr, "Failed to set TCP_NODELAY");
    }
    stream
        .set_read_timeout(Some(HANDSHAKE_TIMEOUT))
        .context("Setting handshake timeout")?;

    let Some(head) = http::peek_head(&stream, HANDSHAKE_TIMEOUT).context("Reading request head")? else {
        debug!(%addr, "Peer left before sending a request");
        return Ok(());
    };
    if !head.upgrade {
        debug!(%addr, method = %head.method, path = %head.path, "Plain HTTP request");
        http::respond(stream, &head, ctx.shared.len(), &ctx.allowed_origins)
            .context("Answering HTTP request")?;
        return Ok(());
    }

    let callback = |req: &Request, resp: Response| check_request(req, resp, &ctx.path, &ctx.allowed_origins);
    let mut ws = match tungstenite::accept_hdr(stream, callback) {
        Ok(ws) => ws,
        Err(HandshakeError::Failure(e)) => {
            debug!(?e, %addr, "Handshake refused");
            return Ok(());
        }
        Err(HandshakeError::Interrupted(_)) => bail!("WebSocket handshake timed out"),
    };
    ws.get_ref()
        .set_read_timeout(Some(POLL_INTERVAL))
        .context("Setting session poll interval")?;

    // One analyzer per connection, dropped with the session
    let analyzer = StreamAnalyzer::new(ctx.config).context("Creating analyzer")?;
    let mut session = Session::new(addr, analyzer);
    ctx.shared.insert(addr);
    ctx.counters.sessions_opened.fetch_add(1, Ordering::Relaxed);
    info!(%addr, "Session opened");
    ctx.event(format!("Connected: {addr}"));

    let result = serve(&mut ws, &mut session, &ctx.stop, &ctx.shared, &ctx.counters);
    ctx.shared.remove(&addr);

    let stats = session.stats();
    match result {
        Ok(()) => info!(
            addr = %session.addr(),
            samples = stats.samples,
            estimates = stats.estimates,
            "Session closed"
        ),
        Err(SessionError::Protocol(e)) => warn!(%addr, samples = stats.samples, error = %e, "Session ended on bad input"),
        Err(SessionError::Transport(e)) => warn!(%addr, samples = stats.samples, ?e, "Session transport failed"),
    }
    ctx.event(format!(
        "Disconnected: {addr} ({} samples, {} estimates)",
        stats.samples, stats.estimates
    ));
    Ok(())
}

fn check_request(req: &Request, resp: Response, path: &str, allowed_origins: &[String]) -> Result<Response, ErrorResponse> {
    if req.uri().path() != path {
        return Err(refusal(StatusCode::NOT_FOUND, "Not Found"));
    }
    let origin = req.headers().get("origin").and_then(|v| v.to_str().ok());
    if let Some(origin) = origin {
        if !super::origin_allowed(origin, allowed_origins) {
            return Err(refusal(StatusCode::FORBIDDEN, "Origin not allowed"));
        }
    }
    Ok(resp)
}

fn refusal(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut resp = ErrorResponse::new(Some(reason.to_string()));
    *resp.status_mut() = status;
    resp
}

fn spawn_metrics_reporter(counters: Arc<Counters>, shared: Arc<SharedState>, stop: Arc<AtomicBool>) {
    thread::spawn(move || {
        let mut samples = RateAverager::new(5.0);
        let mut estimates = RateAverager::new(5.0);
        let mut last_samples = 0u64;
        let mut last_estimates = 0u64;
        let mut last = std::time::Instant::now();
        while !stop.load(Ordering::Relaxed) {
            // Short sleeps keep shutdown responsive
            for _ in 0..25 {
                if stop.load(Ordering::Relaxed) {
                    return;
                }
                thread::sleep(POLL_INTERVAL);
            }
            let now = std::time::Instant::now();
            let dt = now.duration_since(last).as_secs_f64();
            last = now;
            let s = counters.samples_in.load(Ordering::Relaxed);
            let e = counters.estimates_out.load(Ordering::Relaxed);
            let sps = samples.update(s - last_samples, dt);
            let eps = estimates.update(e - last_estimates, dt);
            last_samples = s;
            last_estimates = e;
            info!(
                samples_per_sec = (sps * 10.0).round() / 10.0,
                estimates_per_sec = (eps * 10.0).round() / 10.0,
                sessions = shared.len(),
                "Throughput"
            );
        }
    });
}

#[cfg(feature = "mdns")]
fn advertise(listen: &Listen) -> Option<(_mdns::Responder, _mdns::Service)> {
    match _mdns::Responder::new() {
        Ok(responder) => {
            let txt = format!("path={}", listen.path);
            let service = responder.register(
                "_pulsegw._tcp".to_string(),
                "pulsegw".to_string(),
                listen.host.port(),
                &[txt.as_str()],
            );
            Some((responder, service))
        }
        Err(e) => {
            warn!(error = ?e, "mDNS responder init failed; continuing without mDNS");
            None
        }
    }
}
