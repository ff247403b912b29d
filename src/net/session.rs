use std::borrow::Cow;
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::CloseFrame;
use tungstenite::{Message, WebSocket};

use crate::analysis::StreamAnalyzer;
use crate::metrics::Counters;
use crate::protocol::{decode_sample, encode_estimate, EstimateMessage, ProtocolError};
use crate::state::{SessionStats, SharedState};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("websocket transport: {0}")]
    Transport(#[from] tungstenite::Error),
}

/// One connected stream. Owns its analyzer for the lifetime of the connection.
pub struct Session {
    addr: SocketAddr,
    analyzer: StreamAnalyzer,
    stats: SessionStats,
}

impl Session {
    pub fn new(addr: SocketAddr, analyzer: StreamAnalyzer) -> Self {
        Self {
            addr,
            analyzer,
            stats: SessionStats::default(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Decode one inbound frame and run it through the analyzer.
    pub fn handle_text(&mut self, text: &str) -> Result<Option<EstimateMessage>, ProtocolError> {
        let sample = decode_sample(text)?;
        let estimate = self.analyzer.ingest(sample.red_value, sample.timestamp);
        self.stats.samples += 1;
        self.stats.phase = self.analyzer.phase();
        if let Some(est) = estimate {
            self.stats.estimates += 1;
            self.stats.last_bpm = Some(est.bpm);
        }
        Ok(estimate.map(EstimateMessage::from))
    }
}

pub fn close_frame(err: &ProtocolError) -> CloseFrame<'static> {
    let (code, reason) = match err {
        ProtocolError::BinaryFrame => (CloseCode::Unsupported, "binary frames are not supported"),
        ProtocolError::Json(_) | ProtocolError::NonFinite { .. } => (CloseCode::Invalid, "malformed sample"),
    };
    CloseFrame { code, reason: Cow::Borrowed(reason) }
}

/// Receive -> ingest -> respond until the peer leaves, the stop flag is set,
/// or the stream misbehaves. The underlying socket must have a read timeout
/// so the stop flag gets polled.
pub fn serve<S: Read + Write>(
    ws: &mut WebSocket<S>,
    session: &mut Session,
    stop: &AtomicBool,
    shared: &SharedState,
    counters: &Counters,
) -> Result<(), SessionError> {
    while !stop.load(Ordering::Relaxed) {
        let frame = match ws.read() {
            Ok(frame) => frame,
            Err(e) if super::is_timeout(&e) => continue,
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let reply = match frame {
            Message::Text(text) => session.handle_text(&text),
            Message::Binary(_) => Err(ProtocolError::BinaryFrame),
            // Close replies are queued by tungstenite; the next read reports ConnectionClosed.
            _ => continue,
        };
        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                shutdown(ws, Some(close_frame(&err)));
                return Err(err.into());
            }
        };
        counters.record_sample(reply.is_some());
        shared.update(&session.addr, session.stats.clone());
        if let Some(msg) = reply {
            ws.send(Message::Text(encode_estimate(&msg)?))?;
        }
    }
    shutdown(ws, None);
    Ok(())
}

/// Send a close frame and wait briefly for the peer's acknowledgement.
fn shutdown<S: Read + Write>(ws: &mut WebSocket<S>, frame: Option<CloseFrame<'static>>) {
    if ws.close(frame).is_err() {
        return;
    }
    for _ in 0..10 {
        match ws.read() {
            Ok(_) => {}
            Err(e) if super::is_timeout(&e) => {}
            Err(_) => break,
        }
    }
}
