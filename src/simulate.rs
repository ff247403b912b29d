use std::net::TcpStream;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, info};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::analysis::Sample;
use crate::cli::Simulate;
use crate::net::is_timeout;
use crate::protocol::{EstimateMessage, SampleMessage};

/// Sine-shaped pulse wave with optional baseline and uniform noise.
pub struct SyntheticPpg {
    beat_hz: f64,
    rate: f64,
    amplitude: f64,
    offset: f64,
    noise: f64,
    rng: StdRng,
    index: u64,
}

impl SyntheticPpg {
    pub fn new(sim: &Simulate) -> Self {
        let rng = match sim.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            beat_hz: sim.bpm / 60.0,
            rate: sim.rate,
            amplitude: sim.amplitude,
            offset: sim.offset,
            noise: sim.noise,
            rng,
            index: 0,
        }
    }
}

impl Iterator for SyntheticPpg {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        let t = self.index as f64 / self.rate;
        self.index += 1;
        let mut value = self.offset + self.amplitude * (2.0 * std::f64::consts::PI * self.beat_hz * t).sin();
        if self.noise > 0.0 {
            value += self.rng.gen_range(-self.noise..=self.noise);
        }
        Some(Sample::new(value, t))
    }
}

fn validate(sim: &Simulate) -> Result<()> {
    if !(sim.rate.is_finite() && sim.rate > 0.0) {
        bail!("--rate must be positive, got {}", sim.rate);
    }
    if !(sim.seconds.is_finite() && sim.seconds >= 0.0) {
        bail!("--seconds must be non-negative, got {}", sim.seconds);
    }
    if !(sim.bpm.is_finite() && sim.bpm > 0.0) {
        bail!("--bpm must be positive, got {}", sim.bpm);
    }
    if !(sim.noise.is_finite() && sim.noise >= 0.0) {
        bail!("--noise must be non-negative, got {}", sim.noise);
    }
    Ok(())
}

type Client = WebSocket<MaybeTlsStream<TcpStream>>;

/// Read every reply already waiting. Returns false once the server closed.
fn drain_replies(ws: &mut Client, received: &mut Vec<EstimateMessage>) -> Result<bool> {
    loop {
        match ws.read() {
            Ok(Message::Text(text)) => {
                let msg: EstimateMessage =
                    serde_json::from_str(&text).with_context(|| format!("Decoding reply {text}"))?;
                println!("{}", serde_json::to_string(&msg)?);
                received.push(msg);
            }
            Ok(Message::Close(frame)) => {
                debug!(?frame, "Server closed the stream");
                return Ok(false);
            }
            Ok(_) => {}
            Err(e) if is_timeout(&e) => return Ok(true),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => return Ok(false),
            Err(e) => return Err(e).context("Reading from gateway"),
        }
    }
}

fn set_read_timeout(ws: &Client, timeout: Duration) -> Result<()> {
    if let MaybeTlsStream::Plain(s) = ws.get_ref() {
        s.set_read_timeout(Some(timeout)).context("Setting client read timeout")?;
    }
    Ok(())
}

pub fn run_simulate(sim: Simulate) -> Result<()> {
    validate(&sim)?;
    let total = (sim.seconds * sim.rate).round() as usize;
    let (mut ws, _) = tungstenite::connect(sim.url.as_str())
        .with_context(|| format!("Connecting to {}", sim.url))?;
    info!(url = %sim.url, bpm = sim.bpm, rate = sim.rate, samples = total, "Streaming synthetic PPG");
    set_read_timeout(&ws, Duration::from_millis(1))?;

    let pace = Duration::from_secs_f64(1.0 / sim.rate);
    let mut received = Vec::new();
    let mut open = true;
    for sample in SyntheticPpg::new(&sim).take(total) {
        let msg = SampleMessage {
            red_value: sample.value,
            timestamp: sample.timestamp,
        };
        ws.send(Message::Text(serde_json::to_string(&msg)?))
            .context("Sending sample")?;
        open = drain_replies(&mut ws, &mut received)?;
        if !open {
            break;
        }
        if !sim.fast {
            std::thread::sleep(pace);
        }
    }

    if open {
        // Pick up replies to the last few samples
        set_read_timeout(&ws, Duration::from_millis(500))?;
        if drain_replies(&mut ws, &mut received)? {
            let _ = ws.close(None);
            let _ = drain_replies(&mut ws, &mut received);
        }
    }

    info!(
        sent = total,
        estimates = received.len(),
        last_bpm = ?received.last().map(|m| m.heart_rate),
        "Simulation finished"
    );
    Ok(())
}
