use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::analysis::{self, AnalyzerConfig};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Accept PPG streams over WebSocket and answer with heart-rate estimates
    Listen(Listen),
    /// Stream a synthetic PPG signal to a running gateway
    Simulate(Simulate),
    /// Run the analyzer over newline-delimited JSON samples
    Replay(Replay),
}

#[derive(Parser, Clone, Debug)]
pub struct Listen {
    /// TCP listen address
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub host: SocketAddr,

    /// WebSocket endpoint path
    #[arg(long, default_value = "/ws/heartrate")]
    pub path: String,

    /// Allowed browser origin (repeatable); none or "*" admits any origin
    #[arg(long = "allow-origin", value_name = "ORIGIN")]
    pub allow_origins: Vec<String>,

    /// Show the live session dashboard instead of console logs
    #[arg(long)]
    pub tui: bool,

    /// Skip mDNS advertisement
    #[arg(long)]
    pub no_mdns: bool,

    #[command(flatten)]
    pub analyzer: AnalyzerArgs,
}

#[derive(Args, Clone, Debug)]
pub struct AnalyzerArgs {
    /// Sliding window capacity in samples
    #[arg(long, default_value_t = analysis::DEFAULT_CAPACITY)]
    pub capacity: usize,

    /// Samples required before estimating
    #[arg(long, default_value_t = analysis::DEFAULT_MIN_SAMPLES)]
    pub min_samples: usize,

    /// Moving-average width
    #[arg(long, default_value_t = analysis::DEFAULT_SMOOTHING_WINDOW)]
    pub window: usize,

    /// Lowest plausible heart rate
    #[arg(long, default_value_t = analysis::DEFAULT_MIN_BPM)]
    pub min_bpm: f64,

    /// Highest plausible heart rate
    #[arg(long, default_value_t = analysis::DEFAULT_MAX_BPM)]
    pub max_bpm: f64,
}

impl Default for AnalyzerArgs {
    fn default() -> Self {
        let c = AnalyzerConfig::default();
        Self {
            capacity: c.capacity,
            min_samples: c.min_samples,
            window: c.smoothing_window,
            min_bpm: c.min_bpm,
            max_bpm: c.max_bpm,
        }
    }
}

impl From<&AnalyzerArgs> for AnalyzerConfig {
    fn from(a: &AnalyzerArgs) -> Self {
        AnalyzerConfig {
            capacity: a.capacity,
            min_samples: a.min_samples,
            smoothing_window: a.window,
            min_bpm: a.min_bpm,
            max_bpm: a.max_bpm,
        }
    }
}

#[derive(Parser, Clone, Debug)]
pub struct Simulate {
    /// Gateway WebSocket URL
    #[arg(long, default_value = "ws://127.0.0.1:8000/ws/heartrate")]
    pub url: String,

    /// Heart rate of the synthetic pulse
    #[arg(long, default_value_t = 72.0)]
    pub bpm: f64,

    /// Samples per second
    #[arg(long, default_value_t = 30.0)]
    pub rate: f64,

    /// Stream duration in seconds
    #[arg(long, default_value_t = 10.0)]
    pub seconds: f64,

    /// Pulse amplitude
    #[arg(long, default_value_t = 10.0)]
    pub amplitude: f64,

    /// Constant baseline added to every sample
    #[arg(long, default_value_t = 0.0)]
    pub offset: f64,

    /// Peak amplitude of uniform noise
    #[arg(long, default_value_t = 0.0)]
    pub noise: f64,

    /// Noise seed (random when omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Send as fast as possible instead of pacing at --rate
    #[arg(long)]
    pub fast: bool,
}

#[derive(Parser, Clone, Debug)]
pub struct Replay {
    /// Input file with one JSON sample per line (stdin when omitted)
    pub input: Option<PathBuf>,

    #[command(flatten)]
    pub analyzer: AnalyzerArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_defaults() {
        let cli = Cli::parse_from(["pulsegw", "listen"]);
        let Some(Commands::Listen(l)) = cli.command else { panic!("expected listen") };
        assert_eq!(l.host, "127.0.0.1:8000".parse::<SocketAddr>().unwrap());
        assert_eq!(l.path, "/ws/heartrate");
        assert!(l.allow_origins.is_empty());
        assert_eq!(AnalyzerConfig::from(&l.analyzer), AnalyzerConfig::default());
    }

    #[test]
    fn analyzer_flags_are_shared() {
        let cli = Cli::parse_from([
            "pulsegw", "replay", "in.jsonl", "--window", "7", "--min-bpm", "30", "--capacity", "600",
        ]);
        let Some(Commands::Replay(r)) = cli.command else { panic!("expected replay") };
        assert_eq!(r.input, Some(PathBuf::from("in.jsonl")));
        let cfg = AnalyzerConfig::from(&r.analyzer);
        assert_eq!(cfg.smoothing_window, 7);
        assert_eq!(cfg.min_bpm, 30.0);
        assert_eq!(cfg.capacity, 600);
        assert_eq!(cfg.min_samples, 100);
    }

    #[test]
    fn repeated_origins() {
        let cli = Cli::parse_from([
            "pulsegw", "listen", "--allow-origin", "https://a.example", "--allow-origin", "https://b.example",
        ]);
        let Some(Commands::Listen(l)) = cli.command else { panic!("expected listen") };
        assert_eq!(l.allow_origins.len(), 2);
    }
}
