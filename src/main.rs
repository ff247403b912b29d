mod analysis;
mod cli;
mod metrics;
mod net;
mod protocol;
mod replay;
mod simulate;
mod state;
mod tui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::net::server::run_listen;
use crate::replay::run_replay;
use crate::simulate::run_simulate;

fn main() {
    let cli = Cli::parse();

    // The dashboard owns the terminal; skip console logging under it.
    let dashboard = matches!(&cli.command, Some(Commands::Listen(l)) if l.tui);
    if !dashboard {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init()
            .ok();
    }

    let result: Result<()> = match cli.command {
        Some(Commands::Listen(listen)) => run_listen(listen),
        Some(Commands::Simulate(sim)) => run_simulate(sim),
        Some(Commands::Replay(replay)) => run_replay(replay),
        None => {
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(err) = result {
        // Map to stable exit codes
        let code = exit_code_for_error(&err);
        eprintln!("error: {err:?}");
        std::process::exit(code);
    }
}

fn exit_code_for_io(err: &std::io::Error) -> i32 {
    use std::io::ErrorKind::*;
    match err.kind() {
        AddrInUse | AddrNotAvailable | PermissionDenied | ConnectionRefused | ConnectionAborted | ConnectionReset => 4,
        _ => 1,
    }
}

pub(crate) fn exit_code_for_error(err: &anyhow::Error) -> i32 {
    // 2: invalid configuration, 4: bind/connect failure, 5: websocket failure, 1: other
    for cause in err.chain() {
        if cause.is::<crate::analysis::ConfigError>() {
            return 2;
        }
        if let Some(wse) = cause.downcast_ref::<tungstenite::Error>() {
            return match wse {
                tungstenite::Error::Io(ioe) => exit_code_for_io(ioe),
                _ => 5,
            };
        }
        if let Some(ioe) = cause.downcast_ref::<std::io::Error>() {
            return exit_code_for_io(ioe);
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn exit_code_invalid_config() {
        let err = anyhow::Error::from(crate::analysis::ConfigError::ZeroWindow).context("Invalid analyzer configuration");
        assert_eq!(exit_code_for_error(&err), 2);
    }

    #[test]
    fn exit_code_bind_like_io_error() {
        let err = anyhow::Error::from(std::io::Error::from(std::io::ErrorKind::AddrInUse));
        assert_eq!(exit_code_for_error(&err), 4);
    }

    #[test]
    fn exit_code_refused_websocket_connect() {
        let res: std::result::Result<(), _> =
            Err(tungstenite::Error::Io(std::io::ErrorKind::ConnectionRefused.into()));
        let err = res.context("Connecting").unwrap_err();
        assert_eq!(exit_code_for_error(&err), 4);
    }

    #[test]
    fn exit_code_websocket_protocol_error() {
        let err = anyhow::Error::from(tungstenite::Error::ConnectionClosed);
        assert_eq!(exit_code_for_error(&err), 5);
    }

    #[test]
    fn exit_code_other() {
        let err = anyhow::anyhow!("other");
        assert_eq!(exit_code_for_error(&err), 1);
    }
}
