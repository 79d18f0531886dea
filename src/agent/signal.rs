//! Forwarding of process termination signals
use log::debug;
use std::fmt;
use tokio::sync::mpsc;

use crate::error::Result;

/// A request from outside the process to shut down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationSignal::Interrupt => f.write_str("SIGINT"),
            TerminationSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Listen for SIGINT and SIGTERM, forwarding every delivery
#[cfg(unix)]
pub fn listen() -> Result<mpsc::Receiver<TerminationSignal>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let (tx, rx) = mpsc::channel(4);

    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = interrupt.recv() => TerminationSignal::Interrupt,
                Some(()) = terminate.recv() => TerminationSignal::Terminate,
                else => break,
            };

            debug!("Caught {}", received);
            if tx.send(received).await.is_err() {
                break;
            }
        }
    });

    Ok(rx)
}

/// Listen for Ctrl-C, forwarding every delivery
#[cfg(not(unix))]
pub fn listen() -> Result<mpsc::Receiver<TerminationSignal>> {
    use log::error;

    let (tx, rx) = mpsc::channel(4);

    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                break;
            }

            debug!("Caught {}", TerminationSignal::Interrupt);
            if tx.send(TerminationSignal::Interrupt).await.is_err() {
                break;
            }
        }
    });

    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(TerminationSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(TerminationSignal::Terminate.to_string(), "SIGTERM");
    }

    #[tokio::test]
    async fn test_listen_registers_handlers() {
        assert!(listen().is_ok());
    }
}
