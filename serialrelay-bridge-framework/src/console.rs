//! Shutdown requests from the console and from Ctrl+C.

use std::io::{ErrorKind, Read};

use tokio::signal;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Why console watching stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    /// A `q` or `Q` was read.
    Quit,
    /// End of input or an unrecoverable read error.
    Closed,
}

/// Read `reader` byte by byte until a case-insensitive `q` shows up.
pub fn wait_for_quit<R: Read>(mut reader: R) -> ConsoleExit {
    let mut buf = [0u8; 64];

    loop {
        match reader.read(&mut buf) {
            Ok(0) => return ConsoleExit::Closed,
            Ok(n) => {
                if buf[..n].iter().any(|b| b.eq_ignore_ascii_case(&b'q')) {
                    return ConsoleExit::Quit;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(error = %e, "Failed to read console input");
                return ConsoleExit::Closed;
            }
        }
    }
}

/// Resolve once the user asks the bridge to stop.
///
/// Stdin is read on a dedicated OS thread so a pending read never keeps the
/// runtime from shutting down. When stdin closes, Ctrl+C remains the only way
/// to stop.
pub async fn shutdown_signal() {
    let (tx, rx) = oneshot::channel();

    let spawned = std::thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            let exit = wait_for_quit(std::io::stdin().lock());
            let _ = tx.send(exit);
        });

    let console = async move {
        if let Err(e) = spawned {
            warn!(error = %e, "Failed to start console reader");
            return std::future::pending::<()>().await;
        }
        match rx.await {
            Ok(ConsoleExit::Quit) => info!("Quit requested from console"),
            Ok(ConsoleExit::Closed) | Err(_) => {
                debug!("Console input closed");
                info!("Console closed, press Ctrl+C to stop");
                std::future::pending::<()>().await
            }
        }
    };

    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await
            }
        }
    };

    tokio::select! {
        _ = console => {}
        _ = ctrl_c => {}
    }
}
