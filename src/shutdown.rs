use std::process;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Listens for Ctrl+C and SIGTERM and exits the process when either arrives
pub struct ShutdownManager {
    rx: mpsc::Receiver<()>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);

        let tx_clone = tx.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    let _ = tx_clone.send(()).await;
                }
                Err(err) => {
                    error!("error listening for ctrl+c: {}", err);
                }
            }
        });

        #[cfg(unix)]
        {
            let tx_clone = tx.clone();
            tokio::spawn(async move {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        let _ = tx_clone.send(()).await;
                    }
                    Err(err) => {
                        error!("failed to install SIGTERM handler: {}", err);
                    }
                }
            });
        }

        ShutdownManager { rx }
    }

    /// Drive `future` to completion unless a shutdown signal arrives first.
    ///
    /// Snapshots are written atomically, so exiting mid-scan only loses progress made since the
    /// last stored snapshot.
    pub async fn run_until_shutdown<F, T>(mut self, future: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        tokio::select! {
            _ = self.rx.recv() => {
                info!("shutdown signal received, exiting");
                process::exit(0);
            }
            result = future => result,
        }
    }
}
