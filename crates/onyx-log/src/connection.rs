//! Connection lifecycle manager (C3): initial connect, a connection-state
//! listener, and a reconnect driver that blocks until reconnected, exposing
//! a "connected" gate to the rest of the crate (spec §4.2, §5).

use crate::client::{Backend, ConnectionState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const CONNECT_ATTEMPT: Duration = Duration::from_secs(5);

/// Owns the background reconnect task and the "connected" gate. Dropping
/// this (or calling [`Lifecycle::shutdown`]) cancels the task.
pub struct Lifecycle {
    connected_rx: watch::Receiver<bool>,
    kill: watch::Sender<bool>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl Lifecycle {
    /// Starts the lifecycle manager: blocks (in 5-second attempts) until the
    /// backend reports connected, then spawns the background reconnect
    /// driver (spec §4.2).
    pub async fn start<B: Backend>(backend: Arc<B>) -> Self {
        while !backend.block_until_connected(CONNECT_ATTEMPT).await {
            tracing::warn!("still waiting for initial connection to the coordination service");
        }

        let (connected_tx, connected_rx) = watch::channel(true);
        let (kill, mut kill_rx) = watch::channel(false);
        let mut states = backend.connection_states();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = kill_rx.changed() => {
                        if *kill_rx.borrow() {
                            tracing::debug!("reconnect driver received shutdown signal");
                            return;
                        }
                    }
                    state = states.recv() => {
                        match state {
                            Some(ConnectionState::Lost) => {
                                tracing::warn!("lost connection to the coordination service, reconnecting");
                                let _ = connected_tx.send(false);
                                while !backend.block_until_connected(CONNECT_ATTEMPT).await {}
                                tracing::info!("reconnected to the coordination service");
                                let _ = connected_tx.send(true);
                            }
                            Some(ConnectionState::Reconnected) | Some(ConnectionState::Connected) => {
                                let _ = connected_tx.send(true);
                            }
                            None => {
                                // Backend closed its listener channel; nothing more to drive.
                                return;
                            }
                        }
                    }
                }
            }
        });

        Self {
            connected_rx,
            kill,
            task: Some(task),
        }
    }

    /// A gate other components can await: resolves once the backend is
    /// (again) connected.
    pub async fn wait_connected(&mut self) {
        while !*self.connected_rx.borrow() {
            if self.connected_rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.connected_rx.borrow()
    }

    /// Removes the listener, cancels the background task, leaving closing
    /// the backend itself to the caller (spec §4.2 "Shutdown removes the
    /// listener, cancels the background task, and closes the client if
    /// started").
    pub async fn shutdown(mut self) {
        let _ = self.kill.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        let _ = self.kill.send(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
