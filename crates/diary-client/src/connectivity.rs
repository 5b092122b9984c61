//! Wallet connectivity monitor
//!
//! Connection state only moves through [`transition`], a pure function over
//! wallet events. The monitor publishes the current state on a watch channel;
//! a background probe feeds it account checks on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use diary_core::{NetworkId, NetworkKind};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::rpc::{self, ChainRpc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Reconnecting,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub show_reconnect_prompt: bool,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            show_reconnect_prompt: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletEvent {
    WalletConnected,
    WalletReconnecting,
    WalletDisconnected,
    NetworkChanged(NetworkId),
    /// Liveness probe saw this many exposed accounts
    AccountsProbed(usize),
    ProbeFailed,
    ReconnectRequested,
    /// Result of the transport availability check during a manual reconnect
    TransportChecked(bool),
}

pub fn transition(state: ConnectionState, event: &WalletEvent) -> ConnectionState {
    use ConnectionStatus::*;

    let disconnected = ConnectionState {
        status: Disconnected,
        show_reconnect_prompt: true,
    };

    match *event {
        WalletEvent::WalletConnected => ConnectionState {
            status: Connected,
            show_reconnect_prompt: false,
        },
        WalletEvent::WalletReconnecting => ConnectionState {
            status: Reconnecting,
            ..state
        },
        WalletEvent::WalletDisconnected => disconnected,
        WalletEvent::NetworkChanged(id) => ConnectionState {
            show_reconnect_prompt: state.show_reconnect_prompt || NetworkKind::of(id).is_none(),
            ..state
        },
        // The wallet adapter owns reconnection while accounts are visible
        WalletEvent::AccountsProbed(n) if n > 0 => state,
        WalletEvent::AccountsProbed(_) | WalletEvent::ProbeFailed => disconnected,
        WalletEvent::ReconnectRequested => ConnectionState {
            status: Reconnecting,
            ..state
        },
        WalletEvent::TransportChecked(false) => disconnected,
        WalletEvent::TransportChecked(true) => state,
    }
}

/// Shared connection state, cheap to clone
#[derive(Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<ConnectionState>>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityMonitor {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Apply one event and return the resulting state
    pub fn handle(&self, event: WalletEvent) -> ConnectionState {
        self.tx.send_modify(|state| {
            let next = transition(*state, &event);
            if next != *state {
                tracing::debug!(?event, from = ?state.status, to = ?next.status, "Connection state changed");
            }
            *state = next;
        });
        self.state()
    }

    pub fn state(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }
}

/// Background liveness probe; aborted when dropped
pub struct ProbeHandle {
    task: JoinHandle<()>,
}

impl Drop for ProbeHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn spawn_liveness_probe<R>(
    monitor: ConnectivityMonitor,
    rpc: R,
    interval: Duration,
) -> ProbeHandle
where
    R: ChainRpc + 'static,
{
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let event = match rpc::accounts(&rpc).await {
                Ok(accounts) => WalletEvent::AccountsProbed(accounts.len()),
                Err(err) => {
                    tracing::warn!(error = %err, "Wallet liveness probe failed");
                    WalletEvent::ProbeFailed
                }
            };
            monitor.handle(event);
        }
    });
    ProbeHandle { task }
}

/// Manual reconnect: go optimistic, then check the transport answers
pub async fn reconnect<R: ChainRpc>(monitor: &ConnectivityMonitor, rpc: &R) -> ConnectionState {
    monitor.handle(WalletEvent::ReconnectRequested);
    let available = match rpc::chain_id(rpc).await {
        Ok(chain_id) => {
            tracing::debug!(chain_id, "Wallet transport available");
            true
        }
        Err(err) => {
            tracing::warn!(error = %err, "Wallet transport unavailable");
            false
        }
    };
    monitor.handle(WalletEvent::TransportChecked(available))
}
