//! Pulse / membership (C9): ephemeral liveness nodes and deletion watches
//! (spec §4.8).

use crate::client::{Backend, Client};
use crate::codec::Codec;
use crate::error::Result;
use crate::monitor::MonitorSink;
use crate::namespace::Paths;
use std::time::Instant;
use tokio::sync::mpsc;

pub struct PulseRegistry<'a, B: Backend, C: Codec, M: MonitorSink> {
    client: &'a Client<B, C, M>,
    paths: &'a Paths,
}

impl<'a, B: Backend, C: Codec, M: MonitorSink> PulseRegistry<'a, B, C, M> {
    pub fn new(client: &'a Client<B, C, M>, paths: &'a Paths) -> Self {
        Self { client, paths }
    }

    /// Registers an ephemeral liveness node for `peer_id`. The node
    /// disappears automatically when this peer's session ends.
    pub async fn register_pulse(&self, peer_id: &str) -> Result<()> {
        let start = Instant::now();
        let node = self.paths.pulse(peer_id);
        let result = self.client.create(&node, None, false, false).await;
        self.client.emit_timed(
            "register_pulse",
            start,
            None,
            Some(peer_id.to_string()),
            None,
            &result,
        );
        result.map(|_| ())
    }

    pub async fn group_exists(&self, peer_id: &str) -> Result<bool> {
        Ok(self
            .client
            .exists(&self.paths.pulse(peer_id), None)
            .await?
            .is_some())
    }

    /// Arranges for `true` to be enqueued onto `out_channel` exactly once,
    /// when `peer_id`'s pulse node is deleted, or immediately if the node
    /// is already absent (including on error reading it), per spec §4.8
    /// and the "fires exactly once" invariant of spec §8 property 5.
    pub async fn on_delete(&self, peer_id: &str, out_channel: mpsc::Sender<bool>) {
        let node = self.paths.pulse(peer_id);
        loop {
            match self.client.exists_watch(&node).await {
                Ok((None, _)) => {
                    let _ = out_channel.send(true).await;
                    return;
                }
                Ok((Some(_), watch)) => {
                    if !watch.fired().await {
                        let _ = out_channel.send(true).await;
                        return;
                    }
                    // The watch fires on any change to the node, not only a
                    // deletion; loop and re-check before declaring it gone.
                }
                Err(_) => {
                    let _ = out_channel.send(true).await;
                    return;
                }
            }
        }
    }
}
