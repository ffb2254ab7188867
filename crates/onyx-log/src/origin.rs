//! Origin manager (C8): CAS update of the replica snapshot node keyed by a
//! monotonic `message-id` (spec §3, §4.7).

use crate::client::{Backend, Client};
use crate::codec::Codec;
use crate::error::Result;
use crate::monitor::MonitorSink;
use crate::namespace::Paths;
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginSnapshot<R> {
    pub message_id: i64,
    pub replica: R,
}

pub struct OriginManager<'a, B: Backend, C: Codec, M: MonitorSink> {
    client: &'a Client<B, C, M>,
    paths: &'a Paths,
}

impl<'a, B: Backend, C: Codec, M: MonitorSink> OriginManager<'a, B, C, M> {
    pub fn new(client: &'a Client<B, C, M>, paths: &'a Paths) -> Self {
        Self { client, paths }
    }

    /// Reads the current origin snapshot (used by bootstrap and by
    /// subscriber re-seek; spec §4.5, §4.7).
    pub async fn read_origin<R: for<'de> Deserialize<'de>>(&self) -> Result<OriginSnapshot<R>> {
        let (bytes, _stat) = self.client.get_raw(&self.paths.origin()).await?;
        self.client.codec().decode(&bytes)
    }

    /// CAS-updates the origin snapshot, but only if `message_id` strictly
    /// exceeds the currently stored one (spec §3 invariant 2, §4.7).
    /// `BadVersion` from a losing CAS race is swallowed, not propagated —
    /// liveness is ensured because a future, higher `message_id` will win
    /// eventually (spec §7).
    pub async fn update_origin<R: Serialize + for<'de> Deserialize<'de>>(
        &self,
        replica: R,
        message_id: i64,
    ) -> Result<()> {
        let start = Instant::now();
        let node = self.paths.origin();

        let (bytes, stat) = self.client.get_raw(&node).await?;
        let current: OriginSnapshot<R> = self.client.codec().decode(&bytes)?;

        let result = if current.message_id < message_id {
            let updated = OriginSnapshot { message_id, replica };
            let encoded = self.client.codec().encode(&updated)?;
            match self.client.set_raw(&node, encoded, stat.version).await {
                Ok(_) => Ok(()),
                Err(crate::error::Error::BadVersion(_)) => Ok(()), // concurrent writer won
                Err(err) => Err(err),
            }
        } else {
            Ok(())
        };

        self.client
            .emit_timed("write_origin", start, None, None, Some(message_id), &result);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_round_trips_through_json() {
        let snap = OriginSnapshot {
            message_id: 7,
            replica: serde_json::json!({"a": 1}),
        };
        let json = serde_json::to_string(&snap).unwrap();
        let back: OriginSnapshot<serde_json::Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.message_id, 7);
    }
}
