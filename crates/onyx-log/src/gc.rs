//! Garbage collection (C10): deletes a single log entry by position, once
//! the origin snapshot has advanced past it (spec §4.9).

use crate::client::{Backend, Client};
use crate::codec::Codec;
use crate::error::Result;
use crate::monitor::MonitorSink;
use crate::namespace::Paths;
use std::time::Instant;

pub struct GarbageCollector<'a, B: Backend, C: Codec, M: MonitorSink> {
    client: &'a Client<B, C, M>,
    paths: &'a Paths,
}

impl<'a, B: Backend, C: Codec, M: MonitorSink> GarbageCollector<'a, B, C, M> {
    pub fn new(client: &'a Client<B, C, M>, paths: &'a Paths) -> Self {
        Self { client, paths }
    }

    /// Deletes `P/log/entry-<pad10(position)>`. Callers are responsible for
    /// the GC precondition of spec §3 invariant 3 (origin's `message-id`
    /// already `>= position`); subscribers tolerate deletion of positions
    /// they haven't reached via the re-seek protocol (spec §4.5, §4.9).
    pub async fn gc_log_entry(&self, position: i64) -> Result<()> {
        let start = Instant::now();
        let node = self.paths.log_entry(position);
        let result = self.client.delete(&node).await;
        self.client
            .emit_timed("gc_log_entry", start, None, None, Some(position), &result);
        result
    }
}
