//! Log writer (C5): appends an entry at the next sequentially-numbered
//! child of the log root (spec §4.4). Ordering is delegated entirely to the
//! coordination service's sequential-node semantics — there is no
//! in-process coordination here.

use crate::client::{Backend, Client};
use crate::codec::Codec;
use crate::error::Result;
use crate::monitor::MonitorSink;
use crate::namespace::Paths;
use serde::Serialize;
use std::time::Instant;

pub struct LogWriter<'a, B: Backend, C: Codec, M: MonitorSink> {
    client: &'a Client<B, C, M>,
    paths: &'a Paths,
}

impl<'a, B: Backend, C: Codec, M: MonitorSink> LogWriter<'a, B, C, M> {
    pub fn new(client: &'a Client<B, C, M>, paths: &'a Paths) -> Self {
        Self { client, paths }
    }

    /// Appends `value` to the log, returning the coordination service's
    /// generated path (its suffix is the newly-assigned `message-id`).
    pub async fn write_log_entry<V: Serialize>(&self, value: &V) -> Result<String> {
        let start = Instant::now();
        let bytes = self.client.codec().encode(value)?;
        let len = bytes.len();

        let result = self
            .client
            .create(&self.paths.log_entry_prefix(), Some(bytes), true, true)
            .await;

        self.client
            .emit_timed("write_log_entry", start, Some(len), None, None, &result);

        result
    }
}
