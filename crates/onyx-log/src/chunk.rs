//! Chunk store (C7): typed write/read of named artifacts under per-kind
//! subtrees (spec §3, §4.6). Re-architected per the REDESIGN FLAG of spec §9
//! as a single kind-parameterized enum + write/read pair, rather than
//! polymorphic dispatch over `(backend, kind)`.

use crate::client::{Backend, Client};
use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::monitor::MonitorSink;
use crate::namespace::Paths;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// The write strategy for a chunk kind, matching spec §4.6's distinction
/// between create-only artifacts, two-level artifacts needing `create_all`,
/// and the single CAS-able `:chunk` kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteStrategy {
    /// `create`: parent already exists (single-level artifact root).
    Create,
    /// `create_all`: intermediate parents may not yet exist (two-level
    /// artifacts, or a chunk's per-id directory).
    CreateAll,
    /// CAS force-write, only valid for `ChunkKind::Chunk`.
    ForceWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    JobHash,
    Catalog,
    Workflow,
    Flow,
    Lifecycles,
    Windows,
    Triggers,
    JobMetadata,
    Exception,
    Task,
    Chunk,
}

impl ChunkKind {
    pub const ALL: &'static [ChunkKind] = &[
        ChunkKind::JobHash,
        ChunkKind::Catalog,
        ChunkKind::Workflow,
        ChunkKind::Flow,
        ChunkKind::Lifecycles,
        ChunkKind::Windows,
        ChunkKind::Triggers,
        ChunkKind::JobMetadata,
        ChunkKind::Exception,
        ChunkKind::Task,
        ChunkKind::Chunk,
    ];

    pub(crate) fn subtree(&self) -> &'static str {
        match self {
            ChunkKind::JobHash => "job-hash",
            ChunkKind::Catalog => "catalog",
            ChunkKind::Workflow => "workflow",
            ChunkKind::Flow => "flow",
            ChunkKind::Lifecycles => "lifecycles",
            ChunkKind::Windows => "windows",
            ChunkKind::Triggers => "triggers",
            ChunkKind::JobMetadata => "job-metadata",
            ChunkKind::Exception => "exception",
            ChunkKind::Task => "task",
            ChunkKind::Chunk => "chunk",
        }
    }

    fn strategy(&self) -> WriteStrategy {
        match self {
            ChunkKind::Task => WriteStrategy::CreateAll,
            ChunkKind::Chunk => WriteStrategy::ForceWrite,
            _ => WriteStrategy::Create,
        }
    }

    fn event_name(&self, verb: &'static str) -> &'static str {
        match (self, verb) {
            (ChunkKind::JobHash, "write") => "write_job-hash",
            (ChunkKind::JobHash, _) => "read_job-hash",
            (ChunkKind::Catalog, "write") => "write_catalog",
            (ChunkKind::Catalog, _) => "read_catalog",
            (ChunkKind::Workflow, "write") => "write_workflow",
            (ChunkKind::Workflow, _) => "read_workflow",
            (ChunkKind::Flow, "write") => "write_flow",
            (ChunkKind::Flow, _) => "read_flow",
            (ChunkKind::Lifecycles, "write") => "write_lifecycles",
            (ChunkKind::Lifecycles, _) => "read_lifecycles",
            (ChunkKind::Windows, "write") => "write_windows",
            (ChunkKind::Windows, _) => "read_windows",
            (ChunkKind::Triggers, "write") => "write_triggers",
            (ChunkKind::Triggers, _) => "read_triggers",
            (ChunkKind::JobMetadata, "write") => "write_job-metadata",
            (ChunkKind::JobMetadata, _) => "read_job-metadata",
            (ChunkKind::Exception, "write") => "write_exception",
            (ChunkKind::Exception, _) => "read_exception",
            (ChunkKind::Task, "write") => "write_task",
            (ChunkKind::Task, _) => "read_task",
            (ChunkKind::Chunk, "write") => "write_chunk",
            (ChunkKind::Chunk, _) => "read_chunk",
        }
    }

    /// Builds the node path for `(kind, id[, sub_id])`. `sub_id` is required
    /// (and only meaningful) for `Task`, whose path is `task/<id>/<sub_id>`.
    fn path(&self, paths: &Paths, id: &str, sub_id: Option<&str>) -> Result<String> {
        match (self, sub_id) {
            (ChunkKind::Task, Some(task_id)) => Ok(paths.task(id, task_id)),
            (ChunkKind::Task, None) => Err(Error::Protocol("task chunks require a sub_id")),
            (ChunkKind::Chunk, _) => Ok(paths.chunk(id)),
            (_, None) => Ok(paths.artifact(self.subtree(), id)),
            (_, Some(_)) => Err(Error::Protocol("only task chunks take a sub_id")),
        }
    }
}

pub struct ChunkStore<'a, B: Backend, C: Codec, M: MonitorSink> {
    client: &'a Client<B, C, M>,
    paths: &'a Paths,
}

impl<'a, B: Backend, C: Codec, M: MonitorSink> ChunkStore<'a, B, C, M> {
    pub fn new(client: &'a Client<B, C, M>, paths: &'a Paths) -> Self {
        Self { client, paths }
    }

    pub async fn write_chunk<V: Serialize>(
        &self,
        kind: ChunkKind,
        id: &str,
        value: &V,
        sub_id: Option<&str>,
    ) -> Result<()> {
        if kind.strategy() == WriteStrategy::ForceWrite {
            return Err(Error::Protocol(
                "force_write_chunk must be used for ChunkKind::Chunk",
            ));
        }

        let start = Instant::now();
        let node = kind.path(self.paths, id, sub_id)?;
        let bytes = self.client.codec().encode(value)?;
        let len = bytes.len();

        let result = match kind.strategy() {
            WriteStrategy::Create => self.client.create(&node, Some(bytes), true, false).await,
            WriteStrategy::CreateAll => self.client.create_all(&node, Some(bytes), true).await,
            WriteStrategy::ForceWrite => unreachable!(),
        };

        self.client.emit_timed(
            kind.event_name("write"),
            start,
            Some(len),
            Some(id.to_string()),
            None,
            &result,
        );
        result.map(|_| ())
    }

    pub async fn read_chunk<V: for<'de> Deserialize<'de>>(
        &self,
        kind: ChunkKind,
        id: &str,
        sub_id: Option<&str>,
    ) -> Result<V> {
        let start = Instant::now();
        let node = kind.path(self.paths, id, sub_id)?;
        let result = self.client.get_raw(&node).await;

        self.client.emit_timed(
            kind.event_name("read"),
            start,
            None,
            Some(id.to_string()),
            None,
            &result,
        );

        let (bytes, _stat) = result?;
        self.client.codec().decode(&bytes)
    }

    /// CAS-force-write for `ChunkKind::Chunk` only: creates the node if
    /// absent, otherwise sets it with its current version (spec §4.6).
    /// Retrying on `BadVersion` is the caller's responsibility.
    pub async fn force_write_chunk<V: Serialize>(&self, id: &str, value: &V) -> Result<()> {
        let start = Instant::now();
        let node = ChunkKind::Chunk.path(self.paths, id, None)?;
        let bytes = self.client.codec().encode(value)?;
        let len = bytes.len();

        let existing = self.client.exists(&node, None).await?;
        let result = match existing {
            None => self
                .client
                .create_all(&node, Some(bytes), true)
                .await
                .map(|_| ()),
            Some(stat) => self.client.set_raw(&node, bytes, stat.version).await.map(|_| ()),
        };

        self.client.emit_timed(
            "write_chunk",
            start,
            Some(len),
            Some(id.to_string()),
            None,
            &result,
        );
        result
    }
}
