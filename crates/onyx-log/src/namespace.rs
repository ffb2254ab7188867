//! Namespace layout (C4): derivation of all paths from a tenancy prefix, and
//! bootstrap creation of the path skeleton and origin node (spec §3, §4.3).

use crate::client::{Backend, Client};
use crate::codec::Codec;
use crate::error::Result;
use crate::monitor::MonitorSink;

/// All subtree roots under a tenancy prefix `P = /onyx/<tenancy-id>`.
#[derive(Debug, Clone)]
pub struct Paths {
    root: String,
}

impl Paths {
    pub fn new(tenancy_id: &str) -> Self {
        Self {
            root: format!("/onyx/{tenancy_id}"),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn log_root(&self) -> String {
        format!("{}/log", self.root)
    }

    /// Path of the sequential log entry node whose coordination-service
    /// suffix equals `pad_sequential_id(position)`, once it has been
    /// created. Used only to check `exists`/`get` for an *already assigned*
    /// position — the writer never constructs this path itself, since the
    /// sequence number is assigned by the coordination service.
    pub fn log_entry(&self, position: i64) -> String {
        format!("{}/entry-{}", self.log_root(), pad_sequential_id(position))
    }

    pub fn log_entry_prefix(&self) -> String {
        format!("{}/entry-", self.log_root())
    }

    pub fn pulse_root(&self) -> String {
        format!("{}/pulse", self.root)
    }

    pub fn pulse(&self, peer_id: &str) -> String {
        format!("{}/{}", self.pulse_root(), peer_id)
    }

    pub fn origin_root(&self) -> String {
        format!("{}/origin", self.root)
    }

    pub fn origin(&self) -> String {
        format!("{}/origin", self.origin_root())
    }

    pub fn log_parameters_root(&self) -> String {
        format!("{}/log-parameters", self.root)
    }

    pub fn log_parameters(&self) -> String {
        format!("{}/log-parameters", self.log_parameters_root())
    }

    pub fn artifact_root(&self, kind: &str) -> String {
        format!("{}/{}", self.root, kind)
    }

    pub fn artifact(&self, kind: &str, id: &str) -> String {
        format!("{}/{}", self.artifact_root(kind), id)
    }

    pub fn task_root(&self) -> String {
        format!("{}/task", self.root)
    }

    pub fn task_job_root(&self, job_id: &str) -> String {
        format!("{}/{}", self.task_root(), job_id)
    }

    pub fn task(&self, job_id: &str, task_id: &str) -> String {
        format!("{}/{}", self.task_job_root(job_id), task_id)
    }

    pub fn chunk_root(&self) -> String {
        format!("{}/chunk", self.root)
    }

    pub fn chunk_dir(&self, id: &str) -> String {
        format!("{}/{}", self.chunk_root(), id)
    }

    pub fn chunk(&self, id: &str) -> String {
        format!("{}/chunk", self.chunk_dir(id))
    }

    /// All of the single-level subtree roots that bootstrap must ensure
    /// exist (spec §3 table, §4.3 step 1). `log/`, `origin/`, and
    /// `log-parameters/` are listed explicitly; artifact kinds come from
    /// [`crate::chunk::ChunkKind::ALL`].
    fn fixed_roots(&self) -> Vec<String> {
        vec![
            self.log_root(),
            self.pulse_root(),
            self.origin_root(),
            self.log_parameters_root(),
            self.task_root(),
            self.chunk_root(),
        ]
    }
}

/// Zero-pads `n` to at least 10 digits, order-preserving both lexically and
/// numerically for `n < 10^10` (spec §3 invariant 1, §8 property 6).
pub fn pad_sequential_id(n: i64) -> String {
    format!("{:0width$}", n, width = 10.max(n.to_string().len()))
}

/// Ensures every subtree root exists, then ensures the origin snapshot node
/// exists (spec §4.3). Idempotent: a second bootstrap of the same tenancy is
/// a no-op (spec §3 invariant 5).
pub async fn bootstrap<B: Backend, C: Codec, M: MonitorSink, R: serde::Serialize>(
    client: &Client<B, C, M>,
    paths: &Paths,
    base_replica: &R,
) -> Result<()> {
    for root in paths.fixed_roots() {
        create_idempotent(client, &root).await?;
    }
    for kind in crate::chunk::ChunkKind::ALL {
        create_idempotent(client, &paths.artifact_root(kind.subtree())).await?;
    }

    match client.exists(&paths.origin(), None).await? {
        Some(_) => {}
        None => {
            let snapshot = crate::origin::OriginSnapshot {
                message_id: -1,
                replica: base_replica,
            };
            let bytes = client.codec().encode(&snapshot)?;
            match client.create(&paths.origin(), Some(bytes), true, false).await {
                Ok(_) => {}
                Err(crate::error::Error::NodeExists(_)) => {
                    // Lost a bootstrap race with another peer; benign.
                }
                Err(err) => return Err(err),
            }
        }
    }

    Ok(())
}

async fn create_idempotent<B: Backend, C: Codec, M: MonitorSink>(
    client: &Client<B, C, M>,
    path: &str,
) -> Result<()> {
    match client.create_all(path, None, true).await {
        Ok(_) => Ok(()),
        Err(crate::error::Error::NodeExists(_)) => Ok(()),
        Err(err) => Err(err),
    }
}
