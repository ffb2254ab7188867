//! Log subscriber — tailer (C6): the hardest component (spec §4.5). A
//! resumable cursor that seeds itself from the origin snapshot, emits
//! entries in ascending `message-id` order, watches for new ones, and
//! re-seeks to origin whenever it finds a position has been GC'd out from
//! under it.

use crate::client::{Backend, Client};
use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::monitor::MonitorSink;
use crate::namespace::Paths;
use crate::origin::OriginManager;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

/// Cluster-wide log parameters, read once at subscriber startup (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogParameters {
    pub log_version: u32,
}

/// The only log version this build of the crate understands.
pub const SUPPORTED_LOG_VERSION: u32 = 1;

const LOG_PARAMETERS_RETRY: Duration = Duration::from_millis(500);

/// A durable log entry as emitted to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry<V> {
    pub message_id: i64,
    pub created_at: i64,
    pub value: V,
}

/// Everything a tailer can put onto its output channel: real entries, the
/// synthetic replica-reset event emitted on setup and on every re-seek, and
/// a terminal error (spec §4.5 "Failure handling").
#[derive(Debug, Clone)]
pub enum SubscriberEvent<V, R> {
    SetReplica(R),
    Entry(LogEntry<V>),
    Closed(String),
}

/// The cursor a tailer advances; exposed for tests of the re-seek state
/// machine (spec §8 properties).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cursor {
    pub position: i64,
}

pub struct Subscriber<'a, B: Backend, C: Codec, M: MonitorSink> {
    client: &'a Client<B, C, M>,
    paths: &'a Paths,
}

impl<'a, B: Backend, C: Codec, M: MonitorSink> Subscriber<'a, B, C, M> {
    pub fn new(client: &'a Client<B, C, M>, paths: &'a Paths) -> Self {
        Self { client, paths }
    }

    /// Runs the tail loop until `kill` fires or a terminal failure occurs,
    /// pushing events onto `out_channel`. The returned `R` is the origin
    /// replica observed at setup time; callers merge it with whatever
    /// `LogParameters` they also read, per spec §4.5's "returns an initial
    /// aggregate" contract — merge semantics are business-specific and so
    /// are left to the caller rather than folded into this crate.
    pub async fn subscribe<V, R>(
        &self,
        out_channel: mpsc::Sender<SubscriberEvent<V, R>>,
        mut kill: watch::Receiver<bool>,
    ) -> Result<R>
    where
        V: Serialize + DeserializeOwned + Send + 'static,
        R: Serialize + DeserializeOwned + Clone + Send + 'static,
    {
        let log_parameters = self.read_log_parameters_with_retry().await;
        if log_parameters.log_version != SUPPORTED_LOG_VERSION {
            let err = Error::IncompatibleLogVersion {
                required: log_parameters.log_version,
                supported: SUPPORTED_LOG_VERSION,
            };
            let _ = out_channel
                .send(SubscriberEvent::Closed(err.to_string()))
                .await;
            return Err(err);
        }

        let origin = OriginManager::new(self.client, self.paths);
        let (cursor, replica) = match self.seed_cursor(&origin, &out_channel).await {
            Ok(pair) => pair,
            Err(err) => {
                let _ = out_channel
                    .send(SubscriberEvent::Closed(err.to_string()))
                    .await;
                return Err(err);
            }
        };

        if let Err(err) = self.tail(&origin, cursor, &out_channel, &mut kill).await {
            let _ = out_channel
                .send(SubscriberEvent::Closed(err.to_string()))
                .await;
            return Err(err);
        }

        Ok(replica)
    }

    async fn read_log_parameters_with_retry(&self) -> LogParameters {
        loop {
            match self.client.get_raw(&self.paths.log_parameters()).await {
                Ok((bytes, _stat)) => match self.client.codec().decode(&bytes) {
                    Ok(params) => return params,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to decode log-parameters, retrying");
                    }
                },
                Err(err) => {
                    tracing::warn!(error = %err, "failed to read log-parameters, retrying");
                }
            }
            tokio::time::sleep(LOG_PARAMETERS_RETRY).await;
        }
    }

    /// Setup steps 3-4 of spec §4.5: read the origin snapshot, emit the
    /// synthetic `SetReplica` event, and seed the cursor at
    /// `origin.message_id + 1`.
    async fn seed_cursor<V, R>(
        &self,
        origin: &OriginManager<'_, B, C, M>,
        out_channel: &mpsc::Sender<SubscriberEvent<V, R>>,
    ) -> Result<(Cursor, R)>
    where
        R: DeserializeOwned + Clone,
    {
        let snapshot = origin.read_origin::<R>().await?;
        if out_channel
            .send(SubscriberEvent::SetReplica(snapshot.replica.clone()))
            .await
            .is_err()
        {
            return Err(Error::SubscriberClosed);
        }
        Ok((
            Cursor {
                position: snapshot.message_id + 1,
            },
            snapshot.replica,
        ))
    }

    /// Tail loop of spec §4.5. Runs until `kill` fires (normal termination)
    /// or a non-recoverable error occurs (propagated to the caller, who
    /// emits it onto `out_channel`).
    async fn tail<V, R>(
        &self,
        origin: &OriginManager<'_, B, C, M>,
        mut cursor: Cursor,
        out_channel: &mpsc::Sender<SubscriberEvent<V, R>>,
        kill: &mut watch::Receiver<bool>,
    ) -> Result<()>
    where
        V: DeserializeOwned,
        R: Serialize + DeserializeOwned + Clone,
    {
        loop {
            if *kill.borrow() {
                return Ok(());
            }

            let path = self.paths.log_entry(cursor.position);
            match self.client.exists(&path, None).await? {
                Some(_) => match self.try_read_entry(&path, cursor.position).await {
                    Ok(entry) => {
                        cursor.position += 1;
                        if out_channel.send(SubscriberEvent::Entry(entry)).await.is_err() {
                            return Ok(());
                        }
                    }
                    Err(err) if is_reseek_trigger(&err) => {
                        cursor = self.re_seek(origin, out_channel).await?;
                    }
                    Err(err) => return Err(err),
                },
                None => {
                    let (_, child_watch) = self.client.children_watch(&self.paths.log_root()).await?;
                    // Race guard: the entry may have appeared between our
                    // `exists` check and watch registration.
                    if self.client.exists(&path, None).await?.is_some() {
                        match self.try_read_entry(&path, cursor.position).await {
                            Ok(entry) => {
                                cursor.position += 1;
                                if out_channel.send(SubscriberEvent::Entry(entry)).await.is_err() {
                                    return Ok(());
                                }
                                continue;
                            }
                            Err(err) if is_reseek_trigger(&err) => {
                                cursor = self.re_seek(origin, out_channel).await?;
                                continue;
                            }
                            Err(err) => return Err(err),
                        }
                    }

                    tokio::select! {
                        _ = kill.changed() => {
                            if *kill.borrow() {
                                return Ok(());
                            }
                        }
                        fired = child_watch.fired() => {
                            if !fired {
                                return Err(Error::SubscriberClosed);
                            }
                            match self.client.exists(&path, None).await? {
                                Some(_) => match self.try_read_entry(&path, cursor.position).await {
                                    Ok(entry) => {
                                        cursor.position += 1;
                                        if out_channel.send(SubscriberEvent::Entry(entry)).await.is_err() {
                                            return Ok(());
                                        }
                                    }
                                    Err(err) if is_reseek_trigger(&err) => {
                                        cursor = self.re_seek(origin, out_channel).await?;
                                    }
                                    Err(err) => return Err(err),
                                },
                                // Watch fired on a GC delete elsewhere in the
                                // log; loop and re-check our own position.
                                None => {}
                            }
                        }
                    }
                }
            }
        }
    }

    async fn try_read_entry<V: DeserializeOwned>(
        &self,
        path: &str,
        position: i64,
    ) -> Result<LogEntry<V>> {
        let start = Instant::now();
        let result = self.client.get_raw(path).await;
        self.client.emit_timed(
            "read_log_entry",
            start,
            None,
            None,
            Some(position),
            &result,
        );
        let (bytes, stat) = result?;
        let value: V = self.client.codec().decode(&bytes)?;
        Ok(LogEntry {
            message_id: position,
            created_at: stat.ctime,
            value,
        })
    }

    /// The re-seek protocol of spec §4.5: re-read the origin, emit a fresh
    /// `SetReplica`, and resume from `origin.message_id + 1`.
    async fn re_seek<V, R>(
        &self,
        origin: &OriginManager<'_, B, C, M>,
        out_channel: &mpsc::Sender<SubscriberEvent<V, R>>,
    ) -> Result<Cursor>
    where
        R: DeserializeOwned + Clone,
    {
        let snapshot = origin.read_origin::<R>().await?;
        if out_channel
            .send(SubscriberEvent::SetReplica(snapshot.replica))
            .await
            .is_err()
        {
            return Err(Error::SubscriberClosed);
        }
        Ok(Cursor {
            position: snapshot.message_id + 1,
        })
    }
}

/// Whether an error reading an entry at the expected position means the
/// entry was GC'd and a re-seek is warranted, per spec §4.5's tail loop
/// ("on NoNode or NodeExists during read: re-seek to origin").
fn is_reseek_trigger(err: &Error) -> bool {
    matches!(err, Error::NoNode(_) | Error::NodeExists(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reseek_trigger_matches_no_node_and_node_exists() {
        assert!(is_reseek_trigger(&Error::NoNode("x".into())));
        assert!(is_reseek_trigger(&Error::NodeExists("x".into())));
        assert!(!is_reseek_trigger(&Error::SubscriberClosed));
    }

    #[test]
    fn cursor_advances_monotonically() {
        let mut cursor = Cursor { position: 5 };
        cursor.position += 1;
        assert_eq!(cursor.position, 6);
    }

    proptest::proptest! {
        /// Spec §4.5/§9: `NoNode` and `NodeExists` are the only two kinds
        /// that trigger a re-seek on an entry read, for any path string
        /// either might carry.
        #[test]
        fn only_no_node_and_node_exists_trigger_reseek(path in "[a-z/\\-]{0,32}") {
            prop_assert!(is_reseek_trigger(&Error::NoNode(path.clone())));
            prop_assert!(is_reseek_trigger(&Error::NodeExists(path.clone())));
            prop_assert!(!is_reseek_trigger(&Error::BadVersion(path)));
            prop_assert!(!is_reseek_trigger(&Error::SubscriberClosed));
            prop_assert!(!is_reseek_trigger(&Error::ConnectionLoss));
        }

        /// Re-seeding always lands on `origin.message_id + 1`, never on the
        /// origin's own id (spec §4.5's re-seek protocol).
        #[test]
        fn reseed_position_is_origin_plus_one(message_id in -1i64..1_000_000) {
            let cursor = Cursor { position: message_id + 1 };
            prop_assert!(cursor.position > message_id);
            prop_assert_eq!(cursor.position - 1, message_id);
        }
    }
}
