//! Coordination client adapter (C1): a thin façade over the external
//! coordination service, normalizing its errors into the kinds of spec §4.1
//! and folding in the codec boundary (C2) and monitoring emission (§6).

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::monitor::{MonitorEvent, MonitorSink};
use std::future::Future;
use std::time::{Duration, Instant};

/// Metadata returned alongside a node's data, analogous to ZooKeeper's Stat.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stat {
    pub ctime: i64,
    pub version: i32,
}

/// The connection-state transitions a lifecycle manager (C3) listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Lost,
    Reconnected,
}

/// A one-shot notification that a watched path changed, mirroring spec §4.1's
/// "watcher is a one-shot callback invoked on any change".
pub struct Watch(tokio::sync::oneshot::Receiver<()>);

impl Watch {
    /// Wraps the receiving half of a one-shot channel as a `Watch`. Public
    /// so that `Backend` implementations outside this crate (e.g. the
    /// in-memory fake in `onyx-log-testkit`) can bridge their own watcher
    /// notifications into this type.
    pub fn new(rx: tokio::sync::oneshot::Receiver<()>) -> Self {
        Self(rx)
    }

    pub async fn fired(self) -> bool {
        self.0.await.is_ok()
    }
}

/// The raw operations a backend must provide, matching spec §4.1 exactly.
/// Implemented once for `zookeeper_async` (see [`crate::zk`]) and once for
/// an in-memory fake (`onyx-log-testkit`), using a native `impl Future`
/// return (RPITIT) rather than `async-trait`, the same pattern the teacher
/// crate uses for its `Subscriber` trait.
pub trait Backend: Send + Sync + 'static {
    fn create(
        &self,
        path: &str,
        data: Option<Vec<u8>>,
        persistent: bool,
        sequential: bool,
    ) -> impl Future<Output = Result<String>> + Send;

    fn create_all(
        &self,
        path: &str,
        data: Option<Vec<u8>>,
        persistent: bool,
    ) -> impl Future<Output = Result<String>> + Send;

    fn exists(&self, path: &str) -> impl Future<Output = Result<Option<Stat>>> + Send;

    /// Registers a one-shot watch alongside the existence check, per spec
    /// §4.1 (`exists(path, watcher?)`).
    fn exists_watch(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<(Option<Stat>, Watch)>> + Send;

    fn get(&self, path: &str) -> impl Future<Output = Result<(Vec<u8>, Stat)>> + Send;

    fn set(
        &self,
        path: &str,
        data: Vec<u8>,
        expected_version: i32,
    ) -> impl Future<Output = Result<Stat>> + Send;

    fn children(&self, path: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Registers a one-shot watch alongside the children listing, per spec
    /// §4.1 (`children(path, watcher?)`).
    fn children_watch(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<(Vec<String>, Watch)>> + Send;

    fn delete(&self, path: &str) -> impl Future<Output = Result<()>> + Send;

    fn close(&self) -> impl Future<Output = Result<()>> + Send;

    fn is_started(&self) -> bool;

    fn block_until_connected(&self, timeout: Duration) -> impl Future<Output = bool> + Send;

    /// Subscribes to connection-state transitions (spec §4.2). Each call
    /// installs an independent listener.
    fn connection_states(&self) -> tokio::sync::mpsc::UnboundedReceiver<ConnectionState>;
}

/// The adapter proper: wraps a [`Backend`], applies the guarded-region error
/// translation of spec §7, and emits a monitoring event per operation.
pub struct Client<B: Backend, C: Codec, M: MonitorSink> {
    backend: B,
    codec: C,
    monitor: M,
}

impl<B: Backend, C: Codec, M: MonitorSink> Client<B, C, M> {
    pub fn new(backend: B, codec: C, monitor: M) -> Self {
        Self {
            backend,
            codec,
            monitor,
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn monitor(&self) -> &M {
        &self.monitor
    }

    pub fn is_started(&self) -> bool {
        self.backend.is_started()
    }

    pub async fn block_until_connected(&self, timeout: Duration) -> bool {
        self.backend.block_until_connected(timeout).await
    }

    pub async fn create(
        &self,
        path: &str,
        data: Option<Vec<u8>>,
        persistent: bool,
        sequential: bool,
    ) -> Result<String> {
        guarded(self.backend.create(path, data, persistent, sequential).await)
    }

    pub async fn create_all(
        &self,
        path: &str,
        data: Option<Vec<u8>>,
        persistent: bool,
    ) -> Result<String> {
        guarded(self.backend.create_all(path, data, persistent).await)
    }

    pub async fn exists(&self, path: &str, _watcher: Option<()>) -> Result<Option<Stat>> {
        guarded(self.backend.exists(path).await)
    }

    pub async fn exists_watch(&self, path: &str) -> Result<(Option<Stat>, Watch)> {
        guarded(self.backend.exists_watch(path).await)
    }

    pub async fn get_raw(&self, path: &str) -> Result<(Vec<u8>, Stat)> {
        guarded(self.backend.get(path).await)
    }

    pub async fn set_raw(&self, path: &str, data: Vec<u8>, expected_version: i32) -> Result<Stat> {
        guarded(self.backend.set(path, data, expected_version).await)
    }

    pub async fn children(&self, path: &str) -> Result<Vec<String>> {
        guarded(self.backend.children(path).await)
    }

    pub async fn children_watch(&self, path: &str) -> Result<(Vec<String>, Watch)> {
        guarded(self.backend.children_watch(path).await)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        guarded(self.backend.delete(path).await)
    }

    pub async fn close(&self) -> Result<()> {
        self.backend.close().await
    }

    /// Times an operation and emits the monitoring event spec §6 describes
    /// (`{event, latency_ns, [bytes], [id], [position]}`).
    pub(crate) fn emit_timed<T>(
        &self,
        event: &'static str,
        start: Instant,
        bytes: Option<usize>,
        id: Option<String>,
        position: Option<i64>,
        _result: &Result<T>,
    ) {
        self.monitor.emit(MonitorEvent {
            event,
            latency_ns: start.elapsed().as_nanos() as u64,
            bytes,
            id,
            position,
        });
    }
}

fn guarded<T>(result: Result<T>) -> Result<T> {
    result.map_err(Error::guarded)
}
