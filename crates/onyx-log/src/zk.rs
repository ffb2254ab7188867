//! Real backend (C1 implementation): wraps `zookeeper_async::ZooKeeper`,
//! normalizing its errors and watcher callbacks into this crate's
//! `Backend` trait (spec §4.1).

use crate::client::{Backend, ConnectionState, Stat, Watch};
use crate::error::{Error, Result};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use zookeeper_async::{Acl, CreateMode, WatchedEvent, Watcher, ZkError, ZkState, ZooKeeper};

/// The session-level watcher installed once at connect time. Fans transport
/// state transitions out to every listener registered via
/// [`ZkBackend::connection_states`].
struct SessionWatcher {
    tx: broadcast::Sender<ConnectionState>,
}

impl Watcher for SessionWatcher {
    fn handle(&self, event: WatchedEvent) {
        let state = match event.keeper_state {
            ZkState::SyncConnected | ZkState::ConnectedReadOnly => ConnectionState::Reconnected,
            ZkState::Connecting | ZkState::AuthFailed | ZkState::Closed | ZkState::Expired => {
                ConnectionState::Lost
            }
            _ => return,
        };
        let _ = self.tx.send(state);
    }
}

/// A one-shot watcher adapter: the coordination service invokes
/// [`Watcher::handle`] once and drops it, so a single `oneshot::Sender`
/// behind a mutex is enough to bridge it to our `Watch` type.
struct OneshotWatcher {
    tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl Watcher for OneshotWatcher {
    fn handle(&self, _event: WatchedEvent) {
        if let Some(tx) = self.tx.lock().expect("watcher lock poisoned").take() {
            let _ = tx.send(());
        }
    }
}

fn one_shot() -> (Arc<OneshotWatcher>, Watch) {
    let (tx, rx) = oneshot::channel();
    (
        Arc::new(OneshotWatcher {
            tx: Mutex::new(Some(tx)),
        }),
        Watch::new(rx),
    )
}

/// Backend implementation against a live ZooKeeper ensemble.
pub struct ZkBackend {
    zk: ZooKeeper,
    state_tx: broadcast::Sender<ConnectionState>,
    started: AtomicBool,
}

impl ZkBackend {
    /// Connects to `connect_string` (comma-separated `host:port` list),
    /// installing the session watcher that feeds [`Self::connection_states`].
    pub async fn connect(connect_string: &str, session_timeout: Duration) -> Result<Self> {
        let (state_tx, _) = broadcast::channel(64);
        let watcher = SessionWatcher {
            tx: state_tx.clone(),
        };
        let zk = ZooKeeper::connect(connect_string, session_timeout, watcher)
            .await
            .map_err(|err| Error::from_zk(connect_string, err))?;

        Ok(Self {
            zk,
            state_tx,
            started: AtomicBool::new(true),
        })
    }

    fn convert_err(path: &str, err: ZkError) -> Error {
        Error::from_zk(path, err)
    }

    async fn ensure_parents(&self, path: &str) -> Result<()> {
        let mut built = String::new();
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        let Some((_, parents)) = segments.split_last() else {
            return Ok(());
        };
        for segment in parents {
            built.push('/');
            built.push_str(segment);
            match self
                .zk
                .create(
                    &built,
                    Vec::new(),
                    Acl::open_unsafe().clone(),
                    CreateMode::Persistent,
                )
                .await
            {
                Ok(_) | Err(ZkError::NodeExists) => {}
                Err(err) => return Err(Self::convert_err(&built, err)),
            }
        }
        Ok(())
    }
}

impl Backend for ZkBackend {
    fn create(
        &self,
        path: &str,
        data: Option<Vec<u8>>,
        persistent: bool,
        sequential: bool,
    ) -> impl Future<Output = Result<String>> + Send {
        let path = path.to_string();
        async move {
            let mode = match (persistent, sequential) {
                (true, true) => CreateMode::PersistentSequential,
                (true, false) => CreateMode::Persistent,
                (false, true) => CreateMode::EphemeralSequential,
                (false, false) => CreateMode::Ephemeral,
            };
            self.zk
                .create(&path, data.unwrap_or_default(), Acl::open_unsafe().clone(), mode)
                .await
                .map_err(|err| Self::convert_err(&path, err))
        }
    }

    fn create_all(
        &self,
        path: &str,
        data: Option<Vec<u8>>,
        persistent: bool,
    ) -> impl Future<Output = Result<String>> + Send {
        let path = path.to_string();
        async move {
            self.ensure_parents(&path).await?;
            let mode = if persistent {
                CreateMode::Persistent
            } else {
                CreateMode::Ephemeral
            };
            self.zk
                .create(&path, data.unwrap_or_default(), Acl::open_unsafe().clone(), mode)
                .await
                .map_err(|err| Self::convert_err(&path, err))
        }
    }

    fn exists(&self, path: &str) -> impl Future<Output = Result<Option<Stat>>> + Send {
        let path = path.to_string();
        async move {
            self.zk
                .exists(&path, false)
                .await
                .map(|stat| stat.map(stat_from_zk))
                .map_err(|err| Self::convert_err(&path, err))
        }
    }

    fn exists_watch(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<(Option<Stat>, Watch)>> + Send {
        let path = path.to_string();
        async move {
            let (watcher, watch) = one_shot();
            let stat = self
                .zk
                .exists_w(&path, ZkWatcherBridge(watcher))
                .await
                .map_err(|err| Self::convert_err(&path, err))?;
            Ok((stat.map(stat_from_zk), watch))
        }
    }

    fn get(&self, path: &str) -> impl Future<Output = Result<(Vec<u8>, Stat)>> + Send {
        let path = path.to_string();
        async move {
            let (bytes, stat) = self
                .zk
                .get_data(&path, false)
                .await
                .map_err(|err| Self::convert_err(&path, err))?;
            Ok((bytes, stat_from_zk(stat)))
        }
    }

    fn set(
        &self,
        path: &str,
        data: Vec<u8>,
        expected_version: i32,
    ) -> impl Future<Output = Result<Stat>> + Send {
        let path = path.to_string();
        async move {
            self.zk
                .set_data(&path, data, Some(expected_version))
                .await
                .map(stat_from_zk)
                .map_err(|err| Self::convert_err(&path, err))
        }
    }

    fn children(&self, path: &str) -> impl Future<Output = Result<Vec<String>>> + Send {
        let path = path.to_string();
        async move {
            self.zk
                .get_children(&path, false)
                .await
                .map_err(|err| Self::convert_err(&path, err))
        }
    }

    fn children_watch(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<(Vec<String>, Watch)>> + Send {
        let path = path.to_string();
        async move {
            let (watcher, watch) = one_shot();
            let children = self
                .zk
                .get_children_w(&path, ZkWatcherBridge(watcher))
                .await
                .map_err(|err| Self::convert_err(&path, err))?;
            Ok((children, watch))
        }
    }

    fn delete(&self, path: &str) -> impl Future<Output = Result<()>> + Send {
        let path = path.to_string();
        async move {
            self.zk
                .delete(&path, None)
                .await
                .map_err(|err| Self::convert_err(&path, err))
        }
    }

    fn close(&self) -> impl Future<Output = Result<()>> + Send {
        async move {
            self.started.store(false, Ordering::SeqCst);
            self.zk
                .close()
                .await
                .map_err(|err| Self::convert_err("<close>", err))
        }
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn block_until_connected(&self, timeout: Duration) -> impl Future<Output = bool> + Send {
        async move {
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                if matches!(self.zk.state(), ZkState::SyncConnected) {
                    return true;
                }
                if tokio::time::Instant::now() >= deadline {
                    return false;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }

    fn connection_states(&self) -> mpsc::UnboundedReceiver<ConnectionState> {
        let mut rx = self.state_tx.subscribe();
        let (tx, out_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok(state) = rx.recv().await {
                if tx.send(state).is_err() {
                    break;
                }
            }
        });
        out_rx
    }
}

/// Adapter so the stdlib-style `Arc<OneshotWatcher>` satisfies whatever
/// `Watcher` bound `zookeeper_async`'s `*_w` methods require.
struct ZkWatcherBridge(Arc<OneshotWatcher>);

impl Watcher for ZkWatcherBridge {
    fn handle(&self, event: WatchedEvent) {
        self.0.handle(event)
    }
}

fn stat_from_zk(stat: zookeeper_async::Stat) -> Stat {
    Stat {
        ctime: stat.ctime,
        version: stat.version,
    }
}
