//! In-memory `Backend` double, used across `onyx-log`'s own unit tests and
//! by downstream consumers that want fast, deterministic tests without a
//! real ensemble.

use onyx_log::client::{Backend, ConnectionState, Stat, Watch};
use onyx_log::error::{Error, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, mpsc, oneshot};

struct StoredNode {
    data: Vec<u8>,
    version: i32,
    ctime: i64,
    #[allow(dead_code)]
    ephemeral: bool,
}

#[derive(Default)]
struct Tree {
    nodes: BTreeMap<String, StoredNode>,
    sequence_counters: HashMap<String, u64>,
    exists_watchers: HashMap<String, Vec<oneshot::Sender<()>>>,
    children_watchers: HashMap<String, Vec<oneshot::Sender<()>>>,
    gc_on_next_read: HashSet<String>,
}

/// An in-memory stand-in for a coordination service. Connection loss and
/// recovery are simulated explicitly via [`FakeBackend::simulate_connection_loss`]
/// and [`FakeBackend::simulate_reconnect`], for exercising the reconnect
/// driver (C3) without a real ensemble.
pub struct FakeBackend {
    tree: Mutex<Tree>,
    state_tx: broadcast::Sender<ConnectionState>,
    connected: AtomicBool,
}

impl Default for FakeBackend {
    fn default() -> Self {
        let (state_tx, _) = broadcast::channel(64);
        Self {
            tree: Mutex::new(Tree::default()),
            state_tx,
            connected: AtomicBool::new(true),
        }
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn simulate_connection_loss(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.state_tx.send(ConnectionState::Lost);
    }

    pub fn simulate_reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.state_tx.send(ConnectionState::Reconnected);
    }

    /// Arranges for the *next* `get` of `path` to behave as though a
    /// concurrent garbage collection deleted the node in the window between
    /// an `exists` check and the read that follows it: the node is removed
    /// and `NoNode` is returned, with watchers notified exactly as a real
    /// `delete` would. Exercises the race spec §8 property 7 describes
    /// ("deleting `entry-<p>` while a subscriber is at `position == p`"),
    /// which a plain `delete` before the subscriber ever checks `exists`
    /// cannot reach.
    pub fn simulate_gc_race(&self, path: &str) {
        self.tree
            .lock()
            .expect("fake tree lock poisoned")
            .gc_on_next_read
            .insert(path.to_string());
    }

    fn now_millis() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_millis() as i64
    }

    fn parent_of(path: &str) -> String {
        match path.rfind('/') {
            Some(0) => "/".to_string(),
            Some(idx) => path[..idx].to_string(),
            None => "/".to_string(),
        }
    }

    fn list_children(tree: &Tree, parent: &str) -> Vec<String> {
        let prefix = if parent == "/" {
            "/".to_string()
        } else {
            format!("{parent}/")
        };
        tree.nodes
            .keys()
            .filter_map(|k| {
                if k.len() > prefix.len() && k.starts_with(&prefix) {
                    let rest = &k[prefix.len()..];
                    if !rest.contains('/') {
                        return Some(rest.to_string());
                    }
                }
                None
            })
            .collect()
    }
}

fn notify_exists(tree: &mut Tree, path: &str) {
    if let Some(waiters) = tree.exists_watchers.remove(path) {
        for tx in waiters {
            let _ = tx.send(());
        }
    }
}

fn notify_children(tree: &mut Tree, parent: &str) {
    if let Some(waiters) = tree.children_watchers.remove(parent) {
        for tx in waiters {
            let _ = tx.send(());
        }
    }
}

impl Backend for FakeBackend {
    fn create(
        &self,
        path: &str,
        data: Option<Vec<u8>>,
        persistent: bool,
        sequential: bool,
    ) -> impl Future<Output = Result<String>> + Send {
        let path = path.to_string();
        async move {
            let mut tree = self.tree.lock().expect("fake tree lock poisoned");

            let final_path = if sequential {
                let counter = tree.sequence_counters.entry(path.clone()).or_insert(0);
                let seq = *counter;
                *counter += 1;
                format!("{path}{seq:010}")
            } else {
                path.clone()
            };

            if tree.nodes.contains_key(&final_path) {
                return Err(Error::NodeExists(final_path));
            }
            let parent = Self::parent_of(&final_path);
            if parent != "/" && !tree.nodes.contains_key(&parent) {
                return Err(Error::NoNode(parent));
            }

            tree.nodes.insert(
                final_path.clone(),
                StoredNode {
                    data: data.unwrap_or_default(),
                    version: 0,
                    ctime: Self::now_millis(),
                    ephemeral: !persistent,
                },
            );
            notify_exists(&mut tree, &final_path);
            notify_children(&mut tree, &parent);
            tracing::trace!(path = %final_path, "fake backend created node");
            Ok(final_path)
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
            {
                let mut tree = self.tree.lock().expect("fake tree lock poisoned");
                let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
                if let Some((_, parents)) = segments.split_last() {
                    let mut built = String::new();
                    for segment in parents {
                        built.push('/');
                        built.push_str(segment);
                        tree.nodes.entry(built.clone()).or_insert_with(|| StoredNode {
                            data: Vec::new(),
                            version: 0,
                            ctime: Self::now_millis(),
                            ephemeral: false,
                        });
                    }
                }
            }
            self.create(&path, data, persistent, false).await
        }
    }

    fn exists(&self, path: &str) -> impl Future<Output = Result<Option<Stat>>> + Send {
        let path = path.to_string();
        async move {
            let tree = self.tree.lock().expect("fake tree lock poisoned");
            Ok(tree.nodes.get(&path).map(|n| Stat {
                ctime: n.ctime,
                version: n.version,
            }))
        }
    }

    fn exists_watch(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<(Option<Stat>, Watch)>> + Send {
        let path = path.to_string();
        async move {
            let (tx, rx) = oneshot::channel();
            let mut tree = self.tree.lock().expect("fake tree lock poisoned");
            let stat = tree.nodes.get(&path).map(|n| Stat {
                ctime: n.ctime,
                version: n.version,
            });
            tree.exists_watchers.entry(path).or_default().push(tx);
            Ok((stat, Watch::new(rx)))
        }
    }

    fn get(&self, path: &str) -> impl Future<Output = Result<(Vec<u8>, Stat)>> + Send {
        let path = path.to_string();
        async move {
            let mut tree = self.tree.lock().expect("fake tree lock poisoned");
            if tree.gc_on_next_read.remove(&path) {
                tree.nodes.remove(&path);
                let parent = Self::parent_of(&path);
                notify_exists(&mut tree, &path);
                notify_children(&mut tree, &parent);
                return Err(Error::NoNode(path));
            }
            let node = tree.nodes.get(&path).ok_or_else(|| Error::NoNode(path.clone()))?;
            Ok((
                node.data.clone(),
                Stat {
                    ctime: node.ctime,
                    version: node.version,
                },
            ))
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
            let mut tree = self.tree.lock().expect("fake tree lock poisoned");
            let node = tree
                .nodes
                .get_mut(&path)
                .ok_or_else(|| Error::NoNode(path.clone()))?;
            if node.version != expected_version {
                return Err(Error::BadVersion(path.clone()));
            }
            node.data = data;
            node.version += 1;
            let stat = Stat {
                ctime: node.ctime,
                version: node.version,
            };
            notify_exists(&mut tree, &path);
            Ok(stat)
        }
    }

    fn children(&self, path: &str) -> impl Future<Output = Result<Vec<String>>> + Send {
        let path = path.to_string();
        async move {
            let tree = self.tree.lock().expect("fake tree lock poisoned");
            if path != "/" && !tree.nodes.contains_key(&path) {
                return Err(Error::NoNode(path.clone()));
            }
            Ok(Self::list_children(&tree, &path))
        }
    }

    fn children_watch(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<(Vec<String>, Watch)>> + Send {
        let path = path.to_string();
        async move {
            let (tx, rx) = oneshot::channel();
            let mut tree = self.tree.lock().expect("fake tree lock poisoned");
            let children = Self::list_children(&tree, &path);
            tree.children_watchers.entry(path).or_default().push(tx);
            Ok((children, Watch::new(rx)))
        }
    }

    fn delete(&self, path: &str) -> impl Future<Output = Result<()>> + Send {
        let path = path.to_string();
        async move {
            let mut tree = self.tree.lock().expect("fake tree lock poisoned");
            if tree.nodes.remove(&path).is_none() {
                return Err(Error::NoNode(path.clone()));
            }
            let parent = Self::parent_of(&path);
            notify_exists(&mut tree, &path);
            notify_children(&mut tree, &parent);
            Ok(())
        }
    }

    fn close(&self) -> impl Future<Output = Result<()>> + Send {
        async move {
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    fn is_started(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn block_until_connected(&self, _timeout: Duration) -> impl Future<Output = bool> + Send {
        async move { self.connected.load(Ordering::SeqCst) }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_read_round_trip() {
        let backend = FakeBackend::new();
        backend.create("/onyx", None, true, false).await.unwrap();
        let path = backend
            .create("/onyx/entry-", Some(b"hello".to_vec()), true, true)
            .await
            .unwrap();
        assert_eq!(path, "/onyx/entry-0000000000");
        let (data, _stat) = backend.get(&path).await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn exists_watch_fires_on_create() {
        let backend = FakeBackend::new();
        let (stat, watch) = backend.exists_watch("/onyx/flag").await.unwrap();
        assert!(stat.is_none());
        backend.create("/onyx", None, true, false).await.unwrap();
        backend
            .create("/onyx/flag", None, true, false)
            .await
            .unwrap();
        assert!(watch.fired().await);
    }

    #[tokio::test]
    async fn gc_race_makes_next_read_no_node_then_clears() {
        let backend = FakeBackend::new();
        backend.create("/onyx", None, true, false).await.unwrap();
        let path = backend
            .create("/onyx/n", Some(b"a".to_vec()), true, false)
            .await
            .unwrap();

        backend.simulate_gc_race(&path);
        let err = backend.get(&path).await.unwrap_err();
        assert!(matches!(err, Error::NoNode(_)));

        // The node is actually gone, and the hook doesn't re-arm itself.
        assert!(backend.get(&path).await.is_err());
        backend.create(&path, Some(b"b".to_vec()), true, false).await.unwrap();
        let (data, _) = backend.get(&path).await.unwrap();
        assert_eq!(data, b"b");
    }

    #[tokio::test]
    async fn set_rejects_stale_version() {
        let backend = FakeBackend::new();
        backend.create("/onyx", None, true, false).await.unwrap();
        let path = backend
            .create("/onyx/n", Some(b"a".to_vec()), true, false)
            .await
            .unwrap();
        let err = backend.set(&path, b"b".to_vec(), 7).await.unwrap_err();
        assert!(matches!(err, Error::BadVersion(_)));
    }
}
