//! An embedded, disposable ZooKeeper server for end-to-end scenario tests
//! (spec §8 scenarios S1-S6), backed by `testcontainers`.

use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::zookeeper::Zookeeper;

/// Owns a running ZooKeeper container for the lifetime of the value;
/// dropping it tears the container down.
pub struct EmbeddedZookeeper {
    container: ContainerAsync<Zookeeper>,
    port: u16,
}

impl EmbeddedZookeeper {
    pub async fn start() -> Result<Self, testcontainers::TestcontainersError> {
        let container = Zookeeper::default().start().await?;
        let port = container.get_host_port_ipv4(2181).await?;
        Ok(Self { container, port })
    }

    /// A `host:port` connect string suitable for
    /// [`onyx_log::zk::ZkBackend::connect`].
    pub fn connect_string(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }
}
