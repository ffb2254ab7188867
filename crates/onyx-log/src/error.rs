/// Error kinds raised by the coordination log backend.
///
/// `ConnectionLoss` and `SessionExpired` are only ever observed by the
/// adapter itself (see [`crate::client::Client`]); every other component sees
/// [`Error::SubscriberClosed`] in their place once the call happens inside a
/// guarded region, per the error-handling design.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no such node: '{0}'")]
    NoNode(String),
    #[error("node already exists: '{0}'")]
    NodeExists(String),
    #[error("version mismatch writing '{0}'")]
    BadVersion(String),
    #[error("lost connection to the coordination service")]
    ConnectionLoss,
    #[error("coordination service session expired")]
    SessionExpired,
    #[error("coordination service error: {0}")]
    Other(#[source] zookeeper_async::ZkError),
    #[error("subscriber closed: the coordination client disconnected mid-operation")]
    SubscriberClosed,
    #[error("incompatible log version: cluster requires {required}, this peer supports {supported}")]
    IncompatibleLogVersion { required: u32, supported: u32 },
    #[error("failed to encode payload")]
    Encode(#[source] std::io::Error),
    #[error("failed to decode payload")]
    Decode(#[source] std::io::Error),
    #[error("{0}")]
    Protocol(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Normalizes a raw `zookeeper_async` failure into one of the kinds this
    /// crate raises (spec §4.1). Anything not explicitly recognized becomes
    /// `Other`.
    pub(crate) fn from_zk(path: &str, err: zookeeper_async::ZkError) -> Self {
        use zookeeper_async::ZkError;
        match err {
            ZkError::NoNode => Error::NoNode(path.to_string()),
            ZkError::NodeExists => Error::NodeExists(path.to_string()),
            ZkError::BadVersion => Error::BadVersion(path.to_string()),
            ZkError::ConnectionLoss => Error::ConnectionLoss,
            ZkError::SessionExpired => Error::SessionExpired,
            other => Error::Other(other),
        }
    }

    /// True if this error originated as a connection-level failure that a
    /// guarded region (§7) must translate into `SubscriberClosed`.
    pub(crate) fn is_connection_failure(&self) -> bool {
        matches!(self, Error::ConnectionLoss | Error::SessionExpired)
    }

    /// Applies the guarded-region translation described in spec §7: any
    /// connection-level failure becomes the `SubscriberClosed` sentinel,
    /// everything else passes through unchanged.
    pub(crate) fn guarded(self) -> Self {
        if self.is_connection_failure() {
            Error::SubscriberClosed
        } else {
            self
        }
    }
}
