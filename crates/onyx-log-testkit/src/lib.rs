//! Test doubles for `onyx-log`: an in-memory fake coordination client for
//! fast deterministic unit tests, and (behind the `embedded-server`
//! feature) a `testcontainers`-backed embedded ZooKeeper for end-to-end
//! scenario tests.

mod fake;
pub use fake::FakeBackend;

#[cfg(feature = "embedded-server")]
mod embedded;
#[cfg(feature = "embedded-server")]
pub use embedded::EmbeddedZookeeper;
