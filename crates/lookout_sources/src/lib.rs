//! Image sources feeding the request queue.
//!
//! A source's only job is to turn external events into
//! `ClassificationRequest`s and push them onto the queue; no
//! classification or routing logic runs on a source task. Each
//! deployment variant uses exactly one source: the polling directory
//! watcher (filesystem variant) or the bus subscriber (MQTT variant).

pub mod bus;
pub mod watcher;

pub use bus::{connect, BusSubscriber, MqttConfig};
pub use watcher::{DirectoryWatcher, WatcherConfig};
