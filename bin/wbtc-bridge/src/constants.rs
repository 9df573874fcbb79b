/// Capacity of the state-apply intake channel.
pub(crate) const STATE_QUEUE_SIZE: usize = 256;

/// Capacity of each observer sink.
pub(crate) const OBSERVER_QUEUE_SIZE: usize = 128;

/// File name of the sqlite database inside the data directory.
pub(crate) const DB_FILE: &str = "bridge.db";
