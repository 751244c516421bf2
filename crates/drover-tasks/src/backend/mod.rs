use async_trait::async_trait;

pub mod memory;

pub use self::memory::{MemoryDataStore, MemoryEventEmitter, MemoryQueue};

/// Boxed error returned by backend drivers. The runtime wraps it into
/// [`BrokerError`](crate::error::BrokerError) variants at the call site.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// FIFO message transport between producers and consumers.
#[async_trait]
pub trait Queue: Send + Sync + 'static {
    async fn write(&self, message: Vec<u8>) -> Result<(), BackendError>;

    /// Pops the oldest message, or `None` when the queue is empty.
    async fn read(&self) -> Result<Option<Vec<u8>>, BackendError>;

    /// Removes every queued copy of `message`. Backends without
    /// selective removal may return an error; the runtime never relies
    /// on this for correctness.
    async fn remove(&self, message: &[u8]) -> Result<(), BackendError>;

    async fn flush(&self) -> Result<(), BackendError>;

    async fn size(&self) -> Result<usize, BackendError>;
}

/// Key-value storage used for task results, revoke records and the
/// schedule snapshot. A missing key is `None`, distinct from any
/// stored value.
#[async_trait]
pub trait DataStore: Send + Sync + 'static {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), BackendError>;

    /// Destructive read. The value is removed from the store.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    /// Non-destructive read.
    async fn peek(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    async fn flush(&self) -> Result<(), BackendError>;
}

/// Write-only sink for task lifecycle events.
#[async_trait]
pub trait EventEmitter: Send + Sync + 'static {
    async fn emit(&self, event: Vec<u8>) -> Result<(), BackendError>;
}
