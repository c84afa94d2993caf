//! The job dispatcher: single owner of the pending queue, result cache,
//! waiter registry and worker registry.
//!
//! All state lives inside one tokio task fed by an mpsc channel. Transports
//! talk to it through a cloneable [`DispatcherHandle`]; every request is
//! applied whole, one at a time, in arrival order.
//!
//! ```ignore
//! let cancel = CancellationToken::new();
//! let (dispatcher, task) = spawn_dispatcher(DispatcherConfig::default(), cancel.clone());
//! let id = dispatcher.submit(Job::with_default_cmd(infile)).await?;
//! ```

pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod queue;
pub mod waiters;
pub mod workers;

pub use config::DispatcherConfig;
pub use dispatcher::{spawn_dispatcher, Dispatcher, DispatcherStats};
pub use error::{DispatchError, DispatchResult};
pub use handle::DispatcherHandle;
pub use workers::WorkerStatus;
