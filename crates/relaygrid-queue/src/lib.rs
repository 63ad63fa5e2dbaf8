//! relaygrid-queue — the transport collaborators of relaygrid.
//!
//! The front end and the worker tier never share memory; everything they
//! exchange goes through three narrow interfaces:
//!
//! | Trait | Operations |
//! |---|---|
//! | [`MessageQueue`] | `send`, long-poll `receive`, `delete`, `approximate_depth` |
//! | [`BlobStore`] | `put`, `get` by bucket and key |
//! | [`AttributeStore`] | `get_attribute`, `put_attribute` by table, item and name |
//!
//! The traits return boxed futures so they can be held as `Arc<dyn _>`.
//! [`MemoryQueue`], [`MemoryBlobStore`], [`FsBlobStore`] and
//! [`MemoryAttributeStore`] back the standalone daemon and the tests.
//! [`Transport`] bundles the handles with the channel and bucket names.
//!
//! # Delivery semantics
//!
//! `MemoryQueue` mirrors a hosted at-least-once queue: a received message
//! becomes invisible for the visibility timeout and reappears if it is not
//! deleted in time. Each delivery carries a fresh receipt handle; only the
//! latest one can delete the message.

pub mod attributes;
pub mod blob;
pub mod error;
pub mod queue;
pub mod transport;

pub use attributes::{AttributeStore, MemoryAttributeStore};
pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use error::{TransportError, TransportResult};
pub use queue::{MemoryQueue, MessageQueue, ReceivedMessage};
pub use transport::Transport;
