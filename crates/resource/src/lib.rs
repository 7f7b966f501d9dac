//! # Cistern Resource Pool
//!
//! A bounded, thread-safe pool for expensive, fallible resources such as
//! database connections, sockets or native contexts.
//!
//! - at most `capacity` resources are checked out at once;
//! - released resources are reused, most recently released first;
//! - resources that report an error are discarded instead of recycled;
//! - callers that wait longer than the acquire timeout get
//!   [`Error::AcquireTimeout`] rather than blocking forever.
//!
//! ```
//! use cistern_resource::testing::MockFactory;
//! use cistern_resource::{PoolConfig, ResourcePool};
//!
//! let pool = ResourcePool::new(MockFactory::new("db"), PoolConfig::default().with_capacity(2));
//! let conn = pool.acquire()?;
//! let id = conn.id();
//! drop(conn);
//! assert_eq!(pool.acquire()?.id(), id);
//! pool.close();
//! # Ok::<(), cistern_resource::Error>(())
//! ```

pub mod error;
pub mod events;
pub mod guard;
pub mod pool;
pub mod resource;
pub mod testing;

pub use error::{Error, Result};
pub use events::{EntryId, EventSink};
pub use guard::{Handle, Pooled};
pub use pool::{PoolConfig, PoolStats, ResourcePool};
pub use resource::{RawResource, ResourceFactory};
