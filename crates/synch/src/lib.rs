//! # Synch
//!
//! Two synchronization primitives whose entire state lives in a shared
//! segment of 32-bit atomic words:
//!
//! - [`Lock`]: non-reentrant mutex that records which identity holds it
//! - [`Sema`]: counting semaphore
//!
//! ## Architecture Rules
//!
//! 1. **The segment is the only shared state** - handles talk through it and
//!    nowhere else
//! 2. **Single-word atomics** - every read or write of the segment is one
//!    load, store, compare-and-swap or fetch-add
//! 3. **Two waiting disciplines, one wait list** - `*_blocking` calls park the
//!    thread, async calls suspend the task, and a notify from either side
//!    wakes either kind
//!
//! No fairness, no timeouts, no deadlock detection. Wrap calls in your
//! executor's timeout if you need one.
//!
//! ## Example
//!
//! ```rust
//! use synch::{Lock, Sema};
//!
//! let lock = Lock::default();
//! assert!(lock.acquire_blocking());
//! assert!(!lock.acquire_blocking()); // non-reentrant
//! assert!(lock.release());
//!
//! let sema = Sema::new(2)?;
//! let other = synch::Sema::attach(sema.segment())?;
//! assert!(other.down_blocking());
//! assert_eq!(sema.to_string(), "Sema(1)");
//! # Ok::<(), synch::SyncError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod lock;
pub mod sema;
pub mod segment;

pub use config::WaitConfig;
pub use error::{SyncError, SyncResult};
pub use lock::{Lock, LockWords, LOCK_SEGMENT_BYTES, NO_HOLDER};
pub use sema::{Sema, SemaWords, SEMA_SEGMENT_BYTES};
pub use segment::{SharedSegment, WaitFuture, WaitOutcome};
