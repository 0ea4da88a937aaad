//! # Ownership-Tracking Lock
//!
//! A non-reentrant mutex whose state lives entirely in a 12-byte
//! [`SharedSegment`]. Every handle carries an identity; the segment records
//! which identity holds the lock, and only that identity may release it.
//!
//! ## Segment Layout
//!
//! ```text
//!   byte 0        4         8         12
//!        ┌────────┬─────────┬─────────┐
//!        │  flag  │ holder  │ counter │
//!        └────────┴─────────┴─────────┘
//!   flag:    1 = unlocked, 0 = locked
//!   holder:  identity of the owner, -1 when free
//!   counter: last identity handed out by `attach(_, None)`
//! ```
//!
//! ## Protocol
//!
//! Acquire: bail out if our identity already holds it, otherwise wait while
//! `flag == 0`, then `CAS(flag, 1 → 0)` and publish our identity in `holder`.
//! A lost CAS restarts the loop.
//!
//! Release: only the recorded holder proceeds. It clears `holder`, then
//! `CAS(flag, 0 → 1)` and wakes one waiter.

use std::fmt;

use bytemuck::{Pod, Zeroable};

use crate::config::WaitConfig;
use crate::error::{check_word_value, SyncError, SyncResult};
use crate::segment::SharedSegment;

/// Size of a lock segment in bytes.
pub const LOCK_SEGMENT_BYTES: usize = 12;

/// `holder` value while nobody owns the lock.
pub const NO_HOLDER: i32 = -1;

const FLAG: usize = 0;
const HOLDER: usize = 1;
const ID_COUNTER: usize = 2;

const LOCKED: i32 = 0;
const UNLOCKED: i32 = 1;

/// Typed view of a lock segment.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct LockWords {
    /// 1 when unlocked, 0 when locked.
    pub flag: i32,
    /// Current owner, or [`NO_HOLDER`].
    pub holder: i32,
    /// Identity counter for auto-assigned identities.
    pub id_counter: i32,
}

const _: () = assert!(std::mem::size_of::<LockWords>() == LOCK_SEGMENT_BYTES);

impl LockWords {
    /// Layout of a freshly constructed lock.
    #[must_use]
    pub const fn unlocked(id_counter: i32) -> Self {
        Self {
            flag: UNLOCKED,
            holder: NO_HOLDER,
            id_counter,
        }
    }
}

/// Handle to a shared, ownership-tracking lock.
///
/// Cloning produces another handle with the **same** identity on the same
/// segment. Use [`Lock::attach`] to obtain a handle with a different
/// identity.
///
/// ## Usage
///
/// ```rust
/// use synch::Lock;
///
/// let lock = Lock::new(0)?;
/// let segment = lock.segment().clone();
///
/// std::thread::spawn(move || {
///     let worker = Lock::attach(&segment, None).unwrap();
///     if worker.acquire_blocking() {
///         // critical section
///         worker.release();
///     }
/// })
/// .join()
/// .unwrap();
///
/// assert!(!lock.is_locked());
/// # Ok::<(), synch::SyncError>(())
/// ```
#[derive(Clone, Debug)]
pub struct Lock {
    segment: SharedSegment,
    identity: i32,
}

impl Lock {
    /// Creates an unlocked lock on a fresh segment.
    ///
    /// The segment's identity counter starts at `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidArgument`] if `identity` is outside
    /// `[0, 2^31)`.
    pub fn new(identity: i64) -> SyncResult<Self> {
        Self::with_config(identity, WaitConfig::default())
    }

    /// Like [`new`](Self::new) with an explicit wait policy.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_config(identity: i64, config: WaitConfig) -> SyncResult<Self> {
        let identity = check_word_value("identity", identity)?;
        Ok(Self::fresh(identity, config))
    }

    fn fresh(identity: i32, config: WaitConfig) -> Self {
        let words = LockWords::unlocked(identity);
        let segment = SharedSegment::from_words(bytemuck::cast_slice(&[words]), config);
        Self { segment, identity }
    }

    /// Attaches a new handle to an existing lock segment.
    ///
    /// With `identity == None` a fresh identity is minted by atomically
    /// incrementing the segment's counter. An explicit identity is used
    /// as-is; it is not checked against identities already handed out.
    ///
    /// Attaching never changes `flag` or `holder`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidHandle`] if the segment is not exactly
    /// [`LOCK_SEGMENT_BYTES`] long, and [`SyncError::InvalidArgument`] if an
    /// explicit identity is outside `[0, 2^31)`.
    pub fn attach(segment: &SharedSegment, identity: Option<i64>) -> SyncResult<Self> {
        if segment.byte_len() != LOCK_SEGMENT_BYTES {
            return Err(SyncError::InvalidHandle {
                component: "Lock",
                expected: LOCK_SEGMENT_BYTES,
                actual: segment.byte_len(),
            });
        }
        let identity = match identity {
            Some(identity) => check_word_value("identity", identity)?,
            None => segment.fetch_add(ID_COUNTER, 1).wrapping_add(1),
        };
        tracing::debug!(identity, "lock handle attached");
        Ok(Self {
            segment: segment.clone(),
            identity,
        })
    }

    /// Acquires the lock, blocking the calling thread while it is held.
    ///
    /// Returns `false` immediately if this identity already holds the lock.
    pub fn acquire_blocking(&self) -> bool {
        loop {
            if self.held_by_self() {
                return false;
            }
            self.segment.wait(FLAG, LOCKED);
            if self.try_take() {
                return true;
            }
        }
    }

    /// Acquires the lock, suspending the current task while it is held.
    ///
    /// Same contract as [`acquire_blocking`](Self::acquire_blocking). The
    /// executor thread is never blocked. Dropping the future before it
    /// completes leaves the lock untouched.
    pub async fn acquire(&self) -> bool {
        loop {
            if self.held_by_self() {
                return false;
            }
            self.segment.wait_async(FLAG, LOCKED).await;
            if self.try_take() {
                return true;
            }
        }
    }

    fn held_by_self(&self) -> bool {
        self.segment.load(HOLDER) == self.identity
    }

    fn try_take(&self) -> bool {
        if self.segment.compare_exchange(FLAG, UNLOCKED, LOCKED).is_err() {
            tracing::trace!(identity = self.identity, "lost lock race, retrying");
            return false;
        }
        self.segment.store(HOLDER, self.identity);
        tracing::debug!(identity = self.identity, "lock acquired");
        true
    }

    /// Releases the lock.
    ///
    /// Returns `false` if nobody holds it or another identity does. Returns
    /// `false` as well if the flag was not set although this identity was
    /// recorded as holder; the holder is cleared in that case.
    pub fn release(&self) -> bool {
        let holder = self.segment.load(HOLDER);
        if holder == NO_HOLDER || holder != self.identity {
            return false;
        }
        self.segment.store(HOLDER, NO_HOLDER);
        if let Err(flag) = self.segment.compare_exchange(FLAG, LOCKED, UNLOCKED) {
            tracing::warn!(identity = self.identity, flag, "lock flag was not set during release");
            return false;
        }
        self.segment.notify(FLAG, 1);
        tracing::debug!(identity = self.identity, "lock released");
        true
    }

    /// Identity currently holding the lock, or [`NO_HOLDER`].
    #[inline]
    #[must_use]
    pub fn holder(&self) -> i32 {
        self.segment.load(HOLDER)
    }

    /// Identity of this handle.
    #[inline]
    #[must_use]
    pub fn identity(&self) -> i32 {
        self.identity
    }

    /// Returns `true` while any identity holds the lock.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.segment.load(FLAG) == LOCKED
    }

    /// The segment backing this lock, for handing to other threads or tasks.
    #[inline]
    #[must_use]
    pub fn segment(&self) -> &SharedSegment {
        &self.segment
    }

    /// Word-by-word copy of the segment.
    #[must_use]
    pub fn snapshot(&self) -> LockWords {
        LockWords {
            flag: self.segment.load(FLAG),
            holder: self.segment.load(HOLDER),
            id_counter: self.segment.load(ID_COUNTER),
        }
    }
}

impl Default for Lock {
    /// Unlocked lock with identity 0.
    fn default() -> Self {
        Self::fresh(0, WaitConfig::default())
    }
}

impl fmt::Display for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segment.load(FLAG) == UNLOCKED {
            write!(f, "[unlocked] Lock")
        } else {
            write!(f, "[LOCKED ({})] Lock", self.segment.load(HOLDER))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let lock = Lock::default();
        assert!(!lock.is_locked());
        assert_eq!(lock.holder(), NO_HOLDER);
        assert_eq!(lock.identity(), 0);
        assert_eq!(lock.snapshot(), LockWords::unlocked(0));
    }

    #[test]
    fn test_custom_identity() {
        let lock = Lock::new(12).unwrap();
        assert!(!lock.is_locked());
        assert_eq!(lock.holder(), NO_HOLDER);
        assert_eq!(lock.identity(), 12);
    }

    #[test]
    fn test_rejects_out_of_range_identity() {
        assert_eq!(
            Lock::new(-1).unwrap_err(),
            SyncError::InvalidArgument { name: "identity", value: -1 }
        );
        assert!(Lock::new(1 << 31).is_err());
        assert!(Lock::new(i64::from(i32::MAX)).is_ok());
    }

    #[test]
    fn test_acquire_then_reacquire() {
        let lock = Lock::default();
        assert!(lock.acquire_blocking());
        assert_eq!(lock.holder(), 0);
        assert!(!lock.acquire_blocking());
        assert_eq!(lock.holder(), 0);
    }

    #[test]
    fn test_release() {
        let lock = Lock::default();
        assert!(lock.acquire_blocking());
        assert!(lock.release());
        assert!(!lock.is_locked());
        assert_eq!(lock.holder(), NO_HOLDER);
    }

    #[test]
    fn test_release_without_holder() {
        let lock = Lock::default();
        assert!(!lock.release());
        assert!(!lock.is_locked());
        assert_eq!(lock.holder(), NO_HOLDER);
    }

    #[test]
    fn test_release_by_other_identity() {
        let lock = Lock::default();
        let other = Lock::attach(lock.segment(), Some(1)).unwrap();
        assert!(lock.acquire_blocking());
        assert!(!other.release());
        assert!(lock.is_locked());
        assert_eq!(lock.holder(), 0);
    }

    #[test]
    fn test_clone_shares_identity_and_state() {
        let original = Lock::default();
        let replica = original.clone();
        assert_eq!(replica.identity(), original.identity());
        assert!(original.acquire_blocking());
        assert!(replica.is_locked());
        assert!(replica.release());
        assert!(!original.is_locked());
    }

    #[test]
    fn test_attach_mints_identities() {
        let lock = Lock::new(10).unwrap();
        let a = Lock::attach(lock.segment(), None).unwrap();
        let b = Lock::attach(lock.segment(), None).unwrap();
        assert_eq!(a.identity(), 11);
        assert_eq!(b.identity(), 12);
        assert_eq!(lock.snapshot().id_counter, 12);
    }

    #[test]
    fn test_attach_rejects_wrong_size() {
        let segment = SharedSegment::zeroed(4).unwrap();
        assert_eq!(
            Lock::attach(&segment, None).unwrap_err(),
            SyncError::InvalidHandle { component: "Lock", expected: 12, actual: 4 }
        );
    }

    #[test]
    fn test_attach_rejects_bad_identity_without_side_effects() {
        let lock = Lock::default();
        assert!(Lock::attach(lock.segment(), Some(-5)).is_err());
        assert_eq!(lock.snapshot().id_counter, 0);
    }

    #[test]
    fn test_display() {
        let lock = Lock::new(3).unwrap();
        assert_eq!(lock.to_string(), "[unlocked] Lock");
        assert!(lock.acquire_blocking());
        assert_eq!(lock.to_string(), "[LOCKED (3)] Lock");
    }

    #[test]
    fn test_release_with_cleared_flag_keeps_holder_cleared() {
        // holder says 5 but flag says unlocked
        let words = LockWords { flag: UNLOCKED, holder: 5, id_counter: 0 };
        let segment = SharedSegment::from_bytes(bytemuck::bytes_of(&words)).unwrap();
        let lock = Lock::attach(&segment, Some(5)).unwrap();

        assert!(!lock.release());
        assert_eq!(lock.holder(), NO_HOLDER);
        assert!(!lock.is_locked());
    }

    #[tokio::test]
    async fn test_async_acquire_release() {
        let lock = Lock::default();
        assert!(lock.acquire().await);
        assert_eq!(lock.holder(), 0);
        assert!(!lock.acquire().await);
        assert!(lock.release());
        assert!(!lock.is_locked());
    }
}
