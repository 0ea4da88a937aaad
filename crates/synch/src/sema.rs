//! # Counting Semaphore
//!
//! Permits live in a single 4-byte segment word. `up` adds a permit and
//! wakes one waiter; `down` takes a permit, waiting while none are left.
//! There is no ceiling: calling `up` more often than `down` simply grows
//! the count.

use std::fmt;

use bytemuck::{Pod, Zeroable};

use crate::config::WaitConfig;
use crate::error::{check_word_value, SyncError, SyncResult};
use crate::segment::SharedSegment;

/// Size of a semaphore segment in bytes.
pub const SEMA_SEGMENT_BYTES: usize = 4;

const COUNT: usize = 0;

/// Typed view of a semaphore segment.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct SemaWords {
    /// Available permits.
    pub count: i32,
}

const _: () = assert!(std::mem::size_of::<SemaWords>() == SEMA_SEGMENT_BYTES);

/// Handle to a shared counting semaphore.
///
/// All handles on a segment are interchangeable; cloning is the same as
/// [`Sema::attach`] on [`Sema::segment`].
#[derive(Clone, Debug)]
pub struct Sema {
    segment: SharedSegment,
}

impl Sema {
    /// Creates a semaphore holding `initial` permits on a fresh segment.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidArgument`] if `initial` is outside
    /// `[0, 2^31)`.
    pub fn new(initial: i64) -> SyncResult<Self> {
        Self::with_config(initial, WaitConfig::default())
    }

    /// Like [`new`](Self::new) with an explicit wait policy.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_config(initial: i64, config: WaitConfig) -> SyncResult<Self> {
        let initial = check_word_value("initial", initial)?;
        Ok(Self::fresh(initial, config))
    }

    fn fresh(initial: i32, config: WaitConfig) -> Self {
        Self {
            segment: SharedSegment::from_words(&[initial], config),
        }
    }

    /// Attaches a new handle to an existing semaphore segment.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidHandle`] if the segment is not exactly
    /// [`SEMA_SEGMENT_BYTES`] long.
    pub fn attach(segment: &SharedSegment) -> SyncResult<Self> {
        if segment.byte_len() != SEMA_SEGMENT_BYTES {
            return Err(SyncError::InvalidHandle {
                component: "Sema",
                expected: SEMA_SEGMENT_BYTES,
                actual: segment.byte_len(),
            });
        }
        tracing::debug!("semaphore handle attached");
        Ok(Self {
            segment: segment.clone(),
        })
    }

    /// Adds one permit and wakes one waiter (V operation). Always `true`.
    pub fn up(&self) -> bool {
        self.segment.fetch_add(COUNT, 1);
        self.segment.notify(COUNT, 1);
        true
    }

    /// Takes one permit, blocking the calling thread while none are
    /// available (P operation). Always `true` once it returns.
    pub fn down_blocking(&self) -> bool {
        loop {
            let mut value = self.segment.load(COUNT);
            if value == 0 {
                self.segment.wait(COUNT, 0);
                value = self.segment.load(COUNT);
                if value == 0 {
                    continue;
                }
            }
            if self.try_take(value) {
                return true;
            }
        }
    }

    /// Takes one permit, suspending the current task while none are
    /// available. Always `true` once it completes.
    ///
    /// Dropping the future before it completes takes no permit.
    pub async fn down(&self) -> bool {
        loop {
            let mut value = self.segment.load(COUNT);
            if value == 0 {
                self.segment.wait_async(COUNT, 0).await;
                value = self.segment.load(COUNT);
                if value == 0 {
                    continue;
                }
            }
            if self.try_take(value) {
                return true;
            }
        }
    }

    fn try_take(&self, value: i32) -> bool {
        match self.segment.compare_exchange(COUNT, value, value.wrapping_sub(1)) {
            Ok(_) => true,
            Err(observed) => {
                tracing::trace!(expected = value, observed, "lost permit race, retrying");
                false
            }
        }
    }

    /// Currently available permits.
    #[inline]
    #[must_use]
    pub fn value(&self) -> i32 {
        self.segment.load(COUNT)
    }

    /// The segment backing this semaphore, for handing to other threads or
    /// tasks.
    #[inline]
    #[must_use]
    pub fn segment(&self) -> &SharedSegment {
        &self.segment
    }

    /// Copy of the segment.
    #[must_use]
    pub fn snapshot(&self) -> SemaWords {
        SemaWords {
            count: self.segment.load(COUNT),
        }
    }
}

impl Default for Sema {
    /// Semaphore with a single permit.
    fn default() -> Self {
        Self::fresh(1, WaitConfig::default())
    }
}

impl fmt::Display for Sema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sema({})", self.segment.load(COUNT))
    }
}
