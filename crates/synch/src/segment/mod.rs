//! # Shared Segments
//!
//! A segment is a fixed block of 32-bit atomic words that every handle of a
//! [`Lock`](crate::Lock) or [`Sema`](crate::Sema) points at. Handing a
//! segment to another thread or task hands over a reference, never a copy:
//!
//! ```text
//!   thread A          thread B          task C
//!   Lock(tid 0)       Lock(tid 1)       Lock(tid 2)
//!        │                 │                 │
//!        └────────┬────────┴────────┬────────┘
//!                 ▼                 ▼
//!        ┌──────────────────────────────────┐
//!        │ SharedSegment (Arc)              │
//!        │  words:   [flag][holder][ctr]    │
//!        │  waiters: [list][list ][list]    │
//!        └──────────────────────────────────┘
//! ```
//!
//! Word access is `SeqCst` throughout: the lock's protocol spans two words
//! and must observe them in one total order.

mod wait;

pub use wait::{WaitFuture, WaitOutcome};

use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use crate::config::WaitConfig;
use crate::error::{SyncError, SyncResult};
use wait::WaitList;

/// Size of one segment word in bytes.
pub const WORD_BYTES: usize = std::mem::size_of::<i32>();

struct SegmentInner {
    words: Box<[AtomicI32]>,
    waiters: Box<[WaitList]>,
    config: WaitConfig,
}

/// Reference-counted block of atomic words with futex-style wait/notify.
///
/// Cloning is cheap and yields another reference to the same words. The
/// memory is reclaimed when the last reference (segment or handle) drops.
#[derive(Clone)]
pub struct SharedSegment {
    inner: Arc<SegmentInner>,
}

impl SharedSegment {
    /// Builds a segment holding `words`, in order.
    pub(crate) fn from_words(words: &[i32], config: WaitConfig) -> Self {
        let atomics: Box<[AtomicI32]> = words.iter().map(|&w| AtomicI32::new(w)).collect();
        let waiters: Box<[WaitList]> = words.iter().map(|_| WaitList::default()).collect();
        tracing::debug!(words = words.len(), spin_limit = config.spin_limit, "segment created");
        Self {
            inner: Arc::new(SegmentInner {
                words: atomics,
                waiters,
                config,
            }),
        }
    }

    /// Creates a zero-filled segment of `byte_len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidArgument`] unless `byte_len` is a non-zero
    /// multiple of [`WORD_BYTES`].
    pub fn zeroed(byte_len: usize) -> SyncResult<Self> {
        check_byte_len(byte_len)?;
        Ok(Self::from_words(&vec![0; byte_len / WORD_BYTES], WaitConfig::default()))
    }

    /// Creates a segment initialised from a native-endian byte image.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidArgument`] unless the image length is a
    /// non-zero multiple of [`WORD_BYTES`].
    pub fn from_bytes(bytes: &[u8]) -> SyncResult<Self> {
        Self::from_bytes_with_config(bytes, WaitConfig::default())
    }

    /// Like [`from_bytes`](Self::from_bytes) with an explicit wait policy.
    ///
    /// # Errors
    ///
    /// Same as [`from_bytes`](Self::from_bytes).
    pub fn from_bytes_with_config(bytes: &[u8], config: WaitConfig) -> SyncResult<Self> {
        check_byte_len(bytes.len())?;
        let words: Vec<i32> = bytes
            .chunks_exact(WORD_BYTES)
            .map(bytemuck::pod_read_unaligned::<i32>)
            .collect();
        Ok(Self::from_words(&words, config))
    }

    /// Size of the segment in bytes.
    #[inline]
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.inner.words.len() * WORD_BYTES
    }

    /// Number of words in the segment.
    #[inline]
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.inner.words.len()
    }

    /// Wait policy fixed at creation.
    #[inline]
    #[must_use]
    pub fn config(&self) -> WaitConfig {
        self.inner.config
    }

    /// Number of live references (segments and handles) to this memory.
    #[must_use]
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Returns `true` if both values refer to the same memory.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Copies the current contents out as a native-endian byte image.
    ///
    /// Each word is loaded atomically; the image as a whole is not a single
    /// atomic snapshot.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let words: Vec<i32> = (0..self.word_count()).map(|i| self.load(i)).collect();
        bytemuck::cast_slice::<i32, u8>(&words).to_vec()
    }

    /// Atomically loads word `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.word_count()`.
    #[inline]
    #[must_use]
    pub fn load(&self, index: usize) -> i32 {
        self.inner.words[index].load(Ordering::SeqCst)
    }

    #[inline]
    pub(crate) fn store(&self, index: usize, value: i32) {
        self.inner.words[index].store(value, Ordering::SeqCst);
    }

    /// Returns the previous value on success, the observed value on failure.
    #[inline]
    pub(crate) fn compare_exchange(&self, index: usize, current: i32, new: i32) -> Result<i32, i32> {
        self.inner.words[index].compare_exchange(current, new, Ordering::SeqCst, Ordering::SeqCst)
    }

    #[inline]
    pub(crate) fn fetch_add(&self, index: usize, delta: i32) -> i32 {
        self.inner.words[index].fetch_add(delta, Ordering::SeqCst)
    }

    /// Blocks the calling thread while word `index` equals `expected`.
    ///
    /// Returns [`WaitOutcome::NotEqual`] without blocking if the word already
    /// differs. Otherwise the thread stays parked until a
    /// [`notify`](Self::notify) on the same word selects it; the word may have
    /// changed again by the time the call returns.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.word_count()`.
    pub fn wait(&self, index: usize, expected: i32) -> WaitOutcome {
        let word = &self.inner.words[index];
        if wait::spin_until_changed(word, expected, self.inner.config.spin_limit) {
            return WaitOutcome::NotEqual;
        }
        self.inner.waiters[index].wait(word, expected)
    }

    /// Suspending counterpart of [`wait`](Self::wait).
    ///
    /// The returned future registers on the same wait list as blocking
    /// waiters.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.word_count()`.
    pub fn wait_async(&self, index: usize, expected: i32) -> WaitFuture<'_> {
        WaitFuture::new(
            &self.inner.waiters[index],
            &self.inner.words[index],
            expected,
            self.inner.config.spin_limit,
        )
    }

    /// Wakes up to `count` waiters on word `index`, blocking or suspended.
    ///
    /// Returns how many waiters were woken.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.word_count()`.
    pub fn notify(&self, index: usize, count: usize) -> usize {
        let woken = self.inner.waiters[index].notify(count);
        tracing::trace!(word = index, woken, "notify");
        woken
    }

    /// Number of waiters currently registered on word `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.word_count()`.
    #[must_use]
    pub fn waiter_count(&self, index: usize) -> usize {
        self.inner.waiters[index].len()
    }
}

impl fmt::Debug for SharedSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words: Vec<i32> = (0..self.word_count()).map(|i| self.load(i)).collect();
        f.debug_struct("SharedSegment")
            .field("words", &words)
            .field("handles", &self.handle_count())
            .finish()
    }
}

fn check_byte_len(byte_len: usize) -> SyncResult<()> {
    if byte_len == 0 || byte_len % WORD_BYTES != 0 {
        return Err(SyncError::InvalidArgument {
            name: "byte_len",
            value: i64::try_from(byte_len).unwrap_or(i64::MAX),
        });
    }
    Ok(())
}
