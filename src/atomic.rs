//! Word-sized atomic cells used for cross-fiber/thread signalling.
//!
//! Grounded on `lib_fiber/c/src/common/atomic.c`. The original stores a
//! single `void *` slot and, for the 64-bit integer operations, passes the
//! *contents* of that slot to the underlying intrinsic as if it were the
//! slot's address:
//!
//! ```c
//! long long atomic_int64_fetch_add(ATOMIC *self, long long n)
//! {
//!     return (long long) __sync_fetch_and_add((long long *) self->value, n);
//! }
//! ```
//!
//! `self->value` is the stored pointer-sized value, not `&self->value`; the
//! intrinsic would mutate whatever that value happens to point at rather
//! than the cell itself. [`AtomicCell`] and [`AtomicI64Cell`] below are kept
//! as two distinct, correctly-addressed types instead of replicating that
//! behaviour.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

/// A word-sized slot holding an opaque pointer, read and written
/// indivisibly.
///
/// Interpretation of the stored word (pointer vs. arbitrary `usize` tag) is
/// up to the call site; the cell itself never dereferences it.
#[derive(Debug, Default)]
pub struct AtomicCell {
    slot: AtomicUsize,
}

impl AtomicCell {
    pub fn new(value: usize) -> AtomicCell {
        AtomicCell {
            slot: AtomicUsize::new(value),
        }
    }

    /// Atomically replaces the stored value with `value` (release store).
    #[inline]
    pub fn set(&self, value: usize) {
        self.slot.store(value, Ordering::Release);
    }

    /// Atomically replaces the stored value with `value`, returning the
    /// prior value.
    #[inline]
    pub fn swap(&self, value: usize) -> usize {
        self.slot.swap(value, Ordering::AcqRel)
    }

    /// Compares the stored value against `expected` and, if equal, replaces
    /// it with `new`. Returns the value observed at the instant of the
    /// attempt (the *value-returning* CAS, not a boolean success flag):
    /// callers test `observed == expected` themselves.
    #[inline]
    pub fn cas(&self, expected: usize, new: usize) -> usize {
        match self
            .slot
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(prev) => prev,
            Err(prev) => prev,
        }
    }

    #[inline]
    pub fn get(&self) -> usize {
        self.slot.load(Ordering::Acquire)
    }
}

/// A signed 64-bit integer cell, addressed correctly (operates on the
/// cell's own storage, never on the value stored inside it).
///
/// On a platform lacking 64-bit atomics, every mutating operation logs a
/// non-fatal error and returns the sentinel documented per-method instead
/// of panicking; the cell is then unsafe to use as a correctness primitive.
#[derive(Debug, Default)]
pub struct AtomicI64Cell {
    #[cfg(target_has_atomic = "64")]
    slot: AtomicI64,
    #[cfg(not(target_has_atomic = "64"))]
    slot: std::sync::Mutex<i64>,
}

impl AtomicI64Cell {
    pub fn new(value: i64) -> AtomicI64Cell {
        AtomicI64Cell {
            #[cfg(target_has_atomic = "64")]
            slot: AtomicI64::new(value),
            #[cfg(not(target_has_atomic = "64"))]
            slot: std::sync::Mutex::new(value),
        }
    }

    #[cfg(target_has_atomic = "64")]
    #[inline]
    pub fn set(&self, value: i64) {
        self.slot.store(value, Ordering::Release);
    }

    #[cfg(not(target_has_atomic = "64"))]
    pub fn set(&self, value: i64) {
        log::error!("AtomicI64Cell::set: 64-bit atomics unsupported on this platform");
        *self.slot.lock().unwrap() = value;
    }

    #[cfg(target_has_atomic = "64")]
    #[inline]
    pub fn get(&self) -> i64 {
        self.slot.load(Ordering::Acquire)
    }

    #[cfg(not(target_has_atomic = "64"))]
    pub fn get(&self) -> i64 {
        *self.slot.lock().unwrap()
    }

    /// Adds `n` to the cell, returning the prior value. Sentinel `-1` on an
    /// unsupported platform.
    #[cfg(target_has_atomic = "64")]
    #[inline]
    pub fn fetch_add(&self, n: i64) -> i64 {
        self.slot.fetch_add(n, Ordering::AcqRel)
    }

    #[cfg(not(target_has_atomic = "64"))]
    pub fn fetch_add(&self, _n: i64) -> i64 {
        log::error!("AtomicI64Cell::fetch_add: 64-bit atomics unsupported on this platform");
        -1
    }

    /// Adds `n` to the cell, returning the new value. Sentinel `-1` on an
    /// unsupported platform.
    #[cfg(target_has_atomic = "64")]
    #[inline]
    pub fn add_fetch(&self, n: i64) -> i64 {
        self.slot.fetch_add(n, Ordering::AcqRel) + n
    }

    #[cfg(not(target_has_atomic = "64"))]
    pub fn add_fetch(&self, _n: i64) -> i64 {
        log::error!("AtomicI64Cell::add_fetch: 64-bit atomics unsupported on this platform");
        -1
    }

    /// Value-returning CAS: returns the value observed at the instant of
    /// the attempt. On an unsupported platform, returns the unchanged
    /// current value (no mutation took place).
    #[cfg(target_has_atomic = "64")]
    #[inline]
    pub fn cas(&self, expected: i64, new: i64) -> i64 {
        match self
            .slot
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(prev) => prev,
            Err(prev) => prev,
        }
    }

    #[cfg(not(target_has_atomic = "64"))]
    pub fn cas(&self, _expected: i64, _new: i64) -> i64 {
        log::error!("AtomicI64Cell::cas: 64-bit atomics unsupported on this platform");
        *self.slot.lock().unwrap()
    }
}
