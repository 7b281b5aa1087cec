//! Lock-free triple buffering
//!
//! Three slots: write, ready, read. The producer mutates the write slot
//! and publishes by swapping write/ready; the consumer swaps ready/read
//! at block boundaries only when newer data is pending. Slot contents
//! never move; the swap is a single atomic index-word update.

use portable_atomic::{AtomicU32, Ordering};
use std::cell::UnsafeCell;

const FRESH_BIT: u32 = 1 << 6;

/// Triple buffer for single-producer single-consumer handoff
pub struct TripleBuffer<T> {
    /// Slot storage
    buffers: [UnsafeCell<T>; 3],
    /// Packed state: bits 0-1 = write, bits 2-3 = ready, bits 4-5 = read,
    /// bit 6 = ready slot holds unconsumed data
    state: AtomicU32,
}

// Access is serialized through the atomic state word: the producer only
// touches the write slot, the consumer only the read slot.
unsafe impl<T: Send> Send for TripleBuffer<T> {}
unsafe impl<T: Send> Sync for TripleBuffer<T> {}

impl<T> TripleBuffer<T> {
    /// Build with a factory so non-`Clone` payloads work.
    pub fn new_with(mut factory: impl FnMut() -> T) -> Self {
        Self {
            buffers: [
                UnsafeCell::new(factory()),
                UnsafeCell::new(factory()),
                UnsafeCell::new(factory()),
            ],
            state: AtomicU32::new(0b00_01_10),
        }
    }

    /// Mutable reference to the write slot (producer side).
    #[allow(clippy::mut_from_ref)]
    pub fn write(&self) -> &mut T {
        let state = self.state.load(Ordering::Acquire);
        let write_idx = (state & 0b11) as usize;
        unsafe { &mut *self.buffers[write_idx].get() }
    }

    /// Swap write and ready; mark the ready slot fresh.
    pub fn publish(&self) {
        loop {
            let state = self.state.load(Ordering::Acquire);
            let write_idx = state & 0b11;
            let ready_idx = (state >> 2) & 0b11;
            let read_idx = (state >> 4) & 0b11;

            let new_state = ready_idx | (write_idx << 2) | (read_idx << 4) | FRESH_BIT;

            if self
                .state
                .compare_exchange_weak(state, new_state, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
    }

    /// Consumer-side acquire: swap in the ready slot if it is fresh, then
    /// return the read slot. Call once per audio block, at block start.
    pub fn acquire_read(&self) -> &T {
        loop {
            let state = self.state.load(Ordering::Acquire);
            if state & FRESH_BIT == 0 {
                break;
            }
            let write_idx = state & 0b11;
            let ready_idx = (state >> 2) & 0b11;
            let read_idx = (state >> 4) & 0b11;

            let new_state = write_idx | (read_idx << 2) | (ready_idx << 4);

            if self
                .state
                .compare_exchange_weak(state, new_state, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }

        let state = self.state.load(Ordering::Acquire);
        let read_idx = ((state >> 4) & 0b11) as usize;
        unsafe { &*self.buffers[read_idx].get() }
    }

    /// Current read slot without checking for newer data.
    pub fn peek(&self) -> &T {
        let state = self.state.load(Ordering::Acquire);
        let read_idx = ((state >> 4) & 0b11) as usize;
        unsafe { &*self.buffers[read_idx].get() }
    }

    /// True if a publish has not yet been consumed.
    pub fn has_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) & FRESH_BIT != 0
    }
}

impl<T: Clone> TripleBuffer<T> {
    pub fn new(initial: T) -> Self {
        Self::new_with(|| initial.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_then_read() {
        let buffer = TripleBuffer::new(0u64);
        *buffer.write() = 41;
        buffer.publish();
        assert!(buffer.has_pending());
        assert_eq!(*buffer.acquire_read(), 41);
        assert!(!buffer.has_pending());
    }

    #[test]
    fn test_read_without_publish_is_stable() {
        let buffer = TripleBuffer::new(7u64);
        assert_eq!(*buffer.acquire_read(), 7);
        *buffer.write() = 99;
        // Not yet published; the consumer keeps seeing the old value.
        assert_eq!(*buffer.acquire_read(), 7);
    }

    #[test]
    fn test_latest_publish_wins() {
        let buffer = TripleBuffer::new(0u64);
        *buffer.write() = 1;
        buffer.publish();
        *buffer.write() = 2;
        buffer.publish();
        assert_eq!(*buffer.acquire_read(), 2);
    }

    #[test]
    fn test_concurrent_handoff() {
        use std::sync::Arc;
        let buffer = Arc::new(TripleBuffer::new(0u64));
        let producer = {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || {
                for i in 1..=10_000u64 {
                    *buffer.write() = i;
                    buffer.publish();
                }
            })
        };
        let mut last = 0;
        for _ in 0..10_000 {
            let value = *buffer.acquire_read();
            // Values only move forward.
            assert!(value >= last);
            last = value;
        }
        producer.join().unwrap();
        assert_eq!(*buffer.acquire_read(), 10_000);
    }
}
