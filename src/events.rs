//! Interrupt-to-task edge event channel.
//!
//! Raw button edges are produced by GPIO ISRs and consumed by the input
//! task, which runs the debounce FSM.  The ISR side must never block or
//! allocate, so the channel is a lock-free SPSC ring buffer.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ GPIO ISR    │────▶│  Edge Queue  │────▶│  Input task  │
//! │ (per line)  │     │  (lock-free) │     │  (FSM)       │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Overflow policy: `try_send` on a full queue drops the newest edge and
//! returns `false`.  Under saturation this is at-most-once delivery per
//! physical edge; the drop is counted so the link task can log it.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

/// Maximum number of pending raw edges.
/// Power of 2 for efficient ring buffer modulo.
pub const EDGE_QUEUE_CAP: usize = 16;

/// One raw transition captured in interrupt context.
///
/// `line` indexes the configured input line table, `level_active` is the
/// sampled level already translated to active-high logic, `timestamp_ms`
/// is the wrapping millisecond clock at capture time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEdgeEvent {
    pub line: u8,
    pub level_active: bool,
    pub timestamp_ms: u32,
}

impl RawEdgeEvent {
    const fn empty() -> Self {
        Self {
            line: 0,
            level_active: false,
            timestamp_ms: 0,
        }
    }
}

// ── Lock-free SPSC ring buffer ────────────────────────────────
//
// ISRs write (produce), the input task reads (consume).  Atomic
// head/tail indices; one slot is kept free to distinguish full
// from empty, so a ring of N holds N-1 edges.

/// Bounded single-producer single-consumer edge queue.
///
/// The firmware uses the [`EDGE_QUEUE`] static so ISR trampolines can
/// reach it; tests construct their own instances.
pub struct EdgeRing<const N: usize> {
    head: AtomicU8,
    tail: AtomicU8,
    dropped: AtomicU32,
    buf: [UnsafeCell<RawEdgeEvent>; N],
}

// SAFETY: slots are accessed exclusively through the SPSC discipline.
// Producer (try_send): ISR context — one writer, writes buf[head] before
// publishing head with Release.  Consumer (try_recv): input task — one
// reader, reads buf[tail] after observing head with Acquire.  A slot is
// never read and written concurrently.
unsafe impl<const N: usize> Sync for EdgeRing<N> {}

impl<const N: usize> EdgeRing<N> {
    pub const fn new() -> Self {
        assert!(N.is_power_of_two() && N <= 128);
        Self {
            head: AtomicU8::new(0),
            tail: AtomicU8::new(0),
            dropped: AtomicU32::new(0),
            buf: [const { UnsafeCell::new(RawEdgeEvent::empty()) }; N],
        }
    }

    /// Push a raw edge into the queue.
    /// Safe to call from ISR context (lock-free, no allocation).
    /// Returns `false` if the queue is full (edge dropped and counted).
    pub fn try_send(&self, event: RawEdgeEvent) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let next_head = (head + 1) % N as u8;

        if next_head == tail {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false; // Queue full — drop edge.
        }

        // SAFETY: only the single producer writes this slot, and the
        // consumer cannot read it until the Release store below.
        unsafe {
            *self.buf[head as usize].get() = event;
        }

        self.head.store(next_head, Ordering::Release);
        true
    }

    /// Pop the oldest raw edge.
    /// Called from the input task (single consumer).
    /// Returns `None` if the queue is empty.
    pub fn try_recv(&self) -> Option<RawEdgeEvent> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if tail == head {
            return None; // Empty.
        }

        // SAFETY: the Acquire load of head guarantees the producer's
        // write to this slot is visible; the producer will not reuse it
        // until tail advances past it below.
        let event = unsafe { *self.buf[tail as usize].get() };
        self.tail.store((tail + 1) % N as u8, Ordering::Release);

        Some(event)
    }

    /// Check whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        tail == head
    }

    /// Number of pending edges.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed) as usize;
        let tail = self.tail.load(Ordering::Relaxed) as usize;
        (head + N - tail) % N
    }

    /// Read and clear the dropped-edge counter.
    /// The link task calls this periodically for diagnostics.
    pub fn take_dropped(&self) -> u32 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}

/// The ISR-fed edge queue.  Kept in a static so the GPIO ISR trampolines
/// can reach it without captures.
pub static EDGE_QUEUE: EdgeRing<EDGE_QUEUE_CAP> = EdgeRing::new();

/// Serialises tests that touch process-wide simulation statics: the edge
/// queue, the simulated pin levels, the simulated temperature. Tests in
/// other modules that poke any of those must hold this too.
#[cfg(test)]
pub(crate) static SIM_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(line: u8, active: bool, t: u32) -> RawEdgeEvent {
        RawEdgeEvent {
            line,
            level_active: active,
            timestamp_ms: t,
        }
    }

    #[test]
    fn fifo_order_preserved() {
        let ring: EdgeRing<8> = EdgeRing::new();
        for i in 0..5 {
            assert!(ring.try_send(edge(i, true, u32::from(i) * 10)));
        }
        for i in 0..5 {
            let ev = ring.try_recv().unwrap();
            assert_eq!(ev.line, i);
            assert_eq!(ev.timestamp_ms, u32::from(i) * 10);
        }
        assert!(ring.try_recv().is_none());
    }

    #[test]
    fn full_queue_drops_newest_and_counts() {
        let ring: EdgeRing<4> = EdgeRing::new();
        // Capacity N-1: three sends fit, the fourth drops.
        assert!(ring.try_send(edge(0, true, 0)));
        assert!(ring.try_send(edge(1, true, 1)));
        assert!(ring.try_send(edge(2, true, 2)));
        assert!(!ring.try_send(edge(3, true, 3)));
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.take_dropped(), 1);
        assert_eq!(ring.take_dropped(), 0);

        // Surviving events are untouched by the drop.
        assert_eq!(ring.try_recv().unwrap().line, 0);
        assert_eq!(ring.try_recv().unwrap().line, 1);
        assert_eq!(ring.try_recv().unwrap().line, 2);
        assert!(ring.try_recv().is_none());
    }

    #[test]
    fn drains_then_accepts_again() {
        let ring: EdgeRing<4> = EdgeRing::new();
        for round in 0..10u32 {
            assert!(ring.try_send(edge(0, true, round)));
            assert!(ring.try_send(edge(0, false, round + 1)));
            assert_eq!(ring.len(), 2);
            assert!(ring.try_recv().unwrap().level_active);
            assert!(!ring.try_recv().unwrap().level_active);
            assert!(ring.is_empty());
        }
        assert_eq!(ring.take_dropped(), 0);
    }

    #[test]
    fn static_queue_is_usable() {
        let _guard = SIM_TEST_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        assert!(EDGE_QUEUE.try_send(edge(7, true, 1234)));
        let ev = EDGE_QUEUE.try_recv().unwrap();
        assert_eq!(ev.line, 7);
        assert!(EDGE_QUEUE.is_empty());
    }

    #[test]
    fn holds_at_least_ten_pending_edges() {
        let ring: EdgeRing<EDGE_QUEUE_CAP> = EdgeRing::new();
        for i in 0..10 {
            assert!(ring.try_send(edge(i, true, 0)), "edge {i} rejected");
        }
        assert_eq!(ring.len(), 10);
    }
}
