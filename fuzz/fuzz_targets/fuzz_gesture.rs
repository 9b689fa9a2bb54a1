//! Fuzz target: `GestureCycle::poll`
//!
//! Decodes fuzz bytes into a stream of (level, time-advance) samples and
//! drives one line's gesture machine through it, starting the clock at
//! an arbitrary point so wraparound gets exercised.
//!
//! Invariants checked:
//! - No panics under any sample stream
//! - Press and release strictly alternate, starting with a press
//! - At most one long-hold fires per press cycle, and only while pressed
//! - Trailing inactive samples always drain the machine back to idle
//!
//! cargo fuzz run fuzz_gesture

#![no_main]

use libfuzzer_sys::fuzz_target;
use meshnode::fsm::gesture::{GestureCycle, GestureEvent};

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    // First 4 bytes seed the wrapping clock; the rest become samples.
    let (seed, samples) = data.split_at(4);
    let mut t = u32::from_le_bytes(seed.try_into().unwrap());

    let mut gesture = GestureCycle::new();
    let mut pressed = false;
    let mut holds_this_cycle = 0u32;

    for chunk in samples.chunks(2) {
        let active = chunk[0] & 1 == 1;
        let advance = u32::from(chunk.get(1).copied().unwrap_or(10));
        t = t.wrapping_add(advance);

        match gesture.poll(active, t) {
            Some(GestureEvent::Press) => {
                assert!(!pressed, "press without an intervening release");
                pressed = true;
                holds_this_cycle = 0;
            }
            Some(GestureEvent::Release) => {
                assert!(pressed, "release without a press");
                pressed = false;
            }
            Some(GestureEvent::LongHold) => {
                assert!(pressed, "long-hold outside a press cycle");
                holds_this_cycle += 1;
                assert!(holds_this_cycle <= 1, "long-hold fired twice in one cycle");
            }
            None => {}
        }
    }

    // Whatever state the stream left behind, a held-low line drains the
    // machine: at most one release on the way, idle at the end.
    for _ in 0..3 {
        t = t.wrapping_add(10);
        if let Some(ev) = gesture.poll(false, t) {
            assert!(
                matches!(ev, GestureEvent::Release),
                "unexpected event while draining"
            );
        }
    }
    assert!(gesture.is_idle(), "machine failed to drain to idle");
});
