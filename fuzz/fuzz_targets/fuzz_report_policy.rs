//! Fuzz target: reporting policy construction and evaluation
//!
//! The first bytes pick the policy bounds (delta from raw float bits, so
//! NaN and infinities get thrown at the validator); the rest become a
//! sample stream of arbitrary readings and time advances.
//!
//! Invariants checked:
//! - Construction never panics and rejects exactly the invalid bounds
//! - Accepted policies never report twice inside the minimum interval
//! - Evaluation never panics, even on NaN / infinite readings
//!
//! cargo fuzz run fuzz_report_policy

#![no_main]

use libfuzzer_sys::fuzz_target;
use meshnode::telemetry::{ReportPolicy, Reporter};

fuzz_target!(|data: &[u8]| {
    if data.len() < 8 {
        return;
    }

    let (head, samples) = data.split_at(8);
    let min_s = u16::from_le_bytes([head[0], head[1]]) % 600;
    let max_s = u16::from_le_bytes([head[2], head[3]]) % 4000;
    let delta = f32::from_bits(u32::from_le_bytes([head[4], head[5], head[6], head[7]]));

    let Ok(policy) = ReportPolicy::new(min_s, max_s, delta) else {
        // Rejection must mean the bounds were genuinely invalid.
        assert!(
            (min_s == 0 && max_s == 0) || !delta.is_finite() || delta < 0.0,
            "validator rejected valid bounds"
        );
        return;
    };
    assert!(min_s > 0 || max_s > 0, "both-zero intervals slipped through");

    let mut reporter = Reporter::new(policy, 0);
    let mut now = 0u64;
    let mut last_report: Option<u64> = None;

    for chunk in samples.chunks(5) {
        now += u64::from(chunk[0]) * 100;
        let value = f32::from_bits(u32::from_le_bytes([
            chunk.get(1).copied().unwrap_or(0x00),
            chunk.get(2).copied().unwrap_or(0x00),
            chunk.get(3).copied().unwrap_or(0xA0),
            chunk.get(4).copied().unwrap_or(0x41),
        ]));

        if reporter.evaluate(value, now) {
            if let Some(prev) = last_report {
                assert!(
                    now - prev >= u64::from(min_s) * 1000,
                    "reports at {prev} and {now} violate the minimum interval"
                );
            }
            last_report = Some(now);
        }
    }
});
