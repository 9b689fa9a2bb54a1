//! Temperature reporting policy.
//!
//! Decides, per sample, whether the measured value goes out to the mesh.
//! The rules are evaluated in a fixed order on **every** sample (never on
//! an independent poll, so a fast delta crossing cannot fall between
//! periodic checks):
//!
//! 1. inside the minimum-interval suppression window → never report
//! 2. delta threshold configured and crossed → report
//! 3. maximum interval configured and elapsed → report
//! 4. otherwise → stay quiet
//!
//! The suppression window outranks the delta rule: a spike inside the
//! window is dropped, not queued for later.

use crate::app::ports::ConfigError;

/// Reporting bounds, configured once before sampling starts.
///
/// `max_interval_s == 0` with `min_interval_s > 0` means "report only on
/// delta crossings".  Both intervals zero is rejected: the reporter would
/// either spam every sample or fall silent forever depending on `delta_c`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportPolicy {
    /// No two reports closer than this, in seconds.  0 disables the gate.
    pub min_interval_s: u16,
    /// Heartbeat: report at least this often, in seconds.  0 disables.
    pub max_interval_s: u16,
    /// Report when the value moved at least this far from the last
    /// reported one, in °C.  0 disables the delta rule.
    pub delta_c: f32,
}

impl ReportPolicy {
    /// Validate and build a policy.  Rejection happens here, at configure
    /// time, never inside the sampling loop.
    pub fn new(
        min_interval_s: u16,
        max_interval_s: u16,
        delta_c: f32,
    ) -> Result<Self, ConfigError> {
        if min_interval_s == 0 && max_interval_s == 0 {
            return Err(ConfigError::ValidationFailed(
                "report policy: min and max interval both zero",
            ));
        }
        if !delta_c.is_finite() || delta_c < 0.0 {
            return Err(ConfigError::ValidationFailed(
                "report policy: delta must be finite and non-negative",
            ));
        }
        Ok(Self {
            min_interval_s,
            max_interval_s,
            delta_c,
        })
    }
}

impl Default for ReportPolicy {
    /// Matches the provisioning default pushed to sensors: one-second
    /// floor, no heartbeat, one-degree delta.
    fn default() -> Self {
        Self {
            min_interval_s: 1,
            max_interval_s: 0,
            delta_c: 1.0,
        }
    }
}

/// Long-lived reporting state for one measured quantity.
///
/// Owns the last-reported value and timestamp; time arrives as a
/// monotonic millisecond clock so tests drive it virtually.
#[derive(Debug)]
pub struct Reporter {
    policy: ReportPolicy,
    /// `None` until the first report: any configured delta counts as
    /// crossed, so the first value goes out as soon as the suppression
    /// window (measured from construction) allows.
    last_value: Option<f32>,
    last_report_ms: u64,
}

impl Reporter {
    /// `now_ms` seeds the suppression window, so a min-interval policy
    /// stays quiet for its first window after startup.
    pub fn new(policy: ReportPolicy, now_ms: u64) -> Self {
        Self {
            policy,
            last_value: None,
            last_report_ms: now_ms,
        }
    }

    pub fn policy(&self) -> ReportPolicy {
        self.policy
    }

    /// Evaluate one sample.  Returns `true` when the value should be
    /// reported now; bookkeeping is updated on acceptance.
    pub fn evaluate(&mut self, value: f32, now_ms: u64) -> bool {
        let elapsed_ms = now_ms.saturating_sub(self.last_report_ms);

        // 1. Suppression window.
        if self.policy.min_interval_s > 0
            && elapsed_ms < u64::from(self.policy.min_interval_s) * 1000
        {
            return false;
        }

        // 2. Delta crossing.  An unset baseline counts as crossed.
        let delta_crossed = self.policy.delta_c > 0.0
            && self
                .last_value
                .is_none_or(|last| (value - last).abs() >= self.policy.delta_c);
        if delta_crossed {
            self.mark_reported(value, now_ms);
            return true;
        }

        // 3. Heartbeat.
        if self.policy.max_interval_s > 0
            && elapsed_ms >= u64::from(self.policy.max_interval_s) * 1000
        {
            self.mark_reported(value, now_ms);
            return true;
        }

        // 4. Nothing to say.
        false
    }

    /// Record that `value` went out at `now_ms`.
    ///
    /// Also used directly for operator-forced reports (sensor button
    /// release), which bypass the cadence but not the bookkeeping.
    pub fn mark_reported(&mut self, value: f32, now_ms: u64) {
        self.last_value = Some(value);
        self.last_report_ms = now_ms;
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Two accepted reports are never closer than the minimum
        /// interval, whatever the sample stream does.
        #[test]
        fn min_interval_always_respected(
            min_s in 1u16..5,
            samples in proptest::collection::vec((0u64..200, -10.0f32..50.0), 1..100),
        ) {
            let mut r = Reporter::new(policy_for(min_s), 0);
            let mut t = 0u64;
            let mut last_report: Option<u64> = None;
            for (advance_ms, value) in samples {
                t += advance_ms;
                if r.evaluate(value, t) {
                    if let Some(prev) = last_report {
                        prop_assert!(t - prev >= u64::from(min_s) * 1000,
                            "reports {prev} and {t} violate min interval");
                    }
                    last_report = Some(t);
                }
            }
        }

        /// With a heartbeat configured, silence never exceeds the maximum
        /// interval as long as samples keep arriving each second.
        #[test]
        fn max_interval_bounds_silence(max_s in 1u16..20, value in -10.0f32..50.0) {
            let mut r = Reporter::new(ReportPolicy::new(0, max_s, 0.0).unwrap(), 0);
            let mut last_report = 0u64;
            for s in 1..200u64 {
                let now = s * 1000;
                if r.evaluate(value, now) {
                    last_report = now;
                }
                prop_assert!(now - last_report <= u64::from(max_s) * 1000);
            }
        }
    }

    fn policy_for(min_s: u16) -> ReportPolicy {
        ReportPolicy::new(min_s, 0, 1.0).unwrap()
    }
}
