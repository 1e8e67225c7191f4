//! PTP-derived media timing
//!
//! The PTP protocol itself runs in an external follower daemon; this
//! module consumes its time readings and turns them into 32-bit wrapping
//! RTP timestamps for a given sample rate.

use std::sync::Arc;
use std::time::Instant;

/// Port states reported by the PTP follower
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtpState {
    /// Follower is starting up
    Initializing,
    /// Listening for announce messages
    Listening,
    /// Master selected but offset not yet stable
    Uncalibrated,
    /// Locked to the grandmaster
    Slave,
    /// Passive port (another master present)
    Passive,
    /// Fault detected
    Faulty,
}

impl PtpState {
    /// Human-readable state name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PtpState::Initializing => "Initializing",
            PtpState::Listening => "Listening",
            PtpState::Uncalibrated => "Uncalibrated",
            PtpState::Slave => "Slave",
            PtpState::Passive => "Passive",
            PtpState::Faulty => "Faulty",
        }
    }
}

/// Handle to the external PTP follower daemon
///
/// Implementations must never block: an unsynchronized follower answers
/// with its current best estimate and lets consumers decide whether to
/// fall back to a free-running counter.
pub trait PtpFollower: Send + Sync {
    /// Whether the follower is locked to a grandmaster
    fn is_synchronized(&self) -> bool;

    /// Current master-aligned time in nanoseconds
    ///
    /// Monotonically non-decreasing within a session.
    fn current_time_ns(&self) -> i64;

    /// Offset from the grandmaster in nanoseconds
    fn offset_from_master_ns(&self) -> i64;

    /// Current port state
    fn state(&self) -> PtpState;
}

/// Convert a PTP time in nanoseconds to a wrapping RTP timestamp
///
/// `rtp = floor(ptp_ns * sample_rate / 1e9) mod 2^32`, computed in 64-bit
/// integer arithmetic: seconds and the sub-second remainder are scaled
/// separately so the multiply cannot lose ticks.
#[must_use]
pub fn rtp_timestamp_from_ns(ptp_ns: u64, sample_rate: u32) -> u32 {
    let secs = ptp_ns / 1_000_000_000;
    let rem = ptp_ns % 1_000_000_000;
    let ticks = secs
        .wrapping_mul(u64::from(sample_rate))
        .wrapping_add(rem * u64::from(sample_rate) / 1_000_000_000);
    ticks as u32
}

/// Media clock backed by the PTP follower
///
/// Cheap to clone and share between sessions.
#[derive(Clone)]
pub struct MediaClock {
    follower: Arc<dyn PtpFollower>,
}

impl MediaClock {
    /// Create a media clock over a follower handle
    #[must_use]
    pub fn new(follower: Arc<dyn PtpFollower>) -> Self {
        Self { follower }
    }

    /// Whether the underlying follower is locked
    #[must_use]
    pub fn is_synchronized(&self) -> bool {
        self.follower.is_synchronized()
    }

    /// Current follower port state
    #[must_use]
    pub fn state(&self) -> PtpState {
        self.follower.state()
    }

    /// Current PTP time in nanoseconds
    ///
    /// Negative follower readings clamp to zero.
    #[must_use]
    pub fn ptp_timestamp(&self) -> u64 {
        self.follower.current_time_ns().max(0) as u64
    }

    /// RTP timestamp for the given sample rate, derived from PTP time
    #[must_use]
    pub fn rtp_timestamp(&self, sample_rate: u32) -> u32 {
        rtp_timestamp_from_ns(self.ptp_timestamp(), sample_rate)
    }

    /// Offset from the grandmaster in nanoseconds
    #[must_use]
    pub fn offset_from_master_ns(&self) -> i64 {
        self.follower.offset_from_master_ns()
    }
}

impl std::fmt::Debug for MediaClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaClock")
            .field("state", &self.follower.state())
            .field("synchronized", &self.follower.is_synchronized())
            .finish()
    }
}

/// Locally-calibrated clock for fast reads
///
/// Records a one-shot offset between a steady monotonic reading and the
/// PTP reading; afterwards `now_ns` derives from the monotonic clock
/// without contacting the follower.
pub struct LocalClock {
    epoch: Instant,
    offset_ns: i64,
    calibrated: bool,
}

impl LocalClock {
    /// Create an uncalibrated local clock
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            offset_ns: 0,
            calibrated: false,
        }
    }

    /// Calibrate against the follower
    ///
    /// A no-op while the follower is unsynchronized.
    pub fn calibrate(&mut self, clock: &MediaClock) {
        if !clock.is_synchronized() {
            return;
        }

        let ptp_ns = clock.ptp_timestamp();
        let local_ns = self.epoch.elapsed().as_nanos() as i64;
        self.offset_ns = ptp_ns as i64 - local_ns;
        self.calibrated = true;
    }

    /// Whether calibration has happened
    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// Current PTP-aligned time from the steady clock plus offset
    #[must_use]
    pub fn now_ns(&self) -> u64 {
        let local_ns = self.epoch.elapsed().as_nanos() as i64;
        (local_ns + self.offset_ns).max(0) as u64
    }

    /// RTP timestamp derived from the calibrated reading
    #[must_use]
    pub fn rtp_timestamp(&self, sample_rate: u32) -> u32 {
        rtp_timestamp_from_ns(self.now_ns(), sample_rate)
    }
}

impl Default for LocalClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::testing::MockFollower;

    #[test]
    fn test_rtp_timestamp_exact() {
        // 1 second at 48 kHz is exactly 48000 ticks.
        assert_eq!(rtp_timestamp_from_ns(1_000_000_000, 48000), 48000);
        // 1 ms at 48 kHz is 48 ticks.
        assert_eq!(rtp_timestamp_from_ns(1_000_000, 48000), 48);
        assert_eq!(rtp_timestamp_from_ns(0, 48000), 0);
    }

    #[test]
    fn test_rtp_timestamp_floor() {
        // 20833 ns at 48 kHz is 0.999984 ticks, floors to 0.
        assert_eq!(rtp_timestamp_from_ns(20_833, 48000), 0);
        assert_eq!(rtp_timestamp_from_ns(20_834, 48000), 1);
    }

    #[test]
    fn test_rtp_timestamp_wraps() {
        // 2^32 ticks at 48 kHz is 89478.485... seconds; one tick later
        // must land back at a small value.
        let wrap_ns = (1u64 << 32) * 1_000_000_000 / 48000;
        let near = rtp_timestamp_from_ns(wrap_ns - 1_000, 48000);
        let after = rtp_timestamp_from_ns(wrap_ns + 1_000, 48000);
        assert!(near > u32::MAX - 100);
        assert!(after < 100);
    }

    #[test]
    fn test_media_clock_unsynchronized_still_answers() {
        let follower = Arc::new(MockFollower::new());
        follower.set_state(PtpState::Uncalibrated);
        follower.set_time_ns(5_000_000_000);

        let clock = MediaClock::new(follower);
        assert!(!clock.is_synchronized());
        assert_eq!(clock.ptp_timestamp(), 5_000_000_000);
        assert_eq!(clock.rtp_timestamp(48000), 240_000);
    }

    #[test]
    fn test_local_clock_requires_sync_to_calibrate() {
        let follower = Arc::new(MockFollower::new());
        follower.set_state(PtpState::Listening);
        let clock = MediaClock::new(follower.clone());

        let mut local = LocalClock::new();
        local.calibrate(&clock);
        assert!(!local.is_calibrated());

        follower.set_state(PtpState::Slave);
        follower.set_time_ns(10_000_000_000);
        local.calibrate(&clock);
        assert!(local.is_calibrated());
        assert!(local.now_ns() >= 10_000_000_000);
    }

    proptest! {
        #[test]
        fn test_rtp_timestamp_matches_wide_arithmetic(
            ptp_ns in 0u64..=u64::MAX / 96000,
            rate in prop_oneof![Just(44100u32), Just(48000u32), Just(96000u32)]
        ) {
            // Within the non-overflowing range the split computation must
            // agree with the 128-bit reference.
            let reference = (u128::from(ptp_ns) * u128::from(rate) / 1_000_000_000) as u32;
            prop_assert_eq!(rtp_timestamp_from_ns(ptp_ns, rate), reference);
        }
    }
}
