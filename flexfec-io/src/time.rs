//! Time utilities for RTP senders
//!
//! Provides the media clock that stamps RTP timestamps, a periodic timer for
//! statistics, and a token-bucket pacer.

use std::time::{Duration, Instant};

/// RTP media clock
///
/// Converts wall-clock time since creation into RTP timestamp units at the
/// stream's clock rate, starting from a fixed offset. Wraps at 2^32 like the
/// RTP timestamp field.
#[derive(Debug, Clone)]
pub struct RtpClock {
    start: Instant,
    clock_rate: u32,
    offset: u32,
}

impl RtpClock {
    /// Create a clock ticking at `clock_rate` Hz, starting at `offset`
    pub fn new(clock_rate: u32, offset: u32) -> Self {
        RtpClock {
            start: Instant::now(),
            clock_rate,
            offset,
        }
    }

    /// RTP timestamp for `elapsed` time since the clock started
    pub fn timestamp_at(&self, elapsed: Duration) -> u32 {
        let ticks = elapsed.as_micros() * self.clock_rate as u128 / 1_000_000;
        self.offset.wrapping_add(ticks as u32)
    }

    /// RTP timestamp for now
    pub fn now(&self) -> u32 {
        self.timestamp_at(self.start.elapsed())
    }

    /// Clock rate in Hz
    pub fn clock_rate(&self) -> u32 {
        self.clock_rate
    }
}

/// Timer for periodic operations
pub struct Timer {
    interval: Duration,
    last_fire: Instant,
}

impl Timer {
    /// Create a new timer with the given interval
    pub fn new(interval: Duration) -> Self {
        Timer {
            interval,
            last_fire: Instant::now(),
        }
    }

    /// Check if the timer has expired
    pub fn expired(&self) -> bool {
        self.last_fire.elapsed() >= self.interval
    }

    /// Fire the timer if expired, returning true if it fired
    pub fn try_fire(&mut self) -> bool {
        if self.expired() {
            self.last_fire = Instant::now();
            true
        } else {
            false
        }
    }
}

/// Token-bucket pacer
///
/// Used to hold a sender to a target bitrate.
pub struct Pacer {
    /// Maximum tokens (burst size in bytes)
    capacity: u64,
    /// Current token count
    tokens: u64,
    /// Tokens added per microsecond
    rate: f64,
    /// Last refill time
    last_update: Instant,
}

impl Pacer {
    /// Create a new pacer
    ///
    /// # Arguments
    /// * `rate_bps` - Rate in bits per second
    /// * `burst_bytes` - Maximum burst size in bytes
    pub fn new(rate_bps: u64, burst_bytes: u64) -> Self {
        Pacer {
            capacity: burst_bytes,
            tokens: burst_bytes,
            rate: (rate_bps as f64) / 8.0 / 1_000_000.0,
            last_update: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed_us = now.duration_since(self.last_update).as_micros() as f64;
        let new_tokens = (elapsed_us * self.rate) as u64;

        if new_tokens > 0 {
            self.tokens = (self.tokens + new_tokens).min(self.capacity);
            self.last_update = now;
        }
    }

    /// Consume tokens for sending `bytes` worth of data
    ///
    /// Returns true if successful, false if insufficient tokens
    pub fn consume(&mut self, bytes: usize) -> bool {
        self.refill();
        if self.tokens >= bytes as u64 {
            self.tokens -= bytes as u64;
            true
        } else {
            false
        }
    }

    /// Get time to wait before `bytes` will be available
    pub fn time_to_available(&mut self, bytes: usize) -> Duration {
        self.refill();

        if self.tokens >= bytes as u64 {
            return Duration::ZERO;
        }

        let needed = (bytes as u64) - self.tokens;
        Duration::from_micros((needed as f64 / self.rate).ceil() as u64)
    }

    /// Block until `bytes` can be sent, then consume them
    pub fn wait_for(&mut self, bytes: usize) {
        let bytes = bytes.min(self.capacity as usize);
        while !self.consume(bytes) {
            std::thread::sleep(self.time_to_available(bytes));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_rtp_clock_conversion() {
        let clock = RtpClock::new(90_000, 1000);
        assert_eq!(clock.timestamp_at(Duration::ZERO), 1000);
        assert_eq!(clock.timestamp_at(Duration::from_millis(10)), 1900);
        assert_eq!(clock.timestamp_at(Duration::from_secs(1)), 91_000);
        assert_eq!(clock.clock_rate(), 90_000);
    }

    #[test]
    fn test_rtp_clock_wraps() {
        let clock = RtpClock::new(90_000, u32::MAX);
        assert_eq!(clock.timestamp_at(Duration::from_millis(10)), 899);
    }

    #[test]
    fn test_timer_try_fire() {
        let mut timer = Timer::new(Duration::from_millis(10));
        assert!(!timer.try_fire());

        thread::sleep(Duration::from_millis(11));
        assert!(timer.try_fire());
        assert!(!timer.try_fire()); // Should not fire again immediately
    }

    #[test]
    fn test_pacer() {
        // 1 MB/s = 1 byte per microsecond
        let mut pacer = Pacer::new(8_000_000, 1000);

        assert!(pacer.consume(500));
        assert!(pacer.consume(500));
        assert!(!pacer.consume(100));

        thread::sleep(Duration::from_millis(1));
        assert!(pacer.consume(100));
    }

    #[test]
    fn test_pacer_time_to_available() {
        let mut pacer = Pacer::new(1_000_000, 100); // 1 Mbps, 100 byte burst

        pacer.consume(100);

        let wait_time = pacer.time_to_available(100);
        assert!(wait_time > Duration::ZERO);
        assert!(wait_time <= Duration::from_millis(1000));
    }
}
