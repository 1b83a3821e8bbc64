//! Periodic wake-up sources for the scheduler thread.
//!
//! On Linux the default is a `timerfd` on `CLOCK_MONOTONIC`: the kernel
//! counts expirations for us, so a late reader learns how many periods it
//! slept through.  [`SleepTimer`] reproduces that count with a monotonic
//! deadline and is used everywhere else.

use std::io;
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

/// A timer that fires every period.
pub trait PeriodicTimer: Send {
    /// Block until the next expiration.
    ///
    /// Returns how many periods elapsed since the previous call (at least 1).
    fn wait(&mut self) -> io::Result<u64>;
}

/// Open the preferred timer for `period`.
///
/// # Errors
///
/// `InvalidInput` for a zero period, or the OS error from creating the
/// timer.
pub fn open_timer(period: Duration, use_timerfd: bool) -> io::Result<Box<dyn PeriodicTimer>> {
    if period.is_zero() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "timer period must be non-zero"));
    }
    #[cfg(target_os = "linux")]
    if use_timerfd {
        return Ok(Box::new(TimerFd::new(period)?));
    }
    #[cfg(not(target_os = "linux"))]
    if use_timerfd {
        debug!("timerfd unavailable on this platform; using sleep timer");
    }
    debug!(period_ms = period.as_millis() as u64, "sleep timer armed");
    Ok(Box::new(SleepTimer::new(period)))
}

// ────────────────────────────────────────────────────────────────────────────
// timerfd
// ────────────────────────────────────────────────────────────────────────────

#[cfg(target_os = "linux")]
pub use self::linux::TimerFd;

#[cfg(target_os = "linux")]
mod linux {
    use std::fs::File;
    use std::io::{self, Read};
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
    use std::time::Duration;

    use tracing::debug;

    use super::PeriodicTimer;

    /// `timerfd_create(CLOCK_MONOTONIC)` armed with a repeating interval.
    pub struct TimerFd {
        file: File,
    }

    impl TimerFd {
        pub fn new(period: Duration) -> io::Result<Self> {
            // SAFETY: plain syscall; the result is checked before use.
            let raw = unsafe { libc::timerfd_create(libc::CLOCK_MONOTONIC, libc::TFD_CLOEXEC) };
            if raw < 0 {
                return Err(io::Error::last_os_error());
            }
            // SAFETY: `raw` is a freshly created descriptor owned by nobody else.
            let fd = unsafe { OwnedFd::from_raw_fd(raw) };

            let interval = libc::timespec {
                tv_sec: period.as_secs() as libc::time_t,
                tv_nsec: period.subsec_nanos() as libc::c_long,
            };
            let its = libc::itimerspec {
                it_interval: interval,
                it_value: interval,
            };
            let file = File::from(fd);
            // SAFETY: `its` outlives the call and the old-value pointer may be null.
            let rc = unsafe { libc::timerfd_settime(file.as_raw_fd(), 0, &its, std::ptr::null_mut()) };
            if rc < 0 {
                return Err(io::Error::last_os_error());
            }
            debug!(period_ms = period.as_millis() as u64, "timerfd armed");
            Ok(Self { file })
        }
    }

    impl PeriodicTimer for TimerFd {
        fn wait(&mut self) -> io::Result<u64> {
            let mut buf = [0u8; 8];
            self.file.read_exact(&mut buf)?;
            Ok(u64::from_ne_bytes(buf))
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sleep fallback
// ────────────────────────────────────────────────────────────────────────────

/// Deadline-based sleeper on the monotonic clock.
pub struct SleepTimer {
    period: Duration,
    next: Instant,
}

impl SleepTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next: Instant::now() + period,
        }
    }
}

impl PeriodicTimer for SleepTimer {
    fn wait(&mut self) -> io::Result<u64> {
        let now = Instant::now();
        if self.next > now {
            thread::sleep(self.next - now);
        }
        let now = Instant::now();
        let mut expirations = 0;
        while self.next <= now {
            self.next += self.period;
            expirations += 1;
        }
        Ok(expirations.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_period_is_rejected() {
        let err = open_timer(Duration::ZERO, false).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn sleep_timer_waits_one_period() {
        let started = Instant::now();
        let mut timer = SleepTimer::new(Duration::from_millis(5));
        assert_eq!(timer.wait().unwrap(), 1);
        assert!(started.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn sleep_timer_counts_missed_periods() {
        let mut timer = SleepTimer::new(Duration::from_millis(20));
        thread::sleep(Duration::from_millis(95));
        assert!(timer.wait().unwrap() >= 4);
        // Back on schedule afterwards.
        assert_eq!(timer.wait().unwrap(), 1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn timerfd_fires_and_counts_expirations() {
        let mut timer = open_timer(Duration::from_millis(5), true).unwrap();
        assert!(timer.wait().unwrap() >= 1);
        thread::sleep(Duration::from_millis(30));
        assert!(timer.wait().unwrap() >= 5);
    }
}
