use std::{sync::Arc, time::Instant};

/// A trait for time sources used to arm and check request deadlines.
///
/// This abstraction allows you to plug in a real monotonic clock or a mocked
/// time source in tests. The unit is **milliseconds** relative to an origin
/// chosen by the implementation; only differences between readings matter.
///
/// # Example
///
/// ```
/// use msgchain::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1234
///     }
/// }
///
/// let time = FixedTime;
/// assert_eq!(time.current_millis(), 1234);
/// ```
pub trait TimeSource {
    /// Returns the current time in milliseconds since the source's origin.
    fn current_millis(&self) -> u64;
}

impl<T: TimeSource + ?Sized> TimeSource for Arc<T> {
    fn current_millis(&self) -> u64 {
        (**self).current_millis()
    }
}

/// A monotonic time source that returns the milliseconds elapsed since the
/// clock was constructed.
///
/// Clones share the same origin, so readings taken through any clone are
/// comparable. Wall-clock adjustments (NTP, daylight savings) never move it
/// backwards.
#[derive(Clone, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    /// Constructs a clock whose origin (t = 0) is the moment of the call.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl TimeSource for MonotonicClock {
    fn current_millis(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
