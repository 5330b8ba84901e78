/*!
 * Timeouts for event waits and lock acquisition.
 */
use std::fmt;
use std::time::{Duration, Instant};

/// VISA's `VI_TMO_INFINITE`
pub const INFINITE_MILLIS: u32 = u32::MAX;

/// How long a blocking call may wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Poll once and return
    Immediate,
    /// Give up after the duration
    After(Duration),
    /// Wait until the condition holds
    Infinite,
}

impl Timeout {
    /// Interpret a VISA timeout in milliseconds
    pub fn from_millis(millis: u32) -> Self {
        match millis {
            0 => Timeout::Immediate,
            INFINITE_MILLIS => Timeout::Infinite,
            ms => Timeout::After(Duration::from_millis(ms.into())),
        }
    }

    /// `None` waits forever, a zero duration polls
    pub fn from_duration(duration: Option<Duration>) -> Self {
        match duration {
            None => Timeout::Infinite,
            Some(d) if d.is_zero() => Timeout::Immediate,
            Some(d) => Timeout::After(d),
        }
    }

    /// Absolute deadline, `None` for an infinite wait
    pub fn deadline(&self) -> Option<Instant> {
        match self {
            Timeout::Immediate => Some(Instant::now()),
            Timeout::After(d) => Some(Instant::now() + *d),
            Timeout::Infinite => None,
        }
    }

    /// What is left of a wait ending at `deadline`
    pub fn until(deadline: Option<Instant>) -> Self {
        match deadline {
            None => Timeout::Infinite,
            Some(deadline) => {
                Timeout::from(deadline.saturating_duration_since(Instant::now()))
            }
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Timeout::from_duration(Some(duration))
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeout::Immediate => f.write_str("0 ms"),
            Timeout::After(d) => write!(f, "{} ms", d.as_millis()),
            Timeout::Infinite => f.write_str("infinite"),
        }
    }
}
