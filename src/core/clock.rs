//! Timestamps and document identifiers

use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use std::sync::atomic::{AtomicI64, Ordering};

const ID_SUFFIX_LEN: usize = 9;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Millisecond clock that never repeats or goes backwards within a process.
///
/// When the wall clock stalls (two calls inside the same millisecond) or steps
/// backwards, the clock advances by one millisecond past the last value handed
/// out. Stamps taken from one clock are therefore strictly increasing, which is
/// what makes `updatedAt` comparisons meaningful.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last_millis: AtomicI64,
}

impl MonotonicClock {
    /// Create a clock with no history
    pub const fn new() -> Self {
        Self {
            last_millis: AtomicI64::new(0),
        }
    }

    /// Next strictly increasing millisecond value
    pub fn now_millis(&self) -> i64 {
        let wall = Utc::now().timestamp_millis();
        let mut prev = self.last_millis.load(Ordering::Acquire);
        loop {
            let next = wall.max(prev + 1);
            match self.last_millis.compare_exchange_weak(
                prev,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    /// RFC 3339 UTC timestamp with millisecond precision
    pub fn timestamp(&self) -> String {
        format_millis(self.now_millis())
    }

    /// New document identifier: decimal milliseconds followed by a random
    /// base-36 suffix.
    ///
    /// Unique in practice, not by construction: two ids minted by different
    /// processes in the same millisecond collide with probability 36^-9.
    pub fn generate_id(&self) -> String {
        let mut id = self.now_millis().to_string();
        let mut rng = rand::rng();
        for _ in 0..ID_SUFFIX_LEN {
            id.push(BASE36[rng.random_range(0..BASE36.len())] as char);
        }
        id
    }
}

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
