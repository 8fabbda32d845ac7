//! Date and timestamp generators.

use bson::Bson;
use chrono::{DateTime, Utc};
use rand::Rng;

/// Uniform date in `[start, end]`.
pub fn generate_date_range<R: Rng + ?Sized>(
    rng: &mut R,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Bson {
    let (lo, hi) = (start.timestamp_millis(), end.timestamp_millis());
    let millis = if lo >= hi { lo } else { rng.gen_range(lo..=hi) };
    Bson::DateTime(bson::DateTime::from_millis(millis))
}

/// Unconstrained date between the Unix epoch and `now`.
pub fn generate_date<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>) -> Bson {
    let millis = rng.gen_range(0..=now.timestamp_millis().max(0));
    Bson::DateTime(bson::DateTime::from_millis(millis))
}

/// The current instant.
pub fn generate_timestamp(now: DateTime<Utc>) -> Bson {
    Bson::DateTime(bson::DateTime::from_chrono(now))
}
