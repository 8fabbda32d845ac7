//! Numeric value generators.

use bson::{Bson, Decimal128};
use rand::Rng;
use std::str::FromStr;

/// Uniform integer in `[1, 10000]`.
pub fn generate_int<R: Rng + ?Sized>(rng: &mut R) -> Bson {
    Bson::Int32(rng.gen_range(1..=10_000))
}

/// Uniform 64-bit integer in `[1e10, 1e11)`.
pub fn generate_long<R: Rng + ?Sized>(rng: &mut R) -> Bson {
    Bson::Int64(rng.gen_range(10_000_000_000..100_000_000_000))
}

/// Uniform double in `[10, 10000]`, rounded to two decimals.
pub fn generate_double<R: Rng + ?Sized>(rng: &mut R) -> Bson {
    let value: f64 = rng.gen_range(10.0..=10_000.0);
    Bson::Double((value * 100.0).round() / 100.0)
}

/// Uniform decimal in `(0.1, 9999.99)` with two decimal places.
pub fn generate_decimal<R: Rng + ?Sized>(rng: &mut R) -> Bson {
    decimal_value(rng.gen_range(0.1..9_999.99))
}

/// `value` rounded to two places as a Decimal128 parsed from its string form.
pub fn decimal_from_f64(value: f64) -> Option<Decimal128> {
    Decimal128::from_str(&format!("{value:.2}")).ok()
}

/// Decimal128 as an `f64`, read back through its string form.
pub fn decimal_to_f64(value: &Decimal128) -> Option<f64> {
    value.to_string().parse().ok()
}

/// Two-place Decimal128 value, or a Double when the text does not parse.
pub fn decimal_value(value: f64) -> Bson {
    decimal_from_f64(value).map_or(Bson::Double(value), Bson::Decimal128)
}

/// Numeric value of any BSON number, used for range comparisons.
pub fn bson_as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        Bson::Decimal128(d) => decimal_to_f64(d),
        _ => None,
    }
}
