//! Unit conversion for timings reported by the framework.

/// Convert milliseconds to seconds, rounded to three decimals.
///
/// Three decimals of a second is a whole millisecond, so the rounding is
/// applied to `ms` directly (`f64::round`, half away from zero) and only the
/// final scale-down divides. `1234.5` becomes `1.235`.
pub fn ms_to_seconds(ms: f64) -> f64 {
    ms.round() / 1000.0
}

/// Same as [`ms_to_seconds`] with an absent sub-timing counted as zero.
pub fn optional_ms_to_seconds(ms: Option<f64>) -> f64 {
    ms_to_seconds(ms.unwrap_or(0.0))
}
