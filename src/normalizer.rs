use crate::schema::{RawExtraction, Unit};

pub const LAKHS_PER_CRORE: f64 = 100.0;
pub const THOUSANDS_PER_CRORE: f64 = 100_000.0;
pub const RUPEES_PER_CRORE: f64 = 10_000_000.0;

/// Unit-less values above this are assumed to be plain rupees rather than
/// crores.
pub const UNITLESS_RUPEE_THRESHOLD: f64 = 100_000.0;

/// Converts an extracted value to crores.
///
/// Missing input or a missing value yields `0.0`. Callers that need to keep
/// "absent" distinct from zero should check [`RawExtraction::value`] first.
pub fn normalize(raw: Option<&RawExtraction>) -> f64 {
    let Some(raw) = raw else {
        return 0.0;
    };
    let Some(value) = raw.value else {
        return 0.0;
    };

    match raw.unit {
        Unit::Lakh => value / LAKHS_PER_CRORE,
        Unit::Thousand => value / THOUSANDS_PER_CRORE,
        Unit::None if value > UNITLESS_RUPEE_THRESHOLD => value / RUPEES_PER_CRORE,
        Unit::None | Unit::Crore => value,
    }
}

/// Normalizes while preserving absence.
pub fn normalize_present(raw: &RawExtraction) -> Option<f64> {
    raw.value
        .filter(|v| v.is_finite())
        .map(|_| normalize(Some(raw)))
}
