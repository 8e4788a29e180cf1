pub mod fields;
pub mod norms;

pub use fields::{DataDiff, Field, FieldComparison, compare_fields, recursive_diff};
pub use norms::{
    GpNorm, NormStep, NormSet, NormsComparison, compare_normsets, differing_digits,
};

use crate::domain::{ExpertiseError, ExpertiseResult};

/// Default validation thresholds, overridable per expert through task options.
pub mod thresholds {
    /// Maximum relative error in Jo (and in TL statistics).
    pub const JO: f64 = 1e-5;
    /// Minimum number of common digits in an adjoint test.
    pub const JOAD_DIGITS: f64 = 12.0;
    pub const STATESDIFF: f64 = 1e-5;
    pub const VARIANCES: f64 = 1e-5;
    /// Maximum number of differing digits for norms to count as bit-reproducible.
    pub const NORMSDIGITS_BITREPRO: u32 = 0;
    pub const NORMALIZED_FIELDS_DIFF: f64 = 1e-6;
    pub const EPSILON: f64 = 1e-15;
    pub const EXPECTED_RESULT_TOLERANCE_FACTOR: f64 = 0.75;
}

/// Upper bound of meaningful common digits between two doubles.
pub const MAX_COMMON_DIGITS: f64 = 16.0;

/// Rejects negative or non-finite thresholds.
pub fn validate_threshold(name: &str, value: f64) -> ExpertiseResult<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ExpertiseError::configuration(
            "CONFIG.THRESHOLD",
            format!("threshold '{}' must be a finite non-negative number, got {}", name, value),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RelativeError {
    Defined(f64),
    /// Nonzero test value against a zero reference.
    Undefined,
}

impl RelativeError {
    pub fn between(test: f64, reference: f64) -> Self {
        if reference == 0.0 {
            if test == 0.0 {
                Self::Defined(0.0)
            } else {
                Self::Undefined
            }
        } else {
            Self::Defined((test - reference) / reference)
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Self::Defined(value) => Some(value),
            Self::Undefined => None,
        }
    }

    pub fn within(self, threshold: f64) -> bool {
        match self {
            Self::Defined(value) => value.abs() <= threshold,
            Self::Undefined => false,
        }
    }

    /// Orders candidates for "worst error" selection; undefined ranks highest.
    pub fn magnitude(self) -> f64 {
        match self {
            Self::Defined(value) => value.abs(),
            Self::Undefined => f64::INFINITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativeErrorComparison {
    pub absolute_error: f64,
    pub relative_error: RelativeError,
    pub validated: bool,
}

pub fn compare_relative(test: f64, reference: f64, threshold: f64) -> RelativeErrorComparison {
    let relative_error = RelativeError::between(test, reference);
    RelativeErrorComparison {
        absolute_error: test - reference,
        relative_error,
        validated: relative_error.within(threshold),
    }
}

/// Clamps a digit count to [`MAX_COMMON_DIGITS`]; `inf` becomes 16.
pub fn clamp_digits(digits: f64) -> f64 {
    if digits.is_nan() {
        digits
    } else {
        digits.min(MAX_COMMON_DIGITS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DigitAgreement {
    pub digits_diff: f64,
    pub rounded_diff: i64,
    pub as_many_as_reference: bool,
    pub above_threshold: bool,
    pub validated: bool,
}

/// Adjoint-test rule: the test keeps at least as many common digits as the
/// reference (after round-half-even), or reaches `min_digits` on its own.
/// A NaN digit count never validates.
pub fn compare_digits(test: f64, reference: f64, min_digits: f64) -> DigitAgreement {
    let test = clamp_digits(test);
    let reference = clamp_digits(reference);
    let digits_diff = test - reference;
    let comparable = !digits_diff.is_nan();
    let rounded_diff = if comparable {
        digits_diff.round_ties_even() as i64
    } else {
        0
    };
    let as_many_as_reference = comparable && rounded_diff >= 0;
    let above_threshold = !test.is_nan() && test >= min_digits;
    DigitAgreement {
        digits_diff,
        rounded_diff,
        as_many_as_reference,
        above_threshold,
        validated: as_many_as_reference || above_threshold,
    }
}

/// Number of significant digits to request from a test expecting `value`.
pub fn expected_significant_digits(value: f64, tolerance_factor: f64) -> i64 {
    let digits = (value.abs().log10() * tolerance_factor).ceil();
    if digits.is_nan() {
        return 1;
    }
    (digits as i64).max(1)
}

#[cfg(test)]
mod tests {
    use super::{
        RelativeError, clamp_digits, compare_digits, compare_relative,
        expected_significant_digits, thresholds, validate_threshold,
    };

    #[test]
    fn relative_error_is_reflexive() {
        for value in [543801527.59527683, -3.5, 1e-300, 0.0] {
            let comparison = compare_relative(value, value, 0.0);
            assert_eq!(comparison.relative_error, RelativeError::Defined(0.0));
            assert_eq!(comparison.absolute_error, 0.0);
            assert!(comparison.validated);
        }
    }

    #[test]
    fn zero_reference_with_nonzero_test_is_undefined() {
        let comparison = compare_relative(1.0, 0.0, thresholds::JO);
        assert_eq!(comparison.relative_error, RelativeError::Undefined);
        assert!(!comparison.validated);
        assert_eq!(comparison.relative_error.value(), None);
    }

    #[test]
    fn relative_error_is_monotonic_in_threshold() {
        let thresholds = [0.0, 1e-7, 1e-5, 1e-3, 1.0];
        let pairs = [(1.0, 1.0), (1.000001, 1.0), (1.0001, 1.0), (2.0, 1.0), (-1.0, 1.0)];
        for (test, reference) in pairs {
            let mut previously_validated = false;
            for threshold in thresholds {
                let validated = compare_relative(test, reference, threshold).validated;
                assert!(validated || !previously_validated);
                previously_validated = validated;
            }
        }
    }

    #[test]
    fn digit_agreement_rounds_half_to_even() {
        let comparison = compare_digits(13.5, 14.0, 20.0);
        assert_eq!(comparison.rounded_diff, 0);
        assert!(comparison.validated);

        let comparison = compare_digits(12.4, 14.0, 20.0);
        assert_eq!(comparison.rounded_diff, -2);
        assert!(!comparison.validated);
    }

    #[test]
    fn digit_agreement_accepts_test_above_minimum() {
        let comparison = compare_digits(12.5, 15.0, thresholds::JOAD_DIGITS);
        assert!(!comparison.as_many_as_reference);
        assert!(comparison.above_threshold);
        assert!(comparison.validated);
    }

    #[test]
    fn infinite_digits_are_clamped() {
        assert_eq!(clamp_digits(f64::INFINITY), 16.0);
        assert_eq!(clamp_digits(14.56), 14.56);
        let comparison = compare_digits(f64::INFINITY, 16.0, thresholds::JOAD_DIGITS);
        assert_eq!(comparison.digits_diff, 0.0);
        assert!(comparison.validated);
    }

    #[test]
    fn nan_digit_counts_never_validate() {
        let comparison = compare_digits(f64::NAN, 14.0, 0.0);
        assert!(!comparison.as_many_as_reference);
        assert!(!comparison.above_threshold);
        assert!(!comparison.validated);

        let comparison = compare_digits(14.0, f64::NAN, 20.0);
        assert!(!comparison.as_many_as_reference);
        assert!(!comparison.validated);
    }

    #[test]
    fn expected_digits_follow_tolerance_factor() {
        assert_eq!(expected_significant_digits(543801527.59527683, 0.75), 7);
        assert_eq!(expected_significant_digits(43411459.225849807262, 0.75), 6);
        assert_eq!(expected_significant_digits(0.5, 0.75), 1);
        assert_eq!(expected_significant_digits(0.0, 0.75), 1);
    }

    #[test]
    fn negative_thresholds_are_rejected() {
        assert!(validate_threshold("jo_validation_threshold", -1e-5).is_err());
        assert!(validate_threshold("jo_validation_threshold", f64::NAN).is_err());
        assert_eq!(validate_threshold("digits4validation", 0.0).ok(), Some(0.0));
    }
}
