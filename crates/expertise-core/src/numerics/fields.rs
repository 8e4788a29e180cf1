//! Physical fields and their normalized, scale-invariant comparison.

use super::thresholds::EPSILON;
use crate::domain::{ExpertiseError, ExpertiseResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DIMENSIONS_DIFFER: &str = "Comparison not possible: dimensions differ";
pub const NO_COMMON_VALUES: &str = "Comparison not possible: no common unmasked values";

/// One field read from a container: row-major values plus optional mask
/// (`true` = masked) and metadata trees.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Field {
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<Vec<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validity: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,
    /// Auxiliary record without physical metadata.
    #[serde(default)]
    pub misc: bool,
}

impl Field {
    pub fn new(shape: Vec<usize>, values: Vec<f64>) -> Self {
        Self {
            shape,
            values,
            ..Self::default()
        }
    }

    pub fn with_mask(mut self, mask: Vec<bool>) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn is_masked(&self, index: usize) -> bool {
        self.mask
            .as_ref()
            .and_then(|mask| mask.get(index).copied())
            .unwrap_or(false)
    }

    pub fn check_consistency(&self, name: &str) -> ExpertiseResult<()> {
        let expected: usize = self.shape.iter().product();
        if self.values.len() != expected {
            return Err(ExpertiseError::comparison(
                "COMPARISON.FIELD_SHAPE",
                format!(
                    "field '{}' holds {} values for shape {:?}",
                    name,
                    self.values.len(),
                    self.shape
                ),
            ));
        }
        if let Some(mask) = &self.mask
            && mask.len() != expected
        {
            return Err(ExpertiseError::comparison(
                "COMPARISON.FIELD_MASK",
                format!(
                    "field '{}' mask holds {} flags for shape {:?}",
                    name,
                    mask.len(),
                    self.shape
                ),
            ));
        }
        Ok(())
    }

    /// (min, avg, max) over unmasked values; `None` when everything is masked.
    pub fn stats(&self) -> Option<(f64, f64, f64)> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for (index, value) in self.values.iter().enumerate() {
            if self.is_masked(index) {
                continue;
            }
            count += 1;
            sum += value;
            min = min.min(*value);
            max = max.max(*value);
        }
        (count > 0).then(|| (min, sum / count as f64, max))
    }
}

/// `None` when both trees are equal, else the differing branches with
/// `{"test": .., "ref": ..}` leaves.
pub fn recursive_diff(test: &Value, reference: &Value) -> Option<Value> {
    if test == reference {
        return None;
    }
    match (test, reference) {
        (Value::Object(test_map), Value::Object(reference_map)) => {
            let mut diff = Map::new();
            let keys = test_map.keys().chain(
                reference_map
                    .keys()
                    .filter(|key| !test_map.contains_key(key.as_str())),
            );
            for key in keys {
                let test_value = test_map.get(key).unwrap_or(&Value::Null);
                let reference_value = reference_map.get(key).unwrap_or(&Value::Null);
                if let Some(branch) = recursive_diff(test_value, reference_value) {
                    diff.insert(key.clone(), branch);
                }
            }
            (!diff.is_empty()).then_some(Value::Object(diff))
        }
        _ => {
            let mut leaf = Map::new();
            leaf.insert("test".to_string(), test.clone());
            leaf.insert("ref".to_string(), reference.clone());
            Some(Value::Object(leaf))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DataDiff {
    DimensionsDiffer,
    NoCommonValues,
    /// Statistics of `normalized(test) - normalized(ref)` over the common region.
    Normalized { min: f64, avg: f64, max: f64 },
}

impl DataDiff {
    pub fn max_abs(&self) -> Option<f64> {
        match self {
            Self::Normalized { min, max, .. } if min.is_nan() || max.is_nan() => Some(f64::NAN),
            Self::Normalized { min, max, .. } => Some(min.abs().max(max.abs())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::DimensionsDiffer => Value::from(DIMENSIONS_DIFFER),
            Self::NoCommonValues => Value::from(NO_COMMON_VALUES),
            Self::Normalized { min, avg, max } => {
                let mut stats = Map::new();
                stats.insert("min".to_string(), Value::from(*min));
                stats.insert("avg".to_string(), Value::from(*avg));
                stats.insert("max".to_string(), Value::from(*max));
                Value::Object(stats)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldComparison {
    pub metadata_checked: bool,
    pub validity_diff: Option<Value>,
    pub geometry_diff: Option<Value>,
    pub data_bit_repro: bool,
    pub masks_differ: bool,
    pub data_diff: Option<DataDiff>,
    pub validated: bool,
}

impl FieldComparison {
    pub fn max_abs_normalized_diff(&self) -> f64 {
        self.data_diff
            .as_ref()
            .and_then(DataDiff::max_abs)
            .unwrap_or(0.0)
    }

    /// Data and metadata both identical.
    pub fn is_bit_reproducible(&self) -> bool {
        self.data_bit_repro && self.validity_diff.is_none() && self.geometry_diff.is_none()
    }
}

/// Compares two fields read under the same name.
///
/// Normalization uses the reference range over the common unmasked region;
/// a flat reference falls back to raw differences.
pub fn compare_fields(
    name: &str,
    test: &Field,
    reference: &Field,
    threshold: f64,
    check_metadata: bool,
) -> ExpertiseResult<FieldComparison> {
    let metadata_checked = check_metadata && !test.misc && !reference.misc;
    let (validity_diff, geometry_diff) = if metadata_checked {
        (
            metadata_diff(test.validity.as_ref(), reference.validity.as_ref()),
            metadata_diff(test.geometry.as_ref(), reference.geometry.as_ref()),
        )
    } else {
        (None, None)
    };
    let metadata_matches = validity_diff.is_none() && geometry_diff.is_none();

    if test.shape != reference.shape {
        return Ok(FieldComparison {
            metadata_checked,
            validity_diff,
            geometry_diff,
            data_bit_repro: false,
            masks_differ: false,
            data_diff: Some(DataDiff::DimensionsDiffer),
            validated: false,
        });
    }
    test.check_consistency(name)?;
    reference.check_consistency(name)?;

    let size = test.values.len();
    let masks_differ = (0..size).any(|index| test.is_masked(index) != reference.is_masked(index));
    let values_equal = (0..size)
        .filter(|index| !test.is_masked(*index) && !reference.is_masked(*index))
        .all(|index| {
            let (lhs, rhs) = (test.values[index], reference.values[index]);
            lhs.to_bits() == rhs.to_bits() || (lhs - rhs).abs() <= EPSILON
        });
    let data_bit_repro = values_equal && !masks_differ;

    if data_bit_repro {
        return Ok(FieldComparison {
            metadata_checked,
            validity_diff,
            geometry_diff,
            data_bit_repro,
            masks_differ,
            data_diff: None,
            validated: metadata_matches,
        });
    }

    let data_diff = normalized_difference(test, reference);
    let within_threshold = data_diff
        .max_abs()
        .map(|max_abs| max_abs.is_finite() && max_abs < threshold)
        .unwrap_or(false);

    Ok(FieldComparison {
        metadata_checked,
        validity_diff,
        geometry_diff,
        data_bit_repro,
        masks_differ,
        data_diff: Some(data_diff),
        validated: within_threshold && metadata_matches,
    })
}

fn metadata_diff(test: Option<&Value>, reference: Option<&Value>) -> Option<Value> {
    let test = test.unwrap_or(&Value::Null);
    let reference = reference.unwrap_or(&Value::Null);
    recursive_diff(test, reference)
}

fn normalized_difference(test: &Field, reference: &Field) -> DataDiff {
    let common: Vec<usize> = (0..test.values.len())
        .filter(|index| !test.is_masked(*index) && !reference.is_masked(*index))
        .collect();
    if common.is_empty() {
        return DataDiff::NoCommonValues;
    }

    let (reference_min, reference_max) = common.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY),
        |(min, max), index| {
            let value = reference.values[*index];
            (min.min(value), max.max(value))
        },
    );
    let range = reference_max - reference_min;
    let range = if range > 0.0 { range } else { 1.0 };

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for index in &common {
        let diff = (test.values[*index] - reference.values[*index]) / range;
        // f64::min/max would skip a NaN diff
        if diff.is_nan() || min.is_nan() {
            min = f64::NAN;
            max = f64::NAN;
        } else {
            min = min.min(diff);
            max = max.max(diff);
        }
        sum += diff;
    }
    DataDiff::Normalized {
        min,
        avg: sum / common.len() as f64,
        max,
    }
}

#[cfg(test)]
mod tests {
    use super::{DataDiff, Field, compare_fields, recursive_diff};
    use crate::numerics::thresholds::NORMALIZED_FIELDS_DIFF;
    use serde_json::json;

    fn field(values: &[f64]) -> Field {
        Field::new(vec![values.len()], values.to_vec())
    }

    #[test]
    fn equal_fields_are_bit_reproducible() {
        let reference = field(&[1.0, 2.0, 3.0, 4.0]);
        let comparison = compare_fields("T", &reference, &reference, NORMALIZED_FIELDS_DIFF, true)
            .expect("fields should compare");

        assert!(comparison.data_bit_repro);
        assert!(comparison.validated);
        assert!(comparison.data_diff.is_none());
        assert_eq!(comparison.max_abs_normalized_diff(), 0.0);
    }

    #[test]
    fn different_shapes_are_not_comparable() {
        let comparison = compare_fields(
            "T",
            &field(&[1.0, 2.0]),
            &field(&[1.0, 2.0, 3.0]),
            NORMALIZED_FIELDS_DIFF,
            true,
        )
        .expect("shape mismatch is reported, not raised");

        assert!(!comparison.validated);
        assert!(!comparison.data_bit_repro);
        assert_eq!(comparison.data_diff, Some(DataDiff::DimensionsDiffer));
    }

    #[test]
    fn differences_are_normalized_by_reference_range() {
        let reference = field(&[0.0, 5.0, 10.0]);
        let test = field(&[0.0, 5.0, 11.0]);
        let comparison = compare_fields("T", &test, &reference, 0.2, false)
            .expect("fields should compare");

        assert!(!comparison.data_bit_repro);
        assert!((comparison.max_abs_normalized_diff() - 0.1).abs() < 1e-12);
        assert!(comparison.validated);

        let strict = compare_fields("T", &test, &reference, 0.05, false)
            .expect("fields should compare");
        assert!(!strict.validated);
    }

    #[test]
    fn flat_reference_uses_raw_differences() {
        let reference = field(&[2.0, 2.0]);
        let test = field(&[2.0, 2.5]);
        let comparison = compare_fields("T", &test, &reference, 1.0, false)
            .expect("fields should compare");

        assert_eq!(comparison.max_abs_normalized_diff(), 0.5);
        assert!(comparison.validated);
    }

    #[test]
    fn empty_common_region_is_not_validated() {
        let reference = field(&[1.0, 2.0]).with_mask(vec![true, false]);
        let test = field(&[1.0, 3.0]).with_mask(vec![false, true]);
        let comparison = compare_fields("T", &test, &reference, 1.0, false)
            .expect("fields should compare");

        assert_eq!(comparison.data_diff, Some(DataDiff::NoCommonValues));
        assert!(!comparison.validated);
    }

    #[test]
    fn differing_masks_are_reported_without_failing() {
        let reference = field(&[1.0, 2.0, 3.0]).with_mask(vec![false, false, true]);
        let test = field(&[1.0, 2.0, 9.0]);
        let comparison = compare_fields("T", &test, &reference, NORMALIZED_FIELDS_DIFF, false)
            .expect("fields should compare");

        assert!(comparison.masks_differ);
        assert!(!comparison.data_bit_repro);
        assert_eq!(comparison.max_abs_normalized_diff(), 0.0);
        assert!(comparison.validated);
    }

    #[test]
    fn metadata_differences_fail_validation() {
        let mut reference = field(&[1.0]);
        reference.validity = Some(json!({"term": 6, "basis": "2024-01-01T00"}));
        let mut test = reference.clone();
        test.validity = Some(json!({"term": 12, "basis": "2024-01-01T00"}));

        let comparison = compare_fields("T", &test, &reference, NORMALIZED_FIELDS_DIFF, true)
            .expect("fields should compare");
        assert!(comparison.data_bit_repro);
        assert!(!comparison.validated);
        assert_eq!(comparison.validity_diff, Some(json!({"term": {"test": 12, "ref": 6}})));

        let ignored = compare_fields("T", &test, &reference, NORMALIZED_FIELDS_DIFF, false)
            .expect("fields should compare");
        assert!(ignored.validated);
    }

    #[test]
    fn field_distance_is_monotonic_in_threshold() {
        let reference = field(&[0.0, 1.0, 2.0, 4.0]);
        let test = field(&[0.1, 1.0, 2.2, 4.0]);
        let mut previously_validated = false;
        for threshold in [0.0, 0.01, 0.05, 0.1, 1.0] {
            let validated = compare_fields("T", &test, &reference, threshold, false)
                .expect("fields should compare")
                .validated;
            assert!(validated || !previously_validated);
            previously_validated = validated;
        }
    }

    #[test]
    fn non_finite_test_values_are_not_validated() {
        let reference = field(&[1.0, 2.0, 3.0]);

        let with_nan = compare_fields("T", &field(&[1.0, f64::NAN, 3.0]), &reference, 1e-6, false)
            .expect("fields should compare");
        assert!(!with_nan.data_bit_repro);
        assert!(with_nan.max_abs_normalized_diff().is_nan());
        assert!(!with_nan.validated);

        let with_inf =
            compare_fields("T", &field(&[1.0, f64::INFINITY, 3.0]), &reference, 1.0, false)
                .expect("fields should compare");
        assert!(with_inf.max_abs_normalized_diff().is_infinite());
        assert!(!with_inf.validated);
    }

    #[test]
    fn recursive_diff_reports_only_differing_leaves() {
        let test = json!({"a": 1, "b": {"c": 2, "d": 3}, "new": true});
        let reference = json!({"a": 1, "b": {"c": 2, "d": 4}});

        assert_eq!(recursive_diff(&test, &test), None);
        assert_eq!(
            recursive_diff(&test, &reference),
            Some(json!({
                "b": {"d": {"test": 3, "ref": 4}},
                "new": {"test": true, "ref": null}
            }))
        );
    }
}
