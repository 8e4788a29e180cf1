//! Spectral/gridpoint norm records and their digit-level comparison.

use crate::domain::{ExpertiseError, ExpertiseResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Significant digits used when rendering norms for comparison.
pub const NORM_SIGNIFICANT_DIGITS: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct GpNorm {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

impl GpNorm {
    fn components(&self) -> [(&'static str, f64); 3] {
        [("min", self.min), ("avg", self.avg), ("max", self.max)]
    }
}

/// Norms printed at one model step.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NormStep {
    #[serde(deserialize_with = "deserialize_step_label")]
    pub step: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub spnorms: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub gpnorms: BTreeMap<String, GpNorm>,
}

impl NormStep {
    pub fn has_spectral(&self) -> bool {
        !self.spnorms.is_empty()
    }

    pub fn has_gridpoint(&self) -> bool {
        !self.gpnorms.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct NormSet {
    pub steps: Vec<NormStep>,
}

impl NormSet {
    pub fn new(steps: Vec<NormStep>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, label: &str) -> Option<&NormStep> {
        self.steps.iter().find(|step| step.step == label)
    }
}

fn deserialize_step_label<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StepLabel {
        Index(u64),
        Label(String),
    }

    Ok(match StepLabel::deserialize(deserializer)? {
        StepLabel::Index(index) => index.to_string(),
        StepLabel::Label(label) => label,
    })
}

/// Number of differing significant digits between two norm values.
///
/// Both values are rendered with 15 significant digits in scientific
/// notation; a sign or exponent mismatch counts as all digits differing.
pub fn differing_digits(test: f64, reference: f64) -> u32 {
    if test.to_bits() == reference.to_bits() {
        return 0;
    }
    if !test.is_finite() || !reference.is_finite() {
        return if test.is_nan() && reference.is_nan() {
            0
        } else {
            NORM_SIGNIFICANT_DIGITS
        };
    }

    let (test_negative, test_mantissa, test_exponent) = decompose(test);
    let (reference_negative, reference_mantissa, reference_exponent) = decompose(reference);
    if test_negative != reference_negative || test_exponent != reference_exponent {
        return NORM_SIGNIFICANT_DIGITS;
    }

    let common = test_mantissa
        .bytes()
        .zip(reference_mantissa.bytes())
        .take_while(|(lhs, rhs)| lhs == rhs)
        .count() as u32;
    NORM_SIGNIFICANT_DIGITS.saturating_sub(common)
}

fn decompose(value: f64) -> (bool, String, i32) {
    let rendered = format!("{:.*e}", (NORM_SIGNIFICANT_DIGITS - 1) as usize, value.abs());
    let (mantissa, exponent) = rendered.split_once('e').unwrap_or((rendered.as_str(), "0"));
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let negative = value.is_sign_negative() && value != 0.0;
    (negative, digits, exponent.parse().unwrap_or(0))
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormsComparison {
    /// Largest number of differing digits over every compared norm.
    pub worst_digits: u32,
    pub compared_norms: usize,
    /// One line per compared step and norm, in step order.
    pub report: Vec<String>,
}

impl NormsComparison {
    pub fn is_bit_reproducible(&self) -> bool {
        self.worst_digits == 0
    }
}

/// Compares the steps present in both sets; one-sided steps and norms are
/// left out. Nothing in common is a comparison error.
pub fn compare_normsets(test: &NormSet, reference: &NormSet) -> ExpertiseResult<NormsComparison> {
    let mut worst_digits = 0;
    let mut compared_norms = 0;
    let mut report = Vec::new();

    for test_step in &test.steps {
        let Some(reference_step) = reference.step(&test_step.step) else {
            continue;
        };
        report.push(format!("step {}", test_step.step));

        for (name, test_value) in &test_step.spnorms {
            let Some(reference_value) = reference_step.spnorms.get(name) else {
                continue;
            };
            let digits = differing_digits(*test_value, *reference_value);
            worst_digits = worst_digits.max(digits);
            compared_norms += 1;
            report.push(format!(
                "  spnorm {:<12} test={:.14e} ref={:.14e} digits={}",
                name, test_value, reference_value, digits
            ));
        }

        for (field, test_norm) in &test_step.gpnorms {
            let Some(reference_norm) = reference_step.gpnorms.get(field) else {
                continue;
            };
            let mut field_worst = 0;
            for ((component, test_value), (_, reference_value)) in test_norm
                .components()
                .into_iter()
                .zip(reference_norm.components())
            {
                let digits = differing_digits(test_value, reference_value);
                field_worst = field_worst.max(digits);
                compared_norms += 1;
                if digits > 0 {
                    report.push(format!(
                        "  gpnorm {:<12} {} test={:.14e} ref={:.14e} digits={}",
                        field, component, test_value, reference_value, digits
                    ));
                }
            }
            worst_digits = worst_digits.max(field_worst);
            if field_worst == 0 {
                report.push(format!("  gpnorm {:<12} digits=0", field));
            }
        }
    }

    if compared_norms == 0 {
        return Err(ExpertiseError::comparison(
            "COMPARISON.NORMS_DISJOINT",
            "test and reference norm sets have no step/norm in common",
        ));
    }

    Ok(NormsComparison {
        worst_digits,
        compared_norms,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::{GpNorm, NormSet, NormStep, compare_normsets, differing_digits};
    use std::collections::BTreeMap;

    fn step(label: &str, spnorms: &[(&str, f64)], gpnorms: &[(&str, f64, f64, f64)]) -> NormStep {
        NormStep {
            step: label.to_string(),
            spnorms: spnorms
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect(),
            gpnorms: gpnorms
                .iter()
                .map(|(name, min, avg, max)| {
                    (
                        name.to_string(),
                        GpNorm {
                            min: *min,
                            avg: *avg,
                            max: *max,
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn sample_set() -> NormSet {
        NormSet::new(vec![
            step("0", &[("VORTICITY", 0.123456789012345e-4), ("TEMPERATURE", 0.25e3)], &[]),
            step("1", &[], &[("SURFTEMPERATURE", 2.1e2, 2.8e2, 3.1e2)]),
        ])
    }

    #[test]
    fn identical_values_have_no_differing_digits() {
        assert_eq!(differing_digits(1.0, 1.0), 0);
        assert_eq!(differing_digits(-2.5e-3, -2.5e-3), 0);
        assert_eq!(differing_digits(0.0, 0.0), 0);
    }

    #[test]
    fn differing_digits_counts_from_common_prefix() {
        assert_eq!(differing_digits(1.23456789012345, 1.23456789012346), 1);
        assert_eq!(differing_digits(1.2345, 1.2346), 11);
        assert_eq!(differing_digits(1.0, 2.0), 15);
    }

    #[test]
    fn sign_or_exponent_mismatch_differs_on_every_digit() {
        assert_eq!(differing_digits(1.0, -1.0), 15);
        assert_eq!(differing_digits(9.99, 10.0), 15);
    }

    #[test]
    fn identical_sets_are_bit_reproducible() {
        let comparison = compare_normsets(&sample_set(), &sample_set())
            .expect("identical sets should compare");
        assert_eq!(comparison.worst_digits, 0);
        assert!(comparison.is_bit_reproducible());
        assert_eq!(comparison.compared_norms, 5);
    }

    #[test]
    fn one_sided_steps_and_norms_are_excluded() {
        let mut test = sample_set();
        test.steps.push(step("2", &[("VORTICITY", 1.0)], &[]));
        test.steps[0].spnorms.insert("DIVERGENCE".to_string(), 3.0);

        let comparison = compare_normsets(&test, &sample_set())
            .expect("overlapping sets should compare");
        assert_eq!(comparison.worst_digits, 0);
        assert_eq!(comparison.compared_norms, 5);
    }

    #[test]
    fn worst_digit_is_maximum_over_norms() {
        let mut test = sample_set();
        test.steps[0]
            .spnorms
            .insert("TEMPERATURE".to_string(), 0.2500001e3);

        let comparison = compare_normsets(&test, &sample_set()).expect("sets should compare");
        assert_eq!(comparison.worst_digits, 9);
    }

    #[test]
    fn disjoint_sets_cannot_be_compared() {
        let test = NormSet::new(vec![step("7", &[("VORTICITY", 1.0)], &[])]);
        assert!(compare_normsets(&test, &sample_set()).is_err());
    }

    #[test]
    fn step_labels_accept_integers() {
        let step: NormStep = serde_json::from_str(r#"{"step": 3, "spnorms": {"VORTICITY": 1.5}}"#)
            .expect("step should deserialize");
        assert_eq!(step.step, "3");
        assert!(step.has_spectral());
        assert!(!step.has_gridpoint());
    }
}
