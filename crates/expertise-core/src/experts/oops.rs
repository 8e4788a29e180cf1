//! Experts reading the check lines printed by OOPS unit tests.

use super::{
    Expert, ExpertContext, ExpertSettings, ExpertVariant, RELATIVE_ERROR_STATUS, Sealed,
    not_parsed, parse_options, render_relative,
};
use crate::domain::{ExpertiseError, ExpertiseResult};
use crate::format::{
    render_general, render_int, render_percent, render_shortest, render_signed_general,
};
use crate::numerics::{
    RelativeError, clamp_digits, compare_digits, compare_relative, expected_significant_digits,
    thresholds, validate_threshold,
};
use crate::parsing::TextArtifact;
use crate::parsing::grammar::{capture_f64, capture_u64, grammar, names};
use crate::summary::{ComparisonResult, Summary};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

const DEFAULT_TEST_OUTPUT: &str = "stdeo.0";
const DEFAULT_LISTING: &str = "NODE.001_01";

fn default_test_output() -> String {
    DEFAULT_TEST_OUTPUT.to_string()
}

fn default_listing() -> String {
    DEFAULT_LISTING.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TestOutputOptions {
    #[serde(default = "default_test_output")]
    output: String,
}

/// A scalar checked by relative error: Jo, states diff or variances.
#[derive(Debug, Clone, Copy)]
struct Quantity {
    summary_key: &'static str,
    grammar: &'static str,
    value_group: &'static str,
    parse_code: &'static str,
    threshold_option: &'static str,
    default_threshold: f64,
    expected_key: &'static str,
    /// Expected result suggested as a truncated integer.
    expected_as_integer: bool,
    means: fn(f64) -> String,
}

impl Quantity {
    fn of(variant: ExpertVariant) -> Option<Self> {
        match variant {
            ExpertVariant::Jo => Some(Self {
                summary_key: "Jo",
                grammar: names::OOPS_JO,
                value_group: "jo",
                parse_code: "PARSE.OOPS_JO",
                threshold_option: "jo_validation_threshold",
                default_threshold: thresholds::JO,
                expected_key: "expected_Jo",
                expected_as_integer: true,
                means: |threshold| percent_bound_means("Jo", threshold),
            }),
            ExpertVariant::StatesDiff => Some(Self {
                summary_key: "States diff",
                grammar: names::OOPS_STATES_DIFF,
                value_group: "statediff",
                parse_code: "PARSE.OOPS_STATES_DIFF",
                threshold_option: "statesdiff_validation_threshold",
                default_threshold: thresholds::STATESDIFF,
                expected_key: "expected_diff",
                expected_as_integer: false,
                means: |threshold| {
                    format!(
                        "Absolute value of Relative error in 'States diff' is lower or equal to {}",
                        render_percent(threshold, 3)
                    )
                },
            }),
            ExpertVariant::Variances => Some(Self {
                summary_key: "Variances",
                grammar: names::OOPS_VARIANCES,
                value_group: "var",
                parse_code: "PARSE.OOPS_VARIANCES",
                threshold_option: "variances_validation_threshold",
                default_threshold: thresholds::VARIANCES,
                expected_key: "expected_variances",
                expected_as_integer: true,
                means: |threshold| percent_bound_means("Variances", threshold),
            }),
            _ => None,
        }
    }
}

fn percent_bound_means(quantity: &str, threshold: f64) -> String {
    format!(
        "Absolute value of Relative error in {} is lower or equal to {}%",
        quantity,
        render_general(threshold * 100.0, false)
    )
}

fn threshold_from_value(name: &str, value: &Value) -> ExpertiseResult<f64> {
    let threshold = value.as_f64().ok_or_else(|| {
        ExpertiseError::configuration(
            "CONFIG.THRESHOLD",
            format!("threshold '{}' must be a number, got {}", name, value),
        )
    })?;
    validate_threshold(name, threshold)
}

/// Relative-error expert over one scalar of the test output.
#[derive(Debug)]
pub struct ScalarExpert {
    settings: ExpertSettings,
    variant: ExpertVariant,
    quantity: Quantity,
    output: String,
    threshold: f64,
    value: Option<f64>,
}

impl ScalarExpert {
    pub fn from_options(
        variant: ExpertVariant,
        settings: ExpertSettings,
        options: &Map<String, Value>,
    ) -> ExpertiseResult<Self> {
        let quantity = Quantity::of(variant).ok_or_else(|| {
            ExpertiseError::internal(
                "INTERNAL.EXPERT_VARIANT",
                format!("{} is not a relative-error variant", variant.name()),
            )
        })?;
        let mut options = options.clone();
        let threshold = match options.remove(quantity.threshold_option) {
            Some(value) => threshold_from_value(quantity.threshold_option, &value)?,
            None => quantity.default_threshold,
        };
        let TestOutputOptions { output } = parse_options(&settings.kind, &options)?;
        Ok(Self {
            settings,
            variant,
            quantity,
            output,
            threshold,
            value: None,
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Sealed for ScalarExpert {}

impl Expert for ScalarExpert {
    fn settings(&self) -> &ExpertSettings {
        &self.settings
    }

    fn variant(&self) -> ExpertVariant {
        self.variant
    }

    fn is_parsed(&self) -> bool {
        self.value.is_some()
    }

    fn parse(&mut self, context: &ExpertContext<'_>) -> ExpertiseResult<()> {
        let output = TextArtifact::read(context.workspace, &self.output)?;
        let captures = output.require_first(self.quantity.grammar, self.quantity.parse_code)?;
        let value = capture_f64(&captures, self.quantity.value_group, self.quantity.parse_code)?;
        debug!(expert = %self.settings.label, value, "parsed OOPS test value");
        self.value = Some(value);
        Ok(())
    }

    fn summarize(&self) -> ExpertiseResult<Summary> {
        let value = self.value.ok_or_else(|| not_parsed(&self.settings))?;
        Ok(Summary::new().with(self.quantity.summary_key, value))
    }

    fn compare_summaries(
        &self,
        test: &Summary,
        reference: &Summary,
    ) -> ExpertiseResult<ComparisonResult> {
        let key = self.quantity.summary_key;
        let comparison = compare_relative(
            test.require_f64(key)?,
            reference.require_f64(key)?,
            self.threshold,
        );
        let mut result = ComparisonResult::validated(
            comparison.validated,
            (self.quantity.means)(self.threshold),
            format!("Relative error in {}", key),
            render_relative(comparison.relative_error, 3),
        )
        .with(
            format!("Absolute error in {}", key),
            render_signed_general(comparison.absolute_error),
        );
        if comparison.relative_error == RelativeError::Undefined {
            result.insert(RELATIVE_ERROR_STATUS, "undefined");
        }
        Ok(result)
    }

    fn expected_result(&self) -> ExpertiseResult<Option<Summary>> {
        let value = self.value.ok_or_else(|| not_parsed(&self.settings))?;
        let expected = if self.quantity.expected_as_integer {
            (value.trunc() as i64).to_string()
        } else {
            render_shortest(value)
        };
        let digits = expected_significant_digits(value, thresholds::EXPECTED_RESULT_TOLERANCE_FACTOR);
        Ok(Some(
            Summary::new()
                .with(self.quantity.expected_key, expected)
                .with("significant_digits", digits.to_string()),
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AdjointOptions {
    #[serde(default = "default_test_output")]
    output: String,
    #[serde(default = "default_digits_threshold")]
    digits_validation_threshold: f64,
}

fn default_digits_threshold() -> f64 {
    thresholds::JOAD_DIGITS
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct AdjointTest {
    dx1_dx2: f64,
    dy1_dy2: f64,
    digits: f64,
}

/// Adjoint test: common digits between the two scalar products.
#[derive(Debug)]
pub struct AdjointExpert {
    settings: ExpertSettings,
    output: String,
    digits_threshold: f64,
    parsed: Option<AdjointTest>,
}

impl AdjointExpert {
    pub fn from_options(
        settings: ExpertSettings,
        options: &Map<String, Value>,
    ) -> ExpertiseResult<Self> {
        let options: AdjointOptions = parse_options(&settings.kind, options)?;
        Ok(Self {
            settings,
            output: options.output,
            digits_threshold: validate_threshold(
                "digits_validation_threshold",
                options.digits_validation_threshold,
            )?,
            parsed: None,
        })
    }
}

impl Sealed for AdjointExpert {}

impl Expert for AdjointExpert {
    fn settings(&self) -> &ExpertSettings {
        &self.settings
    }

    fn variant(&self) -> ExpertVariant {
        ExpertVariant::Adjoint
    }

    fn is_parsed(&self) -> bool {
        self.parsed.is_some()
    }

    fn parse(&mut self, context: &ExpertContext<'_>) -> ExpertiseResult<()> {
        const CODE: &str = "PARSE.OOPS_ADJOINT";
        let output = TextArtifact::read(context.workspace, &self.output)?;
        let captures = output.require_first(names::OOPS_ADJOINT, CODE)?;
        self.parsed = Some(AdjointTest {
            dx1_dx2: capture_f64(&captures, "dx1dx2", CODE)?,
            dy1_dy2: capture_f64(&captures, "dy1dy2", CODE)?,
            digits: clamp_digits(capture_f64(&captures, "digits", CODE)?),
        });
        Ok(())
    }

    fn summarize(&self) -> ExpertiseResult<Summary> {
        let parsed = self.parsed.ok_or_else(|| not_parsed(&self.settings))?;
        Ok(Summary::new()
            .with("dx1.dx2", parsed.dx1_dx2)
            .with("dy1.dy2", parsed.dy1_dy2)
            .with("Digits", parsed.digits))
    }

    fn compare_summaries(
        &self,
        test: &Summary,
        reference: &Summary,
    ) -> ExpertiseResult<ComparisonResult> {
        let agreement = compare_digits(
            test.require_f64("Digits")?,
            reference.require_f64("Digits")?,
            self.digits_threshold,
        );
        let threshold = render_general(self.digits_threshold, false);
        Ok(ComparisonResult::validated(
            agreement.validated,
            format!(
                "Enough digits common between dx1.dx2 and dy1.dy2 (scalar products); enough == as many as reference or > {}",
                threshold
            ),
            "Diff in common digits",
            render_int(agreement.rounded_diff),
        )
        .with("Common digits in AD-test >= reference", agreement.as_many_as_reference)
        .with(
            format!("Common digits in AD-test >= {}", threshold),
            agreement.above_threshold,
        )
        .with("Float diff in common digits", agreement.digits_diff))
    }

    fn expected_result(&self) -> ExpertiseResult<Option<Summary>> {
        let parsed = self.parsed.ok_or_else(|| not_parsed(&self.settings))?;
        Ok(Some(Summary::new().with(
            "significant_digits",
            (parsed.digits.trunc() as i64).to_string(),
        )))
    }
}

pub const TL_STATISTICS: &str = "WRITE_OBSVEC statistics at each update";
pub const TL_UPDATES: &str = "Number of updates";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TlOptions {
    #[serde(default = "default_listing")]
    output: String,
    #[serde(default = "default_jo_threshold")]
    jo_validation_threshold: f64,
}

fn default_jo_threshold() -> f64 {
    thresholds::JO
}

/// Observation statistics printed before one ODB update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObsvecStatistics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_rmdi: Option<u64>,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

/// Tangent-linear test: WRITE_OBSVEC statistics at each update.
#[derive(Debug)]
pub struct TlStatisticsExpert {
    settings: ExpertSettings,
    output: String,
    threshold: f64,
    updates: Option<BTreeMap<String, ObsvecStatistics>>,
}

impl TlStatisticsExpert {
    pub fn from_options(
        settings: ExpertSettings,
        options: &Map<String, Value>,
    ) -> ExpertiseResult<Self> {
        let options: TlOptions = parse_options(&settings.kind, options)?;
        Ok(Self {
            settings,
            output: options.output,
            threshold: validate_threshold("jo_validation_threshold", options.jo_validation_threshold)?,
            updates: None,
        })
    }
}

/// Statistics are printed on the two lines preceding the signature.
fn parse_statistics(joined: &str) -> ExpertiseResult<Option<ObsvecStatistics>> {
    const CODE: &str = "PARSE.TL_STATISTICS";
    if let Some(captures) = grammar(names::TL_STATS_VALUES)?.captures(joined) {
        return Ok(Some(ObsvecStatistics {
            values: Some(capture_u64(&captures, "values", CODE)?),
            not_rmdi: Some(capture_u64(&captures, "not_rmdi", CODE)?),
            min: capture_f64(&captures, "min", CODE)?,
            max: capture_f64(&captures, "max", CODE)?,
            avg: capture_f64(&captures, "avg", CODE)?,
        }));
    }
    if let Some(captures) = grammar(names::TL_STATS)?.captures(joined) {
        return Ok(Some(ObsvecStatistics {
            values: None,
            not_rmdi: None,
            min: capture_f64(&captures, "min", CODE)?,
            max: capture_f64(&captures, "max", CODE)?,
            avg: capture_f64(&captures, "avg", CODE)?,
        }));
    }
    Ok(None)
}

impl Sealed for TlStatisticsExpert {}

impl Expert for TlStatisticsExpert {
    fn settings(&self) -> &ExpertSettings {
        &self.settings
    }

    fn variant(&self) -> ExpertVariant {
        ExpertVariant::TlStatistics
    }

    fn is_parsed(&self) -> bool {
        self.updates.is_some()
    }

    fn parse(&mut self, context: &ExpertContext<'_>) -> ExpertiseResult<()> {
        let listing = TextArtifact::read(context.workspace, &self.output)?;
        let lines = listing.lines();
        let mut updates = BTreeMap::new();
        for (index, captures) in listing.find_all(names::TL_SIGNATURE)? {
            if index < 2 {
                continue;
            }
            let joined = format!("{} {}", lines[index - 2], lines[index - 1]);
            if let Some(statistics) = parse_statistics(&joined)? {
                let update = captures
                    .name("nupdate")
                    .map(|found| found.as_str().to_string())
                    .unwrap_or_default();
                updates.insert(update, statistics);
            }
        }
        if updates.is_empty() {
            return Err(ExpertiseError::parse(
                "PARSE.TL_STATISTICS",
                format!("no WRITE_OBSVEC statistics found in '{}'", listing.name()),
            ));
        }
        self.updates = Some(updates);
        Ok(())
    }

    fn summarize(&self) -> ExpertiseResult<Summary> {
        let updates = self
            .updates
            .as_ref()
            .ok_or_else(|| not_parsed(&self.settings))?;
        let statistics = serde_json::to_value(updates).map_err(|source| {
            ExpertiseError::internal(
                "INTERNAL.SUMMARY_VALUE",
                format!("failed to render TL statistics: {}", source),
            )
        })?;
        Ok(Summary::new()
            .with(TL_STATISTICS, statistics)
            .with(TL_UPDATES, updates.len()))
    }

    fn compare_summaries(
        &self,
        test: &Summary,
        reference: &Summary,
    ) -> ExpertiseResult<ComparisonResult> {
        let test_updates = test.require_object(TL_STATISTICS)?;
        let reference_updates = reference.require_object(TL_STATISTICS)?;

        let mut worst_relative: Option<RelativeError> = None;
        let mut worst_absolute: Option<f64> = None;
        for (update, test_statistics) in test_updates {
            let reference_statistics = reference_updates
                .get(update)
                .and_then(Value::as_object)
                .ok_or_else(|| {
                    ExpertiseError::comparison(
                        "COMPARISON.TL_UPDATES",
                        format!("update {} is missing in reference", update),
                    )
                })?;
            let Some(test_statistics) = test_statistics.as_object() else {
                continue;
            };
            for (name, test_value) in test_statistics {
                let (Some(test_value), Some(reference_value)) = (
                    test_value.as_f64(),
                    reference_statistics.get(name).and_then(Value::as_f64),
                ) else {
                    continue;
                };
                let relative = RelativeError::between(test_value, reference_value);
                let absolute = test_value - reference_value;
                if worst_relative.is_none_or(|worst| relative.magnitude() > worst.magnitude()) {
                    worst_relative = Some(relative);
                }
                if worst_absolute.is_none_or(|worst| absolute.abs() > worst.abs()) {
                    worst_absolute = Some(absolute);
                }
            }
        }

        let (Some(worst_relative), Some(worst_absolute)) = (worst_relative, worst_absolute) else {
            return Err(ExpertiseError::comparison(
                "COMPARISON.TL_UPDATES",
                "no WRITE_OBSVEC statistic in common with reference",
            ));
        };
        let mut result = ComparisonResult::validated(
            worst_relative.within(self.threshold),
            format!(
                "Absolute values of Relative errors in WRITE_OBSVEC statistics is lower or equal to {}%",
                render_general(self.threshold * 100.0, false)
            ),
            "Relative errors in WRITE_OBSVEC statistics",
            render_relative(worst_relative, 3),
        )
        .with(
            "Absolute errors in WRITE_OBSVEC statistics",
            render_signed_general(worst_absolute),
        );
        if worst_relative == RelativeError::Undefined {
            result.insert(RELATIVE_ERROR_STATUS, "undefined");
        }
        Ok(result)
    }
}
