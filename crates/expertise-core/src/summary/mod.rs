//! Structured, serializable results of parsing and comparing artifacts.

pub mod serialization;

pub use serialization::{SummaryIoError, read_json_document, to_pretty_json, write_json_document};

use crate::domain::{ExpertiseError, ExpertiseResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const VALIDATED: &str = "Validated";
pub const VALIDATED_MEANS: &str = "Validated means";
pub const MAIN_METRICS: &str = "mainMetrics";
pub const COMPARISON_STATUS: &str = "comparisonStatus";
pub const PARSE_STATUS: &str = "parseStatus";
pub const COMPARISON_ERROR: &str = "Error during comparison";

/// Markers written in place of values that could not be compared.
pub mod markers {
    pub const MISSING_IN_TEST: &str = "!Missing in test!";
    pub const COMPARISON_ERROR: &str = "!ComparisonError!";
    pub const NEW_IN_TEST: &str = "!New in test!";
}

/// Sorted-key mapping from names to JSON values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Summary(Map<String, Value>);

impl Summary {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn validated(&self) -> Option<bool> {
        self.0.get(VALIDATED).and_then(Value::as_bool)
    }

    pub fn main_metrics(&self) -> Option<&str> {
        self.get_str(MAIN_METRICS)
    }

    pub fn main_metric_value(&self) -> Option<&Value> {
        self.main_metrics().and_then(|key| self.0.get(key))
    }

    /// Numeric value required by a comparator.
    pub fn require_f64(&self, key: &str) -> ExpertiseResult<f64> {
        self.get_f64(key).ok_or_else(|| {
            ExpertiseError::comparison(
                "COMPARISON.SUMMARY_VALUE",
                format!("summary key '{}' is missing or not numeric", key),
            )
        })
    }

    pub fn require_object(&self, key: &str) -> ExpertiseResult<&Map<String, Value>> {
        self.0.get(key).and_then(Value::as_object).ok_or_else(|| {
            ExpertiseError::comparison(
                "COMPARISON.SUMMARY_VALUE",
                format!("summary key '{}' is missing or not an object", key),
            )
        })
    }
}

impl From<Summary> for Value {
    fn from(summary: Summary) -> Self {
        summary.into_value()
    }
}

/// Outcome of comparing a test Summary against a reference one.
///
/// Validating comparisons carry `Validated`, `Validated means` and
/// `mainMetrics`; informational ones only `mainMetrics`; the no-reference
/// sentinel carries `comparisonStatus` and nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComparisonResult(Summary);

impl ComparisonResult {
    pub fn validated(
        verdict: bool,
        means: impl Into<String>,
        main_metric: impl Into<String>,
        main_value: impl Into<Value>,
    ) -> Self {
        let main_metric = main_metric.into();
        let summary = Summary::new()
            .with(VALIDATED, verdict)
            .with(VALIDATED_MEANS, means.into())
            .with(main_metric.clone(), main_value)
            .with(MAIN_METRICS, main_metric);
        Self(summary)
    }

    pub fn informational(main_metric: impl Into<String>, main_value: impl Into<Value>) -> Self {
        let main_metric = main_metric.into();
        let summary = Summary::new()
            .with(main_metric.clone(), main_value)
            .with(MAIN_METRICS, main_metric);
        Self(summary)
    }

    pub fn no_reference(description: impl Into<String>) -> Self {
        let status = Summary::new()
            .with("symbol", "0")
            .with("short", "- No ref -")
            .with("text", description.into());
        Self(Summary::new().with(COMPARISON_STATUS, status))
    }

    /// Result of a comparison that raised under `fatal_exceptions = false`.
    pub fn error(message: impl Into<String>) -> Self {
        Self(Summary::new().with(COMPARISON_ERROR, message.into()))
    }

    pub fn from_summary(summary: Summary) -> ExpertiseResult<Self> {
        let result = Self(summary);
        result.check_main_metrics()?;
        Ok(result)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds a detail entry. Reserved keys go through the dedicated setters.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        if key == MAIN_METRICS {
            return;
        }
        self.0.insert(key, value);
    }

    pub fn set_verdict(&mut self, verdict: bool, means: impl Into<String>) {
        self.0.insert(VALIDATED, verdict);
        self.0.insert(VALIDATED_MEANS, means.into());
    }

    pub fn set_main_metric(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        self.0.insert(key.clone(), value);
        self.0.insert(MAIN_METRICS, key);
    }

    pub fn verdict(&self) -> Option<bool> {
        self.0.validated()
    }

    pub fn main_metrics(&self) -> Option<&str> {
        self.0.main_metrics()
    }

    pub fn main_metric_value(&self) -> Option<&Value> {
        self.0.main_metric_value()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_no_reference(&self) -> bool {
        self.0.contains_key(COMPARISON_STATUS)
    }

    pub fn as_summary(&self) -> &Summary {
        &self.0
    }

    pub fn into_summary(self) -> Summary {
        self.0
    }

    pub fn check_main_metrics(&self) -> ExpertiseResult<()> {
        match self.0.get(MAIN_METRICS) {
            None => Ok(()),
            Some(Value::String(key)) if self.0.contains_key(key) => Ok(()),
            Some(other) => Err(ExpertiseError::internal(
                "INTERNAL.MAIN_METRICS",
                format!("mainMetrics {} does not name a key of the result", other),
            )),
        }
    }
}

impl From<ComparisonResult> for Value {
    fn from(result: ComparisonResult) -> Self {
        result.into_summary().into_value()
    }
}

/// Walks two JSON trees and computes `test - ref` for every numeric leaf.
///
/// Branches missing on one side are replaced by the [`markers`]; leaves that
/// cannot be subtracted become `!ComparisonError!` unless `fatal_exceptions`.
pub fn diff_tree(
    test: &Map<String, Value>,
    reference: &Map<String, Value>,
    fatal_exceptions: bool,
) -> ExpertiseResult<Map<String, Value>> {
    let mut diff = Map::new();
    for (key, reference_value) in reference {
        let Some(test_value) = test.get(key) else {
            diff.insert(key.clone(), Value::from(markers::MISSING_IN_TEST));
            continue;
        };
        match (test_value, reference_value) {
            (Value::Object(test_branch), Value::Object(reference_branch)) => {
                let branch = diff_tree(test_branch, reference_branch, fatal_exceptions)?;
                diff.insert(key.clone(), Value::Object(branch));
            }
            (Value::Number(test_number), Value::Number(reference_number)) => {
                let value = match (test_number.as_i64(), reference_number.as_i64()) {
                    (Some(lhs), Some(rhs)) => lhs
                        .checked_sub(rhs)
                        .map(Value::from)
                        .unwrap_or_else(|| Value::from(lhs as f64 - rhs as f64)),
                    _ => {
                        let lhs = test_number.as_f64().unwrap_or(f64::NAN);
                        let rhs = reference_number.as_f64().unwrap_or(f64::NAN);
                        Value::from(lhs - rhs)
                    }
                };
                diff.insert(key.clone(), value);
            }
            _ => {
                if fatal_exceptions {
                    return Err(ExpertiseError::comparison(
                        "COMPARISON.DIFF_TREE",
                        format!("cannot compute difference for key '{}'", key),
                    ));
                }
                diff.insert(key.clone(), Value::from(markers::COMPARISON_ERROR));
            }
        }
    }
    for key in test.keys() {
        if !reference.contains_key(key) {
            diff.insert(key.clone(), Value::from(markers::NEW_IN_TEST));
        }
    }
    Ok(diff)
}

#[cfg(test)]
mod tests {
    use super::{ComparisonResult, MAIN_METRICS, Summary, diff_tree, markers};
    use serde_json::{Value, json};

    fn object(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().cloned().expect("test value should be an object")
    }

    #[test]
    fn summary_keys_are_sorted() {
        let summary = Summary::new().with("b", 1).with("a", 2).with("C", 3);
        let keys: Vec<&str> = summary.keys().collect();
        assert_eq!(keys, vec!["C", "a", "b"]);
    }

    #[test]
    fn validated_result_names_existing_main_metric() {
        let result = ComparisonResult::validated(true, "rule", "Relative error in Jo", "0.000%");
        assert_eq!(result.verdict(), Some(true));
        assert_eq!(result.main_metrics(), Some("Relative error in Jo"));
        assert_eq!(result.main_metric_value(), Some(&Value::from("0.000%")));
        assert!(result.check_main_metrics().is_ok());
    }

    #[test]
    fn insert_cannot_overwrite_main_metrics_name() {
        let mut result = ComparisonResult::informational("Diff", 1.0);
        result.insert(MAIN_METRICS, "Missing key");
        assert_eq!(result.main_metrics(), Some("Diff"));
    }

    #[test]
    fn dangling_main_metrics_is_rejected() {
        let summary = Summary::new().with(MAIN_METRICS, "absent");
        assert!(ComparisonResult::from_summary(summary).is_err());
    }

    #[test]
    fn no_reference_sentinel_has_no_verdict() {
        let result = ComparisonResult::no_reference("No adequate reference available (kind=taskinfo)");
        assert!(result.is_no_reference());
        assert_eq!(result.verdict(), None);
        assert_eq!(result.main_metrics(), None);
    }

    #[test]
    fn diff_tree_marks_missing_new_and_errors() {
        let test = object(json!({"a": 3, "b": {"x": 1.5}, "s": "text", "new": 1}));
        let reference = object(json!({"a": 1, "b": {"x": 0.5}, "s": "other", "gone": 2}));

        let diff = diff_tree(&test, &reference, false).expect("non-fatal diff should succeed");

        assert_eq!(diff["a"], json!(2));
        assert_eq!(diff["b"], json!({"x": 1.0}));
        assert_eq!(diff["s"], json!(markers::COMPARISON_ERROR));
        assert_eq!(diff["gone"], json!(markers::MISSING_IN_TEST));
        assert_eq!(diff["new"], json!(markers::NEW_IN_TEST));
    }

    #[test]
    fn diff_tree_escalates_errors_when_fatal() {
        let test = object(json!({"s": "text"}));
        let reference = object(json!({"s": 1}));
        assert!(diff_tree(&test, &reference, true).is_err());
    }
}
