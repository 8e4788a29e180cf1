use crate::domain::{ExpertiseError, ExpertiseResult, Scope};
use crate::summary::{
    COMPARISON_ERROR, ComparisonResult, Summary, read_json_document, write_json_document,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Comparison outcome of every expert against one scope's references.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeReport {
    pub experts: BTreeMap<String, ComparisonResult>,
    #[serde(rename = "Validated", default, skip_serializing_if = "Option::is_none")]
    pub validated: Option<bool>,
    pub lead_expert: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_metrics: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_metrics_value: Option<Value>,
}

/// One expert's comparison, with the attributes aggregation depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeOutcome {
    pub label: String,
    pub side_expert: bool,
    pub fatal_exceptions: bool,
    pub result: ComparisonResult,
}

/// AND over non-side verdicts. An absent verdict fails the scope for a
/// fatal expert and is skipped otherwise; no contributor leaves the scope
/// unassessed.
pub fn aggregate_scope(lead: &str, outcomes: Vec<ScopeOutcome>) -> ScopeReport {
    let mut validated: Option<bool> = None;
    for outcome in outcomes.iter().filter(|outcome| !outcome.side_expert) {
        let verdict = match outcome.result.verdict() {
            Some(verdict) => verdict,
            None if outcome.fatal_exceptions => false,
            None => continue,
        };
        validated = Some(validated.unwrap_or(true) && verdict);
    }

    let lead_result = outcomes
        .iter()
        .find(|outcome| outcome.label == lead)
        .map(|outcome| &outcome.result);
    let main_metrics = lead_result
        .and_then(ComparisonResult::main_metrics)
        .map(str::to_string);
    let main_metrics_value = lead_result
        .and_then(ComparisonResult::main_metric_value)
        .cloned();

    ScopeReport {
        experts: outcomes
            .into_iter()
            .map(|outcome| (outcome.label, outcome.result))
            .collect(),
        validated,
        lead_expert: lead.to_string(),
        main_metrics,
        main_metrics_value,
    }
}

/// Expert summaries keyed by label, plus one report per compared scope.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct TaskSummary(Map<String, Value>);

impl TaskSummary {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn insert_expert(&mut self, label: impl Into<String>, summary: Summary) {
        self.0.insert(label.into(), summary.into_value());
    }

    pub fn insert_scope(&mut self, scope: Scope, report: &ScopeReport) -> ExpertiseResult<()> {
        let value = serde_json::to_value(report).map_err(|source| {
            ExpertiseError::internal(
                "INTERNAL.SCOPE_REPORT",
                format!("failed to serialize {} report: {}", scope, source),
            )
        })?;
        self.0.insert(scope.as_str().to_string(), value);
        Ok(())
    }

    pub fn expert(&self, label: &str) -> Option<Summary> {
        if Scope::from_key(label).is_some() {
            return None;
        }
        self.0.get(label).cloned().and_then(Summary::from_value)
    }

    pub fn expert_labels(&self) -> impl Iterator<Item = &str> {
        self.0
            .keys()
            .map(String::as_str)
            .filter(|key| Scope::from_key(key).is_none())
    }

    pub fn scope(&self, scope: Scope) -> ExpertiseResult<Option<ScopeReport>> {
        let Some(value) = self.0.get(scope.as_str()) else {
            return Ok(None);
        };
        serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|source| {
                ExpertiseError::parse(
                    "PARSE.SCOPE_REPORT",
                    format!("'{}' entry is not a scope report: {}", scope, source),
                )
            })
    }

    /// False when any compared scope failed, true when at least one
    /// validated and none failed.
    pub fn overall_verdict(&self) -> ExpertiseResult<Option<bool>> {
        let mut overall = None;
        for scope in Scope::ALL {
            let Some(report) = self.scope(scope)? else {
                continue;
            };
            match report.validated {
                Some(false) => return Ok(Some(false)),
                Some(true) => overall = Some(true),
                None => {}
            }
        }
        Ok(overall)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn save(&self, path: &Path) -> ExpertiseResult<()> {
        write_json_document(path, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> ExpertiseResult<Self> {
        match read_json_document(path)? {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(ExpertiseError::parse(
                "PARSE.TASK_SUMMARY",
                format!("'{}' is not a JSON object", path.display()),
            )),
        }
    }
}

fn status_label(verdict: Option<bool>) -> &'static str {
    match verdict {
        Some(true) => "PASS",
        Some(false) => "FAIL",
        None => "NOT ASSESSED",
    }
}

fn expert_status(result: &ComparisonResult) -> &'static str {
    match result.verdict() {
        Some(true) => "PASS",
        Some(false) => "FAIL",
        None if result.is_no_reference() => "NO REF",
        None if result.get(COMPARISON_ERROR).is_some() => "ERROR",
        None => "INFO",
    }
}

/// Console digest of a TaskSummary: overall status, then one block per
/// compared scope.
pub fn render_human_summary(summary: &TaskSummary) -> ExpertiseResult<String> {
    let mut lines = Vec::new();
    lines.push(format!(
        "Task status: {}",
        status_label(summary.overall_verdict()?)
    ));
    let labels: Vec<&str> = summary.expert_labels().collect();
    lines.push(format!("Experts: {} ({})", labels.len(), labels.join(", ")));

    for scope in Scope::ALL {
        let Some(report) = summary.scope(scope)? else {
            continue;
        };
        let headline = match (&report.main_metrics, &report.main_metrics_value) {
            (Some(metric), Some(value)) => format!("{} = {}", metric, value),
            _ => "no headline metric".to_string(),
        };
        lines.push(format!(
            "Scope {}: {} (lead {}: {})",
            scope,
            status_label(report.validated),
            report.lead_expert,
            headline
        ));
        for (label, result) in &report.experts {
            lines.push(format!("  {}: {}", label, expert_status(result)));
        }
    }
    Ok(lines.join("\n"))
}
