//! Experts: one artifact kind bound to a parse, summarize and compare contract.

pub mod fields;
pub mod norms;
pub mod oops;
pub mod profiling;
mod registry;

pub use registry::{ExpertSpec, ExpertVariant, build_expert, registered_kinds};

use crate::domain::{ExpertiseError, ExpertiseResult, ReferenceArtifact, Workspace, resource_kind};
use crate::format::render_percent;
use crate::numerics::RelativeError;
use crate::parsing::Decoders;
use crate::summary::{ComparisonResult, Summary, read_json_document};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt::Debug;
use tracing::warn;

pub const UNDEFINED_RELATIVE: &str = "undefined (reference is zero)";
pub const RELATIVE_ERROR_STATUS: &str = "Relative error status";

/// What an expert may look at while parsing and comparing.
#[derive(Debug, Clone, Copy)]
pub struct ExpertContext<'a> {
    pub workspace: &'a Workspace,
    pub decoders: &'a Decoders,
}

impl<'a> ExpertContext<'a> {
    pub fn new(workspace: &'a Workspace, decoders: &'a Decoders) -> Self {
        Self {
            workspace,
            decoders,
        }
    }
}

/// Attributes shared by every expert, resolved at configuration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpertSettings {
    pub kind: String,
    pub label: String,
    pub fatal_exceptions: bool,
    pub side_expert: bool,
    pub lead: bool,
}

mod sealed {
    pub trait Sealed {}
}

pub(crate) use sealed::Sealed;

/// Lifecycle: unparsed, then parsed; `summarize` and `compare` need a
/// successful `parse` first and may be called any number of times.
pub trait Expert: Sealed + Debug {
    fn settings(&self) -> &ExpertSettings;

    fn variant(&self) -> ExpertVariant;

    fn is_parsed(&self) -> bool;

    fn parse(&mut self, context: &ExpertContext<'_>) -> ExpertiseResult<()>;

    fn summarize(&self) -> ExpertiseResult<Summary>;

    /// Compares this expert's summary against the one recorded under the
    /// same label in the `taskinfo` reference.
    fn compare(
        &self,
        references: &[ReferenceArtifact],
        context: &ExpertContext<'_>,
    ) -> ExpertiseResult<ComparisonResult> {
        let test = self.summarize()?;
        match reference_summary(self.settings(), references, context.workspace)? {
            Some(reference) => self.compare_summaries(&test, &reference),
            None => missing_reference(
                self.settings(),
                resource_kind::TASKINFO,
                format!(
                    "no reference summary for expert '{}'",
                    self.settings().label
                ),
            ),
        }
    }

    fn compare_summaries(
        &self,
        _test: &Summary,
        _reference: &Summary,
    ) -> ExpertiseResult<ComparisonResult> {
        Err(ExpertiseError::internal(
            "INTERNAL.SUMMARY_COMPARISON",
            format!(
                "expert kind '{}' does not compare summaries",
                self.settings().kind
            ),
        ))
    }

    /// Suggested expected result for the upstream test harness, when the
    /// variant has one.
    fn expected_result(&self) -> ExpertiseResult<Option<Summary>> {
        Ok(None)
    }
}

pub(crate) fn not_parsed(settings: &ExpertSettings) -> ExpertiseError {
    ExpertiseError::internal(
        "INTERNAL.EXPERT_NOT_PARSED",
        format!(
            "expert '{}' ({}) used before parse",
            settings.label, settings.kind
        ),
    )
}

/// Deserializes variant options; unknown names are rejected by the option
/// structs themselves.
pub(crate) fn parse_options<T: DeserializeOwned>(
    kind: &str,
    options: &Map<String, Value>,
) -> ExpertiseResult<T> {
    serde_json::from_value(Value::Object(options.clone())).map_err(|source| {
        ExpertiseError::configuration(
            "CONFIG.EXPERT_OPTIONS",
            format!("invalid options for expert kind '{}': {}", kind, source),
        )
    })
}

/// Error when `fatal_exceptions`, otherwise a warning and the no-reference
/// sentinel.
pub(crate) fn missing_reference(
    settings: &ExpertSettings,
    kinds: &str,
    detail: String,
) -> ExpertiseResult<ComparisonResult> {
    if settings.fatal_exceptions {
        return Err(ExpertiseError::pairing("PAIRING.NO_REFERENCE", detail));
    }
    warn!(expert = %settings.label, "{} => ignored in comparison", detail);
    Ok(ComparisonResult::no_reference(format!(
        "No adequate reference available (kind={})",
        kinds
    )))
}

/// Entry recorded under this expert's label in the first `taskinfo`
/// reference; `None` when there is no such reference or entry.
pub(crate) fn reference_summary(
    settings: &ExpertSettings,
    references: &[ReferenceArtifact],
    workspace: &Workspace,
) -> ExpertiseResult<Option<Summary>> {
    let Some(reference) = references
        .iter()
        .find(|reference| reference.has_kind(resource_kind::TASKINFO))
    else {
        return Ok(None);
    };
    let path = workspace.require(&reference.name, "ARTIFACT.REFERENCE_SUMMARY")?;
    let document = read_json_document(&path)?;
    Ok(document
        .get(&settings.label)
        .cloned()
        .and_then(Summary::from_value))
}

pub(crate) fn render_relative(relative: RelativeError, precision: usize) -> String {
    match relative {
        RelativeError::Defined(value) => render_percent(value, precision),
        RelativeError::Undefined => UNDEFINED_RELATIVE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Expert, ExpertContext, ExpertSpec, UNDEFINED_RELATIVE, build_expert, render_relative,
    };
    use crate::domain::{ExpertiseErrorCategory, ReferenceArtifact, Workspace};
    use crate::numerics::RelativeError;
    use crate::parsing::Decoders;
    use crate::summary::COMPARISON_STATUS;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn relative_errors_render_undefined_explicitly() {
        assert_eq!(render_relative(RelativeError::Defined(0.0), 3), "0.000%");
        assert_eq!(render_relative(RelativeError::Undefined, 3), UNDEFINED_RELATIVE);
    }

    #[test]
    fn summarize_before_parse_is_an_internal_error() {
        let expert = build_expert(&ExpertSpec::new("oops:op_obs_file/test_hop_with_jo"), true)
            .expect("expert should build");
        let error = expert.summarize().expect_err("summary should need parse");
        assert_eq!(error.category(), ExpertiseErrorCategory::InternalError);
    }

    #[test]
    fn missing_label_in_reference_summary_yields_sentinel_when_not_fatal() {
        let temp = TempDir::new().expect("tempdir should be created");
        fs::write(
            temp.path().join("stdeo.0"),
            "<Message file=\"a.h\" line=\"1\"><![CDATA[Jo = 100.5]]></Message><Message file=\"b.h\" line=\"2\"><![CDATA[Expected result = 100 Digits: 2.0]]></Message>\n",
        )
        .expect("listing should be written");
        fs::write(temp.path().join("ref_summary.json"), r#"{"other": {"Jo": 1.0}}"#)
            .expect("reference should be written");
        let workspace = Workspace::open(temp.path()).expect("workspace should open");
        let decoders = Decoders::default();
        let context = ExpertContext::new(&workspace, &decoders);
        let references = [ReferenceArtifact::new("ref_summary.json", "taskinfo")];

        let mut spec = ExpertSpec::new("oops:op_obs_file/test_hop_with_jo");
        spec.fatal_exceptions = Some(false);
        let mut expert = build_expert(&spec, true).expect("expert should build");
        expert.parse(&context).expect("listing should parse");

        let result = expert
            .compare(&references, &context)
            .expect("comparison should degrade");
        assert!(result.is_no_reference());
        assert!(result.get(COMPARISON_STATUS).is_some());

        spec.fatal_exceptions = Some(true);
        let mut expert = build_expert(&spec, true).expect("expert should build");
        expert.parse(&context).expect("listing should parse");
        let error = expert
            .compare(&references, &context)
            .expect_err("fatal comparison should fail");
        assert_eq!(error.category(), ExpertiseErrorCategory::PairingError);
    }
}
