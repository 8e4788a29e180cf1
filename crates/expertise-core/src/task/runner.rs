use super::config::{TaskConfig, TaskReferences};
use super::report::{ScopeOutcome, TaskSummary, aggregate_scope};
use crate::domain::{
    ExpertiseError, ExpertiseErrorCategory, ExpertiseResult, ReferenceArtifact, Scope, Workspace,
};
use crate::experts::{Expert, ExpertContext, build_expert};
use crate::parsing::Decoders;
use crate::summary::{ComparisonResult, PARSE_STATUS, Summary};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Runs every configured expert over one working directory.
///
/// Experts run sequentially in configuration order; the runner owns them,
/// their decoders and the summaries they produce.
#[derive(Debug)]
pub struct TaskRunner {
    experts: Vec<Box<dyn Expert>>,
    lead: String,
    output: String,
    references: TaskReferences,
    decoders: Decoders,
}

impl TaskRunner {
    /// Validates the configuration and builds every expert before anything
    /// is parsed.
    pub fn new(config: TaskConfig) -> ExpertiseResult<Self> {
        config.validate()?;
        let experts = config
            .experts
            .iter()
            .map(|spec| build_expert(spec, config.fatal_exceptions))
            .collect::<ExpertiseResult<Vec<_>>>()?;
        let lead = config
            .lead_label()
            .map(str::to_string)
            .ok_or_else(|| ExpertiseError::configuration("CONFIG.LEAD", "no lead expert"))?;
        Ok(Self {
            experts,
            lead,
            output: config.output,
            references: config.references,
            decoders: Decoders::default(),
        })
    }

    pub fn with_decoders(mut self, decoders: Decoders) -> Self {
        self.decoders = decoders;
        self
    }

    pub fn experts(&self) -> impl Iterator<Item = &dyn Expert> {
        self.experts.iter().map(|expert| expert.as_ref())
    }

    pub fn lead(&self) -> &str {
        &self.lead
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn run(&mut self, workspace: &Workspace) -> ExpertiseResult<TaskSummary> {
        let mut summary = TaskSummary::new();
        let context = ExpertContext::new(workspace, &self.decoders);

        for expert in &mut self.experts {
            let entry = parse_and_summarize(expert.as_mut(), &context)?;
            summary.insert_expert(expert.settings().label.clone(), entry);
        }

        for scope in Scope::ALL {
            let references = self.references.for_scope(scope);
            if references.is_empty() {
                debug!(%scope, "no reference declared, scope skipped");
                continue;
            }
            let mut outcomes = Vec::with_capacity(self.experts.len());
            for expert in &self.experts {
                let settings = expert.settings();
                let result = compare_in_scope(expert.as_ref(), references, &context, scope)?;
                outcomes.push(ScopeOutcome {
                    label: settings.label.clone(),
                    side_expert: settings.side_expert,
                    fatal_exceptions: settings.fatal_exceptions,
                    result,
                });
            }
            let report = aggregate_scope(&self.lead, outcomes);
            info!(%scope, validated = ?report.validated, "scope compared");
            summary.insert_scope(scope, &report)?;
        }
        Ok(summary)
    }

    /// Runs the task and writes the TaskSummary to `output`, or to the
    /// configured name inside the working directory.
    pub fn run_and_save(
        &mut self,
        workspace: &Workspace,
        output: Option<&Path>,
    ) -> ExpertiseResult<(TaskSummary, PathBuf)> {
        let summary = self.run(workspace)?;
        let path = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| workspace.path(&self.output));
        summary.save(&path)?;
        info!(path = %path.display(), "task summary written");
        Ok((summary, path))
    }

    /// Expected-result suggestions of the parsed experts that provide one.
    pub fn expected_results(&self) -> ExpertiseResult<Vec<(String, Summary)>> {
        let mut expected = Vec::new();
        for expert in self.experts.iter().filter(|expert| expert.is_parsed()) {
            if let Some(result) = expert.expected_result()? {
                expected.push((expert.settings().label.clone(), result));
            }
        }
        Ok(expected)
    }
}

fn parse_status(error: &ExpertiseError) -> Summary {
    let status = Summary::new()
        .with("symbol", "E")
        .with("short", "- Parse error -")
        .with("code", error.code())
        .with("text", error.message());
    Summary::new().with(PARSE_STATUS, status)
}

fn parse_and_summarize(
    expert: &mut dyn Expert,
    context: &ExpertContext<'_>,
) -> ExpertiseResult<Summary> {
    let label = expert.settings().label.clone();
    match expert.parse(context).and_then(|()| expert.summarize()) {
        Ok(summary) => {
            debug!(expert = %label, kind = %expert.settings().kind, "expert parsed");
            Ok(summary)
        }
        Err(error) if !expert.settings().fatal_exceptions && error.is_recoverable() => {
            warn!(expert = %label, code = error.code(), "{} => parse status recorded", error.message());
            Ok(parse_status(&error))
        }
        Err(error) => Err(error),
    }
}

fn compare_in_scope(
    expert: &dyn Expert,
    references: &[ReferenceArtifact],
    context: &ExpertContext<'_>,
    scope: Scope,
) -> ExpertiseResult<ComparisonResult> {
    let settings = expert.settings();
    if !expert.is_parsed() {
        return Ok(ComparisonResult::error(format!(
            "expert '{}' was not parsed, nothing to compare",
            settings.label
        )));
    }
    match expert.compare(references, context) {
        Ok(result) => Ok(result),
        Err(error) if !settings.fatal_exceptions && error.is_recoverable() => {
            warn!(expert = %settings.label, %scope, code = error.code(), "{}", error.message());
            Ok(match error.category() {
                ExpertiseErrorCategory::PairingError | ExpertiseErrorCategory::ArtifactNotFound => {
                    ComparisonResult::no_reference(format!(
                        "No adequate reference available ({})",
                        error.message()
                    ))
                }
                _ => ComparisonResult::error(error.message()),
            })
        }
        Err(error) => Err(error),
    }
}
