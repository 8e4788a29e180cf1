//! Fields stored in output containers, compared file by file.

use super::{
    Expert, ExpertContext, ExpertSettings, ExpertVariant, Sealed, missing_reference, not_parsed,
    parse_options,
};
use crate::domain::{ExpertiseError, ExpertiseResult, ReferenceArtifact, resource_kind};
use crate::format::{render_general, render_plain_percent};
use crate::numerics::{FieldComparison, compare_fields, thresholds, validate_threshold};
use crate::pairing::{ArtifactPair, discover_field_files, make_pairs};
use crate::parsing::FieldResource;
use crate::summary::{COMPARISON_ERROR, ComparisonResult, Summary};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

pub const MAX_NORMALIZED_DIFF: &str = "Max normalized diff";
pub const BIT_REPRODUCIBLE: &str = "Bit-reproducible";
pub const COMMON_FIELDS_DIFFERENCES: &str = "Common fields differences";
pub const NEW_FIELDS: &str = "New fields";
pub const LOST_FIELDS: &str = "Lost fields";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldsOptions {
    #[serde(default)]
    filenames: Vec<String>,
    #[serde(default = "default_normalized_threshold")]
    normalized_validation_threshold: f64,
    #[serde(default)]
    ignore_meta: bool,
    #[serde(default)]
    ignore_orphan_fields: bool,
    #[serde(default = "default_true")]
    hide_bit_repro_fields: bool,
    #[serde(default)]
    compute_stats: bool,
}

fn default_normalized_threshold() -> f64 {
    thresholds::NORMALIZED_FIELDS_DIFF
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq)]
struct ParsedFile {
    fields: Vec<String>,
    /// `(min, avg, max)` per field; `None` for a fully masked field.
    stats: Option<BTreeMap<String, Option<(f64, f64, f64)>>>,
}

#[derive(Debug)]
pub struct FieldsInFileExpert {
    settings: ExpertSettings,
    filenames: Vec<String>,
    threshold: f64,
    ignore_meta: bool,
    ignore_orphan_fields: bool,
    hide_bit_repro_fields: bool,
    compute_stats: bool,
    files: Option<BTreeMap<String, ParsedFile>>,
}

/// Outcome of comparing one local container with its reference.
#[derive(Debug, Clone, PartialEq)]
struct FileOutcome {
    validated: bool,
    bit_reproducible: bool,
    max_normalized_diff: f64,
    means: String,
    report: ComparisonResult,
}

impl FieldsInFileExpert {
    pub fn from_options(
        settings: ExpertSettings,
        options: &Map<String, Value>,
    ) -> ExpertiseResult<Self> {
        let options: FieldsOptions = parse_options(&settings.kind, options)?;
        Ok(Self {
            settings,
            filenames: options.filenames,
            threshold: validate_threshold(
                "normalized_validation_threshold",
                options.normalized_validation_threshold,
            )?,
            ignore_meta: options.ignore_meta,
            ignore_orphan_fields: options.ignore_orphan_fields,
            hide_bit_repro_fields: options.hide_bit_repro_fields,
            compute_stats: options.compute_stats,
            files: None,
        })
    }

    fn files_to_parse(&self, context: &ExpertContext<'_>) -> ExpertiseResult<Vec<String>> {
        if self.filenames.is_empty() {
            return discover_field_files(context.workspace);
        }
        let mut files = Vec::new();
        for name in &self.filenames {
            if context.workspace.contains(name) {
                files.push(name.clone());
                continue;
            }
            let message = format!("output file '{}' not found", name);
            if self.settings.fatal_exceptions {
                return Err(ExpertiseError::artifact_not_found("ARTIFACT.OUTPUT_FILE", message));
            }
            warn!(expert = %self.settings.label, "{} => ignored in comparison", message);
        }
        Ok(files)
    }

    fn parse_file(&self, resource: &dyn FieldResource) -> ExpertiseResult<ParsedFile> {
        let fields = resource.list_fields();
        let stats = if self.compute_stats {
            let mut stats = BTreeMap::new();
            for name in &fields {
                stats.insert(name.clone(), resource.read_field(name)?.stats());
            }
            Some(stats)
        } else {
            None
        };
        Ok(ParsedFile { fields, stats })
    }

    fn means(&self) -> String {
        let mut means = format!(
            "All fields have identical shape/mask than reference, and normalized errors lower than {}",
            render_general(self.threshold, false)
        );
        if !self.ignore_orphan_fields {
            means.push_str(", and no field is orphan on one or the other side.");
        }
        means
    }

    fn compare_files(
        &self,
        pair: &ArtifactPair,
        context: &ExpertContext<'_>,
    ) -> ExpertiseResult<FileOutcome> {
        let test = context
            .decoders
            .fields
            .open(&context.workspace.path(&pair.local))?;
        let reference = context
            .decoders
            .fields
            .open(&context.workspace.path(&pair.reference))?;

        let test_fields: BTreeSet<String> = test.list_fields().into_iter().collect();
        let reference_fields: BTreeSet<String> = reference.list_fields().into_iter().collect();
        let new_fields: Vec<&String> = test_fields.difference(&reference_fields).collect();
        let lost_fields: Vec<&String> = reference_fields.difference(&test_fields).collect();

        let mut check_metadata = !self.ignore_meta;
        let mut validated = true;
        let mut bit_reproducible = true;
        let mut max_normalized_diff: f64 = 0.0;
        let mut differences = Map::new();

        for name in test_fields.intersection(&reference_fields) {
            match compare_field(test.as_ref(), reference.as_ref(), name, self.threshold, check_metadata) {
                Ok(comparison) => {
                    if comparison.metadata_checked && test.shares_metadata_across_fields() {
                        check_metadata = false;
                    }
                    validated &= comparison.validated;
                    bit_reproducible &= comparison.is_bit_reproducible();
                    let field_max = comparison.max_abs_normalized_diff();
                    max_normalized_diff = if max_normalized_diff.is_nan() || field_max.is_nan() {
                        f64::NAN
                    } else {
                        max_normalized_diff.max(field_max)
                    };
                    let hidden = self.hide_bit_repro_fields
                        && comparison.validated
                        && comparison.is_bit_reproducible();
                    if !hidden {
                        differences.insert(name.clone(), Value::Object(field_status(&comparison)));
                    }
                }
                Err(error) if !self.settings.fatal_exceptions => {
                    warn!(field = %name, code = error.code(), "{}", error.message());
                    validated = false;
                    bit_reproducible = false;
                    let mut status = Map::new();
                    status.insert(COMPARISON_ERROR.to_string(), Value::from(error.message()));
                    differences.insert(name.clone(), Value::Object(status));
                }
                Err(error) => return Err(error),
            }
        }

        if !self.ignore_orphan_fields && !(new_fields.is_empty() && lost_fields.is_empty()) {
            validated = false;
        }
        let orphans = |fields: &[&String]| {
            if fields.is_empty() {
                Value::Null
            } else {
                Value::from(fields.iter().map(|name| name.as_str()).collect::<Vec<_>>())
            }
        };

        let means = self.means();
        let report = ComparisonResult::validated(
            validated,
            means.clone(),
            MAX_NORMALIZED_DIFF,
            render_plain_percent(max_normalized_diff),
        )
        .with(BIT_REPRODUCIBLE, bit_reproducible)
        .with(COMMON_FIELDS_DIFFERENCES, differences)
        .with(NEW_FIELDS, orphans(&new_fields))
        .with(LOST_FIELDS, orphans(&lost_fields));

        Ok(FileOutcome {
            validated,
            bit_reproducible,
            max_normalized_diff,
            means,
            report,
        })
    }
}

fn compare_field(
    test: &dyn FieldResource,
    reference: &dyn FieldResource,
    name: &str,
    threshold: f64,
    check_metadata: bool,
) -> ExpertiseResult<FieldComparison> {
    let test_field = test.read_field(name)?;
    let reference_field = reference.read_field(name)?;
    compare_fields(name, &test_field, &reference_field, threshold, check_metadata)
}

fn field_status(comparison: &FieldComparison) -> Map<String, Value> {
    let mut status = Map::new();
    if comparison.metadata_checked {
        status.insert(
            "Validity diff".to_string(),
            comparison.validity_diff.clone().unwrap_or(Value::Null),
        );
        status.insert(
            "Geometry diff".to_string(),
            comparison.geometry_diff.clone().unwrap_or(Value::Null),
        );
    }
    status.insert("Data bit-repro".to_string(), Value::from(comparison.data_bit_repro));
    if let Some(data_diff) = &comparison.data_diff {
        status.insert("Data diff".to_string(), data_diff.to_value());
    }
    if comparison.masks_differ {
        status.insert("Mask diff".to_string(), Value::from(true));
    }
    status.insert("Validated".to_string(), Value::from(comparison.validated));
    status
}

fn stats_value(stats: &Option<(f64, f64, f64)>) -> Value {
    match stats {
        Some((min, avg, max)) => {
            let mut map = Map::new();
            map.insert("min".to_string(), Value::from(*min));
            map.insert("avg".to_string(), Value::from(*avg));
            map.insert("max".to_string(), Value::from(*max));
            Value::Object(map)
        }
        None => Value::Null,
    }
}

impl Sealed for FieldsInFileExpert {}

impl Expert for FieldsInFileExpert {
    fn settings(&self) -> &ExpertSettings {
        &self.settings
    }

    fn variant(&self) -> ExpertVariant {
        ExpertVariant::FieldsInFile
    }

    fn is_parsed(&self) -> bool {
        self.files.is_some()
    }

    fn parse(&mut self, context: &ExpertContext<'_>) -> ExpertiseResult<()> {
        let names = self.files_to_parse(context)?;
        if names.is_empty() {
            return Err(ExpertiseError::parse(
                "PARSE.FIELDS_NO_FILES",
                format!(
                    "no field container to parse in '{}'",
                    context.workspace.root().display()
                ),
            ));
        }
        let mut files = BTreeMap::new();
        for name in names {
            let resource = context.decoders.fields.open(&context.workspace.path(&name))?;
            files.insert(name, self.parse_file(resource.as_ref())?);
        }
        self.files = Some(files);
        Ok(())
    }

    fn summarize(&self) -> ExpertiseResult<Summary> {
        let files = self
            .files
            .as_ref()
            .ok_or_else(|| not_parsed(&self.settings))?;
        let mut listing = Map::new();
        for (name, parsed) in files {
            let mut entry = Map::new();
            entry.insert("Number of fields".to_string(), Value::from(parsed.fields.len()));
            if let Some(stats) = &parsed.stats {
                let stats: Map<String, Value> = stats
                    .iter()
                    .map(|(field, stats)| (field.clone(), stats_value(stats)))
                    .collect();
                entry.insert("Stats".to_string(), Value::Object(stats));
            }
            listing.insert(name.clone(), Value::Object(entry));
        }
        Ok(Summary::new()
            .with("Number of files", files.len())
            .with("Files", listing))
    }

    fn compare(
        &self,
        references: &[ReferenceArtifact],
        context: &ExpertContext<'_>,
    ) -> ExpertiseResult<ComparisonResult> {
        if !self.is_parsed() {
            return Err(not_parsed(&self.settings));
        }
        let pairs = make_pairs(
            &self.filenames,
            references,
            context.workspace,
            self.settings.fatal_exceptions,
        )?;
        if pairs.is_empty() {
            let kinds = resource_kind::FIELD_CONTAINERS.join("|");
            return missing_reference(
                &self.settings,
                &kinds,
                format!("no kind={} reference resources provided", kinds),
            );
        }

        let mut outcomes = Vec::with_capacity(pairs.len());
        for pair in &pairs {
            info!(expert = %self.settings.label, test = %pair.local, reference = %pair.reference, "comparing fields");
            outcomes.push((pair.local.as_str(), self.compare_files(pair, context)?));
        }

        let validated = outcomes.iter().all(|(_, outcome)| outcome.validated);
        let bit_reproducible = outcomes.iter().all(|(_, outcome)| outcome.bit_reproducible);
        let max_normalized_diff = outcomes
            .iter()
            .map(|(_, outcome)| outcome.max_normalized_diff)
            .fold(0.0, f64::max);
        let means = outcomes
            .first()
            .map(|(_, outcome)| outcome.means.clone())
            .unwrap_or_else(|| self.means());

        let mut result = ComparisonResult::validated(
            validated,
            means,
            MAX_NORMALIZED_DIFF,
            render_plain_percent(max_normalized_diff),
        )
        .with(BIT_REPRODUCIBLE, bit_reproducible);
        for (local, outcome) in outcomes {
            result.insert(local, outcome.report);
        }
        Ok(result)
    }
}
