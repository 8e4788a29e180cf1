//! Spectral and gridpoint norms printed in the run listing.

use super::{
    Expert, ExpertContext, ExpertSettings, ExpertVariant, Sealed, missing_reference, not_parsed,
    parse_options, reference_summary,
};
use crate::domain::{ExpertiseError, ExpertiseResult, ReferenceArtifact, resource_kind};
use crate::numerics::{NormSet, NormStep, compare_normsets, thresholds};
use crate::summary::{ComparisonResult, Summary};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

pub const NUMBER_OF_STEPS: &str = "Number of steps";
pub const MAXIMUM_DIFFERENT_DIGITS: &str = "Maximum different digits";
pub const BIT_REPRODUCIBLE: &str = "Bit-reproducible";
pub const NORMS_COMPARED: &str = "_Norms Compared (all)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormsType {
    Spnorms,
    Gpnorms,
    #[default]
    Both,
}

/// Which steps end up in the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormsMode {
    All,
    Last,
    #[default]
    LastSpectral,
}

impl NormsMode {
    fn key(self) -> &'static str {
        match self {
            Self::All => "_Norms at each step",
            Self::Last => "Last step norms",
            Self::LastSpectral => "Last step with spectral norms",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NormsOptions {
    #[serde(default = "default_output")]
    output: String,
    #[serde(default = "default_digits")]
    digits4validation: u32,
    #[serde(default)]
    normstype: NormsType,
    #[serde(default)]
    mode: NormsMode,
}

fn default_output() -> String {
    "NODE.001_01".to_string()
}

fn default_digits() -> u32 {
    thresholds::NORMSDIGITS_BITREPRO
}

#[derive(Debug)]
pub struct NormsExpert {
    settings: ExpertSettings,
    output: String,
    digits_threshold: u32,
    normstype: NormsType,
    mode: NormsMode,
    normset: Option<NormSet>,
}

impl NormsExpert {
    pub fn from_options(
        settings: ExpertSettings,
        options: &Map<String, Value>,
    ) -> ExpertiseResult<Self> {
        let options: NormsOptions = parse_options(&settings.kind, options)?;
        if options.normstype == NormsType::Gpnorms && options.mode == NormsMode::LastSpectral {
            return Err(ExpertiseError::configuration(
                "CONFIG.EXPERT_OPTIONS",
                format!(
                    "expert '{}': mode 'last_spectral' selects nothing with normstype 'gpnorms'",
                    settings.label
                ),
            ));
        }
        Ok(Self {
            settings,
            output: options.output,
            digits_threshold: options.digits4validation,
            normstype: options.normstype,
            mode: options.mode,
            normset: None,
        })
    }

    fn summary_key(&self) -> String {
        match self.normstype {
            NormsType::Both => self.mode.key().to_string(),
            NormsType::Spnorms => format!("{} (spnorms only)", self.mode.key()),
            NormsType::Gpnorms => format!("{} (gpnorms only)", self.mode.key()),
        }
    }

    /// Steps written to the summary, restricted to the configured norms type.
    fn selected_steps(&self, normset: &NormSet) -> Vec<NormStep> {
        let typed = normset.steps.iter().filter_map(|step| match self.normstype {
            NormsType::Both => Some(step.clone()),
            NormsType::Spnorms => step.has_spectral().then(|| NormStep {
                gpnorms: Default::default(),
                ..step.clone()
            }),
            NormsType::Gpnorms => step.has_gridpoint().then(|| NormStep {
                spnorms: Default::default(),
                ..step.clone()
            }),
        });
        match self.mode {
            NormsMode::All => typed.collect(),
            NormsMode::Last => typed.last().into_iter().collect(),
            NormsMode::LastSpectral => typed
                .filter(NormStep::has_spectral)
                .last()
                .into_iter()
                .collect(),
        }
    }

    fn compare_sets(&self, test: &NormSet, reference: &NormSet) -> ExpertiseResult<ComparisonResult> {
        let comparison = compare_normsets(test, reference)?;
        let validated = comparison.worst_digits <= self.digits_threshold;
        let mut result = ComparisonResult::validated(
            validated,
            format!(
                "Maximum number of different digits in norms is lower or equal to {}",
                self.digits_threshold
            ),
            MAXIMUM_DIFFERENT_DIGITS,
            comparison.worst_digits,
        )
        .with(BIT_REPRODUCIBLE, comparison.is_bit_reproducible());
        if !validated {
            result.insert(NORMS_COMPARED, comparison.report);
        }
        Ok(result)
    }

    fn steps_from_summary(&self, summary: &Summary) -> ExpertiseResult<NormSet> {
        let key = self.summary_key();
        let value = summary.get(&key).cloned().ok_or_else(|| {
            ExpertiseError::comparison(
                "COMPARISON.NORMS_SUMMARY",
                format!("summary has no '{}' entry", key),
            )
        })?;
        let steps = match self.mode {
            NormsMode::All => serde_json::from_value::<Vec<NormStep>>(value),
            NormsMode::Last | NormsMode::LastSpectral => {
                serde_json::from_value::<NormStep>(value).map(|step| vec![step])
            }
        }
        .map_err(|source| {
            ExpertiseError::comparison(
                "COMPARISON.NORMS_SUMMARY",
                format!("'{}' does not hold norms: {}", key, source),
            )
        })?;
        Ok(NormSet::new(steps))
    }
}

impl Sealed for NormsExpert {}

impl Expert for NormsExpert {
    fn settings(&self) -> &ExpertSettings {
        &self.settings
    }

    fn variant(&self) -> ExpertVariant {
        ExpertVariant::Norms
    }

    fn is_parsed(&self) -> bool {
        self.normset.is_some()
    }

    fn parse(&mut self, context: &ExpertContext<'_>) -> ExpertiseResult<()> {
        let path = context
            .workspace
            .require(&self.output, "ARTIFACT.NORMS_LISTING")?;
        let normset = context.decoders.norms.decode(&path)?;
        if self.selected_steps(&normset).is_empty() {
            return Err(ExpertiseError::parse(
                "PARSE.NORMS_SELECTION",
                format!(
                    "no step of '{}' matches '{}'",
                    self.output,
                    self.summary_key()
                ),
            ));
        }
        self.normset = Some(normset);
        Ok(())
    }

    fn summarize(&self) -> ExpertiseResult<Summary> {
        let normset = self
            .normset
            .as_ref()
            .ok_or_else(|| not_parsed(&self.settings))?;
        let selected = self.selected_steps(normset);
        let rendered = match self.mode {
            NormsMode::All => serde_json::to_value(&selected),
            NormsMode::Last | NormsMode::LastSpectral => serde_json::to_value(selected.last()),
        }
        .map_err(|source| {
            ExpertiseError::internal(
                "INTERNAL.SUMMARY_VALUE",
                format!("failed to render norms: {}", source),
            )
        })?;
        Ok(Summary::new()
            .with(NUMBER_OF_STEPS, normset.len())
            .with(self.summary_key(), rendered))
    }

    /// A reference listing wins over the reference summary, which may hold
    /// only a subset of the norms.
    fn compare(
        &self,
        references: &[ReferenceArtifact],
        context: &ExpertContext<'_>,
    ) -> ExpertiseResult<ComparisonResult> {
        let normset = self
            .normset
            .as_ref()
            .ok_or_else(|| not_parsed(&self.settings))?;

        if let Some(listing) = references
            .iter()
            .find(|reference| reference.has_kind(resource_kind::PLISTING))
        {
            info!(expert = %self.settings.label, reference = %listing.name, "comparing norms to reference listing");
            let path = context
                .workspace
                .require(&listing.name, "ARTIFACT.REFERENCE_LISTING")?;
            let reference = context.decoders.norms.decode(&path)?;
            return self.compare_sets(normset, &reference);
        }

        match reference_summary(&self.settings, references, context.workspace)? {
            Some(reference) => self.compare_summaries(&self.summarize()?, &reference),
            None => missing_reference(
                &self.settings,
                "plisting|taskinfo",
                format!("no reference norms for expert '{}'", self.settings.label),
            ),
        }
    }

    fn compare_summaries(
        &self,
        test: &Summary,
        reference: &Summary,
    ) -> ExpertiseResult<ComparisonResult> {
        self.compare_sets(
            &self.steps_from_summary(test)?,
            &self.steps_from_summary(reference)?,
        )
    }
}
