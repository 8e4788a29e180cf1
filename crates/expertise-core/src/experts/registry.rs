use super::fields::FieldsInFileExpert;
use super::norms::NormsExpert;
use super::oops::{AdjointExpert, ScalarExpert, TlStatisticsExpert};
use super::profiling::{BatorProfileExpert, DrHookExpert, RssExpert};
use super::{Expert, ExpertSettings};
use crate::domain::{ExpertiseError, ExpertiseResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExpertVariant {
    Jo,
    Adjoint,
    TlStatistics,
    StatesDiff,
    Variances,
    Norms,
    FieldsInFile,
    DrHook,
    Rss,
    BatorProfile,
}

impl ExpertVariant {
    pub const ALL: [ExpertVariant; 10] = [
        ExpertVariant::Jo,
        ExpertVariant::Adjoint,
        ExpertVariant::TlStatistics,
        ExpertVariant::StatesDiff,
        ExpertVariant::Variances,
        ExpertVariant::Norms,
        ExpertVariant::FieldsInFile,
        ExpertVariant::DrHook,
        ExpertVariant::Rss,
        ExpertVariant::BatorProfile,
    ];

    /// Kind strings accepted for this variant.
    pub const fn kinds(self) -> &'static [&'static str] {
        match self {
            Self::Jo => &[
                "oops:op_obs_file/test_hop_with_jo",
                "oops:op_obs_model/test_hop_with_jo",
            ],
            Self::Adjoint => &[
                "oops:op_obs_file/test_adjoint",
                "oops:op_obs_model/test_adjoint",
            ],
            Self::TlStatistics => &["oops:op_obs_file/test_tl", "oops:op_obs_model/test_tl"],
            Self::StatesDiff => &[
                "oops:mix/test_model_direct",
                "oops:mix/test_external_dfi",
                "oops:mix/test_fields_change_resolution",
            ],
            Self::Variances => &["oops:ensemble/read"],
            Self::Norms => &["norms"],
            Self::FieldsInFile => &["fields_in_file"],
            Self::DrHook => &["drHookMax", "drHookAve"],
            Self::Rss => &["rss"],
            Self::BatorProfile => &["bator_profile"],
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Jo => "Jo",
            Self::Adjoint => "AdjointTest",
            Self::TlStatistics => "TlStatistics",
            Self::StatesDiff => "StatesDiff",
            Self::Variances => "Variances",
            Self::Norms => "Norms",
            Self::FieldsInFile => "FieldsInFile",
            Self::DrHook => "DrHook",
            Self::Rss => "Rss",
            Self::BatorProfile => "BatorProfile",
        }
    }

    /// Profiling variants are informational and stay out of the verdict.
    pub const fn default_side_expert(self) -> bool {
        matches!(self, Self::DrHook | Self::Rss | Self::BatorProfile)
    }

    pub fn from_kind(kind: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|variant| variant.kinds().contains(&kind))
    }
}

/// One expert entry of a task configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExpertSpec {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub lead: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal_exceptions: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_expert: Option<bool>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

impl ExpertSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            label: None,
            lead: false,
            fatal_exceptions: None,
            side_expert: None,
            options: Map::new(),
        }
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    pub fn resolved_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.kind)
    }
}

/// Every accepted kind with the variant it selects, in variant order.
pub fn registered_kinds() -> Vec<(&'static str, ExpertVariant)> {
    ExpertVariant::ALL
        .into_iter()
        .flat_map(|variant| variant.kinds().iter().map(move |kind| (*kind, variant)))
        .collect()
}

/// Builds an unparsed expert; `task_fatal_exceptions` applies unless the
/// spec overrides it.
pub fn build_expert(
    spec: &ExpertSpec,
    task_fatal_exceptions: bool,
) -> ExpertiseResult<Box<dyn Expert>> {
    let variant = ExpertVariant::from_kind(&spec.kind).ok_or_else(|| {
        ExpertiseError::configuration(
            "CONFIG.UNKNOWN_KIND",
            format!("no expert registered for kind '{}'", spec.kind),
        )
    })?;
    let settings = ExpertSettings {
        kind: spec.kind.clone(),
        label: spec.resolved_label().to_string(),
        fatal_exceptions: spec.fatal_exceptions.unwrap_or(task_fatal_exceptions),
        side_expert: spec
            .side_expert
            .unwrap_or_else(|| variant.default_side_expert()),
        lead: spec.lead,
    };

    let expert: Box<dyn Expert> = match variant {
        ExpertVariant::Jo | ExpertVariant::StatesDiff | ExpertVariant::Variances => {
            Box::new(ScalarExpert::from_options(variant, settings, &spec.options)?)
        }
        ExpertVariant::Adjoint => Box::new(AdjointExpert::from_options(settings, &spec.options)?),
        ExpertVariant::TlStatistics => {
            Box::new(TlStatisticsExpert::from_options(settings, &spec.options)?)
        }
        ExpertVariant::Norms => Box::new(NormsExpert::from_options(settings, &spec.options)?),
        ExpertVariant::FieldsInFile => {
            Box::new(FieldsInFileExpert::from_options(settings, &spec.options)?)
        }
        ExpertVariant::DrHook => Box::new(DrHookExpert::from_options(settings, &spec.options)?),
        ExpertVariant::Rss => Box::new(RssExpert::from_options(settings, &spec.options)?),
        ExpertVariant::BatorProfile => {
            Box::new(BatorProfileExpert::from_options(settings, &spec.options)?)
        }
    };
    Ok(expert)
}
