//! Informational experts over profiling artifacts: DrHook, RSS and Bator.
//!
//! None of these carries a verdict; each surfaces a relative difference as
//! its headline metric.

use super::{
    Expert, ExpertContext, ExpertSettings, ExpertVariant, Sealed, UNDEFINED_RELATIVE, not_parsed,
    parse_options, render_relative,
};
use crate::domain::{ExpertiseError, ExpertiseResult};
use crate::format::{
    DEFAULT_PERCENT_PRECISION, parse_memory_gb, parse_percent, render_memory_gb, render_percent,
};
use crate::numerics::RelativeError;
use crate::parsing::profiling::{
    BatorSynthesis, DrHookHeader, RoutineProfile, discover_drhook_profiles, discover_task_outputs,
    merge_drhook_profiles, parse_drhook_header, parse_profile_rows, read_bator_synthesis,
    read_rss_kilobytes,
};
use crate::summary::{ComparisonResult, Summary, diff_tree, markers};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Routines faster than this in the reference are left out of the extremes.
const SIGNIFICANT_ROUTINE_TIME: f64 = 0.1;

fn render_relative_default(relative: RelativeError) -> String {
    render_relative(relative, DEFAULT_PERCENT_PRECISION)
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DrHookOptions {
    #[serde(default)]
    merge_tool_max: Option<PathBuf>,
    #[serde(default)]
    merge_tool_ave: Option<PathBuf>,
}

/// How per-process profiles are merged: routine wall-times by their maximum
/// or by their average over processes. Selected by the expert kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrHookMerge {
    WalltimeMax,
    WalltimeAve,
}

impl DrHookMerge {
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "drHookMax" => Some(Self::WalltimeMax),
            "drHookAve" => Some(Self::WalltimeAve),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WalltimeMax => "walltime max",
            Self::WalltimeAve => "walltime average",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct DrHookProfile {
    header: DrHookHeader,
    lines: Vec<String>,
}

#[derive(Debug)]
pub struct DrHookExpert {
    settings: ExpertSettings,
    merge: DrHookMerge,
    merge_tool: Option<PathBuf>,
    profile: Option<DrHookProfile>,
}

impl DrHookExpert {
    pub fn from_options(
        settings: ExpertSettings,
        options: &Map<String, Value>,
    ) -> ExpertiseResult<Self> {
        let options: DrHookOptions = parse_options(&settings.kind, options)?;
        let merge = DrHookMerge::from_kind(&settings.kind).ok_or_else(|| {
            ExpertiseError::configuration(
                "CONFIG.DRHOOK_MERGE",
                format!("no DrHook merge mode for kind '{}'", settings.kind),
            )
        })?;
        let merge_tool = match merge {
            DrHookMerge::WalltimeMax => options.merge_tool_max,
            DrHookMerge::WalltimeAve => options.merge_tool_ave,
        };
        Ok(Self {
            settings,
            merge,
            merge_tool,
            profile: None,
        })
    }

    pub fn merge(&self) -> DrHookMerge {
        self.merge
    }

    /// External tool used for the selected merge mode, if configured.
    pub fn merge_tool(&self) -> Option<&Path> {
        self.merge_tool.as_deref()
    }
}

/// Largest change in one direction, with the routine it was seen on.
#[derive(Debug, Clone, PartialEq)]
struct Extreme {
    routine: Option<String>,
    value: f64,
}

impl Extreme {
    fn none() -> Self {
        Self {
            routine: None,
            value: 0.0,
        }
    }

    fn raise(&mut self, routine: &str, value: f64) {
        if value.abs() >= self.value.abs() {
            self.routine = Some(routine.to_string());
            self.value = value;
        }
    }

    fn routine_value(&self) -> Value {
        Value::from(self.routine.as_deref().unwrap_or("None"))
    }
}

/// Per-routine extremes of the `Max.time` change, over routines present in
/// both profiles.
fn compare_routines(
    test: &BTreeMap<String, RoutineProfile>,
    reference: &BTreeMap<String, RoutineProfile>,
) -> Map<String, Value> {
    let mut slower = Extreme::none();
    let mut faster = Extreme::none();
    let mut relatively_slower = Extreme::none();
    let mut relatively_faster = Extreme::none();

    for (routine, reference_profile) in reference {
        let Some(test_profile) = test.get(routine) else {
            continue;
        };
        if reference_profile.max_time <= SIGNIFICANT_ROUTINE_TIME {
            continue;
        }
        let diff = test_profile.max_time - reference_profile.max_time;
        let relative = diff / reference_profile.max_time;
        if diff > 0.0 {
            slower.raise(routine, diff);
            relatively_slower.raise(routine, relative);
        } else if diff < 0.0 {
            faster.raise(routine, diff);
            relatively_faster.raise(routine, relative);
        }
    }

    let mut report = Map::new();
    report.insert("Highest slow-down - routine".to_string(), slower.routine_value());
    report.insert("Highest slow-down - (s)".to_string(), Value::from(slower.value));
    report.insert("Highest acceleration - routine".to_string(), faster.routine_value());
    report.insert("Highest acceleration - (s)".to_string(), Value::from(faster.value));
    report.insert(
        "Highest relative slow-down - routine".to_string(),
        relatively_slower.routine_value(),
    );
    report.insert(
        "Highest relative slow-down - %".to_string(),
        Value::from(render_percent(relatively_slower.value, DEFAULT_PERCENT_PRECISION)),
    );
    report.insert(
        "Highest relative acceleration - routine".to_string(),
        relatively_faster.routine_value(),
    );
    report.insert(
        "Highest relative acceleration - %".to_string(),
        Value::from(render_percent(relatively_faster.value, DEFAULT_PERCENT_PRECISION)),
    );
    report
}

fn profile_lines(summary: &Summary) -> Option<Vec<String>> {
    summary.get("DrHookProfile")?.as_array().map(|lines| {
        lines
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}

impl Sealed for DrHookExpert {}

impl Expert for DrHookExpert {
    fn settings(&self) -> &ExpertSettings {
        &self.settings
    }

    fn variant(&self) -> ExpertVariant {
        ExpertVariant::DrHook
    }

    fn is_parsed(&self) -> bool {
        self.profile.is_some()
    }

    fn parse(&mut self, context: &ExpertContext<'_>) -> ExpertiseResult<()> {
        let files = discover_drhook_profiles(context.workspace)?;
        let merged = merge_drhook_profiles(context.workspace, &files, self.merge_tool.as_deref())?;
        let header = parse_drhook_header(&merged)?;
        parse_profile_rows(merged.lines())?;
        debug!(
            expert = %self.settings.label,
            merge = self.merge.as_str(),
            profiles = files.len(),
            "parsed DrHook profile"
        );
        self.profile = Some(DrHookProfile {
            header,
            lines: merged.lines().to_vec(),
        });
        Ok(())
    }

    fn summarize(&self) -> ExpertiseResult<Summary> {
        let profile = self
            .profile
            .as_ref()
            .ok_or_else(|| not_parsed(&self.settings))?;
        Ok(Summary::new()
            .with("Elapse time", profile.header.elapse_time)
            .with("MPI tasks", profile.header.mpi_tasks)
            .with("OpenMP threads", profile.header.openmp_threads)
            .with("Merge", self.merge.as_str())
            .with("DrHookProfile", profile.lines.clone()))
    }

    fn compare_summaries(
        &self,
        test: &Summary,
        reference: &Summary,
    ) -> ExpertiseResult<ComparisonResult> {
        let test_elapse = test.require_f64("Elapse time")?;
        let reference_elapse = reference.require_f64("Elapse time")?;
        let mut result = ComparisonResult::informational(
            "Relative diff in Elapse time",
            render_relative_default(RelativeError::between(test_elapse, reference_elapse)),
        )
        .with("Diff in Elapse time", test_elapse - reference_elapse);

        let routines = profile_lines(test)
            .zip(profile_lines(reference))
            .and_then(|(test_lines, reference_lines)| {
                Some((
                    parse_profile_rows(&test_lines).ok()?,
                    parse_profile_rows(&reference_lines).ok()?,
                ))
            });
        if let Some((test_routines, reference_routines)) = routines {
            for (key, value) in compare_routines(&test_routines, &reference_routines) {
                result.insert(key, value);
            }
        }
        Ok(result)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RssOptions {
    #[serde(default)]
    ntasks_per_node: Option<usize>,
}

#[derive(Debug)]
pub struct RssExpert {
    settings: ExpertSettings,
    ntasks_per_node: Option<usize>,
    /// Kilobytes per task, in task order.
    tasks_rss: Option<Vec<u64>>,
}

impl RssExpert {
    pub fn from_options(
        settings: ExpertSettings,
        options: &Map<String, Value>,
    ) -> ExpertiseResult<Self> {
        let options: RssOptions = parse_options(&settings.kind, options)?;
        if options.ntasks_per_node == Some(0) {
            return Err(ExpertiseError::configuration(
                "CONFIG.EXPERT_OPTIONS",
                "ntasks_per_node must be positive",
            ));
        }
        Ok(Self {
            settings,
            ntasks_per_node: options.ntasks_per_node,
            tasks_rss: None,
        })
    }
}

fn memory_kilobytes(summary: &Summary, key: &str) -> ExpertiseResult<f64> {
    summary
        .get_str(key)
        .and_then(parse_memory_gb)
        .ok_or_else(|| {
            ExpertiseError::comparison(
                "COMPARISON.RSS_SUMMARY",
                format!("summary key '{}' is not a memory size", key),
            )
        })
}

impl Sealed for RssExpert {}

impl Expert for RssExpert {
    fn settings(&self) -> &ExpertSettings {
        &self.settings
    }

    fn variant(&self) -> ExpertVariant {
        ExpertVariant::Rss
    }

    fn is_parsed(&self) -> bool {
        self.tasks_rss.is_some()
    }

    fn parse(&mut self, context: &ExpertContext<'_>) -> ExpertiseResult<()> {
        let outputs = discover_task_outputs(context.workspace)?;
        let tasks_rss = outputs
            .iter()
            .map(|name| read_rss_kilobytes(context.workspace, name))
            .collect::<ExpertiseResult<Vec<_>>>()?;
        self.tasks_rss = Some(tasks_rss);
        Ok(())
    }

    fn summarize(&self) -> ExpertiseResult<Summary> {
        let tasks_rss = self
            .tasks_rss
            .as_ref()
            .ok_or_else(|| not_parsed(&self.settings))?;
        let max = tasks_rss.iter().copied().max().unwrap_or(0);
        let min = tasks_rss.iter().copied().min().unwrap_or(0);
        let total: u64 = tasks_rss.iter().sum();
        let imbalance = if max == 0 {
            0.0
        } else {
            (max - min) as f64 / max as f64 * 100.0
        };

        let mut summary = Summary::new()
            .with("RSSmax", render_memory_gb(max as f64, false))
            .with("RSStotal", render_memory_gb(total as f64, false))
            .with("imbalance", format!("{:.1}%", imbalance))
            .with("MPI tasks", tasks_rss.len());
        if let Some(per_node) = self.ntasks_per_node {
            let node_max = tasks_rss
                .chunks(per_node)
                .map(|node| node.iter().sum::<u64>())
                .max()
                .unwrap_or(0);
            summary.insert("NodeRSSmax", render_memory_gb(node_max as f64, false));
            summary.insert("Tasks per node", per_node);
        }
        Ok(summary)
    }

    fn compare_summaries(
        &self,
        test: &Summary,
        reference: &Summary,
    ) -> ExpertiseResult<ComparisonResult> {
        let test_max = memory_kilobytes(test, "RSSmax")?;
        let reference_max = memory_kilobytes(reference, "RSSmax")?;
        let test_total = memory_kilobytes(test, "RSStotal")?;
        let reference_total = memory_kilobytes(reference, "RSStotal")?;
        let imbalance = |summary: &Summary| {
            summary
                .get_str("imbalance")
                .and_then(parse_percent)
                .ok_or_else(|| {
                    ExpertiseError::comparison(
                        "COMPARISON.RSS_SUMMARY",
                        "summary key 'imbalance' is not a percentage",
                    )
                })
        };
        let imbalance_evolution = imbalance(test)? - imbalance(reference)?;

        Ok(ComparisonResult::informational(
            "Relative RSStotal diff",
            render_relative_default(RelativeError::between(test_total, reference_total)),
        )
        .with("Absolute RSSmax diff", render_memory_gb(test_max - reference_max, true))
        .with(
            "Relative RSSmax diff",
            render_relative_default(RelativeError::between(test_max, reference_max)),
        )
        .with(
            "Absolute RSStotal diff",
            render_memory_gb(test_total - reference_total, true),
        )
        .with(
            "Imbalance evolution",
            render_percent(imbalance_evolution, DEFAULT_PERCENT_PRECISION),
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BatorOptions {
    #[serde(default = "default_synthesis")]
    synthesis: String,
}

fn default_synthesis() -> String {
    "parallel_exec_synthesis.json".to_string()
}

const ELAPSE_PER_OBSTYPE: &str = "Elapse time per obstype";
const MEMORY_PER_OBSTYPE: &str = "Memory per obstype";
const TOTAL_ELAPSE: &str = "Total elapse time";
const TOTAL_MEMORY: &str = "Total memory";

#[derive(Debug)]
pub struct BatorProfileExpert {
    settings: ExpertSettings,
    synthesis: String,
    parsed: Option<BatorSynthesis>,
}

impl BatorProfileExpert {
    pub fn from_options(
        settings: ExpertSettings,
        options: &Map<String, Value>,
    ) -> ExpertiseResult<Self> {
        let options: BatorOptions = parse_options(&settings.kind, options)?;
        Ok(Self {
            settings,
            synthesis: options.synthesis,
            parsed: None,
        })
    }
}

/// Relative difference per reference key, with the largest defined one.
fn relative_per_key(
    test: &Map<String, Value>,
    reference: &Map<String, Value>,
) -> (Map<String, Value>, Option<f64>) {
    let mut relative = Map::new();
    let mut largest: Option<f64> = None;
    for (key, reference_value) in reference {
        let value = match (
            test.get(key).and_then(Value::as_f64),
            reference_value.as_f64(),
        ) {
            (Some(test_value), Some(reference_value)) => {
                match RelativeError::between(test_value, reference_value) {
                    RelativeError::Defined(value) => {
                        largest = Some(largest.map_or(value, |largest| largest.max(value)));
                        Value::from(value)
                    }
                    RelativeError::Undefined => Value::from(UNDEFINED_RELATIVE),
                }
            }
            (None, _) if !test.contains_key(key) => Value::from(markers::MISSING_IN_TEST),
            _ => Value::from(markers::COMPARISON_ERROR),
        };
        relative.insert(key.clone(), value);
    }
    (relative, largest)
}

fn render_largest(largest: Option<f64>) -> String {
    largest
        .map(|value| render_percent(value, DEFAULT_PERCENT_PRECISION))
        .unwrap_or_else(|| UNDEFINED_RELATIVE.to_string())
}

impl Sealed for BatorProfileExpert {}

impl Expert for BatorProfileExpert {
    fn settings(&self) -> &ExpertSettings {
        &self.settings
    }

    fn variant(&self) -> ExpertVariant {
        ExpertVariant::BatorProfile
    }

    fn is_parsed(&self) -> bool {
        self.parsed.is_some()
    }

    fn parse(&mut self, context: &ExpertContext<'_>) -> ExpertiseResult<()> {
        self.parsed = Some(read_bator_synthesis(context.workspace, &self.synthesis)?);
        Ok(())
    }

    fn summarize(&self) -> ExpertiseResult<Summary> {
        let synthesis = self
            .parsed
            .as_ref()
            .ok_or_else(|| not_parsed(&self.settings))?;
        let elapse: Map<String, Value> = synthesis
            .iter()
            .map(|(obstype, profile)| (obstype.clone(), Value::from(profile.time_real)))
            .collect();
        let memory: Map<String, Value> = synthesis
            .iter()
            .map(|(obstype, profile)| (obstype.clone(), Value::from(profile.mem_real)))
            .collect();
        Ok(Summary::new()
            .with(ELAPSE_PER_OBSTYPE, elapse)
            .with(MEMORY_PER_OBSTYPE, memory)
            .with(
                TOTAL_ELAPSE,
                synthesis.values().map(|profile| profile.time_real).sum::<f64>(),
            )
            .with(
                TOTAL_MEMORY,
                synthesis.values().map(|profile| profile.mem_real).sum::<f64>(),
            ))
    }

    fn compare_summaries(
        &self,
        test: &Summary,
        reference: &Summary,
    ) -> ExpertiseResult<ComparisonResult> {
        let fatal = self.settings.fatal_exceptions;
        let test_elapse = test.require_object(ELAPSE_PER_OBSTYPE)?;
        let reference_elapse = reference.require_object(ELAPSE_PER_OBSTYPE)?;
        let test_memory = test.require_object(MEMORY_PER_OBSTYPE)?;
        let reference_memory = reference.require_object(MEMORY_PER_OBSTYPE)?;

        let (relative_elapse, largest_elapse) = relative_per_key(test_elapse, reference_elapse);
        let (relative_memory, largest_memory) = relative_per_key(test_memory, reference_memory);

        let test_total_elapse = test.require_f64(TOTAL_ELAPSE)?;
        let reference_total_elapse = reference.require_f64(TOTAL_ELAPSE)?;
        let test_total_memory = test.require_f64(TOTAL_MEMORY)?;
        let reference_total_memory = reference.require_f64(TOTAL_MEMORY)?;

        Ok(ComparisonResult::informational(
            "Max relative diff in elapse time",
            render_largest(largest_elapse),
        )
        .with(
            "Absolute diff in elapse time per obstype",
            diff_tree(test_elapse, reference_elapse, fatal)?,
        )
        .with(
            "Absolute diff in memory per obstype",
            diff_tree(test_memory, reference_memory, fatal)?,
        )
        .with("Relative diff in elapse time per obstype", relative_elapse)
        .with("Relative diff in memory per obstype", relative_memory)
        .with("Max relative diff in memory", render_largest(largest_memory))
        .with(
            "Absolute diff in total elapse time",
            test_total_elapse - reference_total_elapse,
        )
        .with(
            "Relative diff in total elapse time",
            render_relative_default(RelativeError::between(
                test_total_elapse,
                reference_total_elapse,
            )),
        )
        .with(
            "Absolute diff in total memory",
            test_total_memory - reference_total_memory,
        )
        .with(
            "Relative diff in total memory",
            render_relative_default(RelativeError::between(
                test_total_memory,
                reference_total_memory,
            )),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{DrHookExpert, DrHookMerge};
    use crate::domain::{ExpertiseErrorCategory, Workspace};
    use crate::experts::{Expert, ExpertContext, ExpertSettings, ExpertSpec, build_expert};
    use crate::parsing::Decoders;
    use crate::summary::{MAIN_METRICS, Summary, VALIDATED};
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const PROFILE: &str = "\
Profiling information for program='MASTERODB', proc#1:
  Wall-times over all MPI-tasks (secs) : Min=12.340, Max=15.670, Avg=14.010, StDev=0.850
  Number of MPI-tasks : 4
  Number of OpenMP-threads : 8
  Avg-%   Avg.time   Min.time   Max.time   St.dev  Imbal-%   # of calls : Name of the routine
    12.50%      1.234      1.100      1.400     0.050    21.43%        480 : CPG_DYN
     6.20%      0.610      0.600      0.800     0.005     6.25%         12 : RADLSW
     0.10%      0.010      0.010      0.020     0.001     1.00%          2 : SUPHY
";

    fn parsed(kind: &str, files: &[(&str, &str)]) -> Box<dyn Expert> {
        let temp = TempDir::new().expect("tempdir should be created");
        for (name, content) in files {
            fs::write(temp.path().join(name), content).expect("artifact should be written");
        }
        let workspace = Workspace::open(temp.path()).expect("workspace should open");
        let decoders = Decoders::default();
        let mut expert = build_expert(&ExpertSpec::new(kind), true).expect("expert should build");
        expert
            .parse(&ExpertContext::new(&workspace, &decoders))
            .expect("artifacts should parse");
        expert
    }

    #[test]
    fn drhook_summary_reads_header() {
        let expert = parsed("drHookMax", &[("drhook.prof.1", PROFILE)]);
        let summary = expert.summarize().expect("summary should build");
        assert_eq!(summary.get_f64("Elapse time"), Some(15.67));
        assert_eq!(summary.get("MPI tasks"), Some(&json!(4)));
        assert_eq!(summary.get("OpenMP threads"), Some(&json!(8)));
        assert!(expert.settings().side_expert);
    }

    #[test]
    fn drhook_comparison_is_informational() {
        let expert = parsed("drHookAve", &[("drhook.prof.1", PROFILE)]);
        let test = expert.summarize().expect("summary should build");
        let reference_profile = PROFILE
            .replace("Max=15.670", "Max=14.000")
            .replace("1.100      1.400", "1.100      1.000")
            .replace("0.600      0.800", "0.600      1.600");
        let reference = parsed("drHookAve", &[("drhook.prof.1", &reference_profile)])
            .summarize()
            .expect("summary should build");

        let result = expert
            .compare_summaries(&test, &reference)
            .expect("comparison should succeed");
        assert_eq!(result.get(VALIDATED), None);
        assert_eq!(result.main_metrics(), Some("Relative diff in Elapse time"));
        assert_eq!(result.get("Relative diff in Elapse time"), Some(&json!("+11.93%")));
        assert_eq!(result.get("Highest slow-down - routine"), Some(&json!("CPG_DYN")));
        assert_eq!(result.get("Highest acceleration - routine"), Some(&json!("RADLSW")));
        assert_eq!(result.get("Highest relative acceleration - %"), Some(&json!("-50.00%")));
        assert_eq!(result.get("Highest relative slow-down - %"), Some(&json!("+40.00%")));
    }

    fn drhook_settings(kind: &str) -> ExpertSettings {
        ExpertSettings {
            kind: kind.to_string(),
            label: kind.to_string(),
            fatal_exceptions: true,
            side_expert: true,
            lead: false,
        }
    }

    #[test]
    fn drhook_kind_selects_merge_mode_and_tool() {
        let options = ExpertSpec::new("drHookMax")
            .with_option("merge_tool_max", "/opt/drhook/merge_max")
            .with_option("merge_tool_ave", "/opt/drhook/merge_ave")
            .options;

        let max = DrHookExpert::from_options(drhook_settings("drHookMax"), &options)
            .expect("expert should build");
        assert_eq!(max.merge(), DrHookMerge::WalltimeMax);
        assert_eq!(max.merge_tool(), Some(Path::new("/opt/drhook/merge_max")));

        let ave = DrHookExpert::from_options(drhook_settings("drHookAve"), &options)
            .expect("expert should build");
        assert_eq!(ave.merge(), DrHookMerge::WalltimeAve);
        assert_eq!(ave.merge_tool(), Some(Path::new("/opt/drhook/merge_ave")));
    }

    #[test]
    fn drhook_summary_records_merge_mode() {
        let max = parsed("drHookMax", &[("drhook.prof.1", PROFILE)]);
        let ave = parsed("drHookAve", &[("drhook.prof.1", PROFILE)]);
        assert_eq!(
            max.summarize().expect("summary should build").get_str("Merge"),
            Some("walltime max")
        );
        assert_eq!(
            ave.summarize().expect("summary should build").get_str("Merge"),
            Some("walltime average")
        );
    }

    #[cfg(unix)]
    #[test]
    fn drhook_kinds_run_their_own_merge_tool() {
        use std::os::unix::fs::PermissionsExt;

        let tools = TempDir::new().expect("tempdir should be created");
        let write_tool = |name: &str, profile: &str| {
            let path = tools.path().join(name);
            fs::write(&path, format!("#!/bin/sh\ncat <<'PROFILE'\n{profile}PROFILE\n"))
                .expect("tool should be written");
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
                .expect("tool should be executable");
            path
        };
        let max_tool = write_tool("merge_max", PROFILE);
        let ave_tool = write_tool("merge_ave", &PROFILE.replace("Max=15.670", "Max=14.010"));

        let temp = TempDir::new().expect("tempdir should be created");
        for name in ["drhook.prof.1", "drhook.prof.2"] {
            fs::write(temp.path().join(name), PROFILE).expect("profile should be written");
        }
        let workspace = Workspace::open(temp.path()).expect("workspace should open");
        let decoders = Decoders::default();

        let elapse = |kind: &str| {
            let spec = ExpertSpec::new(kind)
                .with_option("merge_tool_max", max_tool.display().to_string())
                .with_option("merge_tool_ave", ave_tool.display().to_string());
            let mut expert = build_expert(&spec, true).expect("expert should build");
            expert
                .parse(&ExpertContext::new(&workspace, &decoders))
                .expect("profiles should merge");
            expert
                .summarize()
                .expect("summary should build")
                .get_f64("Elapse time")
        };
        assert_eq!(elapse("drHookMax"), Some(15.67));
        assert_eq!(elapse("drHookAve"), Some(14.01));
    }

    #[test]
    fn rss_summary_and_comparison() {
        let expert = parsed(
            "rss",
            &[
                ("stdeo.0", "RSS=1048576k\n"),
                ("stdeo.1", "RSS=524288k\n"),
                ("listing.fc.stdeo.2", "RSS=1048576k\n"),
                ("stdeo.3", "RSS=524288k\n"),
            ],
        );
        let summary = expert.summarize().expect("summary should build");
        assert_eq!(summary.get_str("RSSmax"), Some("1.0Gb"));
        assert_eq!(summary.get_str("RSStotal"), Some("3.0Gb"));
        assert_eq!(summary.get_str("imbalance"), Some("50.0%"));
        assert_eq!(summary.get("MPI tasks"), Some(&json!(4)));
        assert!(summary.get("NodeRSSmax").is_none());

        let reference = Summary::new()
            .with("RSSmax", "1.0Gb")
            .with("RSStotal", "2.0Gb")
            .with("imbalance", "40.0%");
        let result = expert
            .compare_summaries(&summary, &reference)
            .expect("comparison should succeed");
        assert_eq!(result.get(MAIN_METRICS), Some(&json!("Relative RSStotal diff")));
        assert_eq!(result.get("Relative RSStotal diff"), Some(&json!("+50.00%")));
        assert_eq!(result.get("Absolute RSStotal diff"), Some(&json!("+1.0Gb")));
        assert_eq!(result.get("Relative RSSmax diff"), Some(&json!("0.00%")));
        assert_eq!(result.get("Imbalance evolution"), Some(&json!("+10.00%")));
    }

    #[test]
    fn rss_node_statistics_need_tasks_per_node() {
        let temp = TempDir::new().expect("tempdir should be created");
        for (task, rss) in [(0, 1048576), (1, 1048576), (2, 2097152), (3, 1048576)] {
            fs::write(temp.path().join(format!("stdeo.{task}")), format!("RSS={rss}k\n"))
                .expect("output should be written");
        }
        let workspace = Workspace::open(temp.path()).expect("workspace should open");
        let decoders = Decoders::default();
        let spec = ExpertSpec::new("rss").with_option("ntasks_per_node", 2);
        let mut expert = build_expert(&spec, true).expect("expert should build");
        expert
            .parse(&ExpertContext::new(&workspace, &decoders))
            .expect("outputs should parse");
        let summary = expert.summarize().expect("summary should build");
        assert_eq!(summary.get_str("NodeRSSmax"), Some("3.0Gb"));
        assert_eq!(summary.get("Tasks per node"), Some(&json!(2)));

        let spec = ExpertSpec::new("rss").with_option("ntasks_per_node", 0);
        let error = build_expert(&spec, true).expect_err("zero tasks per node should fail");
        assert_eq!(error.category(), ExpertiseErrorCategory::ConfigurationError);
    }

    #[test]
    fn bator_profile_compares_per_obstype() {
        let expert = parsed(
            "bator_profile",
            &[(
                "parallel_exec_synthesis.json",
                r#"{"synop": {"time_real": 12.0, "mem_real": 100.0},
                    "amsua": {"time_real": 30.0, "mem_real": 300.0}}"#,
            )],
        );
        let test = expert.summarize().expect("summary should build");
        assert_eq!(test.get_f64("Total elapse time"), Some(42.0));
        assert_eq!(test.get_f64("Total memory"), Some(400.0));

        let reference = Summary::new()
            .with("Elapse time per obstype", json!({"synop": 10.0, "amsua": 30.0, "gpsro": 5.0}))
            .with("Memory per obstype", json!({"synop": 100.0, "amsua": 200.0}))
            .with("Total elapse time", 45.0)
            .with("Total memory", 300.0);
        let result = expert
            .compare_summaries(&test, &reference)
            .expect("comparison should succeed");
        assert_eq!(result.main_metrics(), Some("Max relative diff in elapse time"));
        assert_eq!(result.get("Max relative diff in elapse time"), Some(&json!("+20.00%")));
        assert_eq!(result.get("Max relative diff in memory"), Some(&json!("+50.00%")));
        assert_eq!(
            result.get("Absolute diff in elapse time per obstype"),
            Some(&json!({"synop": 2.0, "amsua": 0.0, "gpsro": "!Missing in test!"}))
        );
        assert_eq!(result.get("Absolute diff in total elapse time"), Some(&json!(-3.0)));
        assert_eq!(result.get("Relative diff in total memory"), Some(&json!("+33.33%")));
    }
}
