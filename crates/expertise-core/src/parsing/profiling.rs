//! Profiling artifacts: DrHook profiles, per-task RSS lines, Bator synthesis.

use super::grammar::{capture_f64, capture_str, capture_u64, grammar, names};
use super::text::TextArtifact;
use crate::domain::{ExpertiseError, ExpertiseResult, Workspace};
use crate::summary::read_json_document;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use tracing::debug;

pub const DRHOOK_PROFILE_GLOBS: [&str; 2] = ["drhook.prof.[0-9]*", "drhookprof.*.n[0-9]*"];

fn drhook_globset() -> ExpertiseResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in DRHOOK_PROFILE_GLOBS {
        let glob = Glob::new(pattern).map_err(|source| {
            ExpertiseError::internal(
                "INTERNAL.DRHOOK_GLOB",
                format!("invalid glob pattern '{}': {}", pattern, source),
            )
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| {
        ExpertiseError::internal(
            "INTERNAL.DRHOOK_GLOB",
            format!("failed to build DrHook glob set: {}", source),
        )
    })
}

/// DrHook profile files of the working directory, sorted by name.
pub fn discover_drhook_profiles(workspace: &Workspace) -> ExpertiseResult<Vec<String>> {
    let globs = drhook_globset()?;
    let files: Vec<String> = workspace
        .entries()
        .filter(|name| globs.is_match(name))
        .map(str::to_string)
        .collect();
    if files.is_empty() {
        return Err(ExpertiseError::artifact_not_found(
            "ARTIFACT.DRHOOK_PROFILES",
            format!(
                "no DrHook profile ({}) found in '{}'",
                DRHOOK_PROFILE_GLOBS.join(", "),
                workspace.root().display()
            ),
        ));
    }
    Ok(files)
}

/// Merged profile lines: through `merge_tool` when configured, else the
/// single profile read as is.
pub fn merge_drhook_profiles(
    workspace: &Workspace,
    files: &[String],
    merge_tool: Option<&Path>,
) -> ExpertiseResult<TextArtifact> {
    match (merge_tool, files) {
        (Some(tool), _) => run_merge_tool(workspace, files, tool),
        (None, [single]) => TextArtifact::read(workspace, single),
        (None, _) => Err(ExpertiseError::parse(
            "PARSE.DRHOOK_MERGE",
            format!(
                "{} DrHook profiles found but no merge tool is configured",
                files.len()
            ),
        )),
    }
}

fn run_merge_tool(
    workspace: &Workspace,
    files: &[String],
    tool: &Path,
) -> ExpertiseResult<TextArtifact> {
    debug!(tool = %tool.display(), profiles = files.len(), "merging DrHook profiles");
    let output = Command::new(tool)
        .args(files)
        .current_dir(workspace.root())
        .output()
        .map_err(|source| {
            ExpertiseError::io_system(
                "IO.DRHOOK_MERGE_TOOL",
                format!("failed to run merge tool '{}': {}", tool.display(), source),
            )
        })?;
    if !output.status.success() {
        return Err(ExpertiseError::parse(
            "PARSE.DRHOOK_MERGE",
            format!(
                "merge tool '{}' exited with {}: {}",
                tool.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(TextArtifact::from_lines(
        tool.display().to_string(),
        stdout.lines(),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrHookHeader {
    /// Maximum wall-time over all MPI tasks, in seconds.
    pub elapse_time: f64,
    pub mpi_tasks: u64,
    pub openmp_threads: u64,
}

pub fn parse_drhook_header(profile: &TextArtifact) -> ExpertiseResult<DrHookHeader> {
    let walltime = profile.require_first(names::DRHOOK_WALLTIME, "PARSE.DRHOOK_WALLTIME")?;
    let mpi = profile.require_first(names::DRHOOK_MPI_TASKS, "PARSE.DRHOOK_MPI_TASKS")?;
    let openmp = profile.require_first(names::DRHOOK_OPENMP_THREADS, "PARSE.DRHOOK_OPENMP")?;
    Ok(DrHookHeader {
        elapse_time: capture_f64(&walltime, "max", "PARSE.DRHOOK_WALLTIME")?,
        mpi_tasks: capture_u64(&mpi, "mpi", "PARSE.DRHOOK_MPI_TASKS")?,
        openmp_threads: capture_u64(&openmp, "openmp", "PARSE.DRHOOK_OPENMP")?,
    })
}

/// One row of the per-routine table.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct RoutineProfile {
    #[serde(rename = "Avg-%")]
    pub avg_pct: f64,
    #[serde(rename = "Avg.time")]
    pub avg_time: f64,
    #[serde(rename = "Min.time")]
    pub min_time: f64,
    #[serde(rename = "Max.time")]
    pub max_time: f64,
    #[serde(rename = "St.dev")]
    pub st_dev: f64,
    #[serde(rename = "Imbal-%")]
    pub imbal_pct: f64,
    #[serde(rename = "# of calls")]
    pub calls: u64,
}

fn is_table_header(line: &str) -> bool {
    line.trim_start().starts_with("Avg-%") && line.contains("Name of the routine")
}

/// Per-routine rows found below the table header.
pub fn parse_profile_rows(lines: &[String]) -> ExpertiseResult<BTreeMap<String, RoutineProfile>> {
    const CODE: &str = "PARSE.DRHOOK_PROFILE";
    let header = lines
        .iter()
        .position(|line| is_table_header(line))
        .ok_or_else(|| ExpertiseError::parse(CODE, "DrHook routine table header not found"))?;
    let row = grammar(names::DRHOOK_PROFILE_ROW)?;

    let mut routines = BTreeMap::new();
    for line in &lines[header + 1..] {
        let Some(captures) = row.captures(line) else {
            continue;
        };
        let routine = capture_str(&captures, "routine", CODE)?.trim().to_string();
        routines.insert(
            routine,
            RoutineProfile {
                avg_pct: capture_f64(&captures, "avg_pct", CODE)?,
                avg_time: capture_f64(&captures, "avg_time", CODE)?,
                min_time: capture_f64(&captures, "min_time", CODE)?,
                max_time: capture_f64(&captures, "max_time", CODE)?,
                st_dev: capture_f64(&captures, "st_dev", CODE)?,
                imbal_pct: capture_f64(&captures, "imbal_pct", CODE)?,
                calls: capture_u64(&captures, "calls", CODE)?,
            },
        );
    }
    Ok(routines)
}

/// Per-task standard outputs (`stdeo.N`, `listing.*.stdeo.N`) by task number.
pub fn discover_task_outputs(workspace: &Workspace) -> ExpertiseResult<Vec<String>> {
    let plain = grammar(names::TASK_OUTPUT)?;
    let listing = grammar(names::TASK_LISTING_OUTPUT)?;

    let mut outputs: Vec<(u64, String)> = Vec::new();
    for name in workspace.entries() {
        let captures = plain.captures(name).or_else(|| listing.captures(name));
        if let Some(captures) = captures {
            let task = capture_u64(&captures, "n", "PARSE.RSS_TASK_NUMBER")?;
            outputs.push((task, name.to_string()));
        }
    }
    if outputs.is_empty() {
        return Err(ExpertiseError::artifact_not_found(
            "ARTIFACT.RSS_OUTPUTS",
            format!(
                "no stdeo.N task output found in '{}'",
                workspace.root().display()
            ),
        ));
    }
    outputs.sort();
    Ok(outputs.into_iter().map(|(_, name)| name).collect())
}

/// Resident set size reported by a task, in kilobytes.
pub fn read_rss_kilobytes(workspace: &Workspace, name: &str) -> ExpertiseResult<u64> {
    let output = TextArtifact::read(workspace, name)?;
    let captures = output.require_first(names::RSS_LINE, "PARSE.RSS_LINE")?;
    capture_u64(&captures, "rss", "PARSE.RSS_LINE")
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BatorObstype {
    pub time_real: f64,
    pub mem_real: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub type BatorSynthesis = BTreeMap<String, BatorObstype>;

pub fn read_bator_synthesis(workspace: &Workspace, name: &str) -> ExpertiseResult<BatorSynthesis> {
    let path = workspace.require(name, "ARTIFACT.BATOR_SYNTHESIS")?;
    let document = read_json_document(&path)?;
    let synthesis: BatorSynthesis = serde_json::from_value(document).map_err(|source| {
        ExpertiseError::parse(
            "PARSE.BATOR_SYNTHESIS",
            format!("'{}' is not a Bator synthesis: {}", name, source),
        )
    })?;
    if synthesis.is_empty() {
        return Err(ExpertiseError::parse(
            "PARSE.BATOR_SYNTHESIS",
            format!("'{}' lists no obstype", name),
        ));
    }
    Ok(synthesis)
}
