//! Named extraction grammars for solver logs, profiling dumps and file names.
//!
//! Every pattern is anchored at the start of the line it is applied to. The
//! table is compiled once, on first lookup.

use crate::domain::{ExpertiseError, ExpertiseResult};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

pub mod names {
    pub const OOPS_JO: &str = "oops.jo";
    pub const OOPS_ADJOINT: &str = "oops.adjoint";
    pub const OOPS_STATES_DIFF: &str = "oops.states_diff";
    pub const OOPS_VARIANCES: &str = "oops.variances";
    pub const TL_SIGNATURE: &str = "tl.signature";
    pub const TL_STATS_VALUES: &str = "tl.stats_values";
    pub const TL_STATS: &str = "tl.stats";
    pub const DRHOOK_WALLTIME: &str = "drhook.walltime";
    pub const DRHOOK_MPI_TASKS: &str = "drhook.mpi_tasks";
    pub const DRHOOK_OPENMP_THREADS: &str = "drhook.openmp_threads";
    pub const DRHOOK_PROFILE_ROW: &str = "drhook.profile_row";
    pub const RSS_LINE: &str = "rss.line";
    pub const TASK_OUTPUT: &str = "rss.task_output";
    pub const TASK_LISTING_OUTPUT: &str = "rss.task_listing_output";
    pub const FILES_HISTORIC: &str = "files.historic";
    pub const FILES_COUPLING: &str = "files.coupling";
    pub const FILES_PGD: &str = "files.pgd";
    pub const FILES_PREP: &str = "files.prep";

    /// Field containers looked for when no file names are configured.
    pub const FIELD_FILES: [&str; 4] = [FILES_HISTORIC, FILES_COUPLING, FILES_PGD, FILES_PREP];
}

/// Fortran-style float, upper-case exponent as printed by the listings.
const FLOAT: &str = r"[+-]*(?:\d+(?:\.\d*)*|\.\d+)(?:E[+-]\d+)*";
/// Float with an optional exponent of either case.
const EXTENDED_FLOAT: &str = r"[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?";
const MESSAGE: &str = r#"<Message file=".+" line="\d+"><!\[CDATA\["#;

static GRAMMARS: LazyLock<Result<BTreeMap<&'static str, Regex>, regex::Error>> =
    LazyLock::new(|| {
        grammar_table()
            .into_iter()
            .map(|(name, pattern)| Regex::new(&pattern).map(|regex| (name, regex)))
            .collect()
    });

fn grammar_table() -> Vec<(&'static str, String)> {
    let expected_result = |value: &str, digits: &str| {
        format!(
            r"{MESSAGE}Expected result = (?P<{value}>[+-]*\d+\.?\d+) Digits: (?P<digits>{digits})\]\]></Message>"
        )
    };

    vec![
        (
            names::OOPS_JO,
            format!(
                r"^{MESSAGE}Jo = (?P<jo>\d+\.\d+)\]\]></Message>{}",
                expected_result("exp_jo", r"[+-]*\d+\.\d+")
            ),
        ),
        (
            names::OOPS_ADJOINT,
            format!(
                r"^{MESSAGE}dx1\.dx2 = (?P<dx1dx2>-?\d+\.\d+(?:e[+-]\d+)?) dy1\.dy2 = (?P<dy1dy2>-?\d+\.\d+(?:e[+-]\d+)?) [Dd]igits = (?P<digits>-?\d+\.\d+|inf)\]\]></Message>"
            ),
        ),
        (
            names::OOPS_STATES_DIFF,
            format!(
                r"^{MESSAGE}.*\|\|(?:Mx-x|x0-x2)\|\| = (?P<statediff>[+-]*\d+(?:\.\d+)*).*\]\]></Message>{}",
                expected_result("exp_statediff", r"[+-]*\d+(?:\.\d+)*")
            ),
        ),
        (
            names::OOPS_VARIANCES,
            format!(
                r"^{MESSAGE}variances = (?P<var>\d+\.\d+)\]\]></Message>{}",
                expected_result("exp_var", r"[+-]*\d+\.\d+")
            ),
        ),
        (
            names::TL_SIGNATURE,
            r"^WRITE_OBSVEC: CDNAME == obs_diags_1@update_(?P<nupdate>\d+) - write to ODB"
                .to_string(),
        ),
        (
            names::TL_STATS_VALUES,
            format!(
                r"^WRITE_OBSVEC: VALUES,NOT RMDI,MIN,MAX,AVG=\s*(?P<values>\d+)\s+(?P<not_rmdi>\d+)\s+(?P<min>{FLOAT})\s+(?P<max>{FLOAT})\s+(?P<avg>{FLOAT})\s*"
            ),
        ),
        (
            names::TL_STATS,
            format!(
                r"^WRITE_OBSVEC: MIN,MAX,AVG=\s*(?P<min>{FLOAT})\s+(?P<max>{FLOAT})\s+(?P<avg>{FLOAT})\s*"
            ),
        ),
        (
            names::DRHOOK_WALLTIME,
            r"^\s*Wall-times over all MPI-tasks \(secs\) : Min=(?P<min>\d+\.\d+), Max=(?P<max>\d+\.\d+), Avg=(?P<avg>\d+\.\d+), StDev=(?P<stdev>\d+\.\d+)"
                .to_string(),
        ),
        (
            names::DRHOOK_MPI_TASKS,
            r"^\s*Number of MPI-tasks : (?P<mpi>\d+)".to_string(),
        ),
        (
            names::DRHOOK_OPENMP_THREADS,
            r"^\s*Number of OpenMP-threads : (?P<openmp>\d+)".to_string(),
        ),
        (
            names::DRHOOK_PROFILE_ROW,
            format!(
                r"^\s*(?P<avg_pct>{EXTENDED_FLOAT})%\s+(?P<avg_time>{EXTENDED_FLOAT})\s+(?P<min_time>{EXTENDED_FLOAT})\s+(?P<max_time>{EXTENDED_FLOAT})\s+(?P<st_dev>{EXTENDED_FLOAT})\s+(?P<imbal_pct>{EXTENDED_FLOAT})%\s+(?P<calls>\d+) : (?P<routine>.*)$"
            ),
        ),
        (names::RSS_LINE, r"^RSS=(?P<rss>\d+)k$".to_string()),
        (names::TASK_OUTPUT, r"^stdeo\.(?P<n>\d+)$".to_string()),
        (
            names::TASK_LISTING_OUTPUT,
            r"^listing\..+\.stdeo\.(?P<n>\d+)$".to_string(),
        ),
        (
            names::FILES_HISTORIC,
            r"^(?P<prefix>ICMSH|PF|GRIBPF)(?P<cnmexp>\w{4})(?P<area>.+)?\+(?P<term_h>\d+)(?::(?P<term_m>\d{2}))?(?P<sfx>\.sfx)?$"
                .to_string(),
        ),
        (
            names::FILES_COUPLING,
            r"^(?P<prefix>CPLOUT)\+(?P<term_h>\d+)(?::(?P<term_m>\d{2}))?$".to_string(),
        ),
        (names::FILES_PGD, r"^(?P<prefix>PGD)\.fa".to_string()),
        (
            names::FILES_PREP,
            r"^(?P<prefix>PREP1_interpolated)\.fa".to_string(),
        ),
    ]
}

/// Compiled grammar registered under `name`.
pub fn grammar(name: &str) -> ExpertiseResult<&'static Regex> {
    let table = GRAMMARS.as_ref().map_err(|source| {
        ExpertiseError::internal(
            "INTERNAL.GRAMMAR_TABLE",
            format!("extraction grammar table failed to compile: {}", source),
        )
    })?;
    table.get(name).ok_or_else(|| {
        ExpertiseError::internal(
            "INTERNAL.GRAMMAR_UNKNOWN",
            format!("no extraction grammar named '{}'", name),
        )
    })
}

pub fn grammar_names() -> Vec<&'static str> {
    grammar_table().into_iter().map(|(name, _)| name).collect()
}

pub fn capture_str<'h>(
    captures: &Captures<'h>,
    group: &str,
    code: &'static str,
) -> ExpertiseResult<&'h str> {
    captures
        .name(group)
        .map(|found| found.as_str())
        .ok_or_else(|| ExpertiseError::parse(code, format!("group '{}' did not match", group)))
}

pub fn capture_f64(captures: &Captures<'_>, group: &str, code: &'static str) -> ExpertiseResult<f64> {
    let raw = capture_str(captures, group, code)?;
    parse_number(raw).ok_or_else(|| {
        ExpertiseError::parse(
            code,
            format!("group '{}' holds '{}' which is not a number", group, raw),
        )
    })
}

pub fn capture_u64(captures: &Captures<'_>, group: &str, code: &'static str) -> ExpertiseResult<u64> {
    let raw = capture_str(captures, group, code)?;
    raw.parse::<u64>().map_err(|_| {
        ExpertiseError::parse(
            code,
            format!("group '{}' holds '{}' which is not an integer", group, raw),
        )
    })
}

/// Accepts the repeated-sign and dangling-dot spellings the listings print.
fn parse_number(raw: &str) -> Option<f64> {
    let unsigned = raw.trim_start_matches(['+', '-']);
    let negative = raw[..raw.len() - unsigned.len()].matches('-').count() % 2 == 1;
    let mut normalized = unsigned.replace(".E", ".0E");
    if normalized.ends_with('.') {
        normalized.push('0');
    }
    let value = normalized.parse::<f64>().ok()?;
    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::{capture_f64, grammar, grammar_names, names, parse_number};

    const SAMPLE_JO: &str = r#"<Message file=".D[6]/test/base/TestSuiteOpObsTrajFile.h" line="106"><![CDATA[Jo = 543801527.59527683258]]></Message><Message file=".D[6]/test/base/TestSuiteVariationalFixture.h" line="250"><![CDATA[Expected result = 543801527 Digits: 8.9607214420661822629]]></Message> ALLOBS_OPER_MOD:OBS_OPER_DELETE instance=           0"#;
    const SAMPLE_ADJOINT: &str = r#"<Message file=".D[6]/test/base/TestSuiteOpObsTrajModel.h" line="153"><![CDATA[dx1.dx2 = -10551.185388577840058 dy1.dy2 = -10551.185388577810954 digits = 14.559351102071987683]]></Message>"#;
    const SAMPLE_DIFF: &str = r#"<Message file=".D[6]/test/base/TestSuiteModel.h" line="133"><![CDATA[||Mx-x|| = 43411459.225849807262||Mx|| = ]]></Message><Message file=".D[6]/test/base/TestSuiteVariationalFixture.h" line="250"><![CDATA[Expected result = 43411459 Digits: 8.2837846578541558529]]></Message></TestLog>"#;
    const SAMPLE_DIFF_NEGATIVE_DIGITS: &str = r#"<Message file=".D[6]/test/base/TestSuiteModel.h" line="98"><![CDATA[||Mx-x|| = 137534984.33869171143||Mx|| = ]]></Message><Message file=".D[6]/test/base/TestSuiteVariationalFixture.h" line="250"><![CDATA[Expected result = 9999 Digits: -4.1384250389422065908]]></Message></TestLog>"#;
    const SAMPLE_VARIANCES: &str = r#"<Message file=".D[6]/test/base/TestSuiteEnsemble.h" line="77"><![CDATA[variances = 1234.5678]]></Message><Message file=".D[6]/test/base/TestSuiteVariationalFixture.h" line="250"><![CDATA[Expected result = 1234 Digits: 3.25]]></Message>"#;

    #[test]
    fn every_grammar_compiles() {
        for name in grammar_names() {
            assert!(grammar(name).is_ok(), "grammar {name} should compile");
        }
        assert!(grammar("no.such.grammar").is_err());
    }

    #[test]
    fn jo_grammar_matches_recorded_sample() {
        let captures = grammar(names::OOPS_JO)
            .expect("grammar should exist")
            .captures(SAMPLE_JO)
            .expect("sample should match");
        assert_eq!(&captures["jo"], "543801527.59527683258");
        assert_eq!(&captures["exp_jo"], "543801527");
        assert_eq!(&captures["digits"], "8.9607214420661822629");
    }

    #[test]
    fn adjoint_grammar_matches_recorded_sample() {
        let captures = grammar(names::OOPS_ADJOINT)
            .expect("grammar should exist")
            .captures(SAMPLE_ADJOINT)
            .expect("sample should match");
        assert_eq!(&captures["dx1dx2"], "-10551.185388577840058");
        assert_eq!(&captures["dy1dy2"], "-10551.185388577810954");
        assert_eq!(&captures["digits"], "14.559351102071987683");

        let infinite = SAMPLE_ADJOINT.replace("digits = 14.559351102071987683", "Digits = inf");
        let captures = grammar(names::OOPS_ADJOINT)
            .expect("grammar should exist")
            .captures(&infinite)
            .expect("infinite digits should match");
        assert_eq!(&captures["digits"], "inf");
    }

    #[test]
    fn states_diff_grammar_matches_recorded_samples() {
        let regex = grammar(names::OOPS_STATES_DIFF).expect("grammar should exist");
        let captures = regex.captures(SAMPLE_DIFF).expect("sample should match");
        assert_eq!(&captures["statediff"], "43411459.225849807262");

        let captures = regex
            .captures(SAMPLE_DIFF_NEGATIVE_DIGITS)
            .expect("sample should match");
        assert_eq!(&captures["statediff"], "137534984.33869171143");
        assert_eq!(&captures["digits"], "-4.1384250389422065908");
    }

    #[test]
    fn variances_grammar_matches_sample() {
        let captures = grammar(names::OOPS_VARIANCES)
            .expect("grammar should exist")
            .captures(SAMPLE_VARIANCES)
            .expect("sample should match");
        assert_eq!(&captures["var"], "1234.5678");
    }

    #[test]
    fn tl_statistics_layouts_are_recognized() {
        let with_values = "WRITE_OBSVEC: VALUES,NOT RMDI,MIN,MAX,AVG=   1200   1180  -0.25E+01  0.31E+01  0.12E-02";
        let captures = grammar(names::TL_STATS_VALUES)
            .expect("grammar should exist")
            .captures(with_values)
            .expect("layout with counts should match");
        assert_eq!(&captures["values"], "1200");
        assert_eq!(
            capture_f64(&captures, "min", "PARSE.TEST").expect("min should parse"),
            -2.5
        );

        let plain = "WRITE_OBSVEC: MIN,MAX,AVG=  -0.25E+01  0.31E+01  0.12E-02";
        assert!(grammar(names::TL_STATS)
            .expect("grammar should exist")
            .is_match(plain));
        assert!(grammar(names::TL_SIGNATURE)
            .expect("grammar should exist")
            .is_match("WRITE_OBSVEC: CDNAME == obs_diags_1@update_2 - write to ODB"));
    }

    #[test]
    fn drhook_grammars_match_profile_lines() {
        let walltime = "Wall-times over all MPI-tasks (secs) : Min=12.340, Max=15.670, Avg=14.010, StDev=0.850";
        let captures = grammar(names::DRHOOK_WALLTIME)
            .expect("grammar should exist")
            .captures(walltime)
            .expect("walltime should match");
        assert_eq!(&captures["max"], "15.670");

        let row = "    12.50%      1.234      1.100      1.400     0.050    21.43%        480 : CPG_DYN";
        let captures = grammar(names::DRHOOK_PROFILE_ROW)
            .expect("grammar should exist")
            .captures(row)
            .expect("profile row should match");
        assert_eq!(&captures["calls"], "480");
        assert_eq!(&captures["routine"], "CPG_DYN");
    }

    #[test]
    fn field_file_grammars_select_containers() {
        let matches = |name: &str| {
            names::FIELD_FILES.iter().any(|grammar_name| {
                grammar(grammar_name)
                    .expect("grammar should exist")
                    .is_match(name)
            })
        };
        assert!(matches("ICMSHFCST+0006"));
        assert!(matches("ICMSHFCST+0006:30"));
        assert!(matches("PFFCSTFRANGP0025+0012"));
        assert!(matches("CPLOUT+0003"));
        assert!(matches("PGD.fa"));
        assert!(matches("PREP1_interpolated.fa"));
        assert!(!matches("reference.ICMSHFCST+0006"));
        assert!(!matches("NODE.001_01"));
    }

    #[test]
    fn listing_numbers_tolerate_fortran_spellings() {
        assert_eq!(parse_number("--1.5"), Some(1.5));
        assert_eq!(parse_number("-1.E+02"), Some(-100.0));
        assert_eq!(parse_number("3."), Some(3.0));
        assert_eq!(parse_number(".5"), Some(0.5));
        assert_eq!(parse_number("inf"), Some(f64::INFINITY));
        assert_eq!(parse_number("abc"), None);
    }
}
