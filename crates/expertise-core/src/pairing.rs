//! Matching local output files to their staged reference counterparts.
//!
//! References are staged next to the outputs under a provenance prefix
//! (`reference.ICMSHFCST+0006` for a local `ICMSHFCST+0006`).

use crate::domain::{ExpertiseError, ExpertiseResult, ReferenceArtifact, Workspace, resource_kind};
use crate::parsing::grammar::{grammar, names};
use serde::Serialize;
use tracing::warn;

/// Provenance prefixes, in priority order.
pub const REFERENCE_PREFIXES: [&str; 3] = [
    "reference.",
    "continuity-reference.",
    "consistency-reference.",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactPair {
    pub local: String,
    pub reference: String,
}

impl ArtifactPair {
    pub fn new(local: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            reference: reference.into(),
        }
    }
}

/// Local name of a staged reference: exactly one prefix removed, the first
/// that matches in priority order.
pub fn strip_reference_prefix(reference: &str) -> Option<&str> {
    REFERENCE_PREFIXES
        .iter()
        .find_map(|prefix| reference.strip_prefix(prefix))
        .filter(|local| !local.is_empty())
}

pub fn is_field_container(reference: &ReferenceArtifact) -> bool {
    resource_kind::FIELD_CONTAINERS
        .iter()
        .any(|kind| reference.has_kind(kind))
}

/// Builds pairs from the configured file names when there are any, from the
/// field-container references otherwise.
pub fn make_pairs(
    filenames: &[String],
    references: &[ReferenceArtifact],
    workspace: &Workspace,
    fatal_exceptions: bool,
) -> ExpertiseResult<Vec<ArtifactPair>> {
    let candidates: Vec<&ReferenceArtifact> = references
        .iter()
        .filter(|reference| is_field_container(reference))
        .collect();
    if filenames.is_empty() {
        pair_from_references(&candidates, workspace, fatal_exceptions)
    } else {
        pair_from_filenames(filenames, &candidates, workspace, fatal_exceptions)
    }
}

fn degrade(fatal_exceptions: bool, error: ExpertiseError) -> ExpertiseResult<()> {
    if fatal_exceptions {
        return Err(error);
    }
    warn!(code = error.code(), "{} => ignored in comparison", error.message());
    Ok(())
}

fn pair_from_references(
    candidates: &[&ReferenceArtifact],
    workspace: &Workspace,
    fatal_exceptions: bool,
) -> ExpertiseResult<Vec<ArtifactPair>> {
    let mut pairs = Vec::new();
    for reference in candidates {
        if !workspace.contains(&reference.name) {
            degrade(
                fatal_exceptions,
                ExpertiseError::artifact_not_found(
                    "ARTIFACT.REFERENCE_FILE",
                    format!("reference file '{}' not found", reference.name),
                ),
            )?;
            continue;
        }
        let Some(local) = strip_reference_prefix(&reference.name) else {
            warn!(
                reference = %reference.name,
                "reference file has no known provenance prefix => skipped"
            );
            continue;
        };
        if workspace.contains(local) {
            pairs.push(ArtifactPair::new(local, reference.name.as_str()));
        } else {
            degrade(
                fatal_exceptions,
                ExpertiseError::pairing(
                    "PAIRING.NO_LOCAL_OUTPUT",
                    format!(
                        "reference file '{}' has no local output equivalent '{}'",
                        reference.name, local
                    ),
                ),
            )?;
        }
    }
    Ok(pairs)
}

fn pair_from_filenames(
    filenames: &[String],
    candidates: &[&ReferenceArtifact],
    workspace: &Workspace,
    fatal_exceptions: bool,
) -> ExpertiseResult<Vec<ArtifactPair>> {
    let mut pairs = Vec::new();
    for local in filenames {
        if !workspace.contains(local) {
            degrade(
                fatal_exceptions,
                ExpertiseError::artifact_not_found(
                    "ARTIFACT.OUTPUT_FILE",
                    format!("output file '{}' not found", local),
                ),
            )?;
            continue;
        }
        let reference = REFERENCE_PREFIXES.iter().find_map(|prefix| {
            let expected = format!("{prefix}{local}");
            candidates
                .iter()
                .find(|candidate| candidate.name == expected)
                .map(|candidate| candidate.name.clone())
        });
        match reference {
            Some(reference) => pairs.push(ArtifactPair::new(local.as_str(), reference)),
            None => degrade(
                fatal_exceptions,
                ExpertiseError::pairing(
                    "PAIRING.NO_REFERENCE",
                    format!("no reference file found for output '{}'", local),
                ),
            )?,
        }
    }
    Ok(pairs)
}

/// Field containers of the working directory recognized by the file-name
/// grammars, in listing order.
pub fn discover_field_files(workspace: &Workspace) -> ExpertiseResult<Vec<String>> {
    let grammars = names::FIELD_FILES
        .iter()
        .map(|name| grammar(name))
        .collect::<ExpertiseResult<Vec<_>>>()?;
    Ok(workspace
        .entries()
        .filter(|entry| grammars.iter().any(|regex| regex.is_match(entry)))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::{ArtifactPair, discover_field_files, make_pairs, strip_reference_prefix};
    use crate::domain::{ExpertiseErrorCategory, ReferenceArtifact, Workspace};

    fn historic(name: &str) -> ReferenceArtifact {
        ReferenceArtifact::new(name, "historic")
    }

    #[test]
    fn reference_driven_pairing_matches_local_equivalent() {
        let workspace = Workspace::from_entries("/work", ["A", "reference.A", "B"]);
        let pairs = make_pairs(&[], &[historic("reference.A")], &workspace, true)
            .expect("pairing should succeed");
        assert_eq!(pairs, vec![ArtifactPair::new("A", "reference.A")]);
    }

    #[test]
    fn only_one_prefix_is_stripped() {
        assert_eq!(strip_reference_prefix("reference.reference.A"), Some("reference.A"));
        assert_eq!(strip_reference_prefix("continuity-reference.PGD.fa"), Some("PGD.fa"));
        assert_eq!(strip_reference_prefix("referenceA"), None);
        assert_eq!(strip_reference_prefix("reference."), None);
    }

    #[test]
    fn non_container_kinds_are_ignored() {
        let workspace = Workspace::from_entries("/work", ["A", "reference.A"]);
        let references = [ReferenceArtifact::new("reference.A", "taskinfo")];
        let pairs = make_pairs(&[], &references, &workspace, true).expect("pairing should succeed");
        assert!(pairs.is_empty());
    }

    #[test]
    fn missing_local_equivalent_fails_or_degrades() {
        let workspace = Workspace::from_entries("/work", ["reference.A", "reference.B", "B"]);
        let references = [historic("reference.A"), historic("reference.B")];

        let error = make_pairs(&[], &references, &workspace, true)
            .expect_err("fatal pairing should fail");
        assert_eq!(error.category(), ExpertiseErrorCategory::PairingError);

        let pairs = make_pairs(&[], &references, &workspace, false)
            .expect("non-fatal pairing should degrade");
        assert_eq!(pairs, vec![ArtifactPair::new("B", "reference.B")]);
    }

    #[test]
    fn filename_driven_pairing_follows_prefix_priority() {
        let workspace = Workspace::from_entries(
            "/work",
            [
                "ICMSHFCST+0006",
                "PGD.fa",
                "consistency-reference.ICMSHFCST+0006",
                "continuity-reference.ICMSHFCST+0006",
                "consistency-reference.PGD.fa",
            ],
        );
        let references = [
            ReferenceArtifact::new("consistency-reference.ICMSHFCST+0006", "historic"),
            ReferenceArtifact::new("continuity-reference.ICMSHFCST+0006", "historic"),
            ReferenceArtifact::new("consistency-reference.PGD.fa", "pgdfa"),
        ];
        let filenames = ["PGD.fa".to_string(), "ICMSHFCST+0006".to_string()];

        let pairs = make_pairs(&filenames, &references, &workspace, true)
            .expect("pairing should succeed");
        assert_eq!(
            pairs,
            vec![
                ArtifactPair::new("PGD.fa", "consistency-reference.PGD.fa"),
                ArtifactPair::new("ICMSHFCST+0006", "continuity-reference.ICMSHFCST+0006"),
            ]
        );
    }

    #[test]
    fn missing_configured_output_is_not_found() {
        let workspace = Workspace::from_entries("/work", ["reference.A"]);
        let error = make_pairs(&["A".to_string()], &[historic("reference.A")], &workspace, true)
            .expect_err("missing output should fail");
        assert_eq!(error.category(), ExpertiseErrorCategory::ArtifactNotFound);
    }

    #[test]
    fn discovery_skips_references_and_listings() {
        let workspace = Workspace::from_entries(
            "/work",
            ["ICMSHFCST+0006", "reference.ICMSHFCST+0006", "NODE.001_01", "PGD.fa"],
        );
        let files = discover_field_files(&workspace).expect("discovery should succeed");
        assert_eq!(files, vec!["ICMSHFCST+0006".to_string(), "PGD.fa".to_string()]);
    }
}
