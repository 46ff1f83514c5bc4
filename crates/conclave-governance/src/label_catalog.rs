//! Logical label purposes and their literal names.
//!
//! The engine addresses labels only by [`LabelPurpose`]. Literal names can be
//! renamed per deployment; every former name stays listed as a legacy alias so
//! items labelled before the rename are still recognised.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LabelPurpose {
    Discussion,
    Voting,
    ExtendedVoting,
    ReadyToImplement,
    Rejected,
    Inconclusive,
    NeedsHuman,
    Implementation,
    MergeReady,
    Stale,
}

impl LabelPurpose {
    pub const ALL: [LabelPurpose; 10] = [
        LabelPurpose::Discussion,
        LabelPurpose::Voting,
        LabelPurpose::ExtendedVoting,
        LabelPurpose::ReadyToImplement,
        LabelPurpose::Rejected,
        LabelPurpose::Inconclusive,
        LabelPurpose::NeedsHuman,
        LabelPurpose::Implementation,
        LabelPurpose::MergeReady,
        LabelPurpose::Stale,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSpec {
    pub name: String,
    #[serde(default)]
    pub legacy: Vec<String>,
}

impl LabelSpec {
    fn new(name: &str, legacy: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            legacy: legacy.iter().map(|alias| alias.to_string()).collect(),
        }
    }

    pub fn matches(&self, label: &str) -> bool {
        let label = label.trim();
        label.eq_ignore_ascii_case(&self.name)
            || self
                .legacy
                .iter()
                .any(|alias| label.eq_ignore_ascii_case(alias))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelCatalog {
    pub discussion: LabelSpec,
    pub voting: LabelSpec,
    pub extended_voting: LabelSpec,
    pub ready_to_implement: LabelSpec,
    pub rejected: LabelSpec,
    pub inconclusive: LabelSpec,
    pub needs_human: LabelSpec,
    pub implementation: LabelSpec,
    pub merge_ready: LabelSpec,
    pub stale: LabelSpec,
}

impl Default for LabelCatalog {
    fn default() -> Self {
        Self {
            discussion: LabelSpec::new("phase:discussion", &["discussion"]),
            voting: LabelSpec::new("phase:voting", &["voting"]),
            extended_voting: LabelSpec::new("phase:extended-voting", &["extended-voting"]),
            ready_to_implement: LabelSpec::new(
                "phase:ready-to-implement",
                &["ready-to-implement"],
            ),
            rejected: LabelSpec::new("phase:rejected", &["rejected"]),
            inconclusive: LabelSpec::new("phase:inconclusive", &["inconclusive"]),
            needs_human: LabelSpec::new("needs:human", &["needs-human"]),
            implementation: LabelSpec::new("implementation", &[]),
            merge_ready: LabelSpec::new("merge-ready", &[]),
            stale: LabelSpec::new("stale", &[]),
        }
    }
}

impl LabelCatalog {
    pub fn spec(&self, purpose: LabelPurpose) -> &LabelSpec {
        match purpose {
            LabelPurpose::Discussion => &self.discussion,
            LabelPurpose::Voting => &self.voting,
            LabelPurpose::ExtendedVoting => &self.extended_voting,
            LabelPurpose::ReadyToImplement => &self.ready_to_implement,
            LabelPurpose::Rejected => &self.rejected,
            LabelPurpose::Inconclusive => &self.inconclusive,
            LabelPurpose::NeedsHuman => &self.needs_human,
            LabelPurpose::Implementation => &self.implementation,
            LabelPurpose::MergeReady => &self.merge_ready,
            LabelPurpose::Stale => &self.stale,
        }
    }

    /// Current literal name; used for every label the engine adds.
    pub fn name(&self, purpose: LabelPurpose) -> &str {
        &self.spec(purpose).name
    }

    pub fn has<S: AsRef<str>>(&self, purpose: LabelPurpose, labels: &[S]) -> bool {
        self.present(purpose, labels).is_some()
    }

    /// The literal label present on the item, whether current or legacy.
    pub fn present<'a, S: AsRef<str>>(
        &self,
        purpose: LabelPurpose,
        labels: &'a [S],
    ) -> Option<&'a str> {
        let spec = self.spec(purpose);
        labels
            .iter()
            .map(|label| label.as_ref())
            .find(|label| spec.matches(label))
    }

    /// The phase purpose implied by an item's labels, if any.
    pub fn phase_of<S: AsRef<str>>(&self, labels: &[S]) -> Option<LabelPurpose> {
        [
            LabelPurpose::Voting,
            LabelPurpose::ExtendedVoting,
            LabelPurpose::Discussion,
            LabelPurpose::Inconclusive,
            LabelPurpose::ReadyToImplement,
            LabelPurpose::Rejected,
        ]
        .into_iter()
        .find(|purpose| self.has(*purpose, labels))
    }
}
