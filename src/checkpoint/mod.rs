//! Human-in-the-loop checkpoint between discovery and composition.
//!
//! The gate shows the candidate groupings and asks which ones to keep. It is
//! a hard synchronization point: nothing downstream starts until it returns.

mod input;

pub use input::{ScriptedInput, SelectionInput, TerminalInput};

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::errors::CheckpointError;

/// Something the user can pick at the checkpoint.
pub trait Candidate {
    fn id(&self) -> u32;

    fn label(&self) -> String;

    /// Items the candidate groups together.
    fn members(&self) -> Vec<String> {
        Vec::new()
    }

    /// Labelled detail lines shown under the candidate.
    fn details(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CheckpointPolicy {
    /// Prompt on the input until a valid answer arrives.
    #[default]
    Interactive,
    /// Keep every candidate without prompting.
    SelectAll,
}

/// Parsed answer to the selection prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Ids(BTreeSet<u32>),
}

/// Why an answer was rejected; the user is asked again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionProblem {
    Empty,
    NotANumber(String),
    Unknown(Vec<u32>),
}

impl std::fmt::Display for SelectionProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Please enter at least one number, or leave blank for all."),
            Self::NotANumber(token) => {
                write!(f, "'{token}' is not a number. Use numbers separated by commas, e.g. 1,3")
            }
            Self::Unknown(ids) => {
                let ids: Vec<String> = ids.iter().map(u32::to_string).collect();
                write!(f, "No option numbered {}.", ids.join(", "))
            }
        }
    }
}

/// Parse a comma-separated list of ids against the offered ids.
///
/// A blank line or `all` selects everything.
pub fn parse_selection(line: &str, offered: &[u32]) -> Result<Selection, SelectionProblem> {
    let line = line.trim();
    if line.is_empty() || line.eq_ignore_ascii_case("all") {
        return Ok(Selection::All);
    }

    let mut ids = BTreeSet::new();
    for token in line.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let id = token
            .parse::<u32>()
            .map_err(|_| SelectionProblem::NotANumber(token.to_string()))?;
        ids.insert(id);
    }
    if ids.is_empty() {
        return Err(SelectionProblem::Empty);
    }

    let unknown: Vec<u32> = ids.iter().copied().filter(|id| !offered.contains(id)).collect();
    if !unknown.is_empty() {
        return Err(SelectionProblem::Unknown(unknown));
    }
    Ok(Selection::Ids(ids))
}

/// Render candidates as the block shown before the prompt.
pub fn render_candidates<C: Candidate>(candidates: &[C]) -> String {
    let mut out = String::new();
    for candidate in candidates {
        out.push_str(&format!("\n  [{}] {}\n", candidate.id(), candidate.label()));
        for (label, value) in candidate.details() {
            out.push_str(&format!("      {label}: {value}\n"));
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct CheckpointGate {
    policy: CheckpointPolicy,
    subject: String,
}

impl CheckpointGate {
    pub fn new(policy: CheckpointPolicy) -> Self {
        Self {
            policy,
            subject: "option".to_string(),
        }
    }

    /// Noun used in the prompt, e.g. "region".
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn policy(&self) -> CheckpointPolicy {
        self.policy
    }

    /// Resolve the selection. The result keeps the candidates' order.
    ///
    /// A single candidate is chosen without prompting under every policy.
    /// A closed input counts as "select all".
    pub fn present<C: Candidate + Clone>(
        &self,
        candidates: &[C],
        input: &mut dyn SelectionInput,
    ) -> Result<Vec<C>, CheckpointError> {
        match candidates {
            [] => return Err(CheckpointError::NoCandidates),
            [only] => {
                info!(id = only.id(), label = %only.label(), "checkpoint_auto_selected");
                return Ok(vec![only.clone()]);
            }
            _ => {}
        }

        if self.policy == CheckpointPolicy::SelectAll {
            info!(count = candidates.len(), "checkpoint_selected_all");
            return Ok(candidates.to_vec());
        }

        let offered: Vec<u32> = candidates.iter().map(Candidate::id).collect();
        input.show(&render_candidates(candidates));
        let prompt = format!(
            "Which {}(s) would you like to explore? Enter numbers separated by commas, or press Enter for all",
            self.subject
        );

        loop {
            let Some(line) = input.read_line(&prompt)? else {
                warn!("checkpoint_input_closed");
                input.notify("No selection received; keeping every option.");
                return Ok(candidates.to_vec());
            };

            match parse_selection(&line, &offered) {
                Ok(Selection::All) => return Ok(candidates.to_vec()),
                Ok(Selection::Ids(ids)) => {
                    info!(selected = ?ids, "checkpoint_selected");
                    return Ok(candidates
                        .iter()
                        .filter(|c| ids.contains(&c.id()))
                        .cloned()
                        .collect());
                }
                Err(problem) => {
                    warn!(answer = %line, problem = %problem, "checkpoint_invalid_answer");
                    input.notify(&problem.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Option_ {
        id: u32,
        name: &'static str,
    }

    impl Candidate for Option_ {
        fn id(&self) -> u32 {
            self.id
        }

        fn label(&self) -> String {
            self.name.to_string()
        }
    }

    fn three() -> Vec<Option_> {
        vec![
            Option_ { id: 1, name: "England" },
            Option_ { id: 2, name: "Scotland" },
            Option_ { id: 3, name: "Wales" },
        ]
    }

    fn ids(selected: &[Option_]) -> Vec<u32> {
        selected.iter().map(|c| c.id).collect()
    }

    #[test]
    fn test_parse_selection() {
        let offered = [1, 2, 3];
        assert_eq!(parse_selection("all", &offered), Ok(Selection::All));
        assert_eq!(parse_selection("  ", &offered), Ok(Selection::All));
        assert_eq!(
            parse_selection(" 3, 1,3 ", &offered),
            Ok(Selection::Ids(BTreeSet::from([1, 3])))
        );
        assert_eq!(
            parse_selection("one", &offered),
            Err(SelectionProblem::NotANumber("one".into()))
        );
        assert_eq!(
            parse_selection("1,7", &offered),
            Err(SelectionProblem::Unknown(vec![7]))
        );
        assert_eq!(parse_selection(" , ", &offered), Err(SelectionProblem::Empty));
    }

    #[test]
    fn test_no_candidates_is_an_error() {
        let gate = CheckpointGate::new(CheckpointPolicy::Interactive);
        let mut input = ScriptedInput::new(["1"]);
        let result = gate.present::<Option_>(&[], &mut input);
        assert!(matches!(result, Err(CheckpointError::NoCandidates)));
    }

    #[test]
    fn test_single_candidate_skips_prompt() {
        let gate = CheckpointGate::new(CheckpointPolicy::Interactive);
        let mut input = ScriptedInput::new(Vec::<String>::new());
        let only = vec![Option_ { id: 4, name: "Kent" }];
        assert_eq!(gate.present(&only, &mut input).unwrap(), only);
        assert_eq!(input.prompts(), 0);
    }

    #[test]
    fn test_select_all_policy() {
        let gate = CheckpointGate::new(CheckpointPolicy::SelectAll);
        let mut input = ScriptedInput::new(["2"]);
        assert_eq!(ids(&gate.present(&three(), &mut input).unwrap()), vec![1, 2, 3]);
        assert_eq!(input.prompts(), 0);
    }

    #[test]
    fn test_selection_keeps_grouping_order() {
        let gate = CheckpointGate::new(CheckpointPolicy::Interactive).with_subject("region");
        let mut input = ScriptedInput::new(["3,1"]);
        assert_eq!(ids(&gate.present(&three(), &mut input).unwrap()), vec![1, 3]);
        assert!(input.shown().contains("[2] Scotland"));
    }

    #[test]
    fn test_invalid_answers_reprompt() {
        let gate = CheckpointGate::new(CheckpointPolicy::Interactive);
        let mut input = ScriptedInput::new(["abc", "9", "2"]);
        assert_eq!(ids(&gate.present(&three(), &mut input).unwrap()), vec![2]);
        assert_eq!(input.prompts(), 3);
        assert_eq!(input.notices().len(), 2);
    }

    #[test]
    fn test_closed_input_selects_all() {
        let gate = CheckpointGate::new(CheckpointPolicy::Interactive);
        let mut input = ScriptedInput::new(["nope"]);
        assert_eq!(ids(&gate.present(&three(), &mut input).unwrap()), vec![1, 2, 3]);
    }
}
