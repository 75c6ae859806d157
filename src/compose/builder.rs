//! Phase builder: assembles and validates a stage tree.
//!
//! The builder checks the topology before anything runs:
//! - A phase has at least one step and a non-zero deadline
//! - Task names are unique within the phase
//! - Sequences are non-empty
//! - Fan-out groups have two or more children with disjoint write sets

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use super::stage::{FanOutGroup, Phase, Sequence, Stage, TaskDescriptor};
use crate::errors::ComposeError;

pub const DEFAULT_PHASE_DEADLINE: Duration = Duration::from_secs(300);

pub struct PhaseBuilder {
    name: String,
    deadline: Duration,
    steps: Vec<Stage>,
}

impl PhaseBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            deadline: DEFAULT_PHASE_DEADLINE,
            steps: Vec::new(),
        }
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn task(self, task: TaskDescriptor) -> Self {
        self.step(task)
    }

    pub fn sequence(self, sequence: Sequence) -> Self {
        self.step(sequence)
    }

    pub fn fan_out(self, group: FanOutGroup) -> Self {
        self.step(group)
    }

    pub fn step(mut self, stage: impl Into<Stage>) -> Self {
        self.steps.push(stage.into());
        self
    }

    pub fn build(self) -> Result<Phase, ComposeError> {
        if self.steps.is_empty() {
            return Err(ComposeError::EmptyPhase { phase: self.name });
        }
        if self.deadline.is_zero() {
            return Err(ComposeError::ZeroDeadline { phase: self.name });
        }

        {
            let mut seen = HashSet::new();
            for stage in &self.steps {
                for task in stage.tasks() {
                    if !seen.insert(task.name.as_str()) {
                        return Err(ComposeError::DuplicateTask {
                            phase: self.name.clone(),
                            task: task.name.clone(),
                        });
                    }
                }
                validate_stage(stage)?;
            }
        }

        Ok(Phase {
            name: self.name,
            deadline: self.deadline,
            steps: self.steps,
        })
    }
}

fn validate_stage(stage: &Stage) -> Result<(), ComposeError> {
    match stage {
        Stage::Task(_) => Ok(()),
        Stage::Sequence(seq) => validate_sequence(seq),
        Stage::FanOut(group) => validate_fan_out(group),
    }
}

fn validate_sequence(seq: &Sequence) -> Result<(), ComposeError> {
    if seq.stages.is_empty() {
        return Err(ComposeError::EmptySequence {
            sequence: seq.name.clone(),
        });
    }
    seq.stages.iter().try_for_each(validate_stage)
}

fn validate_fan_out(group: &FanOutGroup) -> Result<(), ComposeError> {
    if group.children.len() < 2 {
        return Err(ComposeError::TooFewChildren {
            group: group.name.clone(),
            found: group.children.len(),
        });
    }

    // key -> child that writes it
    let mut owners: HashMap<&str, &str> = HashMap::new();
    for child in &group.children {
        validate_sequence(child)?;
        let keys: HashSet<&str> = child.stages.iter().flat_map(|s| s.write_keys()).collect();
        for key in keys {
            if let Some(first) = owners.insert(key, child.name.as_str()) {
                return Err(ComposeError::OverlappingWrites {
                    group: group.name.clone(),
                    first: first.to_string(),
                    second: child.name.clone(),
                    key: key.to_string(),
                });
            }
        }
    }
    Ok(())
}
