//! Stage composition: tasks, sequences, fan-out groups and phases.

mod builder;
pub mod schema;
mod shape;
mod stage;

pub use builder::{DEFAULT_PHASE_DEADLINE, PhaseBuilder};
pub use shape::{Conformed, OutputShape, Shaped};
pub use stage::{FanOutGroup, Phase, Sequence, Stage, TaskDescriptor};
