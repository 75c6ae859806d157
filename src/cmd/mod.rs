//! CLI command implementations.
//!
//! | Module | Responsibility                                        |
//! |--------|-------------------------------------------------------|
//! | `run`  | Build the workflow from config and flags, run it      |
//! | `dev`  | `--dev` snapshot server lifecycle                     |

pub mod dev;
pub mod run;

pub use run::run_itinerary;
