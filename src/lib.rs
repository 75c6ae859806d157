pub mod backend;
pub mod capability;
pub mod checkpoint;
pub mod compose;
pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod retry;
pub mod state;
pub mod supervisor;
pub mod tools;
pub mod ui;
pub mod util;
pub mod web;
pub mod workflow;
