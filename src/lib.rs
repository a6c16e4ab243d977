//! Firmsched - task scheduler for machine lifecycle (firmware scan/install) jobs.

pub mod config;
pub mod hot_queue;
pub mod overflow;
pub mod runner;
pub mod scheduler;
pub mod task;
pub mod tracker;
