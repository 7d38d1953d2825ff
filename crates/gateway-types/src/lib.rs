pub mod config;
pub mod counter;
pub mod decision;
pub mod glob;
pub mod rule;
