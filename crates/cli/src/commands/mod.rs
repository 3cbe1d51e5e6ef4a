//! CLI Commands

pub mod compare;
pub mod config;
pub mod diff;
pub mod selectors;
