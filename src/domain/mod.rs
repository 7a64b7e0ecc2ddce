//! Core domain types and logic.

pub mod matrix;
pub mod panel;
pub mod corporate_actions;
pub mod utility;
pub mod assignment;
pub mod simulation;
pub mod pipeline;
pub mod config_validation;
pub mod error;
