//! Core domain types and logic.

pub mod config_validation;
pub mod error;
pub mod feature;
pub mod forecast;
pub mod halving;
pub mod hhi;
pub mod model;
pub mod pipeline;
pub mod revenue;
pub mod scenario;
pub mod series;
pub mod series_store;
pub mod table;
