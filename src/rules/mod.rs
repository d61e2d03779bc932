//! Declarative matching rules: model, loading and evaluation

pub mod engine;
pub mod error;
pub mod loader;
pub mod model;

pub use engine::{evaluate, evaluate_condition, evaluate_rule};
pub use error::*;
pub use loader::{load, load_document, load_from_source, load_json, load_toml};
pub use model::*;
