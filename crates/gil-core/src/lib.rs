//! gil-core: Adaptive ability estimation and peer-prediction scoring.
//!
//! This crate defines the data model, the IRT and Bayesian Truth Serum
//! engines, grading, and the session orchestrator that composes them over
//! the collaborator traits in [`traits`].

pub mod bts;
pub mod config;
pub mod error;
pub mod grading;
pub mod irt;
pub mod model;
pub mod parser;
pub mod report;
pub mod session;
pub mod statistics;
pub mod traits;

pub use config::EngineConfig;
pub use error::EngineError;
