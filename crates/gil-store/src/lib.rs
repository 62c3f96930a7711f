//! gil-store: in-memory collaborators for the gil assessment engine.
//!
//! Implements the item bank, profile, response and community store traits
//! from `gil-core`, plus a simulated respondent for cohort runs.

pub mod community;
pub mod error;
pub mod item_bank;
pub mod profiles;
pub mod responses;
pub mod simulated;

pub use community::InMemoryCommunityStore;
pub use error::StoreError;
pub use item_bank::InMemoryItemBank;
pub use profiles::InMemoryProfileStore;
pub use responses::InMemoryResponseStore;
pub use simulated::SimulatedRespondent;
