//! Collaborator contracts consumed by the session orchestrator.
//!
//! Persistence and content authoring live outside the core. These async
//! traits are implemented by `gil-store` (in memory) and by whatever
//! database layer a deployment provides.

use async_trait::async_trait;

use crate::model::{AbilityProfile, CommunityStatistic, Item, ResponseRecord};
use crate::session::Submission;

// ---------------------------------------------------------------------------
// Item bank
// ---------------------------------------------------------------------------

/// Read-only source of calibrated clinical cases.
#[async_trait]
pub trait ItemBank: Send + Sync {
    /// Items in `domain` whose id is not in `exclude_ids`.
    async fn get_candidate_items(
        &self,
        domain: &str,
        exclude_ids: &[String],
    ) -> anyhow::Result<Vec<Item>>;

    /// Look up a single item by id.
    async fn get_item(&self, id: &str) -> anyhow::Result<Option<Item>>;
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// Ability profiles keyed by (user, domain).
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Load a profile, creating the default prior if none exists.
    async fn load_profile(&self, user_id: &str, domain: &str) -> anyhow::Result<AbilityProfile>;

    async fn save_profile(&self, profile: &AbilityProfile) -> anyhow::Result<()>;
}

/// Append-only response history.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    async fn append_response(&self, record: &ResponseRecord) -> anyhow::Result<()>;

    /// All responses recorded for a case, oldest first.
    async fn responses_for_case(&self, case_id: &str) -> anyhow::Result<Vec<ResponseRecord>>;

    /// A user's responses within one domain, oldest first.
    async fn responses_for_user(
        &self,
        user_id: &str,
        domain: &str,
    ) -> anyhow::Result<Vec<ResponseRecord>>;
}

/// Shared per-case community aggregates.
///
/// `record_sample` must be atomic with respect to `get_stats`: a reader
/// never observes a sample count that disagrees with the average.
#[async_trait]
pub trait CommunityStore: Send + Sync {
    /// Current aggregate; an empty statistic if the case has no samples.
    async fn get_stats(&self, case_id: &str) -> anyhow::Result<CommunityStatistic>;

    /// Fold one sample into the aggregate and return the new snapshot.
    async fn record_sample(
        &self,
        case_id: &str,
        own_assessment: f64,
        peer_prediction: f64,
    ) -> anyhow::Result<CommunityStatistic>;
}

// ---------------------------------------------------------------------------
// Respondent
// ---------------------------------------------------------------------------

/// Anything that answers presented cases: a UI bridge, a replay, a simulator.
#[async_trait]
pub trait Respondent: Send + Sync {
    /// Produce a submission for the presented item.
    async fn respond(&self, item: &Item, profile: &AbilityProfile) -> anyhow::Result<Submission>;
}
