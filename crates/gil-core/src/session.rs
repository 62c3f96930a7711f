//! Assessment session orchestrator.
//!
//! Composes grading, BTS scoring and the IRT update for each submitted
//! response, applies the stopping rule and fetches the next case. A session
//! is strictly sequential; sessions of different users run concurrently and
//! only meet in the community store.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::bts::{BtsEngine, BtsInput};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::grading::{self, ReferenceFeedback};
use crate::irt::{IrtEngine, StopReason};
use crate::model::{
    AbilityProfile, BtsReport, BtsScore, DifferentialDiagnosis, Item, ResponseRecord,
};
use crate::statistics::{peer_comparison, PeerComparison};
use crate::traits::{CommunityStore, ItemBank, ProfileStore, Respondent, ResponseStore};

/// Lifecycle of an adaptive session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    /// Standard error target met.
    Converged,
    /// Item cap reached.
    ExhaustedMax,
    /// No eligible items left in the bank.
    ExhaustedBank,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Active)
    }

    /// Converged and item-cap completions count as successful.
    pub fn is_successful(&self) -> bool {
        matches!(self, SessionState::Converged | SessionState::ExhaustedMax)
    }
}

impl From<StopReason> for SessionState {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::Converged => SessionState::Converged,
            StopReason::MaxItems => SessionState::ExhaustedMax,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Active => write!(f, "active"),
            SessionState::Converged => write!(f, "converged"),
            SessionState::ExhaustedMax => write!(f, "exhausted_max"),
            SessionState::ExhaustedBank => write!(f, "exhausted_bank"),
        }
    }
}

/// A response as submitted by the clinician.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub case_id: String,
    pub differential: DifferentialDiagnosis,
    /// Self-assessment and peer prediction, if the clinician gave them.
    #[serde(default)]
    pub bts_report: Option<BtsReport>,
    /// Seconds spent on the case.
    pub time_spent: u32,
}

/// Ability movement caused by one response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompetenceUpdate {
    pub previous_theta: f64,
    pub new_theta: f64,
    pub standard_error: f64,
}

/// Everything shown to the clinician after a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackData {
    pub score: f64,
    pub bts_score: Option<BtsScore>,
    pub reference_differential: Vec<ReferenceFeedback>,
    pub peer_comparison: PeerComparison,
    pub competence_update: CompetenceUpdate,
}

/// Identity of the next case to present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextCase {
    pub id: String,
    pub difficulty: f64,
}

/// Result of [`AssessmentOrchestrator::submit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub response: ResponseRecord,
    pub feedback: FeedbackData,
    pub next_case: Option<NextCase>,
    pub state: SessionState,
}

/// One user's adaptive session in one domain.
#[derive(Debug, Clone)]
pub struct AssessmentSession {
    pub id: Uuid,
    pub user_id: String,
    pub domain: String,
    pub state: SessionState,
    /// Latest profile snapshot; final once the state is terminal.
    pub profile: AbilityProfile,
    /// The case awaiting a response, `None` once terminal.
    pub current_item: Option<Item>,
    pub items_administered: u32,
    pub started_at: DateTime<Utc>,
    answered_ids: HashSet<String>,
}

impl AssessmentSession {
    /// Case ids already presented in this session.
    pub fn answered_ids(&self) -> &HashSet<String> {
        &self.answered_ids
    }
}

/// Final record of a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub user_id: String,
    pub domain: String,
    pub state: SessionState,
    pub items_administered: u32,
    pub final_profile: AbilityProfile,
    pub responses: Vec<ResponseRecord>,
}

/// Stored profile next to a fresh fit of the user's whole history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileAudit {
    pub profile: AbilityProfile,
    pub responses: usize,
    pub refit_theta: f64,
    pub refit_standard_error: f64,
}

impl ProfileAudit {
    /// Distance between the incrementally updated theta and the refit.
    pub fn drift(&self) -> f64 {
        (self.profile.theta - self.refit_theta).abs()
    }
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_session_start(&self, user_id: &str, domain: &str);
    fn on_response(&self, user_id: &str, outcome: &SubmissionOutcome);
    fn on_session_complete(&self, summary: &SessionSummary);
    fn on_session_error(&self, user_id: &str, error: &str);
    fn on_cohort_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_session_start(&self, _: &str, _: &str) {}
    fn on_response(&self, _: &str, _: &SubmissionOutcome) {}
    fn on_session_complete(&self, _: &SessionSummary) {}
    fn on_session_error(&self, _: &str, _: &str) {}
    fn on_cohort_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
}

/// A respondent scheduled into a cohort run.
#[derive(Clone)]
pub struct Participant {
    pub user_id: String,
    pub domain: String,
    pub respondent: Arc<dyn Respondent>,
}

/// Drives adaptive sessions against the collaborator stores.
#[derive(Clone)]
pub struct AssessmentOrchestrator {
    items: Arc<dyn ItemBank>,
    profiles: Arc<dyn ProfileStore>,
    responses: Arc<dyn ResponseStore>,
    community: Arc<dyn CommunityStore>,
    config: Arc<EngineConfig>,
}

impl AssessmentOrchestrator {
    /// The configuration must already have passed [`EngineConfig::validate`].
    pub fn new(
        items: Arc<dyn ItemBank>,
        profiles: Arc<dyn ProfileStore>,
        responses: Arc<dyn ResponseStore>,
        community: Arc<dyn CommunityStore>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            items,
            profiles,
            responses,
            community,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open a session and select its first case.
    ///
    /// An empty bank yields a session already in `ExhaustedBank`.
    pub async fn start(&self, user_id: &str, domain: &str) -> Result<AssessmentSession> {
        let profile = self.profiles.load_profile(user_id, domain).await?;
        let answered_ids = HashSet::new();

        let (state, current_item) = match self.select_next(&profile, &answered_ids).await {
            Ok(item) => (SessionState::Active, Some(item)),
            Err(e) if is_exhausted_bank(&e) => {
                tracing::warn!(user = user_id, "{e}; session ends before the first case");
                (SessionState::ExhaustedBank, None)
            }
            Err(e) => return Err(e),
        };

        let session = AssessmentSession {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            domain: domain.to_string(),
            state,
            profile,
            current_item,
            items_administered: 0,
            started_at: Utc::now(),
            answered_ids,
        };
        tracing::info!(
            session = %session.id,
            user = user_id,
            domain,
            theta = session.profile.theta,
            "assessment session started"
        );
        Ok(session)
    }

    /// Score one response, update ability, and advance the session.
    ///
    /// Writes go out in the order response, profile, community sample, and
    /// the session itself changes only after all three succeed. A submission
    /// that fails before the response is appended can be retried as is.
    pub async fn submit(
        &self,
        session: &mut AssessmentSession,
        submission: Submission,
    ) -> Result<SubmissionOutcome> {
        let item = match (&session.state, &session.current_item) {
            (SessionState::Active, Some(item)) => item.clone(),
            _ => return Err(EngineError::SessionFinished(session.id).into()),
        };
        if submission.case_id != item.id {
            return Err(EngineError::UnexpectedCase {
                expected: item.id.clone(),
                got: submission.case_id,
            }
            .into());
        }

        let grade = grading::grade(
            &submission.differential,
            &item.reference_differential,
            &self.config.grading,
        );

        let bts_score = match submission.bts_report {
            Some(report) => self.score_peer_prediction(&item.id, report, grade.score).await?,
            None => None,
        };

        // Work on a copy so a failed write leaves the session untouched.
        let irt = IrtEngine::new(&self.config.irt);
        let now = Utc::now();
        let mut profile = session.profile.clone();
        let update = irt.apply_update(&mut profile, &item, grade.is_correct, now)?;

        let peer_scores: Vec<f64> = self
            .responses
            .responses_for_case(&item.id)
            .await?
            .iter()
            .filter(|r| r.user_id != session.user_id)
            .map(|r| r.score)
            .collect();

        let record = ResponseRecord {
            id: Uuid::new_v4(),
            case_id: item.id.clone(),
            user_id: session.user_id.clone(),
            domain: session.domain.clone(),
            differential: submission.differential,
            bts_report: submission.bts_report,
            time_spent: submission.time_spent,
            is_correct: grade.is_correct,
            score: grade.score,
            theta_estimate: update.theta,
            standard_error: update.standard_error,
            bts_score,
            created_at: now,
        };

        self.responses.append_response(&record).await?;
        self.profiles.save_profile(&profile).await?;
        if let Some(report) = submission.bts_report {
            self.community
                .record_sample(&item.id, report.own_assessment(), report.peer_prediction())
                .await?;
        }

        session.profile = profile;
        session.answered_ids.insert(item.id.clone());
        session.items_administered += 1;

        match irt.stop_reason(session.items_administered, session.profile.standard_error) {
            Some(reason) => {
                session.state = reason.into();
                session.current_item = None;
                tracing::info!(
                    session = %session.id,
                    state = %session.state,
                    theta = session.profile.theta,
                    se = session.profile.standard_error,
                    items = session.items_administered,
                    "assessment session finished"
                );
            }
            None => match self.select_next(&session.profile, &session.answered_ids).await {
                Ok(next) => session.current_item = Some(next),
                Err(e) if is_exhausted_bank(&e) => {
                    tracing::warn!(session = %session.id, "{e}; ending session early");
                    session.state = SessionState::ExhaustedBank;
                    session.current_item = None;
                }
                Err(e) => return Err(e),
            },
        }

        let next_case = session.current_item.as_ref().map(|i| NextCase {
            id: i.id.clone(),
            difficulty: i.parameters.difficulty,
        });

        Ok(SubmissionOutcome {
            feedback: FeedbackData {
                score: grade.score,
                bts_score,
                reference_differential: grade.reference,
                peer_comparison: peer_comparison(grade.score, &peer_scores),
                competence_update: CompetenceUpdate {
                    previous_theta: update.previous_theta,
                    new_theta: update.theta,
                    standard_error: update.standard_error,
                },
            },
            response: record,
            next_case,
            state: session.state,
        })
    }

    /// Score against the aggregate as it stood before this response. Too few
    /// samples defers the score. Nothing is recorded here.
    async fn score_peer_prediction(
        &self,
        case_id: &str,
        report: BtsReport,
        accuracy_score: f64,
    ) -> Result<Option<BtsScore>> {
        let stats = self.community.get_stats(case_id).await?;
        let input = BtsInput::new(report, accuracy_score)?;

        match BtsEngine::new(&self.config.bts).compute(&input, &stats) {
            Ok(score) => Ok(Some(score)),
            Err(e) if e.is_recoverable() => {
                tracing::debug!("bts scoring deferred: {e}");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Refit a user's ability from every stored response in the domain and
    /// set it next to the stored profile.
    ///
    /// Items are looked up by id, so retired cases still count. A response
    /// whose case is gone from the bank is a data integrity error.
    pub async fn audit_profile(&self, user_id: &str, domain: &str) -> Result<ProfileAudit> {
        let profile = self.profiles.load_profile(user_id, domain).await?;
        let history = self.responses.responses_for_user(user_id, domain).await?;

        let mut answered = Vec::with_capacity(history.len());
        for record in &history {
            let item = self.items.get_item(&record.case_id).await?.ok_or_else(|| {
                EngineError::data_integrity(&record.case_id, "case is missing from the item bank")
            })?;
            answered.push((item, record.is_correct));
        }
        let observations: Vec<(&Item, bool)> =
            answered.iter().map(|(item, correct)| (item, *correct)).collect();
        let (refit_theta, refit_standard_error) =
            IrtEngine::new(&self.config.irt).reestimate(&observations)?;

        let audit = ProfileAudit {
            profile,
            responses: history.len(),
            refit_theta,
            refit_standard_error,
        };
        tracing::debug!(
            user = user_id,
            domain,
            theta = audit.profile.theta,
            refit = audit.refit_theta,
            "profile audited"
        );
        Ok(audit)
    }

    async fn select_next(
        &self,
        profile: &AbilityProfile,
        answered_ids: &HashSet<String>,
    ) -> Result<Item> {
        let exclude: Vec<String> = answered_ids.iter().cloned().collect();
        let candidates = self
            .items
            .get_candidate_items(&profile.domain, &exclude)
            .await?;

        IrtEngine::new(&self.config.irt)
            .select_next_item(profile, &candidates, answered_ids)
            .cloned()
            .ok_or_else(|| {
                EngineError::ExhaustedBank {
                    domain: profile.domain.clone(),
                }
                .into()
            })
    }

    /// Run a whole session, asking `respondent` for each presented case.
    pub async fn run_session(
        &self,
        user_id: &str,
        domain: &str,
        respondent: &dyn Respondent,
        progress: &dyn ProgressReporter,
    ) -> Result<SessionSummary> {
        progress.on_session_start(user_id, domain);
        let mut session = self.start(user_id, domain).await?;
        let mut responses = Vec::new();

        while let Some(item) = session.current_item.clone() {
            let submission = respondent.respond(&item, &session.profile).await?;
            let outcome = self.submit(&mut session, submission).await?;
            progress.on_response(user_id, &outcome);
            responses.push(outcome.response);
        }

        let summary = SessionSummary {
            session_id: session.id,
            user_id: session.user_id,
            domain: session.domain,
            state: session.state,
            items_administered: session.items_administered,
            final_profile: session.profile,
            responses,
        };
        progress.on_session_complete(&summary);
        Ok(summary)
    }

    /// Run sessions for many participants with bounded concurrency.
    ///
    /// Failed sessions are reported through `progress` and left out of the
    /// returned summaries.
    pub async fn run_cohort(
        &self,
        participants: Vec<Participant>,
        parallelism: usize,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<SessionSummary>> {
        anyhow::ensure!(parallelism >= 1, "parallelism must be at least 1");

        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(parallelism));
        let total = participants.len();

        let mut futures = FuturesUnordered::new();
        for participant in participants {
            let semaphore = Arc::clone(&semaphore);
            futures.push(async move {
                let user_id = participant.user_id.clone();
                let inner = async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| anyhow::anyhow!("semaphore closed"))?;
                    self.run_session(
                        &participant.user_id,
                        &participant.domain,
                        participant.respondent.as_ref(),
                        progress,
                    )
                    .await
                };
                (user_id, inner.await)
            });
        }

        let mut summaries = Vec::with_capacity(total);
        let mut failed = 0usize;
        while let Some((user_id, result)) = futures.next().await {
            match result {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    match e.downcast_ref::<EngineError>() {
                        Some(engine) if engine.is_recoverable() => {
                            tracing::warn!("session stopped for {user_id}: {e:#}")
                        }
                        _ => tracing::error!("session failed for {user_id}: {e:#}"),
                    }
                    progress.on_session_error(&user_id, &e.to_string());
                    failed += 1;
                }
            }
        }

        progress.on_cohort_complete(total, summaries.len(), failed, start.elapsed());
        Ok(summaries)
    }
}

fn is_exhausted_bank(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::ExhaustedBank { .. })
    )
}
