//! Funnel controller — owns one visitor session and sequences it from the
//! landing page through the quiz, the scripted analysis, the contact gate,
//! and submission.
//!
//! Architecture:
//! - All mutable session state lives behind one `RwLock`; handlers and the
//!   timer tasks contend on it briefly and never hold it across I/O.
//! - The scripted analysis and the social-proof ticker run as spawned tasks
//!   whose `JoinHandle`s are kept so `shutdown()` can abort them — no
//!   dangling timers after the session is torn down.
//! - The lead store is injected as `Arc<dyn LeadStore>` so tests substitute
//!   a stub; nothing in here talks to a concrete backend.

use std::sync::Arc;

use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::FunnelTiming;
use crate::error::FunnelError;
use crate::funnel::model::{LeadAnswers, LeadRecord, WizardStep, is_valid_phone};
use crate::funnel::state::{FunnelState, StateTransition};
use crate::store::LeadStore;

/// The five scripted analysis lines, shown one per tick. Cosmetic only —
/// they carry no information and are never retried.
pub const ANALYSIS_SCRIPT: [&str; 5] = [
    "正在连接 2026 全球院校数据库...",
    "正在比对 2025 vs 2026 录取政策差异...",
    "警告：检测到热门专业录取率大幅波动...",
    "正在计算您的最终胜率...",
    "报告已生成。",
];

/// Rotating social-proof lines, re-picked at random on every ticker tick.
pub const SOCIAL_PROOF_LINES: [&str; 4] = [
    "139****1234 刚刚获取了香港大学预测报告",
    "186****5678 刚刚获取了哥伦比亚大学预测报告",
    "135****9999 刚刚获取了NUS预测报告",
    "150****3321 刚刚解锁了考研胜率分析",
];

/// Line displayed before the ticker's first tick.
pub const SOCIAL_PROOF_INITIAL: &str = "138****8821 刚刚获取了英国名校报告";

/// Events broadcast to whatever frontend transport is attached.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FunnelEvent {
    AnalysisLine { text: String },
    GateOpened,
    SocialProof { text: String },
    Submitted,
}

/// Read-only view of the session for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: FunnelState,
    pub answers: LeadAnswers,
    pub phone: Option<String>,
    pub analysis_line: Option<String>,
    pub social_proof: String,
}

struct SessionInner {
    state: FunnelState,
    answers: LeadAnswers,
    phone: Option<String>,
    analysis_line: Option<String>,
    social_proof: String,
    transitions: Vec<StateTransition>,
    /// Bumped on every entry into `Analyzing`; a script task only acts while
    /// its own run is current, so a stale task from before a reset is inert.
    analysis_run: u64,
}

impl SessionInner {
    fn new() -> Self {
        Self {
            state: FunnelState::Landing,
            answers: LeadAnswers::default(),
            phone: None,
            analysis_line: None,
            social_proof: SOCIAL_PROOF_INITIAL.to_string(),
            transitions: Vec::new(),
            analysis_run: 0,
        }
    }

    fn transition_to(
        &mut self,
        target: FunnelState,
        reason: Option<String>,
    ) -> Result<(), FunnelError> {
        if !self.state.can_transition_to(target) {
            return Err(FunnelError::InvalidTransition {
                from: self.state.to_string(),
                to: target.to_string(),
            });
        }
        self.transitions.push(StateTransition {
            from: self.state,
            to: target,
            timestamp: chrono::Utc::now(),
            reason,
        });
        self.state = target;
        Ok(())
    }
}

/// Drives one visitor session. Cheap to share as `Arc<FunnelController>`.
pub struct FunnelController {
    inner: Arc<RwLock<SessionInner>>,
    timing: FunnelTiming,
    store: Arc<dyn LeadStore>,
    events: broadcast::Sender<FunnelEvent>,
    /// Timer tasks (analysis script, social-proof ticker), aborted on shutdown.
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl FunnelController {
    /// Create a controller in the `Landing` state.
    pub fn new(store: Arc<dyn LeadStore>, timing: FunnelTiming) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(RwLock::new(SessionInner::new())),
            timing,
            store,
            events,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to session events. Safe to call any number of times.
    pub fn subscribe(&self) -> broadcast::Receiver<FunnelEvent> {
        self.events.subscribe()
    }

    /// Current state.
    pub async fn state(&self) -> FunnelState {
        self.inner.read().await.state
    }

    /// Snapshot for API responses.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.read().await;
        SessionSnapshot {
            state: inner.state,
            answers: inner.answers.clone(),
            phone: inner.phone.clone(),
            analysis_line: inner.analysis_line.clone(),
            social_proof: inner.social_proof.clone(),
        }
    }

    /// Transition history, oldest first.
    pub async fn history(&self) -> Vec<StateTransition> {
        self.inner.read().await.transitions.clone()
    }

    /// Leave the landing page: `Landing → Wizard(Grade)`.
    pub async fn begin(&self) -> Result<FunnelState, FunnelError> {
        let mut inner = self.inner.write().await;
        inner.transition_to(
            FunnelState::Wizard {
                step: WizardStep::first(),
            },
            None,
        )?;
        Ok(inner.state)
    }

    /// Answer the question currently on screen.
    ///
    /// Records the option under the step's key and advances to the next
    /// question; the final (country) answer transitions to `Analyzing` and
    /// starts the scripted analysis task.
    pub async fn choose(&self, option: &str) -> Result<FunnelState, FunnelError> {
        let (state, run) = {
            let mut inner = self.inner.write().await;
            let FunnelState::Wizard { step } = inner.state else {
                return Err(FunnelError::InvalidTransition {
                    from: inner.state.to_string(),
                    to: "wizard".to_string(),
                });
            };
            inner.answers.record(step, option)?;

            let target = match step.next() {
                Some(next) => FunnelState::Wizard { step: next },
                None => FunnelState::Analyzing,
            };
            inner.transition_to(target, Some(format!("answered {step}")))?;

            let run = if inner.state == FunnelState::Analyzing {
                inner.analysis_run += 1;
                Some(inner.analysis_run)
            } else {
                None
            };
            (inner.state, run)
        };

        if let Some(run) = run {
            let handle = self.spawn_analysis_script(run);
            self.tasks.lock().await.push(handle);
        }
        Ok(state)
    }

    /// Submit the captured phone number and persist the lead.
    ///
    /// Precondition: state is `Gate` and the phone matches the 11-digit
    /// mobile format; an invalid phone fails synchronously with zero network
    /// calls. The `Submitting` state doubles as the in-flight guard: a second
    /// submit while one is outstanding gets `SubmissionInFlight` and does not
    /// issue a second insert. Failure reopens the gate for a manual retry.
    pub async fn submit(&self, phone: &str) -> Result<FunnelState, FunnelError> {
        let record = {
            let mut inner = self.inner.write().await;
            if inner.state.is_submitting() {
                return Err(FunnelError::SubmissionInFlight);
            }
            if inner.state != FunnelState::Gate {
                return Err(FunnelError::InvalidTransition {
                    from: inner.state.to_string(),
                    to: FunnelState::Submitting.to_string(),
                });
            }
            if !is_valid_phone(phone) {
                return Err(FunnelError::InvalidPhone);
            }
            let record = LeadRecord::new(phone, &inner.answers)
                .ok_or(FunnelError::IncompleteAnswers)?;
            inner.phone = Some(phone.to_string());
            inner.transition_to(FunnelState::Submitting, None)?;
            record
        };

        // The only blocking I/O in the funnel; the lock is not held here.
        let result = self.store.insert_lead(&record).await;

        let mut inner = self.inner.write().await;
        match result {
            Ok(()) => {
                inner.transition_to(FunnelState::Success, Some("lead persisted".to_string()))?;
                info!(country = %record.target_country, "lead captured");
                let _ = self.events.send(FunnelEvent::Submitted);
                Ok(inner.state)
            }
            Err(e) => {
                warn!(error = %e, "lead insert failed; reopening gate");
                inner.transition_to(FunnelState::Gate, Some("insert failed".to_string()))?;
                Err(FunnelError::Store(e))
            }
        }
    }

    /// Restart the funnel: clear answers and phone, return to `Landing`.
    /// Rejected while a submission is in flight. A running analysis script
    /// notices the state change and stops on its own.
    pub async fn reset(&self) -> Result<(), FunnelError> {
        let mut inner = self.inner.write().await;
        if inner.state.is_submitting() {
            return Err(FunnelError::ResetWhileSubmitting);
        }
        debug!(from = %inner.state, "session reset");
        inner.state = FunnelState::Landing;
        inner.answers.clear();
        inner.phone = None;
        inner.analysis_line = None;
        Ok(())
    }

    /// Start the rotating social-proof ticker for this session. Runs until
    /// `shutdown()`, independent of the funnel state.
    pub async fn start_social_proof(&self) {
        let inner = Arc::clone(&self.inner);
        let events = self.events.clone();
        let interval = self.timing.social_proof_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Skip immediate first tick
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let line = {
                    let mut rng = rand::thread_rng();
                    *SOCIAL_PROOF_LINES
                        .choose(&mut rng)
                        .unwrap_or(&SOCIAL_PROOF_INITIAL)
                };
                inner.write().await.social_proof = line.to_string();
                let _ = events.send(FunnelEvent::SocialProof {
                    text: line.to_string(),
                });
            }
        });
        self.tasks.lock().await.push(handle);
    }

    /// Abort all timer tasks. Call on teardown/navigation.
    pub async fn shutdown(&self) {
        for handle in self.tasks.lock().await.drain(..) {
            handle.abort();
        }
    }

    /// Spawn the scripted analysis: one line per tick, a settle delay after
    /// the last line, then the automatic `Analyzing → Gate` transition.
    ///
    /// `run` pins the task to the `Analyzing` entry that spawned it; if the
    /// session is reset and the wizard re-run, the superseded task sees a
    /// newer run and stops instead of racing the fresh script.
    fn spawn_analysis_script(&self, run: u64) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let events = self.events.clone();
        let timing = self.timing;

        tokio::spawn(async move {
            for line in ANALYSIS_SCRIPT {
                tokio::time::sleep(timing.analysis_tick).await;
                {
                    let mut session = inner.write().await;
                    if session.state != FunnelState::Analyzing || session.analysis_run != run {
                        debug!(run, "analysis script stopped: run superseded");
                        return;
                    }
                    session.analysis_line = Some(line.to_string());
                }
                let _ = events.send(FunnelEvent::AnalysisLine {
                    text: line.to_string(),
                });
            }

            tokio::time::sleep(timing.gate_settle).await;
            let mut session = inner.write().await;
            if session.state != FunnelState::Analyzing || session.analysis_run != run {
                debug!(run, "gate transition skipped: run superseded");
                return;
            }
            match session.transition_to(FunnelState::Gate, Some("analysis complete".to_string()))
            {
                Ok(()) => {
                    drop(session);
                    let _ = events.send(FunnelEvent::GateOpened);
                }
                Err(e) => debug!(error = %e, "gate transition skipped"),
            }
        })
    }
}
