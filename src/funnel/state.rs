//! Funnel state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::funnel::model::WizardStep;

/// State of one visitor session.
///
/// The sequence is linear: `Landing → Wizard(Grade) → Wizard(Gpa) →
/// Wizard(Country) → Analyzing → Gate → Submitting → Success`. A failed
/// submission rolls back to `Gate` so the visitor can retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum FunnelState {
    /// Landing page, nothing collected yet.
    Landing,
    /// One of the three quiz questions is on screen.
    Wizard { step: WizardStep },
    /// Scripted analysis animation is running; not user-cancellable.
    Analyzing,
    /// Result is withheld pending contact info.
    Gate,
    /// Insert call is in flight. Doubles as the single-submission guard.
    Submitting,
    /// Lead persisted. Terminal.
    Success,
}

impl FunnelState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: FunnelState) -> bool {
        use FunnelState::*;

        match (*self, target) {
            (Landing, Wizard { step }) => step == WizardStep::Grade,
            (Wizard { step }, Wizard { step: next }) => step.next() == Some(next),
            (Wizard { step }, Analyzing) => step == WizardStep::Country,
            (Analyzing, Gate) => true,
            (Gate, Submitting) => true,
            // Submit outcome: success is terminal, failure re-opens the gate
            (Submitting, Success) | (Submitting, Gate) => true,
            _ => false,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Check if a submission is currently in flight.
    pub fn is_submitting(&self) -> bool {
        matches!(self, Self::Submitting)
    }
}

impl std::fmt::Display for FunnelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Landing => write!(f, "landing"),
            Self::Wizard { step } => write!(f, "wizard_{step}"),
            Self::Analyzing => write!(f, "analyzing"),
            Self::Gate => write!(f, "gate"),
            Self::Submitting => write!(f, "submitting"),
            Self::Success => write!(f, "success"),
        }
    }
}

/// A recorded state transition.
#[derive(Debug, Clone, Serialize)]
pub struct StateTransition {
    pub from: FunnelState,
    pub to: FunnelState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}
