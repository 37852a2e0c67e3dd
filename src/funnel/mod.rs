//! Funnel controller — the quiz → analysis → gate → submit state machine.

pub mod controller;
pub mod model;
pub mod routes;
pub mod state;

pub use controller::{FunnelController, FunnelEvent};
pub use model::{LeadAnswers, LeadRecord, WizardStep, is_valid_phone};
pub use state::FunnelState;
