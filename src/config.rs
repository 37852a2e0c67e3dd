//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Timing knobs for the funnel's scripted phases.
///
/// Injectable so tests can run the analysis script on paused time instead of
/// waiting out wall-clock delays.
#[derive(Debug, Clone, Copy)]
pub struct FunnelTiming {
    /// Interval between scripted analysis lines.
    pub analysis_tick: Duration,
    /// Settle delay between the last analysis line and the gate opening.
    pub gate_settle: Duration,
    /// Interval between social-proof ticker updates.
    pub social_proof_interval: Duration,
    /// Idle time after which an abandoned session is swept away.
    pub session_ttl: Duration,
}

impl Default for FunnelTiming {
    fn default() -> Self {
        Self {
            analysis_tick: Duration::from_millis(1200),
            gate_settle: Duration::from_millis(800),
            social_proof_interval: Duration::from_secs(3),
            session_ttl: Duration::from_secs(30 * 60), // 30 minutes
        }
    }
}

impl FunnelTiming {
    /// Near-instant timings for tests that drive the funnel end to end.
    pub fn fast() -> Self {
        Self {
            analysis_tick: Duration::from_millis(5),
            gate_settle: Duration::from_millis(2),
            social_proof_interval: Duration::from_millis(20),
            session_ttl: Duration::from_millis(500),
        }
    }
}

/// Relay configuration, built from environment variables.
#[derive(Clone)]
pub struct RelayConfig {
    /// PushPlus credential. `None` means the relay endpoint answers every
    /// request with a configuration error but the server still starts.
    pub push_token: Option<SecretString>,
}

impl RelayConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Self {
        let push_token = std::env::var("PUSHPLUS_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::from);

        Self { push_token }
    }
}

/// Timeout applied to both outbound HTTP clients (Supabase, PushPlus).
///
/// The reference leaves the transport default in place; a bounded timeout is
/// the deliberate choice here so a dead upstream cannot pin a submission.
pub const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(10);

/// Port the server listens on when `LEAD_FUNNEL_PORT` is unset.
pub const DEFAULT_PORT: u16 = 8080;

/// Port to bind, from `LEAD_FUNNEL_PORT`. An unparseable value is a startup
/// error rather than a silent fallback.
pub fn server_port() -> Result<u16, ConfigError> {
    parse_port(std::env::var("LEAD_FUNNEL_PORT").ok())
}

fn parse_port(raw: Option<String>) -> Result<u16, ConfigError> {
    match raw {
        None => Ok(DEFAULT_PORT),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: "LEAD_FUNNEL_PORT".to_string(),
            message: format!("{raw:?} is not a valid port"),
        }),
    }
}
