//! Lead Funnel — quiz funnel controller + lead notification relay.

pub mod config;
pub mod error;
pub mod funnel;
pub mod notify;
pub mod store;
