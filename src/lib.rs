//! Modelrelay - resilient LLM request orchestration
//!
//! Turns an unreliable, rate-limited, length-capped text-generation
//! provider into a dependable request/response and request/stream service:
//! ordered model fallback, bounded-backoff retries, transparent
//! continuation of length-capped generations, and overlap deduplication at
//! continuation boundaries.

pub mod backoff;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod orchestrator;
pub mod provider;
pub mod roster;
pub mod telemetry;
