//! Prometheus metrics
//!
//! One `Metrics` instance owns its registry, so tests can construct
//! instances freely without global-registry collisions. Recording never
//! fails a request: counters are infallible once registered.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::{AppError, AppResult};

/// Which public operation a request used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Complete,
    Stream,
}

impl RequestMode {
    fn as_label(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Stream => "stream",
        }
    }
}

pub struct Metrics {
    registry: Registry,
    requests_total: IntCounterVec,
    retries_total: IntCounter,
    fallbacks_total: IntCounter,
    continuations_total: IntCounter,
    roster_exhausted_total: IntCounter,
}

impl Metrics {
    pub fn new() -> AppResult<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("modelrelay_requests_total", "Requests received, by mode"),
            &["mode"],
        )
        .map_err(internal)?;
        let retries_total = IntCounter::new(
            "modelrelay_retries_total",
            "Transient-failure retries on the same model",
        )
        .map_err(internal)?;
        let fallbacks_total = IntCounter::new(
            "modelrelay_fallbacks_total",
            "Times a request moved to the next model in the roster",
        )
        .map_err(internal)?;
        let continuations_total = IntCounter::new(
            "modelrelay_continuations_total",
            "Continuation turns issued after length-capped finishes",
        )
        .map_err(internal)?;
        let roster_exhausted_total = IntCounter::new(
            "modelrelay_roster_exhausted_total",
            "Requests that failed because every model was exhausted",
        )
        .map_err(internal)?;

        registry
            .register(Box::new(requests_total.clone()))
            .map_err(internal)?;
        registry
            .register(Box::new(retries_total.clone()))
            .map_err(internal)?;
        registry
            .register(Box::new(fallbacks_total.clone()))
            .map_err(internal)?;
        registry
            .register(Box::new(continuations_total.clone()))
            .map_err(internal)?;
        registry
            .register(Box::new(roster_exhausted_total.clone()))
            .map_err(internal)?;

        Ok(Self {
            registry,
            requests_total,
            retries_total,
            fallbacks_total,
            continuations_total,
            roster_exhausted_total,
        })
    }

    pub fn record_request(&self, mode: RequestMode) {
        self.requests_total
            .with_label_values(&[mode.as_label()])
            .inc();
    }

    pub fn record_retry(&self) {
        self.retries_total.inc();
    }

    pub fn record_fallback(&self) {
        self.fallbacks_total.inc();
    }

    pub fn record_continuation(&self) {
        self.continuations_total.inc();
    }

    pub fn record_roster_exhausted(&self) {
        self.roster_exhausted_total.inc();
    }

    /// Current continuation-turn count (used by tests and the health view).
    pub fn continuations_count(&self) -> u64 {
        self.continuations_total.get()
    }

    pub fn fallbacks_count(&self) -> u64 {
        self.fallbacks_total.get()
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn render(&self) -> AppResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(internal)?;
        String::from_utf8(buffer)
            .map_err(|err| AppError::Internal(format!("metrics were not valid UTF-8: {err}")))
    }
}

fn internal(err: impl std::fmt::Display) -> AppError {
    AppError::Internal(format!("metrics setup failed: {err}"))
}
