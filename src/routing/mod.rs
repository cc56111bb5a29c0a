// src/routing/mod.rs
//
// Routing decision engine.
//
// A routing decision is produced only for minutes whose threat is at or above
// the routing threshold. The strategy (advisory service or deterministic
// fallback) is chosen once at construction and reused for every minute.
// Every decision leaving the engine satisfies two invariants:
//   - every route id exists in the catalog
//   - no route id is both dangerous and safe

pub mod advisory;
pub mod fallback;

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::RouteCatalog;
use crate::config::Config;
use crate::types::{GameState, Minute, Route, RoutingDecisionRecord, Severity};

pub use advisory::{AdvisoryClient, AdvisoryError, AdvisoryStrategy, ChatMessage, HttpAdvisoryClient};
pub use fallback::FallbackStrategy;

/// Live context for one minute.
#[derive(Debug, Clone)]
pub struct RoutingContext<'a> {
    pub threat_score: f64,
    pub crowd_volume: u32,
    pub game_state: &'a GameState,
    pub transit_loads: BTreeMap<String, u32>,
    pub pedestrian_volume: BTreeMap<String, u32>,
    pub catalog: &'a RouteCatalog,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutingDecision {
    pub danger_routes: Vec<Route>,
    pub safe_routes: Vec<Route>,
    pub alert_message: String,
    pub severity: Severity,
}

impl RoutingDecision {
    pub fn into_record(self, scenario_id: &str, minute: Minute) -> RoutingDecisionRecord {
        RoutingDecisionRecord {
            scenario_id: scenario_id.to_string(),
            minute,
            danger_routes: self.danger_routes,
            safe_routes: self.safe_routes,
            alert_message: self.alert_message,
            severity: self.severity,
        }
    }
}

/// Why a proposed decision was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationFailure {
    #[error("route ids {0:?} are not in the catalog")]
    UnknownRoutes(Vec<String>),

    #[error("route ids {0:?} appear in both danger and safe")]
    OverlappingRoutes(Vec<String>),

    #[error("severity {0} outside [1, 5]")]
    SeverityOutOfRange(i64),

    #[error("malformed decision: {0}")]
    Malformed(String),
}

impl ValidationFailure {
    /// Correction sent back to the advisory service before a retry.
    pub fn correction_message(&self) -> String {
        match self {
            ValidationFailure::UnknownRoutes(ids) => format!(
                "Route ids {ids:?} are not in available_routes. Only use routes from the provided list."
            ),
            ValidationFailure::OverlappingRoutes(ids) => format!(
                "Route ids {ids:?} appear in both danger and safe. A route cannot be both dangerous and safe."
            ),
            ValidationFailure::SeverityOutOfRange(s) => {
                format!("Severity {s} is invalid. Severity must be an integer from 1 to 5.")
            }
            ValidationFailure::Malformed(msg) => format!(
                "The response could not be parsed ({msg}). Reply with a single JSON object with keys \
                 danger_routes, safe_routes, alert_message and severity."
            ),
        }
    }
}

/// Route as returned by the advisory service. Only the id is trusted.
#[derive(Debug, Clone, Deserialize)]
struct RouteRef {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ProposedDecision {
    #[serde(default)]
    danger_routes: Vec<RouteRef>,
    #[serde(default)]
    safe_routes: Vec<RouteRef>,
    #[serde(default)]
    alert_message: String,
    severity: i64,
}

fn check_ids<'a>(
    danger: impl Iterator<Item = &'a str> + Clone,
    safe: impl Iterator<Item = &'a str> + Clone,
    catalog: &RouteCatalog,
) -> Result<(), ValidationFailure> {
    let unknown: Vec<String> = danger
        .clone()
        .chain(safe.clone())
        .filter(|id| !catalog.contains(id))
        .map(str::to_string)
        .collect();
    if !unknown.is_empty() {
        return Err(ValidationFailure::UnknownRoutes(unknown));
    }
    let danger_ids: BTreeSet<&str> = danger.collect();
    let overlap: Vec<String> = safe
        .filter(|id| danger_ids.contains(id))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if !overlap.is_empty() {
        return Err(ValidationFailure::OverlappingRoutes(overlap));
    }
    Ok(())
}

/// Parse and validate an advisory payload, resolving route ids to the
/// verbatim catalog entries.
pub fn validate_payload(content: &str, catalog: &RouteCatalog) -> Result<RoutingDecision, ValidationFailure> {
    let proposed: ProposedDecision =
        serde_json::from_str(content).map_err(|e| ValidationFailure::Malformed(e.to_string()))?;

    check_ids(
        proposed.danger_routes.iter().map(|r| r.id.as_str()),
        proposed.safe_routes.iter().map(|r| r.id.as_str()),
        catalog,
    )?;

    let severity = u8::try_from(proposed.severity)
        .ok()
        .and_then(Severity::new)
        .ok_or(ValidationFailure::SeverityOutOfRange(proposed.severity))?;

    let alert_message = proposed.alert_message.trim().to_string();
    if alert_message.is_empty() {
        return Err(ValidationFailure::Malformed("alert_message is empty".to_string()));
    }

    let resolve = |refs: &[RouteRef]| -> Vec<Route> {
        refs.iter()
            .filter_map(|r| catalog.get(&r.id).cloned())
            .collect()
    };

    Ok(RoutingDecision {
        danger_routes: resolve(&proposed.danger_routes),
        safe_routes: resolve(&proposed.safe_routes),
        alert_message,
        severity,
    })
}

/// Check both route invariants on an already-built decision.
pub fn validate_decision(decision: &RoutingDecision, catalog: &RouteCatalog) -> Result<(), ValidationFailure> {
    check_ids(
        decision.danger_routes.iter().map(|r| r.id.as_str()),
        decision.safe_routes.iter().map(|r| r.id.as_str()),
        catalog,
    )?;
    // Catalog entries are copied verbatim, never edited.
    let edited: Vec<String> = decision
        .danger_routes
        .iter()
        .chain(&decision.safe_routes)
        .filter(|r| catalog.get(&r.id) != Some(*r))
        .map(|r| r.id.clone())
        .collect();
    if !edited.is_empty() {
        return Err(ValidationFailure::Malformed(format!(
            "routes {edited:?} differ from their catalog entries"
        )));
    }
    Ok(())
}

/// Strategy interface shared by the advisory and fallback implementations.
pub trait RoutingStrategy {
    fn name(&self) -> &'static str;

    /// Always returns a complete decision; failures are handled internally.
    fn decide(&self, ctx: &RoutingContext<'_>) -> RoutingDecision;
}

pub struct RoutingEngine {
    strategy: Box<dyn RoutingStrategy>,
    fallback: FallbackStrategy,
    threshold: f64,
}

impl RoutingEngine {
    pub fn new(strategy: Box<dyn RoutingStrategy>, threshold: f64) -> Self {
        Self {
            strategy,
            fallback: FallbackStrategy::new(threshold),
            threshold,
        }
    }

    pub fn fallback_only(threshold: f64) -> Self {
        Self::new(Box::new(FallbackStrategy::new(threshold)), threshold)
    }

    /// Pick the advisory strategy when credentials are configured.
    pub fn from_config(cfg: &Config) -> Self {
        let threshold = cfg.routing.threshold;
        if !cfg.advisory.is_configured() {
            info!("advisory service not configured; using fallback routing");
            return Self::fallback_only(threshold);
        }
        match HttpAdvisoryClient::new(&cfg.advisory) {
            Ok(client) => {
                info!(
                    base_url = %cfg.advisory.base_url,
                    model = %cfg.advisory.model,
                    "using advisory routing strategy"
                );
                let strategy = AdvisoryStrategy::new(
                    client,
                    FallbackStrategy::new(threshold),
                    cfg.routing.max_advisory_retries,
                );
                Self::new(Box::new(strategy), threshold)
            }
            Err(e) => {
                warn!(error = %e, "advisory client unavailable; using fallback routing");
                Self::fallback_only(threshold)
            }
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Routing is triggered at or above the threshold.
    pub fn is_triggered(&self, threat_score: f64) -> bool {
        threat_score >= self.threshold
    }

    /// `None` when routing is not triggered for this minute.
    pub fn decide(&self, ctx: &RoutingContext<'_>) -> Option<RoutingDecision> {
        if !self.is_triggered(ctx.threat_score) {
            return None;
        }
        let decision = self.strategy.decide(ctx);
        match validate_decision(&decision, ctx.catalog) {
            Ok(()) => Some(decision),
            Err(reason) => {
                warn!(
                    strategy = self.strategy.name(),
                    reason = %reason,
                    "decision failed validation; using fallback"
                );
                Some(self.fallback.decide(ctx))
            }
        }
    }
}
