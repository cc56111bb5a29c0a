// src/routing/fallback.rs
//
// Deterministic rule-based routing, always available.

use crate::types::Severity;

use super::{RoutingContext, RoutingDecision, RoutingStrategy};

pub const CALM_MESSAGE: &str = "Crowd conditions stable.";
pub const ELEVATED_MESSAGE: &str =
    "Crowd Crush Risk elevated. Redirect passengers to alternate corridors.";

/// Calm below the threshold; otherwise the first catalog route is flagged
/// dangerous and the next two are recommended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackStrategy {
    threshold: f64,
}

impl FallbackStrategy {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn is_elevated(&self, threat_score: f64) -> bool {
        threat_score >= self.threshold
    }
}

impl RoutingStrategy for FallbackStrategy {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn decide(&self, ctx: &RoutingContext<'_>) -> RoutingDecision {
        if !self.is_elevated(ctx.threat_score) {
            return RoutingDecision {
                danger_routes: Vec::new(),
                safe_routes: Vec::new(),
                alert_message: CALM_MESSAGE.to_string(),
                severity: Severity::CALM,
            };
        }
        let routes = ctx.catalog.routes();
        RoutingDecision {
            danger_routes: routes.iter().take(1).cloned().collect(),
            safe_routes: routes.iter().skip(1).take(2).cloned().collect(),
            alert_message: ELEVATED_MESSAGE.to_string(),
            severity: Severity::ELEVATED,
        }
    }
}
