// src/predictor.rs
//
// Threat & crowd predictor.
//
// A trained model bundle is preferred when one loads cleanly; otherwise the
// deterministic heuristic is used. Model state lives in an explicit
// `ModelHandle` owned by the predictor: it is initialised once, and a missing
// or corrupt artifact leaves it in degraded mode rather than failing.
//
// Bundle format (JSON):
//
//   {
//     "feature_names": ["score_diff", "minutes_remaining", ...],
//     "capacity": 68000,
//     "threat_model": { "kind": "linear", "intercept": 0.1, "coefficients": [...] },
//     "crowd_model":  { "kind": "tree_ensemble", "base_score": 0.5, "trees": [...] }
//   }

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ModelConfig;
use crate::error::{read_to_string, PipelineError};
use crate::features::{make_feature_vector, CorridorContext, FeatureVector, FEATURE_NAMES};
use crate::types::GameState;

/// Default artifact location when none is configured.
pub const DEFAULT_MODEL_PATH: &str = "models/egress_model.json";

/// Score differential at which the heuristic's score term saturates.
const HEURISTIC_DIFF_SCALE: f64 = 28.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        /// Taken when `x[feature] < threshold`.
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    /// Node 0 is the root.
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn predict(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        // A validated tree reaches a leaf in at most `nodes.len()` steps.
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { value }) => return *value,
                Some(TreeNode::Split { feature, threshold, left, right }) => {
                    let v = x.get(*feature).copied().unwrap_or(f64::NAN);
                    idx = if v < *threshold { *left } else { *right };
                }
                None => return f64::NAN,
            }
        }
        f64::NAN
    }

    fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split { feature, left, right, threshold } = node {
                if *feature >= n_features {
                    return Err(format!("node {i} references feature {feature}"));
                }
                // Children must point forward, which rules out cycles.
                if *left <= i || *right <= i || *left >= self.nodes.len() || *right >= self.nodes.len() {
                    return Err(format!("node {i} has invalid children"));
                }
                if !threshold.is_finite() {
                    return Err(format!("node {i} has non-finite threshold"));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Regressor {
    Linear {
        intercept: f64,
        coefficients: Vec<f64>,
    },
    /// Gradient-boosted trees: `base_score + sum(tree outputs)`.
    TreeEnsemble {
        base_score: f64,
        trees: Vec<RegressionTree>,
    },
}

impl Regressor {
    pub fn predict(&self, x: &[f64]) -> f64 {
        match self {
            Regressor::Linear { intercept, coefficients } => {
                intercept + coefficients.iter().zip(x).map(|(c, v)| c * v).sum::<f64>()
            }
            Regressor::TreeEnsemble { base_score, trees } => {
                base_score + trees.iter().map(|t| t.predict(x)).sum::<f64>()
            }
        }
    }

    fn validate(&self, n_features: usize) -> Result<(), String> {
        match self {
            Regressor::Linear { coefficients, intercept } => {
                if coefficients.len() != n_features {
                    return Err(format!(
                        "expected {n_features} coefficients, found {}",
                        coefficients.len()
                    ));
                }
                if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
                    return Err("non-finite coefficient".to_string());
                }
                Ok(())
            }
            Regressor::TreeEnsemble { trees, base_score } => {
                if !base_score.is_finite() {
                    return Err("non-finite base_score".to_string());
                }
                trees
                    .iter()
                    .enumerate()
                    .try_for_each(|(i, t)| t.validate(n_features).map_err(|e| format!("tree {i}: {e}")))
            }
        }
    }
}

fn default_capacity() -> u32 {
    68_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    pub feature_names: Vec<String>,
    pub threat_model: Regressor,
    pub crowd_model: Regressor,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
}

impl ModelBundle {
    pub fn from_json_file(path: &Path) -> Result<Self, PipelineError> {
        let contents = read_to_string(path)?;
        let bundle: ModelBundle =
            serde_json::from_str(&contents).map_err(|e| PipelineError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        bundle.validate()?;
        Ok(bundle)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.feature_names.is_empty() {
            return Err(PipelineError::invalid("model.feature_names", "empty"));
        }
        if let Some(unknown) = self
            .feature_names
            .iter()
            .find(|n| !FEATURE_NAMES.contains(&n.as_str()))
        {
            return Err(PipelineError::invalid(
                "model.feature_names",
                format!("unknown feature '{unknown}'"),
            ));
        }
        if self.capacity == 0 {
            return Err(PipelineError::invalid("model.capacity", "must be > 0"));
        }
        let n = self.feature_names.len();
        self.threat_model
            .validate(n)
            .map_err(|e| PipelineError::invalid("model.threat_model", e))?;
        self.crowd_model
            .validate(n)
            .map_err(|e| PipelineError::invalid("model.crowd_model", e))?;
        Ok(())
    }
}

/// Outcome of the one-time model initialisation.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelStatus {
    Loaded { source: String },
    Degraded { reason: String },
}

/// Owned model state. Degraded mode means heuristic-only.
#[derive(Debug, Clone)]
pub struct ModelHandle {
    bundle: Option<ModelBundle>,
    status: ModelStatus,
}

impl ModelHandle {
    /// No model: heuristic-only.
    pub fn heuristic() -> Self {
        Self {
            bundle: None,
            status: ModelStatus::Degraded {
                reason: "no model configured".to_string(),
            },
        }
    }

    pub fn from_bundle(bundle: ModelBundle) -> Result<Self, PipelineError> {
        bundle.validate()?;
        Ok(Self {
            bundle: Some(bundle),
            status: ModelStatus::Loaded {
                source: "<in-memory>".to_string(),
            },
        })
    }

    /// Try each candidate in order; the first existing path wins. Never fails.
    pub fn load(candidates: &[PathBuf]) -> Self {
        let Some(path) = candidates.iter().find(|p| p.exists()) else {
            let searched: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
            warn!(searched = ?searched, "no trained model found; using heuristic predictor");
            return Self {
                bundle: None,
                status: ModelStatus::Degraded {
                    reason: "no model artifact found".to_string(),
                },
            };
        };

        match ModelBundle::from_json_file(path) {
            Ok(bundle) => {
                info!(path = %path.display(), features = bundle.feature_names.len(), "loaded trained model");
                Self {
                    bundle: Some(bundle),
                    status: ModelStatus::Loaded {
                        source: path.display().to_string(),
                    },
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load model; using heuristic predictor");
                Self {
                    bundle: None,
                    status: ModelStatus::Degraded { reason: e.to_string() },
                }
            }
        }
    }

    pub fn from_config(cfg: &ModelConfig) -> Self {
        Self::load(&model_search_paths(cfg))
    }

    pub fn status(&self) -> &ModelStatus {
        &self.status
    }

    pub fn is_degraded(&self) -> bool {
        self.bundle.is_none()
    }

    pub fn bundle(&self) -> Option<&ModelBundle> {
        self.bundle.as_ref()
    }
}

/// Candidate model locations: the configured path, then the default.
pub fn model_search_paths(cfg: &ModelConfig) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = Vec::new();
    for p in cfg.path.iter().cloned().chain(std::iter::once(PathBuf::from(DEFAULT_MODEL_PATH))) {
        if !out.contains(&p) {
            out.push(p);
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub threat_score: f64,
    pub crowd_volume: u32,
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Rule-based prediction from score margin and time remaining.
pub fn heuristic_predict(features: &FeatureVector, capacity: u32) -> Prediction {
    let margin = features.score_diff.abs() / HEURISTIC_DIFF_SCALE;
    let elapsed = 1.0 - (features.minutes_remaining / 60.0).min(1.0);
    let threat = round3((margin + elapsed).min(1.0)).clamp(0.0, 1.0);
    let crowd = (threat * capacity as f64).round().clamp(0.0, capacity as f64) as u32;
    Prediction {
        threat_score: threat,
        crowd_volume: crowd,
    }
}

/// Pure function of (game state, corridor context) given its model handle.
#[derive(Debug, Clone)]
pub struct Predictor {
    handle: ModelHandle,
    capacity: u32,
}

impl Predictor {
    pub fn new(handle: ModelHandle, capacity: u32) -> Self {
        if let ModelStatus::Degraded { reason } = handle.status() {
            info!(reason = %reason, "predictor running in degraded (heuristic) mode");
        }
        Self { handle, capacity }
    }

    pub fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn predict(&self, game: &GameState, corridors: Option<&CorridorContext>) -> Prediction {
        let features = make_feature_vector(game, corridors);
        match self.handle.bundle() {
            None => heuristic_predict(&features, self.capacity),
            Some(bundle) => self
                .predict_with_model(bundle, &features)
                .unwrap_or_else(|| heuristic_predict(&features, self.capacity)),
        }
    }

    fn predict_with_model(&self, bundle: &ModelBundle, features: &FeatureVector) -> Option<Prediction> {
        let x = features.project(&bundle.feature_names)?;
        let threat_raw = bundle.threat_model.predict(&x);
        let crowd_raw = bundle.crowd_model.predict(&x);
        if !threat_raw.is_finite() || !crowd_raw.is_finite() {
            debug!(threat_raw, crowd_raw, "model produced non-finite output; heuristic used");
            return None;
        }
        let cap = bundle.capacity.min(self.capacity) as f64;
        Some(Prediction {
            threat_score: round3(threat_raw).clamp(0.0, 1.0),
            crowd_volume: crowd_raw.round().clamp(0.0, cap) as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GameSnapshot;

    fn game(quarter: u8, clock_secs: u32, home: u32, away: u32) -> GameState {
        GameState::InEvent(GameSnapshot {
            quarter,
            clock: String::new(),
            clock_seconds_remaining: clock_secs,
            home,
            away,
            score_diff: None,
            play: None,
            momentum_raw: None,
        })
    }

    fn linear_bundle(intercept: f64, coef_diff: f64) -> ModelBundle {
        ModelBundle {
            feature_names: vec!["score_diff".to_string(), "minutes_remaining".to_string()],
            threat_model: Regressor::Linear {
                intercept,
                coefficients: vec![coef_diff, 0.0],
            },
            crowd_model: Regressor::Linear {
                intercept: 1_000_000.0,
                coefficients: vec![0.0, 0.0],
            },
            capacity: 68_000,
        }
    }

    #[test]
    fn heuristic_calm_at_kickoff() {
        let p = Predictor::new(ModelHandle::heuristic(), 68_000);
        let out = p.predict(&game(1, 900, 0, 0), None);
        assert_eq!(out.threat_score, 0.0);
        assert_eq!(out.crowd_volume, 0);

        let out = p.predict(&GameState::NoActiveGame, None);
        assert_eq!(out.threat_score, 0.0);
    }

    #[test]
    fn heuristic_saturates_late_blowout() {
        let p = Predictor::new(ModelHandle::heuristic(), 68_000);
        let out = p.predict(&game(4, 0, 0, 30), None);
        assert_eq!(out.threat_score, 1.0);
        assert_eq!(out.crowd_volume, 68_000);
    }

    #[test]
    fn heuristic_rounds_to_three_places() {
        let p = Predictor::new(ModelHandle::heuristic(), 68_000);
        // 10/28 = 0.357142..., 45 minutes remaining adds 0.25.
        let out = p.predict(&game(2, 900, 10, 0), None);
        assert_eq!(out.threat_score, 0.607);
        assert_eq!(out.crowd_volume, (0.607_f64 * 68_000.0).round() as u32);
    }

    #[test]
    fn linear_model_is_clipped() {
        let handle = ModelHandle::from_bundle(linear_bundle(0.5, -1.0)).unwrap();
        let p = Predictor::new(handle, 68_000);
        let out = p.predict(&game(3, 0, 0, 20), None);
        assert_eq!(out.threat_score, 1.0);
        assert_eq!(out.crowd_volume, 68_000);
        let out = p.predict(&game(3, 0, 20, 0), None);
        assert_eq!(out.threat_score, 0.0);
    }

    #[test]
    fn tree_ensemble_predicts() {
        let tree = RegressionTree {
            nodes: vec![
                TreeNode::Split { feature: 0, threshold: -13.5, left: 1, right: 2 },
                TreeNode::Leaf { value: 0.6 },
                TreeNode::Leaf { value: 0.1 },
            ],
        };
        let r = Regressor::TreeEnsemble { base_score: 0.2, trees: vec![tree] };
        assert!((r.predict(&[-20.0, 0.0]) - 0.8).abs() < 1e-12);
        assert!((r.predict(&[0.0, 0.0]) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn backward_child_rejected() {
        let tree = RegressionTree {
            nodes: vec![
                TreeNode::Split { feature: 0, threshold: 0.0, left: 0, right: 1 },
                TreeNode::Leaf { value: 0.0 },
            ],
        };
        assert!(tree.validate(1).is_err());
    }

    #[test]
    fn unknown_feature_name_is_corrupt() {
        let mut b = linear_bundle(0.0, 0.0);
        b.feature_names[1] = "crowd_mood".to_string();
        assert!(ModelHandle::from_bundle(b).is_err());
    }

    #[test]
    fn missing_or_corrupt_artifact_degrades() {
        let h = ModelHandle::load(&[PathBuf::from("/nonexistent/model.json")]);
        assert!(h.is_degraded());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, "{ not json").unwrap();
        let h = ModelHandle::load(&[path]);
        assert!(h.is_degraded());
        assert!(matches!(h.status(), ModelStatus::Degraded { .. }));
    }

    #[test]
    fn loads_valid_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, serde_json::to_string(&linear_bundle(0.25, 0.0)).unwrap()).unwrap();
        let h = ModelHandle::load(&[PathBuf::from("/nope.json"), path]);
        assert!(!h.is_degraded());
        let p = Predictor::new(h, 68_000);
        assert_eq!(p.predict(&GameState::NoActiveGame, None).threat_score, 0.25);
    }

    #[test]
    fn search_paths_dedup() {
        let cfg = ModelConfig {
            path: Some(PathBuf::from(DEFAULT_MODEL_PATH)),
        };
        assert_eq!(model_search_paths(&cfg).len(), 1);
    }
}
