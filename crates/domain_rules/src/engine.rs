//! Business rules engine
//!
//! Loads the rules for a category through the [`RuleStore`] collaborator,
//! evaluates each rule's condition tree, and consolidates the actions of
//! matched rules into a ranked recommendation.
//!
//! # Evaluation order
//!
//! Rules are evaluated in storage order, not priority order. Priority only
//! decides action tie-breaking and the confidence weighting; changing this
//! would alter observable recommendations, so it is covered by tests.
//!
//! # Caching
//!
//! Loaded rule sets are cached per `(category, include_inactive)` key with a
//! TTL. Each cache entry carries its own expiry instant, checked on read —
//! no background timers — and rule writers invalidate explicitly so an edit
//! takes effect before the TTL elapses.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use core_kernel::{Context, PortError, RuleId};

use crate::condition::evaluate;
use crate::error::RuleError;
use crate::rule::{ActionType, BusinessRule, RuleCategory};

/// Rule storage collaborator
///
/// `include_inactive` widens the load to inactive/draft rules and tells
/// the engine to skip the per-rule applicability check (status and
/// effective-date window) entirely.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Lists the rules for a category in storage order
    async fn list_applicable_rules(
        &self,
        category: RuleCategory,
        include_inactive: bool,
    ) -> Result<Vec<BusinessRule>, PortError>;
}

/// Options controlling a rule set evaluation
#[derive(Debug, Clone, Default)]
pub struct EvaluationOptions {
    /// Evaluate inactive and draft rules too
    pub include_inactive: bool,
    /// Soft deadline; partial results are returned when it elapses
    pub max_execution_time: Option<Duration>,
    /// Stop after the first match with confidence above 0.9
    pub short_circuit: bool,
}

/// A rule that matched during evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedRule {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub priority: u32,
    pub confidence: f64,
    pub explanation: String,
}

/// An action surviving consolidation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedAction {
    pub action_type: ActionType,
    pub parameters: serde_json::Value,
    pub priority: u32,
}

/// Result of evaluating a rule set
///
/// Always returned, even on failure; callers must check `success`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSetEvaluation {
    pub success: bool,
    pub category: RuleCategory,
    /// Number of rules whose condition was evaluated
    pub rules_evaluated: usize,
    pub matched_rules: Vec<MatchedRule>,
    /// Consolidated actions, ascending by priority
    pub actions: Vec<ConsolidatedAction>,
    /// Weighted overall confidence in `[0, 1]`
    pub confidence: f64,
    pub recommendation: String,
    /// Error description when `success` is false
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl RuleSetEvaluation {
    fn failure(category: RuleCategory, error: String, elapsed: Duration) -> Self {
        Self {
            success: false,
            category,
            rules_evaluated: 0,
            matched_rules: Vec::new(),
            actions: Vec::new(),
            confidence: 0.0,
            recommendation: "Evaluation failed; manual review required".to_string(),
            error: Some(error),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

struct CachedRules {
    rules: Arc<Vec<BusinessRule>>,
    expires_at: Instant,
}

/// Default cache TTL for loaded rule sets
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// The rules engine
///
/// Cheap to share: clone the surrounding `Arc`, or construct once per
/// process. Evaluation is side-effect-free and safe to run concurrently
/// across categories.
pub struct RulesEngine {
    store: Arc<dyn RuleStore>,
    cache: RwLock<HashMap<(RuleCategory, bool), CachedRules>>,
    cache_ttl: Duration,
}

impl RulesEngine {
    /// Creates an engine with the default 5-minute cache TTL
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self::with_cache_ttl(store, DEFAULT_CACHE_TTL)
    }

    /// Creates an engine with an explicit cache TTL
    pub fn with_cache_ttl(store: Arc<dyn RuleStore>, cache_ttl: Duration) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
            cache_ttl,
        }
    }

    /// Evaluates all rules of a category against a context
    ///
    /// Never returns an error: any internal failure is converted into a
    /// `success = false` result with zero matched rules.
    pub async fn evaluate_rules(
        &self,
        category: RuleCategory,
        context: &Context,
        options: &EvaluationOptions,
    ) -> RuleSetEvaluation {
        let started = Instant::now();
        match self.evaluate_inner(category, context, options, started).await {
            Ok(result) => result,
            Err(error) => {
                warn!(?category, %error, "rule set evaluation failed");
                RuleSetEvaluation::failure(category, error.to_string(), started.elapsed())
            }
        }
    }

    async fn evaluate_inner(
        &self,
        category: RuleCategory,
        context: &Context,
        options: &EvaluationOptions,
        started: Instant,
    ) -> Result<RuleSetEvaluation, RuleError> {
        let rules = self.load_rules(category, options.include_inactive).await?;
        let now = Utc::now();

        let mut matched_rules = Vec::new();
        let mut rules_evaluated = 0usize;
        // Keyed by (action type, canonical parameter serialization); the
        // lower priority value wins when the same key recurs.
        let mut consolidated: HashMap<(ActionType, String), ConsolidatedAction> = HashMap::new();

        for rule in rules.iter() {
            if let Some(deadline) = options.max_execution_time {
                if started.elapsed() >= deadline {
                    debug!(?category, rules_evaluated, "evaluation deadline reached");
                    break;
                }
            }

            if !options.include_inactive && !rule.is_applicable_at(now) {
                continue;
            }

            let outcome = evaluate(&rule.condition, context);
            rules_evaluated += 1;

            if !outcome.matched {
                continue;
            }

            debug!(rule = %rule.name, confidence = outcome.confidence, "rule matched");
            for action in &rule.actions {
                if let Some(guard) = &action.guard {
                    if !evaluate(guard, context).matched {
                        continue;
                    }
                }
                let key = (
                    action.action_type,
                    serde_json::to_string(&action.parameters)
                        .map_err(|e| RuleError::Evaluation(e.to_string()))?,
                );
                let candidate = ConsolidatedAction {
                    action_type: action.action_type,
                    parameters: action.parameters.clone(),
                    priority: action.priority,
                };
                consolidated
                    .entry(key)
                    .and_modify(|existing| {
                        if candidate.priority < existing.priority {
                            *existing = candidate.clone();
                        }
                    })
                    .or_insert(candidate);
            }

            let confidence = outcome.confidence;
            matched_rules.push(MatchedRule {
                rule_id: rule.id,
                rule_name: rule.name.clone(),
                priority: rule.priority,
                confidence,
                explanation: outcome.explanation,
            });

            if options.short_circuit && confidence > 0.9 {
                debug!(rule = %rule.name, "short-circuiting rule set evaluation");
                break;
            }
        }

        let mut actions: Vec<ConsolidatedAction> = consolidated.into_values().collect();
        actions.sort_by_key(|a| a.priority);

        let confidence = weighted_confidence(&matched_rules);
        let recommendation = if matched_rules.is_empty() {
            "No rules matched; manual review required".to_string()
        } else if actions.is_empty() {
            "Rules matched but produced no actions".to_string()
        } else {
            actions[0].action_type.recommendation().to_string()
        };

        Ok(RuleSetEvaluation {
            success: true,
            category,
            rules_evaluated,
            matched_rules,
            actions,
            confidence,
            recommendation,
            error: None,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn load_rules(
        &self,
        category: RuleCategory,
        include_inactive: bool,
    ) -> Result<Arc<Vec<BusinessRule>>, RuleError> {
        let key = (category, include_inactive);

        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(&key) {
                if entry.expires_at > Instant::now() {
                    return Ok(Arc::clone(&entry.rules));
                }
            }
        }

        let rules = Arc::new(
            self.store
                .list_applicable_rules(category, include_inactive)
                .await?,
        );
        debug!(?category, include_inactive, count = rules.len(), "rule cache refreshed");

        let mut cache = self.cache.write().await;
        cache.insert(
            key,
            CachedRules {
                rules: Arc::clone(&rules),
                expires_at: Instant::now() + self.cache_ttl,
            },
        );

        Ok(rules)
    }

    /// Drops cached rule sets for a category
    ///
    /// Rule writers call this after create/update/delete so a mid-TTL edit
    /// never serves stale applicability decisions.
    pub async fn invalidate_category(&self, category: RuleCategory) {
        let mut cache = self.cache.write().await;
        cache.retain(|(cached, _), _| *cached != category);
    }

    /// Drops the entire rule cache
    pub async fn invalidate_all(&self) {
        self.cache.write().await.clear();
    }
}

/// Weighted average of matched-rule confidences
///
/// Each confidence is weighted by `1 / priority`, so rules with smaller
/// priority numbers dominate, clamped to `[0, 1]`.
fn weighted_confidence(matched: &[MatchedRule]) -> f64 {
    if matched.is_empty() {
        return 0.0;
    }
    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;
    for rule in matched {
        let weight = 1.0 / f64::from(rule.priority.max(1));
        weighted_sum += rule.confidence * weight;
        weight_sum += weight;
    }
    if weight_sum == 0.0 {
        return 0.0;
    }
    (weighted_sum / weight_sum).clamp(0.0, 1.0)
}
