//! In-memory business rule store
//!
//! Rules live in a single ordered list; `list_applicable_rules` returns
//! category matches in the order rules were first saved, which is the
//! evaluation order the rules engine promises. Callers that mutate rules
//! must invalidate the engine's cache for the touched category so the edit
//! is visible before the cache TTL elapses.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use core_kernel::{PortError, RuleId};
use domain_rules::{BusinessRule, RuleCategory, RuleStatus, RuleStore};

/// In-memory implementation of [`RuleStore`] with write operations
#[derive(Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<Vec<BusinessRule>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a rule, or replaces it in place when the ID already exists
    ///
    /// Replacement keeps the rule's original position so evaluation order
    /// is stable across edits.
    pub async fn save_rule(&self, rule: BusinessRule) -> Result<(), PortError> {
        let mut rules = self.rules.write().await;
        match rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => {
                debug!(rule_id = %rule.id, name = %rule.name, "rule replaced");
                *existing = rule;
            }
            None => {
                debug!(rule_id = %rule.id, name = %rule.name, "rule saved");
                rules.push(rule);
            }
        }
        Ok(())
    }

    pub async fn find_rule(&self, id: RuleId) -> Result<Option<BusinessRule>, PortError> {
        Ok(self.rules.read().await.iter().find(|r| r.id == id).cloned())
    }

    /// Removes a rule; missing IDs are a no-op
    pub async fn delete_rule(&self, id: RuleId) -> Result<(), PortError> {
        self.rules.write().await.retain(|r| r.id != id);
        Ok(())
    }

    /// All rules in storage order, regardless of category or status
    pub async fn list_rules(&self) -> Result<Vec<BusinessRule>, PortError> {
        Ok(self.rules.read().await.clone())
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn list_applicable_rules(
        &self,
        category: RuleCategory,
        include_inactive: bool,
    ) -> Result<Vec<BusinessRule>, PortError> {
        let rules = self.rules.read().await;
        Ok(rules
            .iter()
            .filter(|r| r.category == category)
            .filter(|r| include_inactive || r.status == RuleStatus::Active)
            .cloned()
            .collect())
    }
}
