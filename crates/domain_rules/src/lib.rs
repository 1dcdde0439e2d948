//! Business Rules Domain
//!
//! This crate implements the declarative rule layer of the careflow system:
//! the rule model itself, a pure condition evaluator, and the rule set
//! engine that turns matched rules into a ranked recommendation.
//!
//! # Architecture
//!
//! - **Rule model**: [`BusinessRule`] with a [`RuleCondition`] tree and an
//!   ordered list of [`RuleAction`]s
//! - **Condition evaluator**: a total function over a condition tree and a
//!   [`core_kernel::Context`] - no I/O, no state, never panics
//! - **Rules engine**: loads rules per category through a [`RuleStore`]
//!   collaborator, caches them with a TTL, and consolidates actions
//!
//! # Failure semantics
//!
//! A malformed rule evaluates to "not matched" rather than erroring, so a
//! single bad rule cannot abort evaluation of a rule set. The engine itself
//! converts any internal failure into a `success = false` result; callers
//! must check [`RuleSetEvaluation::success`].

pub mod condition;
pub mod engine;
pub mod error;
pub mod rule;

pub use condition::{
    evaluate, ComparisonOperator, ConditionOutcome, DataType, LogicalOperator, RuleCondition,
};
pub use engine::{
    ConsolidatedAction, EvaluationOptions, MatchedRule, RuleSetEvaluation, RuleStore, RulesEngine,
};
pub use error::RuleError;
pub use rule::{ActionType, BusinessRule, RuleAction, RuleCategory, RuleStatus};
