//! Rule domain errors

use thiserror::Error;

use core_kernel::PortError;

/// Errors raised inside the rules engine
///
/// These never cross the `evaluate_rules` boundary: the engine converts any
/// of them into a `success = false` evaluation result.
#[derive(Debug, Error)]
pub enum RuleError {
    /// The rule storage collaborator failed
    #[error("Rule store error: {0}")]
    Store(#[from] PortError),

    /// A rule set evaluation failed unexpectedly
    #[error("Rule evaluation error: {0}")]
    Evaluation(String),
}
