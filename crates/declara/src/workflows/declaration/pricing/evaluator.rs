use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;

use super::super::domain::Formula;
use super::super::schema::ValueSet;

/// Capability that turns a formula and a batch of value sets into an amount.
///
/// Implementations must be pure relative to their inputs. They may be slow (an assisted
/// evaluator can call out to another service); the resolver bounds every call with a timeout.
///
/// The timeout only bounds the wait. The call itself runs on the blocking pool and keeps
/// its thread until it returns, so implementations that talk to a remote service should
/// carry their own deadline as well.
pub trait FormulaEvaluator: Send + Sync {
    fn evaluate(&self, formula: &Formula, batch: &[ValueSet]) -> Result<Decimal, EvaluationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    #[error("formula evaluator unavailable: {0}")]
    Unavailable(String),
    #[error("formula rejected: {0}")]
    Rejected(String),
    #[error("formula evaluation exceeded {0:?}")]
    TimedOut(Duration),
    #[error("formula produced a negative amount ({0})")]
    NegativeAmount(Decimal),
    #[error("formula evaluation aborted: {0}")]
    Aborted(String),
}

/// Evaluator used when no assisted evaluator is wired in; every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableEvaluator;

impl FormulaEvaluator for UnavailableEvaluator {
    fn evaluate(&self, _formula: &Formula, _batch: &[ValueSet]) -> Result<Decimal, EvaluationError> {
        Err(EvaluationError::Unavailable(
            "no formula evaluator configured".to_string(),
        ))
    }
}

/// Negotiated per-declaration rates keyed by formula expression.
///
/// Lets deployments price taxpayer-specific agreements (`levy:tier-a`) without an
/// expression language: the amount is the scheduled rate times the batch size. Unknown
/// expressions are rejected, as are batches where a value set lacks one of the formula's
/// declared variables.
#[derive(Debug, Default, Clone)]
pub struct RateScheduleEvaluator {
    rates: HashMap<String, Decimal>,
}

impl RateScheduleEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, expression: impl Into<String>, rate: Decimal) -> Self {
        self.rates.insert(expression.into(), rate);
        self
    }
}

impl FormulaEvaluator for RateScheduleEvaluator {
    fn evaluate(&self, formula: &Formula, batch: &[ValueSet]) -> Result<Decimal, EvaluationError> {
        let rate = self
            .rates
            .get(formula.expression.trim())
            .ok_or_else(|| {
                EvaluationError::Rejected(format!(
                    "no scheduled rate for '{}'",
                    formula.expression
                ))
            })?;
        for (index, values) in batch.iter().enumerate() {
            if let Some(missing) = formula
                .variables
                .iter()
                .find(|variable| !values.contains(variable))
            {
                return Err(EvaluationError::Rejected(format!(
                    "entry {index} has no value for '{missing}'"
                )));
            }
        }
        Ok(*rate * Decimal::from(batch.len()))
    }
}
