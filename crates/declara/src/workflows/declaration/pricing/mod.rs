mod evaluator;
mod penalty;

pub use evaluator::{EvaluationError, FormulaEvaluator, RateScheduleEvaluator, UnavailableEvaluator};
pub use penalty::{accrue, Accrual};

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::{Formula, PricingMode, PricingStrategy, TaxDefinition, TaxDefinitionId};
use super::schema::ValueSet;
use crate::config::EngineConfig;

/// Amount chosen for a batch together with the step that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub amount: Decimal,
    pub strategy: PricingStrategy,
    /// The administrator formula failed and the flat tariff was charged instead.
    pub fallback_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("cannot price an empty batch")]
    EmptyBatch,
    #[error("tax {tax} requires a taxpayer-specific formula")]
    MandatoryFormulaMissing { tax: TaxDefinitionId },
    #[error("taxpayer formula for tax {tax} could not be evaluated: {source}")]
    EvaluatorFailed {
        tax: TaxDefinitionId,
        #[source]
        source: EvaluationError,
    },
}

/// Strategy chain: taxpayer formula, then administrator formula, then flat tariff.
#[derive(Clone)]
pub struct AmountResolver {
    evaluator: Arc<dyn FormulaEvaluator>,
    timeout: Duration,
}

impl AmountResolver {
    pub fn new(evaluator: Arc<dyn FormulaEvaluator>, config: &EngineConfig) -> Self {
        Self {
            evaluator,
            timeout: config.evaluator_timeout,
        }
    }

    pub async fn resolve(
        &self,
        tax: &TaxDefinition,
        batch: &[ValueSet],
        taxpayer_formula: Option<&Formula>,
    ) -> Result<Resolution, ResolutionError> {
        if batch.is_empty() {
            return Err(ResolutionError::EmptyBatch);
        }

        if tax.pricing_mode == PricingMode::MandatoryCustomFormula {
            let formula = taxpayer_formula.ok_or_else(|| ResolutionError::MandatoryFormulaMissing {
                tax: tax.id.clone(),
            })?;
            let amount = self
                .evaluate(formula, batch)
                .await
                .map_err(|source| ResolutionError::EvaluatorFailed {
                    tax: tax.id.clone(),
                    source,
                })?;
            return Ok(Resolution {
                amount,
                strategy: PricingStrategy::CustomFormula,
                fallback_used: false,
                fallback_reason: None,
            });
        }

        if let Some(formula) = &tax.formula {
            match self.evaluate(formula, batch).await {
                Ok(amount) => {
                    return Ok(Resolution {
                        amount,
                        strategy: PricingStrategy::AdministratorFormula,
                        fallback_used: false,
                        fallback_reason: None,
                    })
                }
                Err(err) => {
                    warn!(tax = %tax.id, error = %err, "administrator formula failed, charging flat tariff");
                    return Ok(Resolution {
                        amount: flat_tariff(tax, batch),
                        strategy: PricingStrategy::FlatTariff,
                        fallback_used: true,
                        fallback_reason: Some(err.to_string()),
                    });
                }
            }
        }

        Ok(Resolution {
            amount: flat_tariff(tax, batch),
            strategy: PricingStrategy::FlatTariff,
            fallback_used: false,
            fallback_reason: None,
        })
    }

    async fn evaluate(&self, formula: &Formula, batch: &[ValueSet]) -> Result<Decimal, EvaluationError> {
        let evaluator = Arc::clone(&self.evaluator);
        let formula = formula.clone();
        let batch = batch.to_vec();
        let task = tokio::task::spawn_blocking(move || evaluator.evaluate(&formula, &batch));

        let amount = match tokio::time::timeout(self.timeout, task).await {
            Err(_) => return Err(EvaluationError::TimedOut(self.timeout)),
            Ok(Err(join)) => return Err(EvaluationError::Aborted(join.to_string())),
            Ok(Ok(result)) => result?,
        };

        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(EvaluationError::NegativeAmount(amount));
        }
        Ok(penalty::round_money(amount))
    }
}

fn flat_tariff(tax: &TaxDefinition, batch: &[ValueSet]) -> Decimal {
    tax.base_rate * Decimal::from(batch.len())
}
