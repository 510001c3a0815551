use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use super::domain::{
    BatchId, Declaration, DeclarationId, DeclarationStatus, Formula, PricingSnapshot,
    ReferenceCode, TaxDefinition, TaxDefinitionId, Taxpayer, TaxpayerId,
};
use super::lifecycle::{LifecycleAction, LifecycleError};
use super::payment::{PaymentFieldError, PaymentId, PaymentMethod, PaymentTransaction};
use super::pricing::{accrue, AmountResolver, FormulaEvaluator, Resolution, ResolutionError};
use super::receipt::{Receipt, ReceiptLine};
use super::repository::{
    DeclarationRepository, NoReferenceData, ReferenceDataSource, RepositoryError, Settlement,
    TaxpayerDirectory,
};
use super::schema::ValueSet;
use super::validation::{validate, ValidationReport};
use crate::config::EngineConfig;
use crate::error::ErrorKind;
use crate::workflows::clock::{Clock, SystemClock};
use crate::workflows::delivery::domain::{DeliveryId, DeliveryRecord};

static DECLARATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static BATCH_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static PAYMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static DELIVERY_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_declaration_id() -> DeclarationId {
    let id = DECLARATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    DeclarationId(format!("dcl-{id:06}"))
}

fn next_batch_id() -> BatchId {
    let id = BATCH_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    BatchId(format!("bat-{id:06}"))
}

fn next_payment_id() -> PaymentId {
    let id = PAYMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    PaymentId(format!("pay-{id:06}"))
}

fn next_delivery_id() -> DeliveryId {
    let id = DELIVERY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    DeliveryId(format!("dlv-{id:06}"))
}

fn new_reference(prefix: &str) -> ReferenceCode {
    ReferenceCode(format!(
        "{prefix}-{}",
        Uuid::new_v4().simple().to_string().to_uppercase()
    ))
}

/// Service composing validation, amount resolution and the declaration state machine.
pub struct DeclarationService<R, T> {
    repository: Arc<R>,
    directory: Arc<T>,
    resolver: AmountResolver,
    reference_data: Arc<dyn ReferenceDataSource>,
    clock: Arc<dyn Clock>,
}

impl<R, T> DeclarationService<R, T>
where
    R: DeclarationRepository + 'static,
    T: TaxpayerDirectory + 'static,
{
    pub fn new(
        repository: Arc<R>,
        directory: Arc<T>,
        evaluator: Arc<dyn FormulaEvaluator>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            repository,
            directory,
            resolver: AmountResolver::new(evaluator, config),
            reference_data: Arc::new(NoReferenceData),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_reference_data(mut self, source: Arc<dyn ReferenceDataSource>) -> Self {
        self.reference_data = source;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Check a batch against the tax schema without filing anything.
    pub fn validate(
        &self,
        tax_id: &TaxDefinitionId,
        batch: &[ValueSet],
    ) -> Result<ValidationReport, DeclarationServiceError> {
        let tax = self.tax(tax_id)?;
        Ok(validate(&tax.schema, batch))
    }

    /// Price a batch that has not been filed, e.g. to show the session total.
    ///
    /// Filed declarations are priced one by one, so the quoted total only matches what
    /// `pay` charges when the evaluator's amount is additive over entries. An evaluator
    /// that discounts whole batches will quote less than the sum of the filed prices.
    pub async fn quote(
        &self,
        tax_id: &TaxDefinitionId,
        batch: &[ValueSet],
        taxpayer_id: Option<&TaxpayerId>,
        formula_override: Option<Formula>,
    ) -> Result<Resolution, DeclarationServiceError> {
        if batch.is_empty() {
            return Err(DeclarationServiceError::EmptyBatch);
        }
        let tax = self.tax(tax_id)?;
        let report = validate(&tax.schema, batch);
        if !report.is_valid() {
            return Err(DeclarationServiceError::Validation(report));
        }

        let taxpayer = match taxpayer_id {
            Some(id) => Some(self.taxpayer(id)?),
            None => None,
        };
        let formula = formula_override.or_else(|| {
            taxpayer
                .as_ref()
                .and_then(|taxpayer| taxpayer.formula_for(&tax.id).cloned())
        });

        Ok(self.resolver.resolve(&tax, batch, formula.as_ref()).await?)
    }

    /// File one draft declaration per value set; the batch shares a batch id.
    pub fn create(
        &self,
        tax_id: &TaxDefinitionId,
        taxpayer_id: &TaxpayerId,
        batch: Vec<ValueSet>,
    ) -> Result<Vec<Declaration>, DeclarationServiceError> {
        if batch.is_empty() {
            return Err(DeclarationServiceError::EmptyBatch);
        }
        let tax = self.tax(tax_id)?;
        let taxpayer = self.taxpayer(taxpayer_id)?;

        let mut batch = batch;
        for values in &mut batch {
            if let Err(err) = self.reference_data.prefill(&tax, values) {
                warn!(tax = %tax.id, error = %err, "reference data prefill skipped");
            }
        }

        let report = validate(&tax.schema, &batch);
        if !report.is_valid() {
            return Err(DeclarationServiceError::Validation(report));
        }

        let batch_id = next_batch_id();
        let created_at = self.clock.now();
        let records = batch
            .into_iter()
            .map(|values| Declaration {
                id: next_declaration_id(),
                reference: new_reference("DCL"),
                taxpayer_id: taxpayer.id.clone(),
                tax_definition_id: tax.id.clone(),
                batch_id: batch_id.clone(),
                values,
                principal: None,
                penalty: None,
                pricing: None,
                status: DeclarationStatus::Draft,
                created_at,
                version: 0,
            })
            .collect();

        let stored = self.repository.insert_declarations(records)?;
        info!(
            tax = %tax.id,
            taxpayer = %taxpayer.id,
            batch = %batch_id,
            count = stored.len(),
            "declarations filed"
        );
        Ok(stored)
    }

    /// Assign (or refresh) the principal and accrue the late penalty from the filing time.
    /// A declaration priced at filing time carries no penalty. The formula sees this
    /// declaration's values alone, never the rest of its batch.
    pub async fn price(
        &self,
        declaration_id: &DeclarationId,
        formula_override: Option<Formula>,
    ) -> Result<Declaration, DeclarationServiceError> {
        let mut declaration = self.declaration(declaration_id)?;
        declaration.ensure(LifecycleAction::Price)?;

        let tax = self.tax(&declaration.tax_definition_id)?;
        let formula = match formula_override {
            Some(formula) => Some(formula),
            None => self
                .taxpayer(&declaration.taxpayer_id)?
                .formula_for(&tax.id)
                .cloned(),
        };

        let resolution = self
            .resolver
            .resolve(
                &tax,
                std::slice::from_ref(&declaration.values),
                formula.as_ref(),
            )
            .await?;

        let now = self.clock.now();
        let repricing = declaration.status == DeclarationStatus::Priced;
        let accrual = accrue(resolution.amount, declaration.created_at, now, &tax.penalty);
        let penalty = accrual.penalty_amount;

        declaration.apply_pricing(
            resolution.amount,
            penalty,
            PricingSnapshot {
                strategy: resolution.strategy,
                fallback_used: resolution.fallback_used,
                fallback_reason: resolution.fallback_reason,
                elapsed_days: accrual.elapsed_days,
                periods_elapsed: accrual.periods_elapsed,
                priced_at: now,
            },
        )?;

        let stored = self.repository.update_declaration(declaration)?;
        info!(
            declaration = %stored.id,
            principal = %resolution.amount,
            %penalty,
            repricing,
            "declaration priced"
        );
        Ok(stored)
    }

    /// Settle a set of priced declarations with one payment. Nothing is written unless
    /// every declaration can be paid.
    pub fn pay(
        &self,
        declaration_ids: &[DeclarationId],
        method: PaymentMethod,
        fields: BTreeMap<String, String>,
    ) -> Result<PaymentTransaction, DeclarationServiceError> {
        if declaration_ids.is_empty() {
            return Err(DeclarationServiceError::EmptyBatch);
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = declaration_ids.iter().find(|id| !seen.insert(*id)) {
            return Err(DeclarationServiceError::DuplicateDeclaration(
                duplicate.clone(),
            ));
        }
        method.validate_fields(&fields)?;

        let mut declarations = Vec::with_capacity(declaration_ids.len());
        for id in declaration_ids {
            let mut declaration = self.declaration(id)?;
            declaration.mark_paid()?;
            declarations.push(declaration);
        }

        let mut principal_total = Decimal::ZERO;
        let mut penalty_total = Decimal::ZERO;
        for declaration in &declarations {
            principal_total += declaration.principal.unwrap_or(Decimal::ZERO);
            penalty_total += declaration.penalty.unwrap_or(Decimal::ZERO);
        }

        let mut document = None;
        let mut checked = HashSet::new();
        for declaration in &declarations {
            if document.is_none() && checked.insert(declaration.tax_definition_id.clone()) {
                document = self.tax(&declaration.tax_definition_id)?.document;
            }
        }

        let paid_at = self.clock.now();
        let payment = PaymentTransaction {
            id: next_payment_id(),
            reference: new_reference("PAY"),
            declaration_ids: declaration_ids.to_vec(),
            method,
            attributes: fields,
            principal_total,
            penalty_total,
            total: principal_total + penalty_total,
            paid_at,
        };
        let delivery = document.map(|kind| {
            DeliveryRecord::new_pending(
                next_delivery_id(),
                payment.id.clone(),
                payment.reference.clone(),
                payment.declaration_ids.clone(),
                kind,
                paid_at,
            )
        });

        let stored = self.repository.commit_payment(Settlement {
            payment,
            declarations,
            delivery,
        })?;
        info!(
            payment = %stored.id,
            reference = %stored.reference,
            method = %stored.method,
            total = %stored.total,
            declarations = stored.declaration_ids.len(),
            "payment recorded"
        );
        Ok(stored)
    }

    /// Withdraw a declaration that has not been paid.
    pub fn delete(
        &self,
        declaration_id: &DeclarationId,
    ) -> Result<Declaration, DeclarationServiceError> {
        let mut declaration = self.declaration(declaration_id)?;
        declaration.mark_deleted()?;
        let stored = self.repository.update_declaration(declaration)?;
        info!(declaration = %stored.id, "declaration deleted");
        Ok(stored)
    }

    pub fn get(
        &self,
        declaration_id: &DeclarationId,
    ) -> Result<Declaration, DeclarationServiceError> {
        self.declaration(declaration_id)
    }

    pub fn find_by_reference(
        &self,
        reference: &ReferenceCode,
    ) -> Result<Declaration, DeclarationServiceError> {
        self.repository
            .declaration_by_reference(reference)?
            .ok_or_else(|| DeclarationServiceError::ReferenceNotFound(reference.clone()))
    }

    pub fn receipt(&self, payment_id: &PaymentId) -> Result<Receipt, DeclarationServiceError> {
        let payment = self
            .repository
            .fetch_payment(payment_id)?
            .ok_or_else(|| DeclarationServiceError::PaymentNotFound(payment_id.clone()))?;

        let mut lines = Vec::with_capacity(payment.declaration_ids.len());
        for id in &payment.declaration_ids {
            let declaration = self.declaration(id)?;
            let tax = self.tax(&declaration.tax_definition_id)?;
            lines.push(ReceiptLine {
                declaration_id: declaration.id,
                reference: declaration.reference,
                tax_definition_id: tax.id,
                tax_name: tax.name,
                principal: declaration.principal.unwrap_or(Decimal::ZERO),
                penalty: declaration.penalty.unwrap_or(Decimal::ZERO),
                values: declaration.values,
            });
        }

        Ok(Receipt {
            payment_id: payment.id,
            reference: payment.reference,
            method: payment.method,
            attributes: payment.attributes,
            paid_at: payment.paid_at,
            principal: payment.principal_total,
            penalty: payment.penalty_total,
            total: payment.total,
            lines,
        })
    }

    fn tax(&self, id: &TaxDefinitionId) -> Result<TaxDefinition, DeclarationServiceError> {
        self.repository
            .tax_definition(id)?
            .ok_or_else(|| DeclarationServiceError::UnknownTax(id.clone()))
    }

    fn taxpayer(&self, id: &TaxpayerId) -> Result<Taxpayer, DeclarationServiceError> {
        self.directory
            .resolve_taxpayer(id)?
            .ok_or_else(|| DeclarationServiceError::UnknownTaxpayer(id.clone()))
    }

    fn declaration(&self, id: &DeclarationId) -> Result<Declaration, DeclarationServiceError> {
        self.repository
            .fetch_declaration(id)?
            .ok_or_else(|| DeclarationServiceError::DeclarationNotFound(id.clone()))
    }
}

/// Error raised by the declaration service.
#[derive(Debug, thiserror::Error)]
pub enum DeclarationServiceError {
    #[error("submission has {} invalid field(s)", .0.error_count())]
    Validation(ValidationReport),
    #[error("batch must contain at least one declaration")]
    EmptyBatch,
    #[error("declaration {0} is listed more than once")]
    DuplicateDeclaration(DeclarationId),
    #[error(transparent)]
    Payment(#[from] PaymentFieldError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    State(#[from] LifecycleError),
    #[error("declaration was modified concurrently; retry the whole operation")]
    Conflict,
    #[error("tax definition {0} not found")]
    UnknownTax(TaxDefinitionId),
    #[error("taxpayer {0} not found")]
    UnknownTaxpayer(TaxpayerId),
    #[error("declaration {0} not found")]
    DeclarationNotFound(DeclarationId),
    #[error("no declaration with reference {0}")]
    ReferenceNotFound(ReferenceCode),
    #[error("payment {0} not found")]
    PaymentNotFound(PaymentId),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for DeclarationServiceError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict => Self::Conflict,
            other => Self::Repository(other),
        }
    }
}

impl DeclarationServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_)
            | Self::EmptyBatch
            | Self::DuplicateDeclaration(_)
            | Self::Payment(_) => ErrorKind::Validation,
            Self::Resolution(_) => ErrorKind::Resolution,
            Self::State(_) | Self::Repository(RepositoryError::DefinitionInUse(_)) => {
                ErrorKind::State
            }
            Self::Conflict => ErrorKind::Conflict,
            Self::UnknownTax(_)
            | Self::UnknownTaxpayer(_)
            | Self::DeclarationNotFound(_)
            | Self::ReferenceNotFound(_)
            | Self::PaymentNotFound(_)
            | Self::Repository(RepositoryError::NotFound) => ErrorKind::NotFound,
            Self::Repository(_) => ErrorKind::Internal,
        }
    }

    /// Offending input path, when one field is to blame.
    pub fn field_path(&self) -> Option<String> {
        match self {
            Self::Validation(report) => report
                .first()
                .map(|(index, path, _)| format!("batch.{index}.{path}")),
            Self::Payment(err) => Some(format!("fields.{}", err.field())),
            Self::DuplicateDeclaration(_) => Some("declaration_ids".to_string()),
            _ => None,
        }
    }
}
