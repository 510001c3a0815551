use super::domain::{
    Declaration, DeclarationId, ReferenceCode, TaxDefinition, TaxDefinitionId, Taxpayer,
    TaxpayerId,
};
use super::payment::{PaymentId, PaymentTransaction};
use super::schema::ValueSet;
use crate::workflows::delivery::domain::DeliveryRecord;

/// Storage abstraction so the lifecycle service can be exercised in isolation.
///
/// Updates are optimistic: the record passed in carries the `version` it was read at and
/// the repository refuses the write with [`RepositoryError::Conflict`] when the stored
/// version has moved on. Accepted writes bump the version.
pub trait DeclarationRepository: Send + Sync {
    fn tax_definition(&self, id: &TaxDefinitionId)
        -> Result<Option<TaxDefinition>, RepositoryError>;
    fn insert_declarations(
        &self,
        records: Vec<Declaration>,
    ) -> Result<Vec<Declaration>, RepositoryError>;
    fn fetch_declaration(&self, id: &DeclarationId)
        -> Result<Option<Declaration>, RepositoryError>;
    fn declaration_by_reference(
        &self,
        reference: &ReferenceCode,
    ) -> Result<Option<Declaration>, RepositoryError>;
    fn update_declaration(&self, record: Declaration) -> Result<Declaration, RepositoryError>;
    /// Store the payment, the paid declarations and the optional delivery as one unit.
    fn commit_payment(&self, settlement: Settlement)
        -> Result<PaymentTransaction, RepositoryError>;
    fn fetch_payment(&self, id: &PaymentId) -> Result<Option<PaymentTransaction>, RepositoryError>;
}

/// Everything a successful payment writes.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub payment: PaymentTransaction,
    pub declarations: Vec<Declaration>,
    pub delivery: Option<DeliveryRecord>,
}

/// Boundary to the taxpayer/session subsystem.
pub trait TaxpayerDirectory: Send + Sync {
    fn resolve_taxpayer(&self, id: &TaxpayerId) -> Result<Option<Taxpayer>, RepositoryError>;
}

/// Reference tables (engine makes, colors, fiscal power) used to pre-fill submissions.
pub trait ReferenceDataSource: Send + Sync {
    fn prefill(&self, tax: &TaxDefinition, values: &mut ValueSet) -> Result<(), ReferenceDataError>;
}

/// Source that knows nothing; leaves submissions untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReferenceData;

impl ReferenceDataSource for NoReferenceData {
    fn prefill(&self, _tax: &TaxDefinition, _values: &mut ValueSet) -> Result<(), ReferenceDataError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("reference data lookup failed: {0}")]
pub struct ReferenceDataError(pub String);

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record was modified concurrently")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("reference code {0} already issued")]
    DuplicateReference(String),
    #[error("tax definition {0} is referenced by filed declarations")]
    DefinitionInUse(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
