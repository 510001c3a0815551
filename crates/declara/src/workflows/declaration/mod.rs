//! Declaration intake, pricing, payment and receipt issuance.

pub mod domain;
pub mod lifecycle;
pub mod payment;
pub mod pricing;
pub mod receipt;
pub mod repository;
pub mod router;
pub mod schema;
pub mod service;
pub mod store;
pub mod validation;

#[cfg(test)]
mod tests;

pub use domain::{
    BatchId, Declaration, DeclarationId, DeclarationStatus, DeclarationStatusView, DocumentKind,
    Formula, PenaltyKind, PenaltyPolicy, PricingMode, PricingSnapshot, PricingStrategy,
    ReferenceCode, TaxDefinition, TaxDefinitionId, Taxpayer, TaxpayerId,
};
pub use lifecycle::{LifecycleAction, LifecycleError};
pub use payment::{PaymentFieldError, PaymentId, PaymentMethod, PaymentTransaction};
pub use pricing::{
    accrue, Accrual, AmountResolver, EvaluationError, FormulaEvaluator, RateScheduleEvaluator,
    Resolution, ResolutionError, UnavailableEvaluator,
};
pub use receipt::{Receipt, ReceiptLine};
pub use repository::{
    DeclarationRepository, NoReferenceData, ReferenceDataError, ReferenceDataSource,
    RepositoryError, Settlement, TaxpayerDirectory,
};
pub use router::declaration_router;
pub use schema::{FieldDefinition, FieldKind, FormSchema, ValueSet};
pub use service::{DeclarationService, DeclarationServiceError};
pub use store::MemoryStore;
pub use validation::{validate, ValidationReport};
