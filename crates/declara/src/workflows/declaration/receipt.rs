use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::domain::{DeclarationId, ReferenceCode, TaxDefinitionId};
use super::payment::{PaymentId, PaymentMethod};
use super::schema::ValueSet;

/// Render-ready projection of a payment. Built only from stored, immutable records, so the
/// same payment always projects to the same receipt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Receipt {
    pub payment_id: PaymentId,
    pub reference: ReferenceCode,
    pub method: PaymentMethod,
    pub attributes: BTreeMap<String, String>,
    pub paid_at: DateTime<Utc>,
    pub principal: Decimal,
    pub penalty: Decimal,
    pub total: Decimal,
    pub lines: Vec<ReceiptLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptLine {
    pub declaration_id: DeclarationId,
    pub reference: ReferenceCode,
    pub tax_definition_id: TaxDefinitionId,
    pub tax_name: String,
    pub principal: Decimal,
    pub penalty: Decimal,
    pub values: ValueSet,
}
