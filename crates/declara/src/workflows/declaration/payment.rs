use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::{DeclarationId, ReferenceCode};
use super::validation::is_phone;

/// Identifier of a recorded payment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub String);

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    MobileMoney,
    BankDeposit,
    Card,
    Cheque,
}

impl PaymentMethod {
    pub const fn label(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::BankDeposit => "bank_deposit",
            PaymentMethod::Card => "card",
            PaymentMethod::Cheque => "cheque",
        }
    }

    /// Attributes the cashier must capture for this method.
    pub const fn required_fields(self) -> &'static [&'static str] {
        match self {
            PaymentMethod::Cash => &["receipt_book_number"],
            PaymentMethod::MobileMoney => &["operator", "phone_number", "transaction_id"],
            PaymentMethod::BankDeposit => &["bank_name", "deposit_slip_number"],
            PaymentMethod::Card => &["card_holder", "last_four_digits"],
            PaymentMethod::Cheque => &["bank_name", "cheque_number", "drawer_name"],
        }
    }

    /// Check the method-specific attributes; the first offending field is reported.
    pub fn validate_fields(
        self,
        fields: &BTreeMap<String, String>,
    ) -> Result<(), PaymentFieldError> {
        for name in self.required_fields() {
            let value = fields.get(*name).map(|value| value.trim()).unwrap_or("");
            if value.is_empty() {
                return Err(PaymentFieldError::Missing {
                    method: self,
                    field: name.to_string(),
                });
            }
            let malformed = match *name {
                "phone_number" => !is_phone(value),
                "last_four_digits" => {
                    value.len() != 4 || !value.chars().all(|c| c.is_ascii_digit())
                }
                _ => false,
            };
            if malformed {
                return Err(PaymentFieldError::Malformed {
                    method: self,
                    field: name.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentFieldError {
    #[error("{method} payments require '{field}'")]
    Missing { method: PaymentMethod, field: String },
    #[error("'{field}' is malformed for {method} payments")]
    Malformed { method: PaymentMethod, field: String },
}

impl PaymentFieldError {
    pub fn field(&self) -> &str {
        match self {
            PaymentFieldError::Missing { field, .. } | PaymentFieldError::Malformed { field, .. } => {
                field
            }
        }
    }
}

/// Settlement of one or more priced declarations. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: PaymentId,
    pub reference: ReferenceCode,
    pub declaration_ids: Vec<DeclarationId>,
    pub method: PaymentMethod,
    pub attributes: BTreeMap<String, String>,
    pub principal_total: Decimal,
    pub penalty_total: Decimal,
    pub total: Decimal,
    pub paid_at: DateTime<Utc>,
}
