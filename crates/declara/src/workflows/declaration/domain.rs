use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::schema::{FormSchema, ValueSet};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of a tax definition in the catalog.
    TaxDefinitionId
);
string_id!(
    /// Identifier of a taxpayer as known to the taxpayer directory.
    TaxpayerId
);
string_id!(
    /// Identifier wrapper for filed declarations.
    DeclarationId
);
string_id!(
    /// Groups declarations filed together in one session.
    BatchId
);
string_id!(
    /// Globally unique, human-facing code printed on forms and receipts.
    ReferenceCode
);

/// How a tax definition is priced; decided when the tax is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingMode {
    /// Every taxpayer must carry a personal formula; no generic rate ever applies.
    MandatoryCustomFormula,
    AdministratorFormula,
    FlatTariff,
}

/// Expression text understood by the injected evaluator plus the variables it reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    pub expression: String,
    #[serde(default)]
    pub variables: Vec<String>,
}

impl Formula {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            variables: Vec::new(),
        }
    }

    pub fn with_variables(mut self, variables: &[&str]) -> Self {
        self.variables = variables.iter().map(|v| v.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyKind {
    /// `value` percent of the principal per elapsed period.
    Percentage,
    /// `value` flat per elapsed period.
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyPolicy {
    pub grace_period_days: u32,
    pub kind: PenaltyKind,
    pub value: Decimal,
}

/// Physical document owed to the taxpayer once the declaration is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Plate,
    Card,
}

impl DocumentKind {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentKind::Plate => "plate",
            DocumentKind::Card => "card",
        }
    }
}

/// Schema, pricing rule and penalty policy for one kind of tax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxDefinition {
    pub id: TaxDefinitionId,
    pub name: String,
    pub schema: FormSchema,
    pub pricing_mode: PricingMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<Formula>,
    /// Flat tariff charged per declaration when no formula applies.
    pub base_rate: Decimal,
    pub penalty: PenaltyPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentKind>,
}

/// Taxpayer as returned by the directory, including negotiated formulas per tax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxpayer {
    pub id: TaxpayerId,
    pub name: String,
    #[serde(default)]
    pub custom_formulas: BTreeMap<TaxDefinitionId, Formula>,
}

impl Taxpayer {
    pub fn formula_for(&self, tax: &TaxDefinitionId) -> Option<&Formula> {
        self.custom_formulas.get(tax)
    }
}

/// Lifecycle status of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationStatus {
    Draft,
    Priced,
    Paid,
    Deleted,
}

impl DeclarationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DeclarationStatus::Draft => "draft",
            DeclarationStatus::Priced => "priced",
            DeclarationStatus::Paid => "paid",
            DeclarationStatus::Deleted => "deleted",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, DeclarationStatus::Paid | DeclarationStatus::Deleted)
    }
}

impl fmt::Display for DeclarationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which resolution step produced a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingStrategy {
    CustomFormula,
    AdministratorFormula,
    FlatTariff,
}

/// Audit of the last pricing run on a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingSnapshot {
    pub strategy: PricingStrategy,
    pub fallback_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub elapsed_days: i64,
    pub periods_elapsed: i64,
    pub priced_at: DateTime<Utc>,
}

/// One taxpayer's filing against a tax definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub id: DeclarationId,
    pub reference: ReferenceCode,
    pub taxpayer_id: TaxpayerId,
    pub tax_definition_id: TaxDefinitionId,
    pub batch_id: BatchId,
    pub values: ValueSet,
    pub principal: Option<Decimal>,
    pub penalty: Option<Decimal>,
    pub pricing: Option<PricingSnapshot>,
    pub status: DeclarationStatus,
    pub created_at: DateTime<Utc>,
    /// Bumped by the repository on every stored change.
    pub version: u64,
}

impl Declaration {
    /// Principal plus any evaluated penalty, once priced.
    pub fn amount_due(&self) -> Option<Decimal> {
        self.principal
            .map(|principal| principal + self.penalty.unwrap_or(Decimal::ZERO))
    }

    pub fn status_view(&self) -> DeclarationStatusView {
        DeclarationStatusView {
            declaration_id: self.id.clone(),
            reference: self.reference.clone(),
            status: self.status.label(),
            principal: self.principal,
            penalty: self.penalty,
            amount_due: self.amount_due(),
            fallback_used: self
                .pricing
                .as_ref()
                .map(|pricing| pricing.fallback_used)
                .unwrap_or(false),
        }
    }
}

/// Outward representation of a declaration for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct DeclarationStatusView {
    pub declaration_id: DeclarationId,
    pub reference: ReferenceCode,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub penalty: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_due: Option<Decimal>,
    pub fallback_used: bool,
}
