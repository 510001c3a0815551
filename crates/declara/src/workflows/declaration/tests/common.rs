use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::workflows::clock::FixedClock;
use crate::workflows::declaration::domain::{
    Declaration, DeclarationId, DocumentKind, Formula, PenaltyKind, PenaltyPolicy, PricingMode,
    ReferenceCode, TaxDefinition, TaxDefinitionId, Taxpayer, TaxpayerId,
};
use crate::workflows::declaration::payment::{PaymentId, PaymentTransaction};
use crate::workflows::declaration::pricing::{EvaluationError, FormulaEvaluator};
use crate::workflows::declaration::repository::{
    DeclarationRepository, RepositoryError, Settlement,
};
use crate::workflows::declaration::schema::{FieldDefinition, FieldKind, FormSchema, ValueSet};
use crate::workflows::declaration::store::MemoryStore;
use crate::workflows::declaration::DeclarationService;

pub(super) const VEHICLE_TAX: &str = "vehicle-tax";
pub(super) const PROFESSIONAL_LEVY: &str = "professional-levy";
pub(super) const STAMP_DUTY: &str = "stamp-duty";
pub(super) const PLAIN_TAXPAYER: &str = "tp-001";
pub(super) const AGREEMENT_TAXPAYER: &str = "tp-002";

pub(super) fn filed_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, 1, 8, 0, 0).unwrap()
}

pub(super) fn engine_config() -> EngineConfig {
    EngineConfig {
        evaluator_timeout: Duration::from_millis(200),
    }
}

pub(super) fn vehicle_schema() -> FormSchema {
    FormSchema::new(vec![
        FieldDefinition::new("owner", FieldKind::ShortText)
            .labelled("Owner name")
            .required(),
        FieldDefinition::new("email", FieldKind::Email)
            .labelled("E-mail")
            .required()
            .always_optional(),
        FieldDefinition::new("phone", FieldKind::Phone)
            .labelled("Phone number")
            .required(),
        FieldDefinition::new("phone_2", FieldKind::Phone)
            .labelled("Second phone number")
            .required()
            .always_optional(),
        FieldDefinition::new("fiscal_power", FieldKind::Number)
            .labelled("Fiscal power")
            .required(),
        FieldDefinition::new(
            "usage",
            FieldKind::SingleSelect {
                options: vec!["private".to_string(), "commercial".to_string()],
            },
        )
        .labelled("Usage")
        .required()
        .with_sub_fields(
            Some("commercial"),
            vec![FieldDefinition::new("licence_number", FieldKind::ShortText)
                .labelled("Transport licence number")
                .required()],
        ),
        FieldDefinition::new("registration_card", FieldKind::FileReference)
            .labelled("Registration card scan")
            .required(),
    ])
}

pub(super) fn monthly_ten_percent() -> PenaltyPolicy {
    PenaltyPolicy {
        grace_period_days: 30,
        kind: PenaltyKind::Percentage,
        value: Decimal::new(10, 0),
    }
}

pub(super) fn vehicle_tax() -> TaxDefinition {
    TaxDefinition {
        id: TaxDefinitionId::from(VEHICLE_TAX),
        name: "Vehicle tax".to_string(),
        schema: vehicle_schema(),
        pricing_mode: PricingMode::AdministratorFormula,
        formula: Some(
            Formula::new("fiscal_power * 1500").with_variables(&["fiscal_power"]),
        ),
        base_rate: Decimal::new(15000, 0),
        penalty: monthly_ten_percent(),
        document: Some(DocumentKind::Plate),
    }
}

pub(super) fn professional_levy() -> TaxDefinition {
    TaxDefinition {
        id: TaxDefinitionId::from(PROFESSIONAL_LEVY),
        name: "Professional levy".to_string(),
        schema: FormSchema::new(vec![FieldDefinition::new("activity", FieldKind::ShortText)
            .labelled("Activity")
            .required()]),
        pricing_mode: PricingMode::MandatoryCustomFormula,
        formula: Some(Formula::new("turnover * 0.02")),
        base_rate: Decimal::new(50000, 0),
        penalty: monthly_ten_percent(),
        document: Some(DocumentKind::Card),
    }
}

pub(super) fn stamp_duty() -> TaxDefinition {
    TaxDefinition {
        id: TaxDefinitionId::from(STAMP_DUTY),
        name: "Stamp duty".to_string(),
        schema: FormSchema::new(vec![FieldDefinition::new("deed", FieldKind::ShortText)
            .labelled("Deed number")
            .required()]),
        pricing_mode: PricingMode::FlatTariff,
        formula: None,
        base_rate: Decimal::new(2500, 0),
        penalty: PenaltyPolicy {
            grace_period_days: 15,
            kind: PenaltyKind::Fixed,
            value: Decimal::new(500, 0),
        },
        document: None,
    }
}

pub(super) fn vehicle_values(owner: &str) -> ValueSet {
    ValueSet::new()
        .with("owner", owner)
        .with("phone", "+243 812 345 678")
        .with("fiscal_power", "12")
        .with("usage", "private")
        .with("usage.licence_number", "TL-0042")
        .with("registration_card", "uploads/card-0042.pdf")
}

pub(super) fn levy_values() -> ValueSet {
    ValueSet::new().with("activity", "Pharmacy")
}

pub(super) fn deed_values(deed: &str) -> ValueSet {
    ValueSet::new().with("deed", deed)
}

pub(super) fn taxpayers() -> Vec<Taxpayer> {
    let mut formulas = BTreeMap::new();
    formulas.insert(
        TaxDefinitionId::from(PROFESSIONAL_LEVY),
        Formula::new("levy:tier-a"),
    );
    vec![
        Taxpayer {
            id: TaxpayerId::from(PLAIN_TAXPAYER),
            name: "Mbuyi Transport".to_string(),
            custom_formulas: BTreeMap::new(),
        },
        Taxpayer {
            id: TaxpayerId::from(AGREEMENT_TAXPAYER),
            name: "Kasa Pharma".to_string(),
            custom_formulas: formulas,
        },
    ]
}

pub(super) fn seeded_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    for tax in [vehicle_tax(), professional_levy(), stamp_duty()] {
        store.register_tax_definition(tax).expect("tax registers");
    }
    for taxpayer in taxpayers() {
        store.register_taxpayer(taxpayer).expect("taxpayer registers");
    }
    Arc::new(store)
}

pub(super) type MemoryService = DeclarationService<MemoryStore, MemoryStore>;

pub(super) fn build_service(
    evaluator: Arc<dyn FormulaEvaluator>,
) -> (MemoryService, Arc<MemoryStore>, Arc<FixedClock>) {
    let store = seeded_store();
    let clock = Arc::new(FixedClock::at(filed_at()));
    let service = DeclarationService::new(store.clone(), store.clone(), evaluator, &engine_config())
        .with_clock(clock.clone());
    (service, store, clock)
}

pub(super) fn cash_fields() -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    fields.insert("receipt_book_number".to_string(), "RB-2025-118".to_string());
    fields
}

/// Returns the same amount for every call and counts invocations.
#[derive(Default)]
pub(super) struct FixedEvaluator {
    pub(super) amount: Decimal,
    pub(super) calls: AtomicUsize,
}

impl FixedEvaluator {
    pub(super) fn new(amount: Decimal) -> Self {
        Self {
            amount,
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FormulaEvaluator for FixedEvaluator {
    fn evaluate(&self, _formula: &Formula, _batch: &[ValueSet]) -> Result<Decimal, EvaluationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.amount)
    }
}

pub(super) struct FailingEvaluator;

impl FormulaEvaluator for FailingEvaluator {
    fn evaluate(&self, _formula: &Formula, _batch: &[ValueSet]) -> Result<Decimal, EvaluationError> {
        Err(EvaluationError::Unavailable("assistant offline".to_string()))
    }
}

pub(super) struct SlowEvaluator(pub(super) Duration);

impl FormulaEvaluator for SlowEvaluator {
    fn evaluate(&self, _formula: &Formula, batch: &[ValueSet]) -> Result<Decimal, EvaluationError> {
        std::thread::sleep(self.0);
        Ok(Decimal::new(999, 0) * Decimal::from(batch.len()))
    }
}

pub(super) struct UnavailableRepository;

impl DeclarationRepository for UnavailableRepository {
    fn tax_definition(
        &self,
        _id: &TaxDefinitionId,
    ) -> Result<Option<TaxDefinition>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn insert_declarations(
        &self,
        _records: Vec<Declaration>,
    ) -> Result<Vec<Declaration>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_declaration(
        &self,
        _id: &DeclarationId,
    ) -> Result<Option<Declaration>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn declaration_by_reference(
        &self,
        _reference: &ReferenceCode,
    ) -> Result<Option<Declaration>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update_declaration(&self, _record: Declaration) -> Result<Declaration, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn commit_payment(
        &self,
        _settlement: Settlement,
    ) -> Result<PaymentTransaction, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_payment(&self, _id: &PaymentId) -> Result<Option<PaymentTransaction>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
