use chrono::{DateTime, NaiveDate, Utc};
use declara::workflows::declaration::{
    DeclarationServiceError, DocumentKind, FieldDefinition, FieldKind, FormSchema, Formula,
    MemoryStore, PenaltyKind, PenaltyPolicy, PricingMode, RateScheduleEvaluator, TaxDefinition,
    TaxDefinitionId, Taxpayer, TaxpayerId,
};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) const VEHICLE_TAX: &str = "vehicle-tax";
pub(crate) const PROFESSIONAL_LEVY: &str = "professional-levy";
pub(crate) const STAMP_DUTY: &str = "stamp-duty";
pub(crate) const FLEET_OPERATOR: &str = "tp-fleet";
pub(crate) const PHARMACY: &str = "tp-pharmacy";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

fn monthly_penalty() -> PenaltyPolicy {
    PenaltyPolicy {
        grace_period_days: 30,
        kind: PenaltyKind::Percentage,
        value: Decimal::new(10, 0),
    }
}

fn vehicle_tax() -> TaxDefinition {
    let mut schema = FormSchema::new(vec![
        FieldDefinition::new("owner", FieldKind::ShortText)
            .labelled("Owner name")
            .required(),
        FieldDefinition::new("plate_number", FieldKind::ShortText)
            .labelled("Plate number")
            .required(),
        FieldDefinition::new("email", FieldKind::Email)
            .labelled("E-mail")
            .required(),
        FieldDefinition::new("phone", FieldKind::Phone)
            .labelled("Phone number")
            .required(),
        FieldDefinition::new("phone_2", FieldKind::Phone)
            .labelled("Second phone number")
            .required(),
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
    ]);
    schema.mark_legacy_optional_fields();

    TaxDefinition {
        id: TaxDefinitionId::from(VEHICLE_TAX),
        name: "Vehicle tax".to_string(),
        schema,
        pricing_mode: PricingMode::AdministratorFormula,
        formula: Some(Formula::new("vehicle:standard").with_variables(&["fiscal_power"])),
        base_rate: Decimal::new(15000, 0),
        penalty: monthly_penalty(),
        document: Some(DocumentKind::Plate),
    }
}

fn professional_levy() -> TaxDefinition {
    TaxDefinition {
        id: TaxDefinitionId::from(PROFESSIONAL_LEVY),
        name: "Professional levy".to_string(),
        schema: FormSchema::new(vec![
            FieldDefinition::new("activity", FieldKind::ShortText)
                .labelled("Activity")
                .required(),
            FieldDefinition::new("annual_turnover", FieldKind::Number)
                .labelled("Annual turnover")
                .required(),
        ]),
        pricing_mode: PricingMode::MandatoryCustomFormula,
        formula: None,
        base_rate: Decimal::new(50000, 0),
        penalty: monthly_penalty(),
        document: Some(DocumentKind::Card),
    }
}

fn stamp_duty() -> TaxDefinition {
    TaxDefinition {
        id: TaxDefinitionId::from(STAMP_DUTY),
        name: "Stamp duty".to_string(),
        schema: FormSchema::new(vec![FieldDefinition::new("deed_number", FieldKind::ShortText)
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

fn taxpayers() -> Vec<Taxpayer> {
    let mut agreements = BTreeMap::new();
    agreements.insert(
        TaxDefinitionId::from(PROFESSIONAL_LEVY),
        Formula::new("levy:tier-a"),
    );
    vec![
        Taxpayer {
            id: TaxpayerId::from(FLEET_OPERATOR),
            name: "Mbuyi Transport".to_string(),
            custom_formulas: BTreeMap::new(),
        },
        Taxpayer {
            id: TaxpayerId::from(PHARMACY),
            name: "Kasa Pharma".to_string(),
            custom_formulas: agreements,
        },
    ]
}

/// Register the demonstration catalog and taxpayers.
pub(crate) fn seed_catalog(store: &MemoryStore) -> Result<(), DeclarationServiceError> {
    for tax in [vehicle_tax(), professional_levy(), stamp_duty()] {
        store.register_tax_definition(tax)?;
    }
    for taxpayer in taxpayers() {
        store.register_taxpayer(taxpayer)?;
    }
    Ok(())
}

/// Scheduled rates backing the seeded formulas.
pub(crate) fn default_evaluator() -> RateScheduleEvaluator {
    RateScheduleEvaluator::new()
        .with_rate("vehicle:standard", Decimal::new(18000, 0))
        .with_rate("levy:tier-a", Decimal::new(75000, 0))
        .with_rate("levy:tier-b", Decimal::new(40000, 0))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_amount(raw: &str) -> Result<Decimal, String> {
    let amount = Decimal::from_str(raw.trim())
        .map_err(|err| format!("failed to parse '{raw}' as an amount ({err})"))?;
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(format!("amount '{raw}' must not be negative"));
    }
    Ok(amount)
}

/// Midnight UTC of a calendar date.
pub(crate) fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}
