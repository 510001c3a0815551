use crate::infra::{
    default_evaluator, parse_amount, parse_date, seed_catalog, start_of_day, FLEET_OPERATOR,
    PHARMACY, PROFESSIONAL_LEVY, STAMP_DUTY, VEHICLE_TAX,
};
use chrono::{Local, NaiveDate, Utc};
use clap::Args;
use declara::config::EngineConfig;
use declara::error::AppError;
use declara::workflows::clock::FixedClock;
use declara::workflows::declaration::{
    accrue, Declaration, DeclarationService, DeclarationServiceError, MemoryStore, PaymentMethod,
    PenaltyKind, PenaltyPolicy, Receipt, TaxDefinitionId, TaxpayerId, ValueSet,
};
use declara::workflows::delivery::DeliveryService;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Days between filing and payment; past the grace period this adds a penalty.
    #[arg(long, default_value_t = 45)]
    pub(crate) late_days: i64,
    /// Number of vehicles filed in the demo batch.
    #[arg(long, default_value_t = 2)]
    pub(crate) vehicles: usize,
    /// Skip the plate handover portion of the demo.
    #[arg(long)]
    pub(crate) skip_delivery: bool,
}

#[derive(Args, Debug)]
pub(crate) struct PenaltyArgs {
    /// Principal the penalty is computed on
    #[arg(long, value_parser = parse_amount)]
    pub(crate) principal: Decimal,
    /// Filing date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) filed: NaiveDate,
    /// Settlement date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) paid: Option<NaiveDate>,
    /// Grace period in days; each completed period adds one penalty unit
    #[arg(long, default_value_t = 30)]
    pub(crate) grace_days: u32,
    /// Percentage of the principal charged per period (default 10)
    #[arg(long, value_parser = parse_amount, conflicts_with = "fixed")]
    pub(crate) percentage: Option<Decimal>,
    /// Fixed amount charged per period
    #[arg(long, value_parser = parse_amount)]
    pub(crate) fixed: Option<Decimal>,
}

pub(crate) fn run_penalty(args: PenaltyArgs) -> Result<(), AppError> {
    let PenaltyArgs {
        principal,
        filed,
        paid,
        grace_days,
        percentage,
        fixed,
    } = args;

    let paid = paid.unwrap_or_else(|| Local::now().date_naive());
    let policy = match fixed {
        Some(value) => PenaltyPolicy {
            grace_period_days: grace_days,
            kind: PenaltyKind::Fixed,
            value,
        },
        None => PenaltyPolicy {
            grace_period_days: grace_days,
            kind: PenaltyKind::Percentage,
            value: percentage.unwrap_or_else(|| Decimal::new(10, 0)),
        },
    };

    let accrual = accrue(principal, start_of_day(filed), start_of_day(paid), &policy);
    println!("Penalty accrual");
    println!("  Filed on: {filed}");
    println!("  Paid on: {paid}");
    println!(
        "  Policy: {} per {} day(s)",
        describe_policy(&policy),
        policy.grace_period_days
    );
    println!("  Days elapsed: {}", accrual.elapsed_days);
    println!("  Periods elapsed: {}", accrual.periods_elapsed);
    println!("  Principal: {principal}");
    println!("  Penalty: {}", accrual.penalty_amount);
    println!("  Total due: {}", accrual.total);
    Ok(())
}

fn describe_policy(policy: &PenaltyPolicy) -> String {
    match policy.kind {
        PenaltyKind::Percentage => format!("{}% of principal", policy.value),
        PenaltyKind::Fixed => format!("{} flat", policy.value),
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        late_days,
        vehicles,
        skip_delivery,
    } = args;

    let store = Arc::new(MemoryStore::new());
    seed_catalog(&store)?;
    let clock = Arc::new(FixedClock::at(Utc::now()));
    let declarations = DeclarationService::new(
        store.clone(),
        store.clone(),
        Arc::new(default_evaluator()),
        &EngineConfig::default(),
    )
    .with_clock(clock.clone());
    let deliveries = DeliveryService::new(store.clone()).with_clock(clock.clone());

    println!("Declaration engine demo");
    let vehicle_tax = TaxDefinitionId::from(VEHICLE_TAX);
    let fleet = TaxpayerId::from(FLEET_OPERATOR);

    let mut incomplete = sample_vehicle(0);
    incomplete.insert("fiscal_power", "");
    match declarations.create(&vehicle_tax, &fleet, vec![incomplete]) {
        Err(DeclarationServiceError::Validation(report)) => {
            println!("\nValidation check");
            for (index, errors) in report.errors() {
                for (path, message) in errors {
                    println!("  - entry {index} / {path}: {message}");
                }
            }
        }
        Err(err) => return Err(err.into()),
        Ok(_) => println!("\nValidation check unexpectedly accepted an incomplete entry"),
    }

    let batch: Vec<ValueSet> = (0..vehicles.max(1)).map(sample_vehicle).collect();
    let quote = declarations
        .quote(&vehicle_tax, &batch, Some(&fleet), None)
        .await?;
    println!(
        "\nSession total for {} vehicle(s): {} ({:?}{})",
        batch.len(),
        quote.amount,
        quote.strategy,
        if quote.fallback_used { ", flat tariff fallback" } else { "" }
    );

    let filed = declarations.create(&vehicle_tax, &fleet, batch)?;
    println!("Filed batch {}", filed[0].batch_id);
    for declaration in &filed {
        let priced = declarations.price(&declaration.id, None).await?;
        render_declaration(&priced);
    }

    let levy = declarations.create(
        &TaxDefinitionId::from(PROFESSIONAL_LEVY),
        &TaxpayerId::from(PHARMACY),
        vec![ValueSet::new()
            .with("activity", "Pharmacy")
            .with("annual_turnover", "84000000")],
    )?;
    let levy = declarations.price(&levy[0].id, None).await?;
    println!("\nProfessional levy under negotiated agreement");
    render_declaration(&levy);

    let withdrawn = declarations.create(
        &TaxDefinitionId::from(STAMP_DUTY),
        &fleet,
        vec![ValueSet::new().with("deed_number", "DEED-2025-031")],
    )?;
    let withdrawn = declarations.delete(&withdrawn[0].id)?;
    println!("\nWithdrawn stamp duty filing");
    render_declaration(&withdrawn);

    clock.advance(chrono::Duration::days(late_days.max(0)));
    println!("\n{late_days} day(s) later at the cashier");
    let mut ids = Vec::with_capacity(filed.len());
    for declaration in &filed {
        let repriced = declarations.price(&declaration.id, None).await?;
        render_declaration(&repriced);
        ids.push(repriced.id);
    }

    let mut fields = BTreeMap::new();
    fields.insert("operator".to_string(), "M-Pesa".to_string());
    fields.insert("phone_number".to_string(), "+243 812 000 111".to_string());
    fields.insert("transaction_id".to_string(), "MP250514.1122.A55".to_string());
    let payment = declarations.pay(&ids, PaymentMethod::MobileMoney, fields)?;
    let receipt = declarations.receipt(&payment.id)?;
    render_receipt(&receipt);

    let mut cash = BTreeMap::new();
    cash.insert("receipt_book_number".to_string(), "RB-2025-007".to_string());
    if let Err(err) = declarations.pay(&ids, PaymentMethod::Cash, cash) {
        println!("\nSecond payment attempt rejected: {err}");
    }

    if skip_delivery {
        return Ok(());
    }

    let pending = deliveries.verify(&payment.reference, &ids[0])?;
    println!(
        "\nPlate handover: {} for payment {} is {}",
        pending.id,
        pending.payment_reference,
        pending.status.label()
    );
    let completed = deliveries.complete(&pending.id)?;
    println!("  Handed over: {}", completed.status.label());
    if let Err(err) = deliveries.complete(&pending.id) {
        println!("  Repeat handover rejected: {err}");
    }

    Ok(())
}

fn sample_vehicle(index: usize) -> ValueSet {
    ValueSet::new()
        .with("owner", "Mbuyi Transport")
        .with("plate_number", format!("CGO-{:04}-KN", 1200 + index))
        .with("phone", "+243 812 345 678")
        .with("fiscal_power", "11")
        .with("usage", "commercial")
        .with("usage.licence_number", format!("TL-{:03}", 40 + index))
        .with("registration_card", format!("uploads/card-{index}.pdf"))
}

fn render_declaration(declaration: &Declaration) {
    let view = declaration.status_view();
    let amounts = match (view.principal, view.penalty, view.amount_due) {
        (Some(principal), Some(penalty), Some(due)) => {
            format!("principal {principal}, penalty {penalty}, due {due}")
        }
        _ => "not priced".to_string(),
    };
    println!(
        "  - {} [{}] {}{}",
        view.reference,
        view.status,
        amounts,
        if view.fallback_used { " (flat tariff fallback)" } else { "" }
    );
}

fn render_receipt(receipt: &Receipt) {
    println!("\nReceipt {}", receipt.reference);
    println!("  Method: {}", receipt.method);
    for (name, value) in &receipt.attributes {
        println!("  {name}: {value}");
    }
    for line in &receipt.lines {
        println!(
            "  - {} {}: principal {}, penalty {}",
            line.tax_name, line.reference, line.principal, line.penalty
        );
    }
    println!(
        "  Principal {} + penalty {} = {}",
        receipt.principal, receipt.penalty, receipt.total
    );
}
