use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;
use rust_decimal::Decimal;

use super::common::*;
use crate::error::ErrorKind;
use crate::workflows::declaration::domain::{
    Declaration, DeclarationId, DeclarationStatus, PricingStrategy, TaxDefinition,
    TaxDefinitionId, TaxpayerId,
};
use crate::workflows::declaration::lifecycle::LifecycleAction;
use crate::workflows::declaration::payment::{PaymentFieldError, PaymentMethod};
use crate::workflows::declaration::repository::{
    DeclarationRepository, ReferenceDataError, ReferenceDataSource, RepositoryError,
};
use crate::workflows::declaration::schema::ValueSet;
use crate::workflows::declaration::{
    DeclarationService, DeclarationServiceError, RateScheduleEvaluator,
};
use crate::workflows::delivery::DeliveryStatus;

fn file_vehicles(service: &MemoryService, owners: &[&str]) -> Vec<Declaration> {
    service
        .create(
            &TaxDefinitionId::from(VEHICLE_TAX),
            &TaxpayerId::from(PLAIN_TAXPAYER),
            owners.iter().map(|owner| vehicle_values(owner)).collect(),
        )
        .expect("vehicle batch files")
}

fn file_deed(service: &MemoryService, deed: &str) -> Declaration {
    service
        .create(
            &TaxDefinitionId::from(STAMP_DUTY),
            &TaxpayerId::from(PLAIN_TAXPAYER),
            vec![deed_values(deed)],
        )
        .expect("deed files")
        .remove(0)
}

#[test]
fn create_files_one_draft_per_entry_sharing_a_batch() {
    let (service, store, _clock) = build_service(Arc::new(FailingEvaluator));

    let declarations = file_vehicles(&service, &["A", "B", "C"]);

    assert_eq!(declarations.len(), 3);
    let batch = &declarations[0].batch_id;
    assert!(declarations.iter().all(|d| &d.batch_id == batch));
    assert!(declarations
        .iter()
        .all(|d| d.status == DeclarationStatus::Draft && d.principal.is_none()));
    assert!(declarations.iter().all(|d| d.created_at == filed_at()));
    assert_ne!(declarations[0].id, declarations[1].id);
    assert_ne!(declarations[0].reference, declarations[1].reference);
    assert!(declarations[0].reference.as_str().starts_with("DCL-"));

    let stored = store
        .fetch_declaration(&declarations[2].id)
        .expect("fetch succeeds")
        .expect("record present");
    assert_eq!(stored.values.get("owner"), Some("C"));

    let by_reference = service
        .find_by_reference(&declarations[1].reference)
        .expect("addressable by reference");
    assert_eq!(by_reference.id, declarations[1].id);
    let err = service
        .find_by_reference(&crate::workflows::declaration::ReferenceCode::from("DCL-NOPE"))
        .expect_err("unknown reference");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn create_rejects_unknown_taxpayer_and_empty_batch() {
    let (service, _store, _clock) = build_service(Arc::new(FailingEvaluator));
    let tax = TaxDefinitionId::from(STAMP_DUTY);

    let err = service
        .create(&tax, &TaxpayerId::from("tp-404"), vec![deed_values("D-1")])
        .expect_err("unknown taxpayer");
    assert!(matches!(err, DeclarationServiceError::UnknownTaxpayer(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = service
        .create(&tax, &TaxpayerId::from(PLAIN_TAXPAYER), Vec::new())
        .expect_err("empty batch");
    assert!(matches!(err, DeclarationServiceError::EmptyBatch));
}

struct BrokenReferenceTables;

impl ReferenceDataSource for BrokenReferenceTables {
    fn prefill(&self, _tax: &TaxDefinition, _values: &mut ValueSet) -> Result<(), ReferenceDataError> {
        Err(ReferenceDataError("engine table offline".to_string()))
    }
}

struct FiscalPowerTable;

impl ReferenceDataSource for FiscalPowerTable {
    fn prefill(&self, tax: &TaxDefinition, values: &mut ValueSet) -> Result<(), ReferenceDataError> {
        if tax.id.as_str() == VEHICLE_TAX && !values.contains("fiscal_power") {
            values.insert("fiscal_power", "9");
        }
        Ok(())
    }
}

#[test]
fn reference_data_prefills_missing_values_and_failures_do_not_block_filing() {
    let (service, _store, _clock) = build_service(Arc::new(FailingEvaluator));
    let service = service.with_reference_data(Arc::new(FiscalPowerTable));
    let values = ValueSet::new()
        .with("owner", "A")
        .with("phone", "0812345678")
        .with("usage", "private")
        .with("usage.licence_number", "TL-7")
        .with("registration_card", "uploads/a.pdf");

    let filed = service
        .create(
            &TaxDefinitionId::from(VEHICLE_TAX),
            &TaxpayerId::from(PLAIN_TAXPAYER),
            vec![values],
        )
        .expect("prefilled batch files");
    assert_eq!(filed[0].values.get("fiscal_power"), Some("9"));

    let (service, _store, _clock) = build_service(Arc::new(FailingEvaluator));
    let service = service.with_reference_data(Arc::new(BrokenReferenceTables));
    let filed = file_vehicles(&service, &["B"]);
    assert_eq!(filed.len(), 1);
}

#[tokio::test]
async fn pricing_twice_at_the_same_instant_yields_the_same_amounts() {
    let (service, _store, _clock) =
        build_service(Arc::new(FixedEvaluator::new(Decimal::new(18000, 0))));
    let declaration = file_vehicles(&service, &["A"]).remove(0);

    let first = service.price(&declaration.id, None).await.expect("first pricing");
    let second = service.price(&declaration.id, None).await.expect("second pricing");

    assert_eq!(first.status, DeclarationStatus::Priced);
    assert_eq!(first.principal, Some(Decimal::new(18000, 0)));
    assert_eq!(first.penalty, Some(Decimal::ZERO));
    assert_eq!(second.principal, first.principal);
    assert_eq!(second.penalty, first.penalty);
    assert_eq!(second.version, first.version + 1);
}

#[tokio::test]
async fn repricing_after_two_grace_periods_accrues_the_penalty() {
    let (service, _store, clock) =
        build_service(Arc::new(FixedEvaluator::new(Decimal::new(18000, 0))));
    let declaration = file_vehicles(&service, &["A"]).remove(0);
    service.price(&declaration.id, None).await.expect("initial pricing");

    clock.advance(Duration::days(61));
    let repriced = service.price(&declaration.id, None).await.expect("repricing");

    assert_eq!(repriced.principal, Some(Decimal::new(18000, 0)));
    assert_eq!(repriced.penalty, Some(Decimal::new(3600, 0)));
    assert_eq!(repriced.amount_due(), Some(Decimal::new(21600, 0)));
    let pricing = repriced.pricing.expect("snapshot kept");
    assert_eq!(pricing.elapsed_days, 61);
    assert_eq!(pricing.periods_elapsed, 2);
}

#[tokio::test]
async fn pricing_records_the_flat_tariff_fallback() {
    let (service, _store, _clock) = build_service(Arc::new(FailingEvaluator));
    let declaration = file_vehicles(&service, &["A"]).remove(0);

    let priced = service.price(&declaration.id, None).await.expect("fallback pricing");

    assert_eq!(priced.principal, Some(Decimal::new(15000, 0)));
    let pricing = priced.pricing.as_ref().expect("snapshot");
    assert_eq!(pricing.strategy, PricingStrategy::FlatTariff);
    assert!(pricing.fallback_used);
    assert!(priced.status_view().fallback_used);
}

#[tokio::test]
async fn pricing_a_mandatory_levy_uses_the_stored_agreement() {
    let evaluator = RateScheduleEvaluator::new()
        .with_rate("levy:tier-a", Decimal::new(75000, 0));
    let (service, _store, _clock) = build_service(Arc::new(evaluator));
    let tax = TaxDefinitionId::from(PROFESSIONAL_LEVY);

    let agreed = service
        .create(&tax, &TaxpayerId::from(AGREEMENT_TAXPAYER), vec![levy_values()])
        .expect("levy files")
        .remove(0);
    let priced = service.price(&agreed.id, None).await.expect("agreement pricing");
    assert_eq!(priced.principal, Some(Decimal::new(75000, 0)));

    let plain = service
        .create(&tax, &TaxpayerId::from(PLAIN_TAXPAYER), vec![levy_values()])
        .expect("levy files")
        .remove(0);
    let err = service.price(&plain.id, None).await.expect_err("no agreement");
    assert_eq!(err.kind(), ErrorKind::Resolution);
    let untouched = service.get(&plain.id).expect("still stored");
    assert_eq!(untouched.status, DeclarationStatus::Draft);
}

#[tokio::test]
async fn payment_is_all_or_nothing() {
    let (service, store, _clock) = build_service(Arc::new(FailingEvaluator));
    let priced = file_deed(&service, "D-1");
    let draft = file_deed(&service, "D-2");
    service.price(&priced.id, None).await.expect("priced");

    let err = service
        .pay(
            &[priced.id.clone(), draft.id.clone()],
            PaymentMethod::Cash,
            cash_fields(),
        )
        .expect_err("draft cannot be paid");

    match &err {
        DeclarationServiceError::State(lifecycle) => {
            assert_eq!(lifecycle.id, draft.id);
            assert_eq!(lifecycle.action, LifecycleAction::Pay);
        }
        other => panic!("expected state error, got {other:?}"),
    }
    assert_eq!(
        service.get(&priced.id).expect("present").status,
        DeclarationStatus::Priced
    );
    assert_eq!(store.payment_count().expect("count"), 0);
}

#[tokio::test]
async fn payment_totals_cover_every_declaration() {
    let (service, _store, clock) = build_service(Arc::new(FailingEvaluator));
    let first = file_deed(&service, "D-1");
    let second = file_deed(&service, "D-2");
    service.price(&first.id, None).await.expect("priced");
    service.price(&second.id, None).await.expect("priced");
    clock.advance(Duration::days(16));
    service.price(&second.id, None).await.expect("repriced with penalty");

    let payment = service
        .pay(
            &[first.id.clone(), second.id.clone()],
            PaymentMethod::Cash,
            cash_fields(),
        )
        .expect("payment recorded");

    assert_eq!(payment.principal_total, Decimal::new(5000, 0));
    assert_eq!(payment.penalty_total, Decimal::new(500, 0));
    assert_eq!(payment.total, Decimal::new(5500, 0));
    assert!(payment.reference.as_str().starts_with("PAY-"));
    assert_eq!(
        service.get(&first.id).expect("present").status,
        DeclarationStatus::Paid
    );
}

#[tokio::test]
async fn payment_requires_method_fields() {
    let (service, _store, _clock) = build_service(Arc::new(FailingEvaluator));
    let declaration = file_deed(&service, "D-1");
    service.price(&declaration.id, None).await.expect("priced");

    let mut fields = BTreeMap::new();
    fields.insert("operator".to_string(), "Vodacom".to_string());
    fields.insert("phone_number".to_string(), "81".to_string());
    fields.insert("transaction_id".to_string(), "TX-9".to_string());

    let err = service
        .pay(&[declaration.id.clone()], PaymentMethod::MobileMoney, fields)
        .expect_err("malformed phone");

    assert!(matches!(
        err,
        DeclarationServiceError::Payment(PaymentFieldError::Malformed { .. })
    ));
    assert_eq!(err.field_path().as_deref(), Some("fields.phone_number"));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn payment_rejects_repeated_declarations() {
    let (service, _store, _clock) = build_service(Arc::new(FailingEvaluator));
    let id = DeclarationId::from("dcl-000001");

    let err = service
        .pay(&[id.clone(), id], PaymentMethod::Cash, cash_fields())
        .expect_err("duplicate id");

    assert!(matches!(err, DeclarationServiceError::DuplicateDeclaration(_)));
    assert_eq!(err.field_path().as_deref(), Some("declaration_ids"));
}

#[tokio::test]
async fn concurrent_payments_settle_a_declaration_once() {
    let (service, store, _clock) = build_service(Arc::new(FailingEvaluator));
    let declaration = file_deed(&service, "D-1");
    service.price(&declaration.id, None).await.expect("priced");
    let service = Arc::new(service);

    let outcomes: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&service);
                let id = declaration.id.clone();
                scope.spawn(move || service.pay(&[id], PaymentMethod::Cash, cash_fields()))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread completes"))
            .collect()
    });

    let successes = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    assert_eq!(successes, 1);
    for outcome in outcomes.iter().filter_map(|outcome| outcome.as_ref().err()) {
        assert!(matches!(
            outcome,
            DeclarationServiceError::State(_) | DeclarationServiceError::Conflict
        ));
    }
    assert_eq!(store.payment_count().expect("count"), 1);
}

#[tokio::test]
async fn stale_writers_lose_with_a_conflict() {
    let (service, store, _clock) = build_service(Arc::new(FailingEvaluator));
    let declaration = file_deed(&service, "D-1");
    service.price(&declaration.id, None).await.expect("priced");
    let stale = store
        .fetch_declaration(&declaration.id)
        .expect("fetch")
        .expect("present");

    service
        .pay(&[declaration.id.clone()], PaymentMethod::Cash, cash_fields())
        .expect("paid");

    let err = store.update_declaration(stale).expect_err("stale write");
    assert_eq!(err, RepositoryError::Conflict);
    assert_eq!(
        DeclarationServiceError::from(err).kind(),
        ErrorKind::Conflict
    );
}

#[tokio::test]
async fn delete_is_limited_to_unpaid_declarations() {
    let (service, _store, _clock) = build_service(Arc::new(FailingEvaluator));
    let draft = file_deed(&service, "D-1");
    let paid = file_deed(&service, "D-2");
    service.price(&paid.id, None).await.expect("priced");
    service
        .pay(&[paid.id.clone()], PaymentMethod::Cash, cash_fields())
        .expect("paid");

    let deleted = service.delete(&draft.id).expect("draft deleted");
    assert_eq!(deleted.status, DeclarationStatus::Deleted);

    let err = service.delete(&paid.id).expect_err("paid is terminal");
    assert_eq!(err.kind(), ErrorKind::State);

    let err = service.price(&draft.id, None).await.expect_err("deleted is terminal");
    assert!(matches!(err, DeclarationServiceError::State(_)));

    let err = service.delete(&DeclarationId::from("dcl-999999")).expect_err("missing");
    assert!(matches!(err, DeclarationServiceError::DeclarationNotFound(_)));
}

#[tokio::test]
async fn receipt_is_reproducible_and_matches_the_payment() {
    let (service, _store, clock) =
        build_service(Arc::new(FixedEvaluator::new(Decimal::new(18000, 0))));
    let declarations = file_vehicles(&service, &["A", "B"]);
    let ids: Vec<DeclarationId> = declarations.iter().map(|d| d.id.clone()).collect();
    for id in &ids {
        service.price(id, None).await.expect("priced");
    }
    let payment = service
        .pay(&ids, PaymentMethod::Cash, cash_fields())
        .expect("paid");

    let first = service.receipt(&payment.id).expect("receipt");
    clock.advance(Duration::days(90));
    let second = service.receipt(&payment.id).expect("receipt again");

    assert_eq!(first, second);
    assert_eq!(first.reference, payment.reference);
    assert_eq!(first.total, Decimal::new(36000, 0));
    assert_eq!(first.lines.len(), 2);
    assert_eq!(first.lines[0].tax_name, "Vehicle tax");
    assert_eq!(first.lines[1].values.get("owner"), Some("B"));
    assert_eq!(
        first.attributes.get("receipt_book_number").map(String::as_str),
        Some("RB-2025-118")
    );
}

#[tokio::test]
async fn paying_for_a_plate_opens_a_pending_delivery() {
    let (service, store, _clock) =
        build_service(Arc::new(FixedEvaluator::new(Decimal::new(18000, 0))));
    let vehicle = file_vehicles(&service, &["A"]).remove(0);
    let deed = file_deed(&service, "D-1");
    service.price(&vehicle.id, None).await.expect("priced");
    service.price(&deed.id, None).await.expect("priced");

    service
        .pay(&[deed.id.clone()], PaymentMethod::Cash, cash_fields())
        .expect("deed paid");
    assert!(store.deliveries().expect("list").is_empty());

    let payment = service
        .pay(&[vehicle.id.clone()], PaymentMethod::Cash, cash_fields())
        .expect("vehicle paid");
    let deliveries = store.deliveries().expect("list");
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].payment_reference, payment.reference);
    assert_eq!(deliveries[0].status, DeliveryStatus::Pending);
    assert!(deliveries[0].covers(&vehicle.id));
}

#[test]
fn repository_outages_surface_as_internal_errors() {
    let service = DeclarationService::new(
        Arc::new(UnavailableRepository),
        seeded_store(),
        Arc::new(FailingEvaluator),
        &engine_config(),
    );

    let err = service
        .get(&DeclarationId::from("dcl-000001"))
        .expect_err("repository offline");

    assert!(matches!(
        err,
        DeclarationServiceError::Repository(RepositoryError::Unavailable(_))
    ));
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[tokio::test]
async fn first_pricing_of_an_overdue_draft_accrues_the_penalty() {
    let (service, _store, clock) =
        build_service(Arc::new(FixedEvaluator::new(Decimal::new(18000, 0))));
    let declaration = file_vehicles(&service, &["A"]).remove(0);

    clock.advance(Duration::days(61));
    let priced = service.price(&declaration.id, None).await.expect("late pricing");

    assert_eq!(priced.principal, Some(Decimal::new(18000, 0)));
    assert_eq!(priced.penalty, Some(Decimal::new(3600, 0)));
    let pricing = priced.pricing.expect("snapshot kept");
    assert_eq!(pricing.elapsed_days, 61);
    assert_eq!(pricing.periods_elapsed, 2);

    let payment = service
        .pay(&[priced.id.clone()], PaymentMethod::Cash, cash_fields())
        .expect("paid");
    assert_eq!(payment.penalty_total, Decimal::new(3600, 0));
    assert_eq!(payment.total, Decimal::new(21600, 0));
}

#[tokio::test]
async fn referenced_tax_definitions_cannot_be_replaced() {
    let (service, store, _clock) = build_service(Arc::new(FailingEvaluator));
    let deed = file_deed(&service, "D-1");
    service.price(&deed.id, None).await.expect("priced");
    let payment = service
        .pay(&[deed.id.clone()], PaymentMethod::Cash, cash_fields())
        .expect("paid");
    let before = service.receipt(&payment.id).expect("receipt");

    let mut renamed = stamp_duty();
    renamed.name = "Renamed duty".to_string();
    let err = store
        .register_tax_definition(renamed)
        .expect_err("definition is frozen");
    assert!(matches!(err, RepositoryError::DefinitionInUse(ref id) if id == STAMP_DUTY));
    assert_eq!(
        DeclarationServiceError::from(err).kind(),
        ErrorKind::State
    );

    let after = service.receipt(&payment.id).expect("receipt again");
    assert_eq!(after, before);
    assert_eq!(after.lines[0].tax_name, "Stamp duty");

    let mut unused = vehicle_tax();
    unused.name = "Vehicle tax 2025".to_string();
    store
        .register_tax_definition(unused)
        .expect("unreferenced definitions may still change");
}

#[tokio::test]
async fn quoted_batch_total_matches_the_sum_of_filed_prices_for_additive_rates() {
    let evaluator =
        RateScheduleEvaluator::new().with_rate("levy:tier-a", Decimal::new(75000, 0));
    let (service, _store, _clock) = build_service(Arc::new(evaluator));
    let tax = TaxDefinitionId::from(PROFESSIONAL_LEVY);
    let taxpayer = TaxpayerId::from(AGREEMENT_TAXPAYER);
    let batch = vec![levy_values(), levy_values()];

    let quoted = service
        .quote(&tax, &batch, Some(&taxpayer), None)
        .await
        .expect("batch quoted");

    let filed = service.create(&tax, &taxpayer, batch).expect("batch filed");
    let mut priced_total = Decimal::ZERO;
    for declaration in &filed {
        let priced = service.price(&declaration.id, None).await.expect("priced");
        priced_total += priced.principal.expect("principal set");
    }

    assert_eq!(quoted.amount, Decimal::new(150000, 0));
    assert_eq!(priced_total, quoted.amount);
}
