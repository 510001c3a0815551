use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::workflows::clock::FixedClock;
use crate::workflows::declaration::domain::{DeclarationId, DocumentKind, ReferenceCode};
use crate::workflows::declaration::payment::{PaymentId, PaymentMethod, PaymentTransaction};
use crate::workflows::declaration::repository::{DeclarationRepository, Settlement};
use crate::workflows::declaration::store::MemoryStore;
use crate::workflows::delivery::domain::{DeliveryId, DeliveryRecord};
use crate::workflows::delivery::DeliveryService;

pub(super) const PAYMENT_REFERENCE: &str = "PAY-7F3A9C";
pub(super) const DELIVERY: &str = "dlv-test-01";

pub(super) fn paid_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 2, 10, 30, 0).unwrap()
}

pub(super) fn covered() -> Vec<DeclarationId> {
    vec![DeclarationId::from("dcl-test-01"), DeclarationId::from("dcl-test-02")]
}

/// Store holding one settled plate payment with its pending delivery.
pub(super) fn store_with_pending_plate() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    let payment = PaymentTransaction {
        id: PaymentId("pay-test-01".to_string()),
        reference: ReferenceCode::from(PAYMENT_REFERENCE),
        declaration_ids: covered(),
        method: PaymentMethod::Cash,
        attributes: BTreeMap::new(),
        principal_total: Decimal::new(36000, 0),
        penalty_total: Decimal::ZERO,
        total: Decimal::new(36000, 0),
        paid_at: paid_at(),
    };
    let delivery = DeliveryRecord::new_pending(
        DeliveryId(DELIVERY.to_string()),
        payment.id.clone(),
        payment.reference.clone(),
        payment.declaration_ids.clone(),
        DocumentKind::Plate,
        paid_at(),
    );
    store
        .commit_payment(Settlement {
            payment,
            declarations: Vec::new(),
            delivery: Some(delivery),
        })
        .expect("settlement commits");
    Arc::new(store)
}

pub(super) fn build_service() -> (DeliveryService<MemoryStore>, Arc<MemoryStore>, Arc<FixedClock>) {
    let store = store_with_pending_plate();
    let clock = Arc::new(FixedClock::at(paid_at()));
    let service = DeliveryService::new(store.clone()).with_clock(clock.clone());
    (service, store, clock)
}
