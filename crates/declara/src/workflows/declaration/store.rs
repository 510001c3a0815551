use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{
    Declaration, DeclarationId, ReferenceCode, TaxDefinition, TaxDefinitionId, Taxpayer,
    TaxpayerId,
};
use super::payment::{PaymentId, PaymentTransaction};
use super::repository::{DeclarationRepository, RepositoryError, Settlement, TaxpayerDirectory};
use crate::workflows::delivery::domain::{DeliveryId, DeliveryRecord};
use crate::workflows::delivery::repository::DeliveryRepository;

#[derive(Default)]
struct StoreState {
    taxes: HashMap<TaxDefinitionId, TaxDefinition>,
    taxpayers: HashMap<TaxpayerId, Taxpayer>,
    declarations: HashMap<DeclarationId, Declaration>,
    payments: HashMap<PaymentId, PaymentTransaction>,
    deliveries: HashMap<DeliveryId, DeliveryRecord>,
    references: HashSet<String>,
}

/// Process-local store backing every repository trait behind a single lock.
///
/// Each trait call holds the lock for its whole duration, which gives the all-or-nothing
/// semantics the lifecycle needs; version checks catch writers working from stale reads.
#[derive(Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tax definition. Once a declaration references it the definition is frozen.
    pub fn register_tax_definition(&self, tax: TaxDefinition) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        if state
            .declarations
            .values()
            .any(|declaration| declaration.tax_definition_id == tax.id)
        {
            return Err(RepositoryError::DefinitionInUse(tax.id.as_str().to_string()));
        }
        state.taxes.insert(tax.id.clone(), tax);
        Ok(())
    }

    pub fn register_taxpayer(&self, taxpayer: Taxpayer) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        state.taxpayers.insert(taxpayer.id.clone(), taxpayer);
        Ok(())
    }

    pub fn payment_count(&self) -> Result<usize, RepositoryError> {
        Ok(self.lock()?.payments.len())
    }

    pub fn deliveries(&self) -> Result<Vec<DeliveryRecord>, RepositoryError> {
        let state = self.lock()?;
        let mut records: Vec<DeliveryRecord> = state.deliveries.values().cloned().collect();
        records.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(records)
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store lock poisoned".to_string()))
    }
}

fn ensure_version<T>(stored: Option<&T>, version_of: impl Fn(&T) -> u64, expected: u64) -> Result<(), RepositoryError> {
    match stored {
        None => Err(RepositoryError::NotFound),
        Some(current) if version_of(current) != expected => Err(RepositoryError::Conflict),
        Some(_) => Ok(()),
    }
}

fn ensure_fresh_reference(state: &StoreState, reference: &ReferenceCode) -> Result<(), RepositoryError> {
    if state.references.contains(reference.as_str()) {
        Err(RepositoryError::DuplicateReference(reference.0.clone()))
    } else {
        Ok(())
    }
}

impl DeclarationRepository for MemoryStore {
    fn tax_definition(
        &self,
        id: &TaxDefinitionId,
    ) -> Result<Option<TaxDefinition>, RepositoryError> {
        Ok(self.lock()?.taxes.get(id).cloned())
    }

    fn insert_declarations(
        &self,
        records: Vec<Declaration>,
    ) -> Result<Vec<Declaration>, RepositoryError> {
        let mut state = self.lock()?;
        let mut seen = HashSet::new();
        for record in &records {
            if state.declarations.contains_key(&record.id) {
                return Err(RepositoryError::Conflict);
            }
            ensure_fresh_reference(&state, &record.reference)?;
            if !seen.insert(record.reference.as_str()) {
                return Err(RepositoryError::DuplicateReference(record.reference.0.clone()));
            }
        }

        for record in &records {
            state.references.insert(record.reference.0.clone());
            state.declarations.insert(record.id.clone(), record.clone());
        }
        Ok(records)
    }

    fn fetch_declaration(
        &self,
        id: &DeclarationId,
    ) -> Result<Option<Declaration>, RepositoryError> {
        Ok(self.lock()?.declarations.get(id).cloned())
    }

    fn declaration_by_reference(
        &self,
        reference: &ReferenceCode,
    ) -> Result<Option<Declaration>, RepositoryError> {
        Ok(self
            .lock()?
            .declarations
            .values()
            .find(|record| &record.reference == reference)
            .cloned())
    }

    fn update_declaration(&self, mut record: Declaration) -> Result<Declaration, RepositoryError> {
        let mut state = self.lock()?;
        ensure_version(state.declarations.get(&record.id), |d| d.version, record.version)?;
        record.version += 1;
        state.declarations.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn commit_payment(
        &self,
        settlement: Settlement,
    ) -> Result<PaymentTransaction, RepositoryError> {
        let Settlement {
            payment,
            declarations,
            delivery,
        } = settlement;

        let mut state = self.lock()?;
        if state.payments.contains_key(&payment.id) {
            return Err(RepositoryError::Conflict);
        }
        ensure_fresh_reference(&state, &payment.reference)?;
        for record in &declarations {
            ensure_version(state.declarations.get(&record.id), |d| d.version, record.version)?;
        }
        if let Some(delivery) = &delivery {
            if state.deliveries.contains_key(&delivery.id) {
                return Err(RepositoryError::Conflict);
            }
        }

        for mut record in declarations {
            record.version += 1;
            state.declarations.insert(record.id.clone(), record);
        }
        if let Some(delivery) = delivery {
            state.deliveries.insert(delivery.id.clone(), delivery);
        }
        state.references.insert(payment.reference.0.clone());
        state.payments.insert(payment.id.clone(), payment.clone());
        Ok(payment)
    }

    fn fetch_payment(&self, id: &PaymentId) -> Result<Option<PaymentTransaction>, RepositoryError> {
        Ok(self.lock()?.payments.get(id).cloned())
    }
}

impl TaxpayerDirectory for MemoryStore {
    fn resolve_taxpayer(&self, id: &TaxpayerId) -> Result<Option<Taxpayer>, RepositoryError> {
        Ok(self.lock()?.taxpayers.get(id).cloned())
    }
}

impl DeliveryRepository for MemoryStore {
    fn fetch_delivery(&self, id: &DeliveryId) -> Result<Option<DeliveryRecord>, RepositoryError> {
        Ok(self.lock()?.deliveries.get(id).cloned())
    }

    fn delivery_by_payment_reference(
        &self,
        reference: &ReferenceCode,
    ) -> Result<Option<DeliveryRecord>, RepositoryError> {
        Ok(self
            .lock()?
            .deliveries
            .values()
            .find(|record| &record.payment_reference == reference)
            .cloned())
    }

    fn update_delivery(&self, mut record: DeliveryRecord) -> Result<DeliveryRecord, RepositoryError> {
        let mut state = self.lock()?;
        ensure_version(state.deliveries.get(&record.id), |d| d.version, record.version)?;
        record.version += 1;
        state.deliveries.insert(record.id.clone(), record.clone());
        Ok(record)
    }
}
