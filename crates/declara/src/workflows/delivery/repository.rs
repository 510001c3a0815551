use super::domain::{DeliveryId, DeliveryRecord};
use crate::workflows::declaration::domain::ReferenceCode;
use crate::workflows::declaration::repository::RepositoryError;

/// Persistence seam for delivery records. Same optimistic contract as declarations.
pub trait DeliveryRepository: Send + Sync {
    fn fetch_delivery(&self, id: &DeliveryId) -> Result<Option<DeliveryRecord>, RepositoryError>;
    fn delivery_by_payment_reference(
        &self,
        reference: &ReferenceCode,
    ) -> Result<Option<DeliveryRecord>, RepositoryError>;
    fn update_delivery(&self, record: DeliveryRecord) -> Result<DeliveryRecord, RepositoryError>;
}
