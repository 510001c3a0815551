use std::sync::Arc;

use tracing::info;

use super::domain::{AlreadyCompleted, DeliveryId, DeliveryRecord, DeliveryStatus};
use super::repository::DeliveryRepository;
use crate::error::ErrorKind;
use crate::workflows::clock::{Clock, SystemClock};
use crate::workflows::declaration::domain::{DeclarationId, ReferenceCode};
use crate::workflows::declaration::repository::RepositoryError;

/// Two-phase handover of plates and cards: verify at the counter, then complete.
pub struct DeliveryService<R> {
    repository: Arc<R>,
    clock: Arc<dyn Clock>,
}

impl<R> DeliveryService<R>
where
    R: DeliveryRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Look up the pending delivery for a payment reference and one of its declarations.
    /// Read-only.
    pub fn verify(
        &self,
        reference: &ReferenceCode,
        declaration_id: &DeclarationId,
    ) -> Result<DeliveryRecord, DeliveryServiceError> {
        let record = self
            .repository
            .delivery_by_payment_reference(reference)?
            .filter(|record| record.covers(declaration_id))
            .ok_or_else(|| DeliveryServiceError::NotFound {
                reference: reference.clone(),
                declaration_id: declaration_id.clone(),
            })?;

        if record.status == DeliveryStatus::Completed {
            return Err(DeliveryServiceError::AlreadyCompleted(AlreadyCompleted {
                id: record.id,
                completed_at: record.completed_at.unwrap_or(record.created_at),
            }));
        }
        Ok(record)
    }

    /// Mark a pending delivery as handed over. A second call is an error, never a no-op.
    pub fn complete(&self, id: &DeliveryId) -> Result<DeliveryRecord, DeliveryServiceError> {
        let mut record = self
            .repository
            .fetch_delivery(id)?
            .ok_or_else(|| DeliveryServiceError::DeliveryNotFound(id.clone()))?;

        record.complete(self.clock.now())?;
        let stored = self.repository.update_delivery(record)?;
        info!(
            delivery = %stored.id,
            payment = %stored.payment_id,
            document = stored.document.label(),
            "delivery completed"
        );
        Ok(stored)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryServiceError {
    #[error("no delivery for payment {reference} covering declaration {declaration_id}")]
    NotFound {
        reference: ReferenceCode,
        declaration_id: DeclarationId,
    },
    #[error("delivery {0} not found")]
    DeliveryNotFound(DeliveryId),
    #[error(transparent)]
    AlreadyCompleted(#[from] AlreadyCompleted),
    #[error("delivery was modified concurrently; retry the whole operation")]
    Conflict,
    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for DeliveryServiceError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict => Self::Conflict,
            other => Self::Repository(other),
        }
    }
}

impl DeliveryServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. }
            | Self::DeliveryNotFound(_)
            | Self::Repository(RepositoryError::NotFound) => ErrorKind::NotFound,
            Self::AlreadyCompleted(_) => ErrorKind::State,
            Self::Conflict => ErrorKind::Conflict,
            Self::Repository(_) => ErrorKind::Internal,
        }
    }
}
