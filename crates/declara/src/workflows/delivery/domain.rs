use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::declaration::domain::{DeclarationId, DocumentKind, ReferenceCode};
use crate::workflows::declaration::payment::PaymentId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(pub String);

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Completion flag. Stored and exchanged as `1` (pending) / `0` (completed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum DeliveryStatus {
    Pending,
    Completed,
}

impl DeliveryStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Completed => "completed",
        }
    }
}

impl From<DeliveryStatus> for u8 {
    fn from(status: DeliveryStatus) -> Self {
        match status {
            DeliveryStatus::Pending => 1,
            DeliveryStatus::Completed => 0,
        }
    }
}

impl TryFrom<u8> for DeliveryStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(DeliveryStatus::Pending),
            0 => Ok(DeliveryStatus::Completed),
            other => Err(format!("unknown delivery flag {other}")),
        }
    }
}

/// Tracks handover of a plate or card owed after payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: DeliveryId,
    pub payment_id: PaymentId,
    pub payment_reference: ReferenceCode,
    pub declaration_ids: Vec<DeclarationId>,
    pub document: DocumentKind,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: u64,
}

/// Completion attempted on a record that is already completed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("delivery {id} was already completed at {completed_at}")]
pub struct AlreadyCompleted {
    pub id: DeliveryId,
    pub completed_at: DateTime<Utc>,
}

impl DeliveryRecord {
    pub fn new_pending(
        id: DeliveryId,
        payment_id: PaymentId,
        payment_reference: ReferenceCode,
        declaration_ids: Vec<DeclarationId>,
        document: DocumentKind,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            payment_id,
            payment_reference,
            declaration_ids,
            document,
            status: DeliveryStatus::Pending,
            created_at,
            completed_at: None,
            version: 0,
        }
    }

    pub fn covers(&self, declaration: &DeclarationId) -> bool {
        self.declaration_ids.iter().any(|id| id == declaration)
    }

    pub(crate) fn complete(&mut self, now: DateTime<Utc>) -> Result<(), AlreadyCompleted> {
        if let DeliveryStatus::Completed = self.status {
            return Err(AlreadyCompleted {
                id: self.id.clone(),
                completed_at: self.completed_at.unwrap_or(now),
            });
        }
        self.status = DeliveryStatus::Completed;
        self.completed_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_keeps_the_pending_is_one_convention() {
        assert_eq!(serde_json::to_value(DeliveryStatus::Pending).unwrap(), 1);
        assert_eq!(serde_json::to_value(DeliveryStatus::Completed).unwrap(), 0);
        let parsed: DeliveryStatus = serde_json::from_value(serde_json::json!(0)).unwrap();
        assert_eq!(parsed, DeliveryStatus::Completed);
        assert!(serde_json::from_value::<DeliveryStatus>(serde_json::json!(2)).is_err());
    }

    #[test]
    fn completion_happens_once() {
        let at = Utc.with_ymd_and_hms(2025, 5, 2, 8, 0, 0).unwrap();
        let mut record = DeliveryRecord::new_pending(
            DeliveryId("dlv-1".to_string()),
            PaymentId("pay-1".to_string()),
            ReferenceCode::from("PAY-1"),
            vec![DeclarationId::from("dcl-1")],
            DocumentKind::Plate,
            at,
        );

        record.complete(at).expect("first completion");
        let err = record.complete(at).expect_err("second completion fails");
        assert_eq!(err.completed_at, at);
        assert_eq!(record.status, DeliveryStatus::Completed);
    }
}
