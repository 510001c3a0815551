use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::domain::{DeliveryId, DeliveryRecord};
use super::repository::DeliveryRepository;
use super::service::{DeliveryService, DeliveryServiceError};
use crate::error::{error_response, ErrorKind};
use crate::workflows::declaration::domain::{DeclarationId, ReferenceCode};

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub reference: String,
    pub document_id: String,
}

/// Counter-facing view of a delivery.
#[derive(Debug, Serialize)]
pub struct DeliveryView {
    pub delivery_id: DeliveryId,
    pub payment_reference: ReferenceCode,
    pub document: &'static str,
    pub status: &'static str,
    /// `1` while pending, `0` once handed over.
    pub pending: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<&DeliveryRecord> for DeliveryView {
    fn from(record: &DeliveryRecord) -> Self {
        Self {
            delivery_id: record.id.clone(),
            payment_reference: record.payment_reference.clone(),
            document: record.document.label(),
            status: record.status.label(),
            pending: record.status.into(),
            completed_at: record.completed_at,
        }
    }
}

pub fn delivery_router<R>(service: Arc<DeliveryService<R>>) -> Router
where
    R: DeliveryRepository + 'static,
{
    Router::new()
        .route("/api/v1/deliveries/verify", get(verify_handler::<R>))
        .route(
            "/api/v1/deliveries/:delivery_id/complete",
            post(complete_handler::<R>),
        )
        .with_state(service)
}

pub(crate) async fn verify_handler<R>(
    State(service): State<Arc<DeliveryService<R>>>,
    Query(query): Query<VerifyQuery>,
) -> Response
where
    R: DeliveryRepository + 'static,
{
    let reference = ReferenceCode(query.reference);
    let declaration_id = DeclarationId(query.document_id);
    match service.verify(&reference, &declaration_id) {
        Ok(record) => (StatusCode::OK, Json(DeliveryView::from(&record))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn complete_handler<R>(
    State(service): State<Arc<DeliveryService<R>>>,
    Path(delivery_id): Path<String>,
) -> Response
where
    R: DeliveryRepository + 'static,
{
    match service.complete(&DeliveryId(delivery_id)) {
        Ok(record) => (StatusCode::OK, Json(DeliveryView::from(&record))).into_response(),
        Err(err) => err.into_response(),
    }
}

impl IntoResponse for DeliveryServiceError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        if kind == ErrorKind::Internal {
            error!(error = %self, "delivery operation failed");
        }
        error_response(kind, self.to_string(), None, None)
    }
}
