use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::domain::{
    BatchId, DeclarationId, DeclarationStatusView, Formula, ReferenceCode, TaxDefinitionId,
    TaxpayerId,
};
use super::payment::{PaymentId, PaymentMethod};
use super::repository::{DeclarationRepository, TaxpayerDirectory};
use super::schema::ValueSet;
use super::service::{DeclarationService, DeclarationServiceError};
use crate::error::{error_response, ErrorKind};

type SharedService<R, T> = Arc<DeclarationService<R, T>>;

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub tax_definition_id: TaxDefinitionId,
    pub batch: Vec<ValueSet>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub tax_definition_id: TaxDefinitionId,
    pub batch: Vec<ValueSet>,
    #[serde(default)]
    pub taxpayer_id: Option<TaxpayerId>,
    #[serde(default)]
    pub formula: Option<Formula>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub tax_definition_id: TaxDefinitionId,
    pub taxpayer_id: TaxpayerId,
    pub batch: Vec<ValueSet>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PriceRequest {
    #[serde(default)]
    pub formula: Option<Formula>,
}

#[derive(Debug, Deserialize)]
pub struct PayRequest {
    pub declaration_ids: Vec<DeclarationId>,
    pub method: PaymentMethod,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedBatchView {
    pub batch_id: BatchId,
    pub declarations: Vec<DeclarationStatusView>,
}

/// Router builder exposing the declaration lifecycle over HTTP.
pub fn declaration_router<R, T>(service: SharedService<R, T>) -> Router
where
    R: DeclarationRepository + 'static,
    T: TaxpayerDirectory + 'static,
{
    Router::new()
        .route("/api/v1/declarations", post(create_handler::<R, T>))
        .route(
            "/api/v1/declarations/validate",
            post(validate_handler::<R, T>),
        )
        .route("/api/v1/declarations/quote", post(quote_handler::<R, T>))
        .route(
            "/api/v1/declarations/:declaration_id",
            get(status_handler::<R, T>).delete(delete_handler::<R, T>),
        )
        .route(
            "/api/v1/declarations/by-reference/:reference",
            get(reference_handler::<R, T>),
        )
        .route(
            "/api/v1/declarations/:declaration_id/price",
            post(price_handler::<R, T>),
        )
        .route("/api/v1/payments", post(pay_handler::<R, T>))
        .route(
            "/api/v1/payments/:payment_id/receipt",
            get(receipt_handler::<R, T>),
        )
        .with_state(service)
}

pub(crate) async fn validate_handler<R, T>(
    State(service): State<SharedService<R, T>>,
    Json(request): Json<BatchRequest>,
) -> Response
where
    R: DeclarationRepository + 'static,
    T: TaxpayerDirectory + 'static,
{
    match service.validate(&request.tax_definition_id, &request.batch) {
        Ok(report) => {
            let payload = json!({
                "valid": report.is_valid(),
                "errors": report,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn quote_handler<R, T>(
    State(service): State<SharedService<R, T>>,
    Json(request): Json<QuoteRequest>,
) -> Response
where
    R: DeclarationRepository + 'static,
    T: TaxpayerDirectory + 'static,
{
    let QuoteRequest {
        tax_definition_id,
        batch,
        taxpayer_id,
        formula,
    } = request;

    match service
        .quote(&tax_definition_id, &batch, taxpayer_id.as_ref(), formula)
        .await
    {
        Ok(resolution) => (StatusCode::OK, Json(resolution)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn create_handler<R, T>(
    State(service): State<SharedService<R, T>>,
    Json(request): Json<CreateRequest>,
) -> Response
where
    R: DeclarationRepository + 'static,
    T: TaxpayerDirectory + 'static,
{
    match service.create(
        &request.tax_definition_id,
        &request.taxpayer_id,
        request.batch,
    ) {
        Ok(declarations) => {
            let batch_id = declarations
                .first()
                .map(|declaration| declaration.batch_id.clone())
                .unwrap_or_else(|| BatchId(String::new()));
            let view = CreatedBatchView {
                batch_id,
                declarations: declarations
                    .iter()
                    .map(|declaration| declaration.status_view())
                    .collect(),
            };
            (StatusCode::CREATED, Json(view)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn status_handler<R, T>(
    State(service): State<SharedService<R, T>>,
    Path(declaration_id): Path<String>,
) -> Response
where
    R: DeclarationRepository + 'static,
    T: TaxpayerDirectory + 'static,
{
    match service.get(&DeclarationId(declaration_id)) {
        Ok(declaration) => (StatusCode::OK, Json(declaration.status_view())).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn reference_handler<R, T>(
    State(service): State<SharedService<R, T>>,
    Path(reference): Path<String>,
) -> Response
where
    R: DeclarationRepository + 'static,
    T: TaxpayerDirectory + 'static,
{
    match service.find_by_reference(&ReferenceCode(reference)) {
        Ok(declaration) => (StatusCode::OK, Json(declaration.status_view())).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn price_handler<R, T>(
    State(service): State<SharedService<R, T>>,
    Path(declaration_id): Path<String>,
    request: Option<Json<PriceRequest>>,
) -> Response
where
    R: DeclarationRepository + 'static,
    T: TaxpayerDirectory + 'static,
{
    let PriceRequest { formula } = request.map(|Json(body)| body).unwrap_or_default();
    match service.price(&DeclarationId(declaration_id), formula).await {
        Ok(declaration) => (StatusCode::OK, Json(declaration.status_view())).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn delete_handler<R, T>(
    State(service): State<SharedService<R, T>>,
    Path(declaration_id): Path<String>,
) -> Response
where
    R: DeclarationRepository + 'static,
    T: TaxpayerDirectory + 'static,
{
    match service.delete(&DeclarationId(declaration_id)) {
        Ok(declaration) => (StatusCode::OK, Json(declaration.status_view())).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn pay_handler<R, T>(
    State(service): State<SharedService<R, T>>,
    Json(request): Json<PayRequest>,
) -> Response
where
    R: DeclarationRepository + 'static,
    T: TaxpayerDirectory + 'static,
{
    match service.pay(&request.declaration_ids, request.method, request.fields) {
        Ok(payment) => (StatusCode::CREATED, Json(payment)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn receipt_handler<R, T>(
    State(service): State<SharedService<R, T>>,
    Path(payment_id): Path<String>,
) -> Response
where
    R: DeclarationRepository + 'static,
    T: TaxpayerDirectory + 'static,
{
    match service.receipt(&PaymentId(payment_id)) {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(err) => err.into_response(),
    }
}

impl IntoResponse for DeclarationServiceError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        if kind == ErrorKind::Internal {
            error!(error = %self, "declaration operation failed");
        }
        let errors = match &self {
            DeclarationServiceError::Validation(report) => serde_json::to_value(report).ok(),
            _ => None,
        };
        error_response(kind, self.to_string(), self.field_path(), errors)
    }
}
