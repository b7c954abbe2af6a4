//! Order workflow endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{OrderId, ProviderId, SubjectId};
use domain::{
    AmendOrder, CancelOrder, CreateOrder, FulfillmentOrder, HistoryEntry, ItemChanges, Money,
    OrderItem, OrderKind, PaymentMethod, Receipt, VerifyCoverage,
};
use order_store::{OrderQuery, OrderStore, Version};
use serde::{Deserialize, Serialize};
use settlement::{SequentialReceiptNumbers, SettleOrder};

use crate::directory::Directory;
use crate::error::ApiError;
use crate::orchestrator::{self, OrchestrationApi, SettlementOutcome};

/// Shared application state accessible from all handlers.
pub struct AppState<S: OrderStore + Clone> {
    pub api: OrchestrationApi<S, SequentialReceiptNumbers<S>>,
    pub directory: Arc<dyn Directory>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub kind: OrderKind,
    pub subject_id: String,
    pub provider_id: String,
    pub origin_department_id: String,
    pub fulfilling_department_id: String,
    pub item_description: String,
    pub quantity: u32,
    pub unit_cost_cents: i64,
    pub created_by: String,
}

#[derive(Deserialize)]
pub struct AdvanceRequest {
    pub status: String,
    pub version: i64,
    pub actor: String,
}

#[derive(Deserialize)]
pub struct CoverageRequest {
    pub version: i64,
    pub actor: String,
    pub total_cost_cents: Option<i64>,
    pub coverage_percentage: Option<f64>,
    pub fixed_copay_cents: Option<i64>,
}

#[derive(Deserialize)]
pub struct AmendRequest {
    pub version: i64,
    pub actor: String,
    pub item_description: Option<String>,
    pub quantity: Option<u32>,
    pub unit_cost_cents: Option<i64>,
}

#[derive(Deserialize)]
pub struct SettleRequest {
    pub version: i64,
    pub actor: String,
    pub amount_tendered_cents: i64,
    pub payment_method: String,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub version: i64,
    pub actor: String,
    pub reason: String,
}

/// Worklist filters. `status` accepts a comma-separated list.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub fulfilling_department_id: Option<String>,
    pub origin_department_id: Option<String>,
    pub subject_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub version: i64,
    pub kind: OrderKind,
    pub status: String,
    pub subject_id: String,
    pub subject_name: Option<String>,
    pub provider_id: String,
    pub provider_name: Option<String>,
    pub origin_department_id: String,
    pub fulfilling_department_id: String,
    pub item: ItemResponse,
    pub total_cost_cents: i64,
    pub amount_due_cents: i64,
    pub coverage: Option<CoverageResponse>,
    pub receipt_number: Option<String>,
    pub cancellation_reason: Option<String>,
    pub history: Vec<HistoryResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct ItemResponse {
    pub description: String,
    pub quantity: u32,
    pub unit_cost_cents: i64,
}

#[derive(Serialize)]
pub struct CoverageResponse {
    pub total_cost_cents: i64,
    pub coverage_percentage: Option<f64>,
    pub fixed_copay_cents: Option<i64>,
    pub insurer_amount_cents: i64,
    pub patient_amount_cents: i64,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub status: String,
    pub actor: String,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Serialize)]
pub struct ReceiptResponse {
    pub receipt_number: String,
    pub order_id: String,
    pub amount_due_cents: i64,
    pub amount_tendered_cents: i64,
    pub change_given_cents: i64,
    pub payment_method: PaymentMethod,
    pub issued_at: DateTime<Utc>,
    pub issued_by: String,
}

#[derive(Serialize)]
pub struct SettleResponse {
    pub order: OrderResponse,
    pub receipt: ReceiptResponse,
    pub already_settled: bool,
}

impl From<&HistoryEntry> for HistoryResponse {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            status: entry.status.to_string(),
            actor: entry.actor.clone(),
            at: entry.at,
            note: entry.note.clone(),
        }
    }
}

impl From<&Receipt> for ReceiptResponse {
    fn from(receipt: &Receipt) -> Self {
        Self {
            receipt_number: receipt.receipt_number.clone(),
            order_id: receipt.order_id.to_string(),
            amount_due_cents: receipt.amount_due.cents(),
            amount_tendered_cents: receipt.amount_tendered.cents(),
            change_given_cents: receipt.change_given.cents(),
            payment_method: receipt.payment_method,
            issued_at: receipt.issued_at,
            issued_by: receipt.issued_by.clone(),
        }
    }
}

// -- Handlers --

/// POST /orders
#[tracing::instrument(skip(state, req))]
pub async fn create<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let subject_id: SubjectId = parse_id(&req.subject_id, "subject_id")?;
    let provider_id: ProviderId = parse_id(&req.provider_id, "provider_id")?;

    let cmd = CreateOrder::new(
        subject_id,
        provider_id,
        req.origin_department_id,
        req.fulfilling_department_id,
        OrderItem::new(
            req.item_description,
            req.quantity,
            Money::from_cents(req.unit_cost_cents),
        ),
        req.created_by,
    )
    .with_kind(req.kind);

    let result = state.api.create_order(cmd).await?;
    let response = render(&state, &result.order).await;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let order = state.api.get_order(order_id).await?;
    Ok(Json(render(&state, &order).await))
}

/// GET /orders
#[tracing::instrument(skip(state))]
pub async fn list<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let mut query = OrderQuery::new();
    if let Some(raw) = params.status.as_deref() {
        let statuses = raw
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| orchestrator::parse_status(s).map(|status| status.as_str().to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        query = query.statuses(statuses);
    }
    if let Some(department) = params.fulfilling_department_id {
        query = query.fulfilling_department(department);
    }
    if let Some(department) = params.origin_department_id {
        query = query.origin_department(department);
    }
    if let Some(subject) = params.subject_id.as_deref() {
        query = query.subject(parse_id(subject, "subject_id")?);
    }
    if let Some(limit) = params.limit {
        query = query.limit(limit);
    }
    if let Some(offset) = params.offset {
        query = query.offset(offset);
    }

    let orders = state.api.list_orders(query).await?;
    let mut responses = Vec::with_capacity(orders.len());
    for order in &orders {
        responses.push(render(&state, order).await);
    }
    Ok(Json(responses))
}

/// POST /orders/{id}/advance
#[tracing::instrument(skip(state, req))]
pub async fn advance<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<AdvanceRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let result = state
        .api
        .advance(order_id, &req.status, Version::new(req.version), &req.actor)
        .await?;
    Ok(Json(render(&state, &result.order).await))
}

/// POST /orders/{id}/coverage
#[tracing::instrument(skip(state, req))]
pub async fn verify_coverage<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<CoverageRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let terms = orchestrator::coverage_terms(
        req.coverage_percentage,
        req.fixed_copay_cents.map(Money::from_cents),
    )?;

    let mut cmd = VerifyCoverage::new(order_id, Version::new(req.version), req.actor);
    if let Some(total) = req.total_cost_cents {
        cmd = cmd.with_total_cost(Money::from_cents(total));
    }
    if let Some(terms) = terms {
        cmd = cmd.with_terms(terms);
    }

    let result = state.api.verify_coverage(cmd).await?;
    Ok(Json(render(&state, &result.order).await))
}

/// POST /orders/{id}/amend
#[tracing::instrument(skip(state, req))]
pub async fn amend<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<AmendRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let changes = ItemChanges {
        description: req.item_description,
        quantity: req.quantity,
        unit_cost: req.unit_cost_cents.map(Money::from_cents),
    };
    let result = state
        .api
        .amend(AmendOrder::new(
            order_id,
            Version::new(req.version),
            changes,
            req.actor,
        ))
        .await?;
    Ok(Json(render(&state, &result.order).await))
}

/// POST /orders/{id}/settle
///
/// A repeated settle answers 200 with the existing receipt and
/// `already_settled: true`.
#[tracing::instrument(skip(state, req))]
pub async fn settle<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<SettleRequest>,
) -> Result<Json<SettleResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let payment_method: PaymentMethod = req
        .payment_method
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    let cmd = SettleOrder::new(
        order_id,
        Version::new(req.version),
        Money::from_cents(req.amount_tendered_cents),
        payment_method,
        req.actor,
    );

    let response = match state.api.settle(cmd).await? {
        SettlementOutcome::Settled(result) => SettleResponse {
            order: render(&state, &result.order).await,
            receipt: ReceiptResponse::from(&result.receipt),
            already_settled: false,
        },
        SettlementOutcome::AlreadySettled(receipt) => {
            let order = state.api.get_order(order_id).await?;
            SettleResponse {
                order: render(&state, &order).await,
                receipt: ReceiptResponse::from(&receipt),
                already_settled: true,
            }
        }
    };
    Ok(Json(response))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip(state, req))]
pub async fn cancel<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let result = state
        .api
        .cancel(CancelOrder::new(
            order_id,
            Version::new(req.version),
            req.reason,
            req.actor,
        ))
        .await?;
    Ok(Json(render(&state, &result.order).await))
}

/// GET /orders/{id}/receipt
#[tracing::instrument(skip(state))]
pub async fn receipt<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let receipt = state.api.get_receipt(order_id).await?;
    Ok(Json(ReceiptResponse::from(&receipt)))
}

async fn render<S: OrderStore + Clone>(
    state: &AppState<S>,
    order: &FulfillmentOrder,
) -> OrderResponse {
    let subject_name = state.directory.subject_name(order.subject_id()).await;
    let provider_name = state.directory.provider_name(order.provider_id()).await;
    let item = order.item();

    OrderResponse {
        id: order.id().to_string(),
        version: order.version().as_i64(),
        kind: order.kind(),
        status: order.status().to_string(),
        subject_id: order.subject_id().to_string(),
        subject_name,
        provider_id: order.provider_id().to_string(),
        provider_name,
        origin_department_id: order.origin_department_id().to_string(),
        fulfilling_department_id: order.fulfilling_department_id().to_string(),
        item: ItemResponse {
            description: item.description.clone(),
            quantity: item.quantity,
            unit_cost_cents: item.unit_cost.cents(),
        },
        total_cost_cents: order.total_cost().cents(),
        amount_due_cents: order.amount_due().cents(),
        coverage: order.coverage().map(|c| CoverageResponse {
            total_cost_cents: c.total_cost().cents(),
            coverage_percentage: c.coverage_percentage().map(|p| p.as_percent()),
            fixed_copay_cents: c.fixed_copay().map(|m| m.cents()),
            insurer_amount_cents: c.insurer_amount().cents(),
            patient_amount_cents: c.patient_amount().cents(),
        }),
        receipt_number: order.settlement().map(|r| r.receipt_number.clone()),
        cancellation_reason: order.cancellation_reason().map(String::from),
        history: order.history().iter().map(HistoryResponse::from).collect(),
        created_at: order.created_at(),
        updated_at: order.updated_at(),
    }
}

fn parse_id<T: From<uuid::Uuid>>(raw: &str, what: &str) -> Result<T, ApiError> {
    let uuid = uuid::Uuid::parse_str(raw)
        .map_err(|e| ApiError::BadRequest(format!("Invalid {what}: {e}")))?;
    Ok(T::from(uuid))
}
