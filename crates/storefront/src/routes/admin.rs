//! Back-office route handlers.
//!
//! Every handler takes [`RequireAdmin`] ahead of its path, query and body
//! extractors: anonymous callers get 401 and customers 403 before any input is
//! looked at.

use axum::{
    Router,
    extract::State,
    routing::{get, post},
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use florist_core::closure::ShopClosure;
use florist_core::invoice::{BillingPeriod, CorporateInvoice, InvoiceFilters};
use florist_core::order::{Order, OrderFilters};
use florist_core::{InvoiceId, InvoiceStatus, OrderId, OrderStatus, Page, Pagination, UserId};

use crate::db::SettingsRepository;
use crate::middleware::RequireAdmin;
use crate::routes::{ApiJson, ApiPath, ApiQuery, ApiResponse, ApiResult};
use crate::services::invoices::{GenerationReport, InvoiceService, InvoiceUpdate};
use crate::services::orders::OrderService;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/{id}", get(show_order).patch(update_order))
        .route("/invoices", get(list_invoices))
        .route("/invoices/generate", post(generate_invoices))
        .route("/invoices/{id}", get(show_invoice).patch(update_invoice))
        .route("/invoices/{id}/send", post(send_invoice))
        .route("/invoices/{id}/resend", post(resend_invoice))
        .route("/settings", get(show_settings).put(update_settings))
}

fn invoices(state: &AppState) -> InvoiceService<'_> {
    InvoiceService::new(state.pool(), state.config().billing).with_email(state.email())
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    pub search: Option<String>,
    /// Inclusive, from the start of the day (UTC).
    pub date_from: Option<NaiveDate>,
    /// Inclusive, to the end of the day (UTC).
    pub date_to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl OrderListQuery {
    fn filters(&self) -> OrderFilters {
        OrderFilters {
            status: self.status,
            search: self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned),
            date_from: self.date_from.map(|d| d.and_time(NaiveTime::MIN).and_utc()),
            date_to: self
                .date_to
                .and_then(|d| d.and_hms_milli_opt(23, 59, 59, 999))
                .map(|dt| dt.and_utc()),
        }
    }

    fn pagination(&self) -> Pagination {
        Pagination::new(
            self.page.unwrap_or(1),
            self.limit.unwrap_or(Pagination::DEFAULT_LIMIT),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderStatusUpdate {
    pub status: OrderStatus,
    pub note: Option<String>,
}

/// GET /api/admin/orders
#[instrument(skip(state, _admin))]
pub async fn list_orders(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiQuery(query): ApiQuery<OrderListQuery>,
) -> ApiResult<Page<Order>> {
    let page = OrderService::new(state.pool())
        .list_all(&query.filters(), query.pagination())
        .await?;
    Ok(ApiResponse::ok(page))
}

/// GET /api/admin/orders/{id}
#[instrument(skip(state, _admin))]
pub async fn show_order(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
) -> ApiResult<Order> {
    Ok(ApiResponse::ok(OrderService::new(state.pool()).get(id).await?))
}

/// PATCH /api/admin/orders/{id}
#[instrument(skip(state, body), fields(admin_id = %admin_id))]
pub async fn update_order(
    State(state): State<AppState>,
    RequireAdmin(admin_id): RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(body): ApiJson<OrderStatusUpdate>,
) -> ApiResult<Order> {
    let note = body.note.map(|n| n.trim().to_owned()).filter(|n| !n.is_empty());
    let order = OrderService::new(state.pool())
        .update_status(id, body.status, note, Utc::now())
        .await?;
    Ok(ApiResponse::ok(order))
}

// =============================================================================
// Invoices
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceListQuery {
    pub status: Option<InvoiceStatus>,
    pub user_id: Option<UserId>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub month: u32,
    pub year: i32,
    pub user_id: Option<UserId>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoicePatch {
    pub status: Option<InvoiceStatus>,
    pub paid_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// GET /api/admin/invoices
#[instrument(skip(state, _admin))]
pub async fn list_invoices(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiQuery(query): ApiQuery<InvoiceListQuery>,
) -> ApiResult<Page<CorporateInvoice>> {
    let filters = InvoiceFilters {
        status: query.status,
        user_id: query.user_id,
    };
    let pagination = Pagination::new(
        query.page.unwrap_or(1),
        query.limit.unwrap_or(Pagination::DEFAULT_LIMIT),
    );
    Ok(ApiResponse::ok(invoices(&state).list(filters, pagination).await?))
}

/// POST /api/admin/invoices/generate
#[instrument(skip(state), fields(admin_id = %admin_id))]
pub async fn generate_invoices(
    State(state): State<AppState>,
    RequireAdmin(admin_id): RequireAdmin,
    ApiJson(body): ApiJson<GenerateRequest>,
) -> ApiResult<GenerationReport> {
    let period = BillingPeriod::new(body.month, body.year)?;
    let report = invoices(&state)
        .generate(period, body.user_id, Utc::now())
        .await?;
    tracing::info!(
        period = %period,
        created = report.created.len(),
        skipped = report.skipped.len(),
        "Invoice generation finished"
    );
    Ok(ApiResponse::ok(report))
}

/// GET /api/admin/invoices/{id}
#[instrument(skip(state, _admin))]
pub async fn show_invoice(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<InvoiceId>,
) -> ApiResult<CorporateInvoice> {
    Ok(ApiResponse::ok(invoices(&state).get(id).await?))
}

/// PATCH /api/admin/invoices/{id}
#[instrument(skip(state, body), fields(admin_id = %admin_id))]
pub async fn update_invoice(
    State(state): State<AppState>,
    RequireAdmin(admin_id): RequireAdmin,
    ApiPath(id): ApiPath<InvoiceId>,
    ApiJson(body): ApiJson<InvoicePatch>,
) -> ApiResult<CorporateInvoice> {
    let update = InvoiceUpdate {
        status: body.status,
        paid_date: body.paid_date,
        notes: body.notes,
    };
    let invoice = invoices(&state).update(id, update, Utc::now()).await?;
    Ok(ApiResponse::ok(invoice))
}

/// POST /api/admin/invoices/{id}/send
#[instrument(skip(state), fields(admin_id = %admin_id))]
pub async fn send_invoice(
    State(state): State<AppState>,
    RequireAdmin(admin_id): RequireAdmin,
    ApiPath(id): ApiPath<InvoiceId>,
) -> ApiResult<CorporateInvoice> {
    Ok(ApiResponse::ok(invoices(&state).send(id, Utc::now()).await?))
}

/// POST /api/admin/invoices/{id}/resend
#[instrument(skip(state), fields(admin_id = %admin_id))]
pub async fn resend_invoice(
    State(state): State<AppState>,
    RequireAdmin(admin_id): RequireAdmin,
    ApiPath(id): ApiPath<InvoiceId>,
) -> ApiResult<CorporateInvoice> {
    Ok(ApiResponse::ok(invoices(&state).resend(id).await?))
}

// =============================================================================
// Settings
// =============================================================================

/// Flat view of the closure setting, as the back office edits it.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosureSettings {
    pub is_enabled: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl From<&ShopClosure> for ClosureSettings {
    fn from(closure: &ShopClosure) -> Self {
        closure.window().map_or_else(Self::default, |window| Self {
            is_enabled: true,
            start_date: Some(window.start_date()),
            end_date: Some(window.end_date()),
            reason: window.reason.clone(),
            message: window.message.clone(),
        })
    }
}

/// GET /api/admin/settings
#[instrument(skip(state, _admin))]
pub async fn show_settings(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> ApiResult<ClosureSettings> {
    let closure = SettingsRepository::new(state.pool()).get_closure().await?;
    Ok(ApiResponse::ok(ClosureSettings::from(&closure)))
}

/// PUT /api/admin/settings
#[instrument(skip(state, body), fields(admin_id = %admin_id))]
pub async fn update_settings(
    State(state): State<AppState>,
    RequireAdmin(admin_id): RequireAdmin,
    ApiJson(body): ApiJson<ClosureSettings>,
) -> ApiResult<ClosureSettings> {
    let blank_to_none = |s: Option<String>| s.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty());
    let closure = ShopClosure::from_parts(
        body.is_enabled,
        body.start_date,
        body.end_date,
        blank_to_none(body.reason),
        blank_to_none(body.message),
    )?;

    SettingsRepository::new(state.pool()).put_closure(&closure).await?;
    tracing::info!(admin_id = %admin_id, enabled = closure.is_enabled(), "Shop closure updated");
    Ok(ApiResponse::ok(ClosureSettings::from(&closure)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{body::Body, http::Request, http::StatusCode, http::header};
    use chrono::TimeZone;

    use super::*;
    use crate::routes::test_support::{json_body, send};

    #[tokio::test]
    async fn test_every_admin_route_requires_login() {
        let requests = [
            Request::get("/api/admin/orders").body(Body::empty()).unwrap(),
            Request::get("/api/admin/orders/1").body(Body::empty()).unwrap(),
            Request::get("/api/admin/invoices").body(Body::empty()).unwrap(),
            Request::post("/api/admin/invoices/1/send").body(Body::empty()).unwrap(),
            Request::post("/api/admin/invoices/1/resend").body(Body::empty()).unwrap(),
            Request::get("/api/admin/settings").body(Body::empty()).unwrap(),
            Request::post("/api/admin/invoices/generate")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"month":13}"#))
                .unwrap(),
            Request::patch("/api/admin/orders/1")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("not json"))
                .unwrap(),
            Request::patch("/api/admin/invoices/1")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("not json"))
                .unwrap(),
            Request::put("/api/admin/settings")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        ];
        for request in requests {
            let uri = request.uri().clone();
            let response = send(request).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(json_body(response).await["error"]["code"], "AUTH_REQUIRED");
        }
    }

    #[tokio::test]
    async fn test_settings_update_requires_login() {
        let response = send(
            Request::put("/api/admin/settings")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"isEnabled":false}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_date_filters_cover_whole_days() {
        let query = OrderListQuery {
            date_from: NaiveDate::from_ymd_opt(2026, 3, 1),
            date_to: NaiveDate::from_ymd_opt(2026, 3, 31),
            search: Some("  ".to_owned()),
            ..OrderListQuery::default()
        };
        let filters = query.filters();
        assert_eq!(
            filters.date_from,
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap())
        );
        assert!(filters.date_to.unwrap() > Utc.with_ymd_and_hms(2026, 3, 31, 23, 59, 59).unwrap());
        assert_eq!(filters.search, None);
    }

    #[test]
    fn test_disabled_closure_settings_view() {
        let view = ClosureSettings::from(&ShopClosure::Disabled);
        assert!(!view.is_enabled);
        assert!(view.start_date.is_none());
    }
}
