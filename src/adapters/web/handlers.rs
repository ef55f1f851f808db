//! HTTP request handlers for the web adapter.
//!
//! Store work runs on the blocking pool; handlers only decode, dispatch and
//! wrap the outcome.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tokio::time::timeout;

use crate::domain::account::{NewCorporateAccount, NewPersonalAccount};
use crate::domain::account_service;
use crate::domain::error::StsError;
use crate::domain::predicate::{StockFilter, parse_privilege};
use crate::domain::stock::Stock;
use crate::domain::stock_service;
use crate::ports::store_port::StorePort;

use super::deadline::{CommitGate, GatedStore};
use super::{AppState, ApiError, Envelope, unwrap_double_encoded};

type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

/// Run `work` on the blocking pool under the request deadline.
///
/// On timeout the commit gate is abandoned so the work rolls back instead of
/// committing behind the client's back. A commit already in flight is awaited
/// and its real outcome returned.
async fn on_store<T, F>(state: &AppState, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&dyn StorePort) -> Result<T, StsError> + Send + 'static,
{
    let gate = Arc::new(CommitGate::new());
    let store = GatedStore::new(Arc::clone(&state.store), Arc::clone(&gate));
    let mut task = tokio::task::spawn_blocking(move || work(&store));

    let joined = match timeout(state.request_timeout, &mut task).await {
        Ok(joined) => joined,
        Err(_) if gate.abandon() => {
            return Err(ApiError::from(StsError::Database {
                reason: format!(
                    "request timed out after {} ms",
                    state.request_timeout.as_millis()
                ),
            }));
        }
        Err(_) => task.await,
    };
    joined
        .map_err(|e| StsError::Database {
            reason: format!("store task failed: {e}"),
        })?
        .map_err(ApiError::from)
}

pub async fn create_personal(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<()> {
    let request: NewPersonalAccount = unwrap_double_encoded(&body)?;
    on_store(&state, move |store| {
        account_service::create_personal_account(store, &request.account, &request.fund_password)
    })
    .await?;
    Ok(Json(Envelope::done()))
}

pub async fn create_corporate(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<()> {
    let request: NewCorporateAccount = unwrap_double_encoded(&body)?;
    on_store(&state, move |store| {
        account_service::create_corporate_account(store, &request.account, &request.fund_password)
    })
    .await?;
    Ok(Json(Envelope::done()))
}

pub async fn fetch_all_stock(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Stock>> {
    let stocks = on_store(&state, stock_service::fetch_all_stock).await?;
    Ok(Json(Envelope::ok(stocks)))
}

pub async fn fetch_one_stock(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<Stock> {
    let code: String = unwrap_double_encoded(&body)?;
    let stock = on_store(&state, move |store| stock_service::fetch_one_stock(store, &code)).await?;
    Ok(Json(Envelope::ok(stock)))
}

pub async fn fetch_stock_under_priv(
    State(state): State<Arc<AppState>>,
    Path(privilege): Path<String>,
) -> ApiResult<Vec<Stock>> {
    let filter = StockFilter::under_privilege(parse_privilege(&privilege)?);
    let stocks = on_store(&state, move |store| {
        stock_service::fetch_certain_stock(store, &filter)
    })
    .await?;
    Ok(Json(Envelope::ok(stocks)))
}

pub async fn fetch_stock_under_priv_like(
    State(state): State<Arc<AppState>>,
    Path(privilege): Path<String>,
    body: Bytes,
) -> ApiResult<Vec<Stock>> {
    let max_privilege = parse_privilege(&privilege)?;
    let term: String = unwrap_double_encoded(&body)?;
    let filter = StockFilter::under_privilege(max_privilege).matching(term);
    let stocks = on_store(&state, move |store| {
        stock_service::fetch_certain_stock(store, &filter)
    })
    .await?;
    Ok(Json(Envelope::ok(stocks)))
}

pub async fn update_stock(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<()> {
    let stock: Stock = unwrap_double_encoded(&body)?;
    on_store(&state, move |store| stock_service::update_stock(store, &stock)).await?;
    Ok(Json(Envelope::done()))
}

pub async fn update_stock_list(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<()> {
    let stocks: Vec<Stock> = unwrap_double_encoded(&body)?;
    on_store(&state, move |store| {
        stock_service::update_stock_list(store, &stocks)
    })
    .await?;
    Ok(Json(Envelope::done()))
}

pub async fn update_stock_list_state(
    State(state): State<Arc<AppState>>,
    Path(new_state): Path<String>,
    body: Bytes,
) -> ApiResult<()> {
    let stocks: Vec<Stock> = unwrap_double_encoded(&body)?;
    on_store(&state, move |store| {
        stock_service::update_stock_list_state(store, stocks, &new_state)
    })
    .await?;
    Ok(Json(Envelope::done()))
}

pub async fn update_stock_list_limit(
    State(state): State<Arc<AppState>>,
    Path(new_limit): Path<String>,
    body: Bytes,
) -> ApiResult<()> {
    let stocks: Vec<Stock> = unwrap_double_encoded(&body)?;
    on_store(&state, move |store| {
        stock_service::update_stock_list_limit(store, stocks, &new_limit)
    })
    .await?;
    Ok(Json(Envelope::done()))
}

pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::from(StsError::not_found("route", uri.path()))
}

pub async fn method_not_allowed(method: Method, uri: Uri) -> Response {
    let err = StsError::validation("method", format!("{method} not allowed on {}", uri.path()));
    let mut response = ApiError::from(err).into_response();
    *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
    response
}
