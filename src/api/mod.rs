use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::Utc;
use log::info;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use uuid::Uuid;

use crate::core::{SimulationConfig, SimulationPoint, SimulationSummary, project, summarize};
use crate::portfolio::{
    AssetDraft, MemoryPortfolioStore, PortfolioError, PortfolioStore, ValuedAsset, valuations,
};
use crate::prices::{CoinGeckoFeed, PriceFeed, usd_prices_for_symbols};

#[derive(Clone)]
struct AppState {
    store: Arc<MemoryPortfolioStore>,
    feed: Arc<dyn PriceFeed>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    current_net_worth: Option<f64>,
    monthly_income: Option<f64>,
    monthly_expense: Option<f64>,
    monthly_investment: Option<f64>,
    investment_return: Option<f64>,
    inflation_rate: Option<f64>,
    years_to_simulate: Option<u32>,
    target_passive_income: Option<f64>,
    start_date: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    config: SimulationConfig,
    points: Vec<SimulationPoint>,
    summary: SimulationSummary,
}

#[derive(Debug, Serialize)]
struct PortfolioResponse {
    items: Vec<ValuedAsset>,
}

#[derive(Debug, Default, Deserialize)]
struct PricesQuery {
    symbols: Option<String>,
}

#[derive(Debug, Serialize)]
struct PricesResponse {
    prices: HashMap<String, f64>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

// Defaults the simulator form ships with.
fn default_simulation_config() -> SimulationConfig {
    SimulationConfig {
        current_net_worth: 129_700_000.0,
        monthly_income: 15_717_000.0,
        monthly_expense: 7_260_000.0,
        monthly_investment: 8_000_000.0,
        investment_return: 12.0,
        inflation_rate: 4.0,
        years_to_simulate: 3,
        target_passive_income: 7_260_000.0,
        start_date: Utc::now().date_naive().to_string(),
    }
}

fn build_simulation_config(payload: SimulatePayload) -> SimulationConfig {
    let mut config = default_simulation_config();

    if let Some(v) = payload.current_net_worth {
        config.current_net_worth = v;
    }
    if let Some(v) = payload.monthly_income {
        config.monthly_income = v;
    }
    if let Some(v) = payload.monthly_expense {
        config.monthly_expense = v;
    }
    if let Some(v) = payload.monthly_investment {
        config.monthly_investment = v;
    }
    if let Some(v) = payload.investment_return {
        config.investment_return = v;
    }
    if let Some(v) = payload.inflation_rate {
        config.inflation_rate = v;
    }
    if let Some(v) = payload.years_to_simulate {
        config.years_to_simulate = v;
    }
    if let Some(v) = payload.target_passive_income {
        config.target_passive_income = v;
    }
    if let Some(v) = payload.start_date {
        config.start_date = v;
    }

    config.normalized()
}

fn parse_symbols(raw: &str) -> Vec<String> {
    let mut symbols: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    symbols.sort();
    symbols.dedup();
    symbols
}

fn require_user(headers: &HeaderMap) -> Result<String, Response> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "Unauthorized"))
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let state = AppState {
        store: Arc::new(MemoryPortfolioStore::new()),
        feed: Arc::new(CoinGeckoFeed::new()),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route(
            "/api/portfolio",
            get(portfolio_list_handler).post(portfolio_insert_handler),
        )
        .route("/api/portfolio/upsert", post(portfolio_upsert_handler))
        .route(
            "/api/portfolio/:id",
            put(portfolio_update_handler).delete(portfolio_delete_handler),
        )
        .route("/api/prices", get(prices_handler))
        .fallback(not_found_handler)
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    info!("portfolio API listening on http://{addr}");
    println!("pundi API listening on http://{addr}");
    println!("Local access: http://127.0.0.1:{port}/");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload)
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload)
}

fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let config = build_simulation_config(payload);
    let points = project(&config);
    match summarize(&points, &config) {
        Ok(summary) => json_response(
            StatusCode::OK,
            SimulateResponse {
                config,
                points,
                summary,
            },
        ),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn portfolio_list_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    let rows = match state.store.list(&user_id).await {
        Ok(rows) => rows,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };

    let mut symbols: Vec<String> = rows.iter().map(|row| row.code.clone()).collect();
    symbols.sort();
    symbols.dedup();
    let prices = usd_prices_for_symbols(state.feed.as_ref(), &symbols).await;

    json_response(
        StatusCode::OK,
        PortfolioResponse {
            items: valuations(&rows, &prices),
        },
    )
}

async fn portfolio_insert_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(draft): Json<AssetDraft>,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    match state.store.insert(&user_id, draft).await {
        Ok(row) => json_response(StatusCode::CREATED, row),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn portfolio_upsert_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(draft): Json<AssetDraft>,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    match state.store.upsert(&user_id, draft).await {
        Ok(row) => json_response(StatusCode::OK, row),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn portfolio_update_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(draft): Json<AssetDraft>,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    match state.store.update(id, &user_id, draft).await {
        Ok(row) => json_response(StatusCode::OK, row),
        Err(e @ PortfolioError::NotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, &e.to_string())
        }
    }
}

async fn portfolio_delete_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    match state.store.delete(id, &user_id).await {
        Ok(()) => with_cache_control(StatusCode::NO_CONTENT),
        Err(e @ PortfolioError::NotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, &e.to_string())
        }
    }
}

async fn prices_handler(
    State(state): State<AppState>,
    Query(query): Query<PricesQuery>,
) -> Response {
    let symbols = parse_symbols(query.symbols.as_deref().unwrap_or(""));
    let prices = usd_prices_for_symbols(state.feed.as_ref(), &symbols).await;
    json_response(StatusCode::OK, PricesResponse { prices })
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn config_from_json(json: &str) -> SimulationConfig {
        let payload =
            serde_json::from_str::<SimulatePayload>(json).expect("payload should parse");
        build_simulation_config(payload)
    }

    #[test]
    fn build_simulation_config_parses_web_keys_over_defaults() {
        let config = config_from_json(
            r#"{
              "currentNetWorth": 100000000,
              "monthlyExpense": 5000000,
              "monthlyInvestment": 2000000,
              "investmentReturn": 12,
              "inflationRate": 0,
              "yearsToSimulate": 1,
              "startDate": "2024-01-01"
            }"#,
        );

        assert_approx(config.current_net_worth, 100_000_000.0);
        assert_approx(config.monthly_expense, 5_000_000.0);
        assert_approx(config.monthly_investment, 2_000_000.0);
        assert_approx(config.investment_return, 12.0);
        assert_approx(config.inflation_rate, 0.0);
        assert_eq!(config.years_to_simulate, 1);
        assert_eq!(config.start_date, "2024-01-01");
        // Untouched fields keep the form defaults.
        assert_approx(config.monthly_income, 15_717_000.0);
        assert_approx(config.target_passive_income, 7_260_000.0);
    }

    #[test]
    fn build_simulation_config_coerces_degenerate_horizons() {
        let config = config_from_json(r#"{ "yearsToSimulate": 0 }"#);
        assert_eq!(config.years_to_simulate, 1);
    }

    #[test]
    fn empty_payload_falls_back_to_the_form_defaults() {
        let config = config_from_json("{}");
        assert_approx(config.current_net_worth, 129_700_000.0);
        assert_eq!(config.years_to_simulate, 3);
    }

    #[test]
    fn simulate_response_serialization_uses_the_chart_field_names() {
        let config = config_from_json(r#"{ "startDate": "2024-01-01" }"#);
        let points = project(&config);
        let summary = summarize(&points, &config).expect("non-empty");
        let response = SimulateResponse {
            config,
            points,
            summary,
        };

        let json = serde_json::to_string(&response).expect("response should serialize");
        assert!(json.contains("\"points\""));
        assert!(json.contains("\"summary\""));
        assert!(json.contains("\"netWorth\""));
        assert!(json.contains("\"passiveIncome\""));
        assert!(json.contains("\"monthlyExpense\""));
        assert!(json.contains("\"fireProgress\""));
        assert!(json.contains("\"monthLabel\""));
        assert!(json.contains("\"gap\""));
        assert!(json.contains("\"finalPoint\""));
        assert!(json.contains("\"fireAchievementMonth\""));
        assert!(json.contains("\"totalInvested\""));
        assert!(json.contains("\"netWorthGrowthPercent\""));
    }

    #[test]
    fn parse_symbols_splits_trims_and_dedups() {
        assert_eq!(parse_symbols("btc, hype,BTC ,"), vec!["BTC", "HYPE"]);
        assert!(parse_symbols("").is_empty());
        assert!(parse_symbols(" , ").is_empty());
    }

    #[test]
    fn require_user_reads_the_identity_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("user-1"));
        assert_eq!(require_user(&headers).expect("user id"), "user-1");
    }

    #[test]
    fn require_user_rejects_missing_or_blank_identities() {
        let response = require_user(&HeaderMap::new()).expect_err("must reject");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("  "));
        let response = require_user(&headers).expect_err("must reject");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn default_start_date_is_an_iso_date() {
        let config = build_simulation_config(SimulatePayload::default());
        assert!(config.start_date.parse::<chrono::NaiveDate>().is_ok());
    }
}
