// Import the things we need
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use lmsr_market::config::Config;
use lmsr_market::db_adapter::PgLedger;
use lmsr_market::lmsr_core::Outcome;
use lmsr_market::models::NewMarket;
use lmsr_market::{EngineError, LmsrEngine};

type AppState = Arc<LmsrEngine<PgLedger>>;
type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

/// Trades carry no authenticated identity yet.
const ANONYMOUS_USER: &str = "anonymous";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let config = Config::from_env();
    config.logging.init();

    info!("🦀 Starting LMSR market engine...");
    config.print_config();

    let ledger = PgLedger::connect(&config.database).await?;
    ledger.init_schema().await?;
    let engine: AppState = Arc::new(LmsrEngine::new(ledger, config.market.clone())?);

    // Create our web application routes with engine state
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/markets", get(list_markets).post(create_market))
        .route("/markets/:market_id", get(get_quote))
        .route("/markets/:market_id/history", get(get_history))
        .route("/markets/:market_id/cost", get(get_trade_cost))
        .route("/markets/:market_id/trades", axum::routing::post(post_trade))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(engine);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    info!("🚀 Server running on http://{}", config.server.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn api_error(err: EngineError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        EngineError::MarketNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::MarketNotActive { .. } => StatusCode::CONFLICT,
        EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    if err.is_client_error() {
        info!("request rejected: {}", err);
        (status, Json(json!({ "error": err.to_string() })))
    } else {
        error!("Database error: {}", err);
        (status, Json(json!({ "error": "Internal server error" })))
    }
}

fn to_json<T: serde::Serialize>(value: T) -> ApiResult {
    serde_json::to_value(value)
        .map(Json)
        .map_err(|e| api_error(EngineError::Storage(e.into())))
}

// Health check endpoint
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "lmsr-market"
    }))
}

async fn list_markets(State(engine): State<AppState>) -> ApiResult {
    let markets = engine.list_markets().await.map_err(api_error)?;
    to_json(json!({ "markets": markets }))
}

async fn create_market(
    State(engine): State<AppState>,
    Json(new_market): Json<NewMarket>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let market = engine.create_market(new_market).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, to_json(market)?))
}

async fn get_quote(State(engine): State<AppState>, Path(market_id): Path<i64>) -> ApiResult {
    let quote = engine.quote(market_id).await.map_err(api_error)?;
    to_json(json!({
        "market": quote.market,
        "shares": { "no": quote.shares[0], "yes": quote.shares[1] },
        "prices": { "no": quote.no_price(), "yes": quote.yes_price() },
        "default_trade_quantity": engine.config().default_trade_quantity,
    }))
}

async fn get_history(State(engine): State<AppState>, Path(market_id): Path<i64>) -> ApiResult {
    let history = engine.price_history(market_id).await.map_err(api_error)?;
    to_json(json!({ "market_id": market_id, "history": history }))
}

/// Outcome as an index (`1`) or a name (`"yes"`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OutcomeParam {
    Index(i64),
    Name(String),
}

impl OutcomeParam {
    fn index(&self) -> Result<i64, (StatusCode, Json<Value>)> {
        match self {
            OutcomeParam::Index(i) => Ok(*i),
            OutcomeParam::Name(name) => name
                .parse::<Outcome>()
                .map(|o| o.index() as i64)
                .map_err(|e| (StatusCode::BAD_REQUEST, Json(json!({ "error": e })))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CostQuery {
    outcome: OutcomeParam,
    quantity: f64,
}

async fn get_trade_cost(
    State(engine): State<AppState>,
    Path(market_id): Path<i64>,
    Query(query): Query<CostQuery>,
) -> ApiResult {
    let outcome = query.outcome.index()?;
    let cost = engine
        .calculate_market_trade_cost(market_id, outcome, query.quantity)
        .await
        .map_err(api_error)?;
    to_json(json!({
        "market_id": market_id,
        "outcome": outcome,
        "quantity": query.quantity,
        "cost": cost,
    }))
}

#[derive(Debug, Deserialize)]
struct TradeRequest {
    outcome: OutcomeParam,
    quantity: f64,
    #[serde(default)]
    user_id: Option<String>,
}

async fn post_trade(
    State(engine): State<AppState>,
    Path(market_id): Path<i64>,
    Json(trade): Json<TradeRequest>,
) -> ApiResult {
    let outcome = trade.outcome.index()?;
    let user_id = trade.user_id.as_deref().unwrap_or(ANONYMOUS_USER);
    let receipt = engine
        .execute_trade(market_id, user_id, outcome, trade.quantity)
        .await
        .map_err(api_error)?;
    to_json(receipt)
}
