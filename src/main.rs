use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

mod catalog;
mod data;
mod db;
mod error;
mod inventory;
mod market;
mod shop;
mod wallet;

use catalog::{PurchaseRequest, SharedStockCatalog};
use data::ItemRegistry;
use db::Database;
use error::EconomyError;
use inventory::{InventoryStore, SlotUpdate};
use market::{MarketListing, Marketplace};
use shop::ShopRegistry;
use wallet::WalletLedger;

// ============================================================================
// App State
// ============================================================================

#[derive(Clone)]
struct AppState {
    db: Arc<Database>,
    wallet: WalletLedger,
    inventory: InventoryStore,
    catalog: SharedStockCatalog,
    market: Marketplace,
}

impl AppState {
    async fn new(database_url: &str, data_dir: &std::path::Path) -> Self {
        // Initialize database
        let db = Database::new(database_url)
            .await
            .expect("Failed to initialize database");

        // Load item definitions from TOML files and seed the catalog tables
        let mut item_registry = ItemRegistry::new();
        if let Err(e) = item_registry.load_from_directory(data_dir) {
            error!("Failed to load item registry: {}", e);
        }
        if item_registry.is_empty() {
            warn!("No item definitions loaded; selling and listing will reject every item type");
        }
        let items: Vec<_> = item_registry.all().cloned().collect();
        db.seed_items(&items).await.expect("Failed to seed items");

        // Load regular-shop definitions and seed the listings
        let mut shop_registry = ShopRegistry::new();
        if let Err(e) = shop_registry.load_from_directory(&data_dir.join("shops")) {
            error!("Failed to load shop registry: {}", e);
        }
        if shop_registry.is_empty() {
            warn!("No shop definitions loaded; the regular shop catalog will be empty");
        }
        let shops: Vec<_> = shop_registry.all().cloned().collect();
        db.seed_catalog(&shops).await.expect("Failed to seed shop catalog");

        let pool = db.pool();
        Self {
            db: Arc::new(db),
            wallet: WalletLedger::new(pool.clone()),
            inventory: InventoryStore::new(pool.clone()),
            catalog: SharedStockCatalog::new(pool.clone()),
            market: Marketplace::new(pool),
        }
    }
}

// ============================================================================
// Response Envelope
// ============================================================================

/// Uniform envelope on every response. `code` mirrors the HTTP status and
/// is what game clients actually look at.
#[derive(Serialize)]
struct ApiEnvelope<T> {
    code: u16,
    message: String,
    data: Option<T>,
}

fn ok<T: Serialize>(data: T) -> (StatusCode, Json<ApiEnvelope<T>>) {
    (
        StatusCode::OK,
        Json(ApiEnvelope {
            code: 200,
            message: "success".to_string(),
            data: Some(data),
        }),
    )
}

fn fail<T: Serialize>(err: EconomyError) -> (StatusCode, Json<ApiEnvelope<T>>) {
    let status = err.status();
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Economy operation failed: {}", err);
    } else {
        info!("Economy operation rejected: {}", err);
    }
    (
        status,
        Json(ApiEnvelope {
            code: status.as_u16(),
            message: err.public_message(),
            data: None,
        }),
    )
}

fn respond<T: Serialize>(result: Result<T, EconomyError>) -> (StatusCode, Json<ApiEnvelope<T>>) {
    match result {
        Ok(data) => ok(data),
        Err(err) => fail(err),
    }
}

// ============================================================================
// HTTP Handlers - Online Shop (consignment marketplace)
// ============================================================================

#[derive(Serialize)]
struct MarketListingResponse {
    id: i64,
    #[serde(rename = "collectableType")]
    collectable_type: String,
    price: i64,
    quantity: i64,
    icon: String,
    #[serde(rename = "canBuy")]
    can_buy: bool,
}

impl From<MarketListing> for MarketListingResponse {
    fn from(listing: MarketListing) -> Self {
        Self {
            id: listing.id,
            collectable_type: listing.collectable_type,
            price: listing.price,
            quantity: listing.quantity,
            icon: listing.icon,
            can_buy: listing.can_buy,
        }
    }
}

#[derive(Deserialize)]
struct SellRequest {
    #[serde(rename = "collectableType")]
    collectable_type: String,
    price: i64,
    quantity: i64,
}

/// GET /online-shop/:player_id - listings the player can buy
async fn list_market(
    State(state): State<AppState>,
    Path(player_id): Path<i64>,
) -> impl IntoResponse {
    respond(
        state
            .market
            .list_available(player_id)
            .await
            .map(|listings| {
                listings
                    .into_iter()
                    .map(MarketListingResponse::from)
                    .collect::<Vec<_>>()
            }),
    )
}

/// POST /online-shop/sell/:player_id - create a consignment listing
async fn sell_item(
    State(state): State<AppState>,
    Path(player_id): Path<i64>,
    Json(req): Json<SellRequest>,
) -> impl IntoResponse {
    respond(
        state
            .market
            .sell(player_id, &req.collectable_type, req.price, req.quantity)
            .await
            .map(MarketListingResponse::from),
    )
}

/// POST /online-shop/buy/:player_id - buy a batch of listings
async fn buy_items(
    State(state): State<AppState>,
    Path(player_id): Path<i64>,
    Json(listing_ids): Json<Vec<i64>>,
) -> impl IntoResponse {
    respond(
        state
            .market
            .buy(player_id, &listing_ids)
            .await
            .map(|_total| true),
    )
}

/// GET /online-shop/sold-items/:player_id - the seller's own listings
async fn list_sold_items(
    State(state): State<AppState>,
    Path(player_id): Path<i64>,
) -> impl IntoResponse {
    respond(
        state
            .market
            .sold_by_player(player_id)
            .await
            .map(|listings| {
                listings
                    .into_iter()
                    .map(MarketListingResponse::from)
                    .collect::<Vec<_>>()
            }),
    )
}

/// POST /online-shop/claim-money/:player_id - claim proceeds of sold listings
async fn claim_money(
    State(state): State<AppState>,
    Path(player_id): Path<i64>,
    Json(listing_ids): Json<Vec<i64>>,
) -> impl IntoResponse {
    respond(
        state
            .market
            .claim(player_id, &listing_ids)
            .await
            .map(|_amount| true),
    )
}

// ============================================================================
// HTTP Handlers - Regular Shop (shared-stock catalog)
// ============================================================================

#[derive(Serialize)]
struct CatalogEntryResponse {
    #[serde(rename = "slotId")]
    slot_id: i64,
    #[serde(rename = "collectableType")]
    collectable_type: String,
    #[serde(rename = "itemName")]
    item_name: String,
    #[serde(rename = "buyPrice")]
    buy_price: i64,
    #[serde(rename = "canBuy")]
    can_buy: bool,
    #[serde(rename = "stockLimit")]
    stock_limit: Option<i64>,
    #[serde(rename = "currentStock")]
    current_stock: Option<i64>,
}

#[derive(Deserialize)]
struct RegularBuyRequest {
    #[serde(rename = "Items")]
    items: Vec<RegularBuyItem>,
}

#[derive(Deserialize)]
struct RegularBuyItem {
    #[serde(rename = "SlotId")]
    slot_id: i64,
    #[serde(rename = "Quantity")]
    quantity: i64,
    /// Client-side price estimate; the server recomputes and this is
    /// only checked for logging.
    #[serde(rename = "TotalPrice", default)]
    total_price: Option<i64>,
}

#[derive(Serialize)]
struct PurchaseReceiptResponse {
    #[serde(rename = "slotId")]
    slot_id: i64,
    #[serde(rename = "collectableType")]
    collectable_type: String,
    quantity: i64,
    #[serde(rename = "totalPrice")]
    total_price: i64,
    #[serde(rename = "currentStock")]
    current_stock: Option<i64>,
}

/// GET /regular-shop/:player_id - the catalog with this player's stock
async fn list_catalog(
    State(state): State<AppState>,
    Path(player_id): Path<i64>,
) -> impl IntoResponse {
    respond(state.catalog.list_for_player(player_id).await.map(|entries| {
        entries
            .into_iter()
            .map(|e| CatalogEntryResponse {
                slot_id: e.listing_id,
                collectable_type: e.collectable_type,
                item_name: e.item_name,
                buy_price: e.buy_price,
                can_buy: e.can_buy,
                stock_limit: e.stock_limit,
                current_stock: e.current_stock,
            })
            .collect::<Vec<_>>()
    }))
}

/// POST /regular-shop/buy/:player_id - buy a batch from the shared shop
async fn buy_from_catalog(
    State(state): State<AppState>,
    Path(player_id): Path<i64>,
    Json(req): Json<RegularBuyRequest>,
) -> impl IntoResponse {
    let requests: Vec<PurchaseRequest> = req
        .items
        .iter()
        .map(|item| PurchaseRequest {
            listing_id: item.slot_id,
            quantity: item.quantity,
        })
        .collect();

    let result = state.catalog.purchase_many(player_id, &requests).await;

    if let Ok(receipts) = &result {
        for (item, receipt) in req.items.iter().zip(receipts) {
            if let Some(claimed) = item.total_price {
                if claimed != receipt.total_price {
                    warn!(
                        "Player {} sent price {} for listing {}, server computed {}",
                        player_id, claimed, receipt.listing_id, receipt.total_price
                    );
                }
            }
        }
    }

    respond(result.map(|receipts| {
        receipts
            .into_iter()
            .map(|r| PurchaseReceiptResponse {
                slot_id: r.listing_id,
                collectable_type: r.collectable_type,
                quantity: r.quantity,
                total_price: r.total_price,
                current_stock: r.remaining_stock,
            })
            .collect::<Vec<_>>()
    }))
}

// ============================================================================
// HTTP Handlers - Inventory & Wallet
// ============================================================================

#[derive(Serialize)]
struct InventorySlotResponse {
    id: i64,
    #[serde(rename = "slotIndex")]
    slot_index: i64,
    #[serde(rename = "itemId")]
    item_id: Option<i64>,
    #[serde(rename = "collectableType")]
    collectable_type: String,
    icon: String,
    quantity: i64,
}

#[derive(Deserialize)]
struct SlotUpdateRequest {
    #[serde(rename = "slotIndex")]
    slot_index: i64,
    #[serde(rename = "collectableType")]
    collectable_type: String,
    quantity: i64,
}

#[derive(Serialize)]
struct WalletResponse {
    #[serde(rename = "playerId")]
    player_id: i64,
    balance: i64,
}

/// GET /inventory/:player_id - every slot, resolved against the item catalog
async fn list_inventory(
    State(state): State<AppState>,
    Path(player_id): Path<i64>,
) -> impl IntoResponse {
    respond(state.inventory.list_slots(player_id).await.map(|slots| {
        slots
            .into_iter()
            .map(|s| InventorySlotResponse {
                id: s.id,
                slot_index: s.slot_index,
                item_id: s.item_id,
                collectable_type: s.collectable_type,
                icon: s.icon,
                quantity: s.quantity,
            })
            .collect::<Vec<_>>()
    }))
}

/// POST /inventory/:player_id - replace slots with the client's snapshot
async fn update_inventory(
    State(state): State<AppState>,
    Path(player_id): Path<i64>,
    Json(entries): Json<Vec<SlotUpdateRequest>>,
) -> impl IntoResponse {
    let updates: Vec<SlotUpdate> = entries
        .into_iter()
        .map(|e| SlotUpdate {
            slot_index: e.slot_index,
            collectable_type: e.collectable_type,
            quantity: e.quantity,
        })
        .collect();

    respond(
        state
            .inventory
            .batch_update(player_id, &updates)
            .await
            .map(|_| true),
    )
}

/// GET /wallet/:player_id - current balance
async fn get_wallet(
    State(state): State<AppState>,
    Path(player_id): Path<i64>,
) -> impl IntoResponse {
    respond(
        state
            .wallet
            .balance(player_id)
            .await
            .map(|balance| WalletResponse { player_id, balance }),
    )
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================================
// Main
// ============================================================================

fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Online shop (consignment marketplace)
        .route("/online-shop/:player_id", get(list_market))
        .route("/online-shop/sell/:player_id", post(sell_item))
        .route("/online-shop/buy/:player_id", post(buy_items))
        .route("/online-shop/sold-items/:player_id", get(list_sold_items))
        .route("/online-shop/claim-money/:player_id", post(claim_money))
        // Regular shop (shared-stock catalog)
        .route("/regular-shop/:player_id", get(list_catalog))
        .route("/regular-shop/buy/:player_id", post(buy_from_catalog))
        // Inventory & wallet
        .route("/inventory/:player_id", get(list_inventory).post(update_inventory))
        .route("/wallet/:player_id", get(get_wallet))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::AUTHORIZATION,
                ]),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("harvest_server=info".parse().unwrap()),
        )
        .init();

    let state = AppState::new("sqlite:harvest.db?mode=rwc", std::path::Path::new("data")).await;
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    info!("Economy server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
