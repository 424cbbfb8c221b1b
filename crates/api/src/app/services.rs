use std::{convert::Infallible, sync::Arc, time::Duration};

use anyhow::Context;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use tokio_stream::{StreamExt, wrappers::BroadcastStream};
use tracing::info;

use stockyard_infra::{
    BroadcastLowStockSink, CatalogStore, FanoutLowStockSink, InMemoryInventoryStore,
    LowStockSink, PostgresInventoryStore, ReadCache, Settings, StockAdjuster, StockStore,
    TracingLowStockSink, TransferEngine,
};

use crate::app::dto;

const ALERT_CHANNEL_CAPACITY: usize = 256;

/// Everything a handler needs, shared behind one `Arc`.
pub struct AppServices {
    pub catalog: Arc<dyn CatalogStore>,
    pub stock: Arc<dyn StockStore>,
    pub transfers: TransferEngine,
    pub adjustments: StockAdjuster,
    pub cache: Arc<ReadCache>,
    alerts: BroadcastLowStockSink,
}

impl AppServices {
    /// Wire services over the given stores.
    pub fn new(catalog: Arc<dyn CatalogStore>, stock: Arc<dyn StockStore>, settings: &Settings) -> Self {
        let cache = Arc::new(ReadCache::new(settings.read_cache_ttl));
        let alerts = BroadcastLowStockSink::new(ALERT_CHANNEL_CAPACITY);
        let sink: Arc<dyn LowStockSink> = Arc::new(
            FanoutLowStockSink::new()
                .with(Arc::new(TracingLowStockSink))
                .with(Arc::new(alerts.clone())),
        );

        let transfers = TransferEngine::new(
            catalog.clone(),
            stock.clone(),
            sink.clone(),
            settings.transfer,
        )
        .with_hook(cache.clone());
        let adjustments = StockAdjuster::new(catalog.clone(), stock.clone(), sink, settings.transfer)
            .with_hook(cache.clone());

        Self {
            catalog,
            stock,
            transfers,
            adjustments,
            cache,
            alerts,
        }
    }

    pub fn alerts(&self) -> &BroadcastLowStockSink {
        &self.alerts
    }
}

/// Pick the backing store from settings: Postgres when a database URL is
/// configured, in-memory otherwise.
pub async fn build_services(settings: &Settings) -> anyhow::Result<AppServices> {
    match &settings.database_url {
        Some(url) => {
            let store = PostgresInventoryStore::connect(url, settings.db_max_connections)
                .await
                .context("connecting to DATABASE_URL")?
                .with_lock_timeout(settings.lock_timeout);
            store.migrate().await.context("applying inventory schema")?;
            info!("using postgres inventory store");
            let store = Arc::new(store);
            Ok(AppServices::new(store.clone(), store, settings))
        }
        None => {
            info!("using in-memory inventory store");
            let store = Arc::new(InMemoryInventoryStore::new().with_lock_timeout(settings.lock_timeout));
            Ok(AppServices::new(store.clone(), store, settings))
        }
    }
}

/// Relay low-stock signals as server-sent events.
///
/// Lagging subscribers skip what they missed rather than failing the stream.
pub fn alerts_sse_stream(
    services: Arc<AppServices>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.alerts().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(signal) => {
            let data = serde_json::to_string(&dto::low_stock_json(&signal))
                .unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event("low_stock").data(data)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
