use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::time::Instant;

use stockyard_infra::store::{StockAdjustment, StockStore};
use stockyard_infra::{
    CatalogStore, InMemoryInventoryStore, RecordingLowStockSink, TransferCommand, TransferEngine,
    TransferEngineConfig,
};
use stockyard_inventory::{Item, ItemDraft, Warehouse, WarehouseDraft};

struct Bench {
    engine: TransferEngine,
    item: Item,
    warehouses: Vec<Warehouse>,
}

fn setup(rt: &Runtime, warehouse_count: usize) -> Bench {
    rt.block_on(async {
        let store = Arc::new(InMemoryInventoryStore::new());
        let now = Utc::now();
        let item = store
            .insert_item(
                Item::create(
                    ItemDraft {
                        sku: "BENCH-1".to_string(),
                        name: "Bench item".to_string(),
                        description: None,
                        category: None,
                        brand: None,
                        unit_of_measure: "pcs".to_string(),
                        minimum_stock_level: 0,
                        maximum_stock_level: None,
                        is_active: None,
                    },
                    now,
                )
                .unwrap(),
            )
            .await
            .unwrap();

        let mut warehouses = Vec::with_capacity(warehouse_count);
        for i in 0..warehouse_count {
            let wh = store
                .insert_warehouse(
                    Warehouse::create(
                        WarehouseDraft {
                            name: format!("WH-{i}"),
                            location: None,
                            address: None,
                            contact_person: None,
                            phone: None,
                            email: None,
                            is_active: None,
                        },
                        now,
                    )
                    .unwrap(),
                )
                .await
                .unwrap();
            store
                .apply_adjustment(
                    &StockAdjustment {
                        item_id: item.id,
                        warehouse_id: wh.id,
                        delta: 500_000,
                        reason: None,
                    },
                    Instant::now() + Duration::from_secs(5),
                )
                .await
                .unwrap();
            warehouses.push(wh);
        }

        let engine = TransferEngine::new(
            store.clone(),
            store,
            Arc::new(RecordingLowStockSink::new()),
            TransferEngineConfig::default(),
        );
        Bench {
            engine,
            item,
            warehouses,
        }
    })
}

fn command(bench: &Bench, from: usize, to: usize) -> TransferCommand {
    TransferCommand {
        item_id: bench.item.id,
        from_warehouse_id: bench.warehouses[from].id,
        to_warehouse_id: bench.warehouses[to].id,
        quantity: 1,
        notes: None,
        initiated_by: None,
    }
}

/// Single transfers back and forth between two warehouses.
fn bench_transfer_latency(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let bench = setup(&rt, 2);
    let mut group = c.benchmark_group("transfer_latency");
    group.throughput(Throughput::Elements(1));

    let mut flip = false;
    group.bench_function("in_memory_round_trip", |b| {
        b.iter(|| {
            flip = !flip;
            let (from, to) = if flip { (0, 1) } else { (1, 0) };
            let done = rt.block_on(bench.engine.transfer(command(&bench, from, to)));
            black_box(done.unwrap());
        });
    });
    group.finish();
}

/// Concurrent transfers spread over N warehouses; contention drops as N grows.
fn bench_concurrent_transfers(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("concurrent_transfers");
    const BATCH: usize = 64;
    group.throughput(Throughput::Elements(BATCH as u64));

    for warehouse_count in [2usize, 8, 32].iter() {
        let bench = Arc::new(setup(&rt, *warehouse_count));
        group.bench_with_input(
            BenchmarkId::from_parameter(warehouse_count),
            warehouse_count,
            |b, &n| {
                b.iter(|| {
                    rt.block_on(async {
                        let mut tasks = Vec::with_capacity(BATCH);
                        for i in 0..BATCH {
                            let bench = bench.clone();
                            tasks.push(tokio::spawn(async move {
                                let cmd = command(&bench, i % n, (i + 1) % n);
                                bench.engine.transfer(cmd).await
                            }));
                        }
                        for task in tasks {
                            black_box(task.await.unwrap().unwrap());
                        }
                    })
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_transfer_latency, bench_concurrent_transfers);
criterion_main!(benches);
