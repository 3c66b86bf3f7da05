//! Manager benchmarks for checkout-path operations
//!
//! Run with: cargo bench -p scv-core --bench activation

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use scv_core::config::ManagerConfig;
use scv_core::models::{AuthToken, TargetId};
use scv_core::service::{Injector, Manager};
use scv_core::test_helpers::{test_stream, NullInjector};

fn bench_manager() -> Arc<Manager> {
    Manager::new(
        Arc::new(NullInjector) as Arc<dyn Injector>,
        &ManagerConfig::default(),
    )
}

/// Benchmark: token minting
fn bench_token_mint(c: &mut Criterion) {
    let target_id = TargetId::from_string("bench_target".to_string());

    c.bench_function("token_mint", |b| {
        b.iter(|| {
            let token = AuthToken::mint(black_box(&target_id));
            black_box(token);
        })
    });
}

/// Benchmark: one full activate/deactivate cycle against a populated target
fn bench_activate_deactivate(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let manager = bench_manager();
    let target_id = TargetId::from_string("t".to_string());

    rt.block_on(async {
        for i in 0..1000 {
            manager
                .add_stream(test_stream(&format!("s{i}"), "t"))
                .await
                .unwrap();
        }
    });

    c.bench_function("activate_deactivate_cycle", |b| {
        b.to_async(&rt).iter(|| {
            let manager = Arc::clone(&manager);
            let target_id = target_id.clone();
            async move {
                let (token, _) = manager
                    .activate_stream(&target_id, "bench_user", "bench_engine")
                    .await
                    .expect("activate failed");
                manager
                    .deactivate_stream(&token)
                    .await
                    .expect("deactivate failed");
            }
        })
    });
}

/// Benchmark: closure dispatch through the read path
fn bench_read_stream(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let manager = bench_manager();

    let stream_id = rt.block_on(async {
        let stream = test_stream("s0", "t");
        let stream_id = stream.stream_id().clone();
        manager.add_stream(stream).await.unwrap();
        stream_id
    });

    c.bench_function("read_stream_closure", |b| {
        b.to_async(&rt).iter(|| {
            let manager = Arc::clone(&manager);
            let stream_id = stream_id.clone();
            async move {
                let frames = manager
                    .read_stream(&stream_id, |state| Ok(state.frames))
                    .await
                    .expect("read failed");
                black_box(frames);
            }
        })
    });
}

criterion_group!(
    benches,
    bench_token_mint,
    bench_activate_deactivate,
    bench_read_stream
);
criterion_main!(benches);
