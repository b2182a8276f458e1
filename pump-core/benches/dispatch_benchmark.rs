use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::json;
use std::hint::black_box;
use std::sync::Once;

use pump_core::{
    Pump,
    host::{ScriptExecutor, VariableInterpolator, Variables},
};

static INIT: Once = Once::new();

pub fn init_tracing_once() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("error")
            .try_init();
    });
}

fn pump_with_handlers(count: usize) -> Pump {
    let pump = Pump::builder().build();
    for i in 0..count {
        pump.add(&["turn 1"], "", json!({ "n": i }), false);
        pump.add(&[format!("noise {i}")], "", json!({}), false);
    }
    pump
}

fn bench_fire_fan_out(c: &mut Criterion) {
    init_tracing_once();
    let mut group = c.benchmark_group("fire_fan_out");

    for count in [1_usize, 16, 256] {
        let pump = pump_with_handlers(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &pump, |b, pump| {
            b.iter(|| black_box(pump.fire_named(black_box("turn 1"))));
        });
    }

    group.finish();
}

fn bench_dynamic_names(c: &mut Criterion) {
    init_tracing_once();
    let vars = Variables::new();
    vars.set("side", json!("north"));
    let pump = Pump::builder()
        .with_interpolator(VariableInterpolator::new(vars.clone()))
        .build();
    for i in 0..32 {
        pump.add(&[format!("$side|_{i}")], "", json!({}), false);
    }

    c.bench_function("fire_dynamic_32", |b| {
        b.iter(|| black_box(pump.fire_named(black_box("north_7"))));
    });
}

fn bench_nested_chain(c: &mut Criterion) {
    init_tracing_once();
    let vars = Variables::new();
    let pump = Pump::builder()
        .with_executor(ScriptExecutor::new(vars))
        .build();
    for i in 0..16 {
        pump.add(
            &[format!("step {i}")],
            "",
            json!({ "do": [{ "fire": format!("step {}", i + 1) }] }),
            false,
        );
    }

    c.bench_function("nested_fire_chain_16", |b| {
        b.iter(|| black_box(pump.fire_named(black_box("step 0"))));
    });
}

fn bench_churn(c: &mut Criterion) {
    init_tracing_once();
    let pump = Pump::builder().build();

    c.bench_function("add_remove_compact", |b| {
        b.iter(|| {
            for i in 0..64 {
                pump.add(&["churn"], &format!("c{i}"), json!({}), false);
            }
            for i in 0..64 {
                pump.remove(&format!("c{i}"));
            }
            black_box(pump.compact())
        });
    });
}

criterion_group!(
    benches,
    bench_fire_fan_out,
    bench_dynamic_names,
    bench_nested_chain,
    bench_churn
);
criterion_main!(benches);
