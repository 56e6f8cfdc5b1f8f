//! 核心功能性能基准测试

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ctxtrace::{is_valid_trace_id, with_testing_prefix, Context, TraceId};

/// 基准测试：ID 生成
fn bench_id_generation(c: &mut Criterion) {
    c.bench_function("TraceId::new", |b| {
        b.iter(|| {
            // 使用 black_box 防止编译器优化掉ID的创建
            black_box(TraceId::new());
        })
    });
}

/// 基准测试：ID 验证
fn bench_id_validation(c: &mut Criterion) {
    let valid_id = "0af76519-16cd-43dd-8448-eb211c80319c";
    let testing_id = "testing-0af76519-16cd-43dd-8448-eb211c80319c";
    let invalid_id = "abc-123-invalid";

    let mut group = c.benchmark_group("is_valid_trace_id");

    group.bench_function("valid_id", |b| {
        b.iter(|| black_box(is_valid_trace_id(black_box(valid_id))))
    });

    // 测试ID只做前缀检查
    group.bench_function("testing_id", |b| {
        b.iter(|| black_box(is_valid_trace_id(black_box(testing_id))))
    });

    group.bench_function("invalid_id", |b| {
        b.iter(|| black_box(is_valid_trace_id(black_box(invalid_id))))
    });

    group.finish();
}

/// 基准测试：上下文派生与查找
fn bench_context(c: &mut Criterion) {
    let trace_id = TraceId::new();
    let base = Context::new().with_value(1u64).with_value(String::from("unrelated"));
    let traced = base.with_trace_id(&trace_id);

    c.bench_function("Context::with_trace_id", |b| {
        b.iter(|| black_box(base.with_trace_id(black_box(&trace_id))))
    });

    c.bench_function("Context::trace_id", |b| {
        b.iter(|| black_box(black_box(&traced).trace_id().len()))
    });

    c.bench_function("with_testing_prefix", |b| {
        b.iter(|| black_box(with_testing_prefix(black_box(trace_id.as_str()))))
    });
}

// 注册基准测试组
criterion_group!(benches, bench_id_generation, bench_id_validation, bench_context);

// 运行基准测试
criterion_main!(benches);
