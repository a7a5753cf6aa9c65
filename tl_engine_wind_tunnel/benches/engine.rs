// Copyright 2026 the TL Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use tl_engine::expr::FLAG_BARE;
use tl_engine::schema::{
    ArgDecl, CombinatorDecl, ExprDecl, SchemaBuilder, SchemaVersion, TypeDecl, prelude,
};
use tl_engine::{Engine, Schema, Scratch, Selector, Value};

const TYPE_ITEM: i32 = 0x0be7_0001;
const ITEM: i32 = 0x0be7_1001;
const TYPE_EVENT: i32 = 0x0be7_0002;
const CLICK: i32 = 0x0be7_2001;
const SCROLL: i32 = 0x0be7_2002;
const PUT_ITEMS: i32 = 0x0be7_3001;
const PUT_EVENTS: i32 = 0x0be7_3002;

/// Entry point for `tl_engine` wind-tunnel benchmarks.
///
/// Scenarios cover flat records in a vector (the common case) and boxed unions that go through
/// tag dispatch, in both directions and across sizes.
fn bench_engine(c: &mut Criterion) {
    bench_store_items(c);
    bench_fetch_items(c);
    bench_store_events_guessing(c);
    bench_fetch_events(c);
}

fn vector_of(element: ExprDecl) -> ExprDecl {
    ExprDecl::Type {
        type_wire_id: prelude::TYPE_VECTOR,
        flags: FLAG_BARE,
        children: vec![element],
    }
}

fn build_engine() -> Engine {
    let mut b = SchemaBuilder::with_prelude(SchemaVersion::V3);
    b.ty(TypeDecl::new(TYPE_ITEM, "Item", 0));
    b.constructor(
        CombinatorDecl::new(ITEM, "item", TYPE_ITEM, ExprDecl::ty(TYPE_ITEM))
            .arg(ArgDecl::nat("flags", 0))
            .arg(ArgDecl::new("id", ExprDecl::bare(prelude::TYPE_LONG)))
            .arg(ArgDecl::new("title", ExprDecl::bare(prelude::TYPE_STRING)))
            .arg(ArgDecl::new("score", ExprDecl::bare(prelude::TYPE_DOUBLE)).optional(0, 0)),
    );
    b.ty(TypeDecl::new(TYPE_EVENT, "Event", 0));
    b.constructor(
        CombinatorDecl::new(CLICK, "click", TYPE_EVENT, ExprDecl::ty(TYPE_EVENT))
            .arg(ArgDecl::new("x", ExprDecl::bare(prelude::TYPE_INT)))
            .arg(ArgDecl::new("y", ExprDecl::bare(prelude::TYPE_INT))),
    );
    b.constructor(
        CombinatorDecl::new(SCROLL, "scroll", TYPE_EVENT, ExprDecl::ty(TYPE_EVENT))
            .arg(ArgDecl::new("delta", ExprDecl::bare(prelude::TYPE_INT))),
    );
    let items = vector_of(ExprDecl::bare(TYPE_ITEM));
    b.function(
        CombinatorDecl::new(PUT_ITEMS, "putItems", prelude::TYPE_VECTOR, items.clone())
            .arg(ArgDecl::new("x", items)),
    );
    let events = vector_of(ExprDecl::ty(TYPE_EVENT));
    b.function(
        CombinatorDecl::new(PUT_EVENTS, "putEvents", prelude::TYPE_VECTOR, events.clone())
            .arg(ArgDecl::new("x", events)),
    );
    Engine::new(Schema::load(&b.build().unwrap()).unwrap())
}

fn items(n: i64) -> Value {
    Value::list((0..n).map(|i| {
        Value::map([
            ("flags", Value::Int(i & 1)),
            ("id", Value::Int(i << 20)),
            ("title", Value::str("wind tunnel item")),
            ("score", Value::Float(0.5)),
        ])
    }))
}

fn events(n: i64, named: bool) -> Value {
    Value::list((0..n).map(|i| {
        let mut e = if i % 2 == 0 {
            Value::map([("delta", Value::Int(i))])
        } else {
            Value::map([("x", Value::Int(i)), ("y", Value::Int(-i))])
        };
        if named {
            let name = if i % 2 == 0 { "scroll" } else { "click" };
            e.as_map_mut().unwrap().insert("_", name);
        }
        e
    }))
}

fn call(x: Value) -> Value {
    Value::map([("x", x)])
}

fn bench_store_items(c: &mut Criterion) {
    let engine = build_engine();
    let mut group = c.benchmark_group("store_items");
    for &n in &[16_i64, 256, 4096] {
        let value = call(items(n));
        let mut scratch = Scratch::new();
        group.bench_with_input(BenchmarkId::new("n", n), &n, |b, _| {
            b.iter(|| {
                let request = engine
                    .compile_and_store_with(
                        Selector::Name("putItems"),
                        black_box(&value),
                        &mut scratch,
                        None,
                    )
                    .unwrap();
                black_box(request.bytes.len())
            });
        });
    }
    group.finish();
}

fn bench_fetch_items(c: &mut Criterion) {
    let engine = build_engine();
    let mut group = c.benchmark_group("fetch_items");
    for &n in &[16_i64, 256, 4096] {
        let request = engine
            .compile_and_store(Selector::Name("putItems"), &call(items(n)))
            .unwrap();
        let response = request.bytes[4..].to_vec();
        let mut scratch = Scratch::new();
        group.bench_with_input(BenchmarkId::new("n", n), &n, |b, _| {
            b.iter(|| {
                let value = engine
                    .fetch_response_with(&request, black_box(&response), &mut scratch, None)
                    .unwrap();
                black_box(value)
            });
        });
    }
    group.finish();
}

/// Unions without `_` exercise checkpoint/rewind on every element.
fn bench_store_events_guessing(c: &mut Criterion) {
    let engine = build_engine();
    let mut group = c.benchmark_group("store_events");
    for named in [true, false] {
        let value = call(events(1024, named));
        let mut scratch = Scratch::new();
        let label = if named { "named" } else { "guessed" };
        group.bench_function(label, |b| {
            b.iter(|| {
                engine
                    .compile_and_store_with(
                        Selector::Name("putEvents"),
                        black_box(&value),
                        &mut scratch,
                        None,
                    )
                    .unwrap()
            });
        });
    }
    group.finish();
}

fn bench_fetch_events(c: &mut Criterion) {
    let engine = build_engine();
    let request = engine
        .compile_and_store(Selector::Name("putEvents"), &call(events(1024, true)))
        .unwrap();
    let response = request.bytes[4..].to_vec();
    c.bench_function("fetch_events", |b| {
        let mut scratch = Scratch::new();
        b.iter(|| {
            engine
                .fetch_response_with(&request, black_box(&response), &mut scratch, None)
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_engine);
criterion_main!(benches);
