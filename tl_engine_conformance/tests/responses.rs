// Copyright 2026 the TL Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use tl_engine::ids::{RPC_REQ_ERROR, error_code};
use tl_engine::schema::SchemaVersion;
use tl_engine::wire::DecodeError;
use tl_engine::{
    Engine, FetchError, Mismatch, RemoteError, Schema, Scratch, Selector, Value,
    fetch_error_envelope,
};
use tl_engine_conformance::{echo, engine, schema_bytes, words};

fn envelope(code: i32, message: &str) -> Vec<u8> {
    let mut bytes = words(&[RPC_REQ_ERROR, 0, 0, code]);
    let mut w = tl_engine::wire::WireWriter::new();
    w.write_string(message.as_bytes()).unwrap();
    bytes.extend_from_slice(w.as_bytes());
    bytes
}

#[test]
fn error_envelope_takes_priority() {
    let engine = engine();
    let bytes = envelope(-500, "server exploded");
    for function in ["putInt", "putShape", "putInts"] {
        let f = engine.schema().function_by_name(function).unwrap();
        let comb = engine.schema().combinator(f).unwrap();
        assert_eq!(
            engine.fetch_as(comb, &bytes).unwrap_err(),
            FetchError::Remote(RemoteError {
                code: -500,
                message: "server exploded".into(),
            }),
            "{function}"
        );
    }
    assert_eq!(fetch_error_envelope(&bytes).unwrap().code, -500);
}

#[test]
fn truncated_envelope_is_a_syntax_error() {
    let engine = engine();
    let f = engine.schema().function_by_name("putInt").unwrap();
    let comb = engine.schema().combinator(f).unwrap();
    let bytes = words(&[RPC_REQ_ERROR, 0]);
    assert_eq!(fetch_error_envelope(&bytes), None);
    let err = engine.fetch_as(comb, &bytes).unwrap_err();
    assert_eq!(err.tl_error_code(), error_code::SYNTAX);
}

#[test]
fn short_buffers_fail_and_do_not_poison_later_calls() {
    let engine = engine();
    let f = engine.schema().function_by_name("putLong").unwrap();
    let comb = engine.schema().combinator(f).unwrap();
    let mut scratch = Scratch::new();
    assert_eq!(
        engine
            .fetch_as_with(comb, &words(&[1]), &mut scratch, None)
            .unwrap_err(),
        FetchError::Mismatch(Mismatch::Decode(DecodeError::UnexpectedEof))
    );
    let value = engine
        .fetch_as_with(comb, &words(&[9, 0]), &mut scratch, None)
        .unwrap();
    assert_eq!(value.get("result"), Some(&Value::Int(9)));
}

#[test]
fn error_values_follow_the_host_convention() {
    let engine = engine();
    let f = engine.schema().function_by_name("putInt").unwrap();
    let comb = engine.schema().combinator(f).unwrap();
    let err = engine.fetch_as(comb, &words(&[1, 2])).unwrap_err();
    assert_eq!(err, FetchError::ExtraData(4));
    let value = err.into_value();
    assert_eq!(
        value.get("__error_code"),
        Some(&Value::Int(i64::from(error_code::EXTRA_DATA)))
    );
    assert!(value.get("__error").is_some());
}

#[test]
fn compilation_happens_once() {
    let engine = engine();
    let schema = engine.schema();
    let f = schema.function_by_name("putShape").unwrap();
    assert_eq!(schema.compile_count(), 0);
    let first = schema.programs(f).unwrap() as *const _;
    let after_first = schema.compile_count();
    assert_eq!(after_first, 1);
    let second = schema.programs(f).unwrap() as *const _;
    assert_eq!(first, second);
    assert_eq!(schema.compile_count(), after_first);

    let square = Value::map([("_", "square"), ("side", "2")]);
    echo(&engine, "putShape", square.clone()).unwrap();
    let warmed = schema.compile_count();
    echo(&engine, "putShape", square).unwrap();
    assert_eq!(schema.compile_count(), warmed);
}

#[test]
fn concurrent_calls_share_programs() {
    let engine = engine();
    std::thread::scope(|s| {
        for i in 0..4_i64 {
            let engine = &engine;
            s.spawn(move || {
                for j in 0..50 {
                    let v = Value::list([i, j]);
                    assert_eq!(echo(engine, "putInts", v.clone()).unwrap(), v);
                }
            });
        }
    });
    let f = engine.schema().function_by_name("putInts").unwrap();
    assert!(engine.schema().combinator(f).unwrap().is_compiled());
}

#[test]
fn both_schema_versions_behave_alike() {
    let v2 = Engine::new(Schema::load(&schema_bytes(SchemaVersion::V2)).unwrap());
    let v3 = engine();
    let user = Value::map([("flags", Value::Int(1)), ("id", Value::Int(2)), ("name", Value::str("x"))]);
    let call = Value::map([("x", user)]);
    assert_eq!(
        v2.compile_and_store(Selector::Name("putUser"), &call).unwrap().bytes,
        v3.compile_and_store(Selector::Name("putUser"), &call).unwrap().bytes
    );
    assert!(v3.warm_up().is_ok());
}
