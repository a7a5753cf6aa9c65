// Copyright 2026 the TL Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use tl_engine::{ExecError, FetchError, Key, Map, Mismatch, Selector, SerializeError, Value};
use tl_engine_conformance::{echo, engine, store_arg, words};

fn ints(n: i64) -> Value {
    Value::list((0..n).map(|i| i * 3 - 7))
}

#[test]
fn vector_sizes_and_round_trip() {
    let engine = engine();
    for n in [0, 1, 1000] {
        let list = ints(n);
        let bytes = store_arg(&engine, "putInts", list.clone()).unwrap();
        assert_eq!(bytes.len() as i64, 4 + 4 * n, "n = {n}");
        assert_eq!(echo(&engine, "putInts", list.clone()).unwrap(), list);
    }
}

#[test]
fn vector_requires_positional_keys() {
    let engine = engine();
    let reordered = Value::map([(Key::Int(1), 5_i64), (Key::Int(0), 4_i64)]);
    assert_eq!(
        store_arg(&engine, "putInts", reordered).unwrap(),
        words(&[2, 4, 5])
    );

    for gappy in [
        Value::map([("a", 1_i64), ("b", 2_i64)]),
        Value::map([(Key::Int(10), 1_i64), (Key::Int(2), 2_i64)]),
    ] {
        assert_eq!(
            store_arg(&engine, "putInts", gappy).unwrap_err(),
            SerializeError::Mismatch(Mismatch::MissingField(Key::Int(0)))
        );
    }
}

#[test]
fn dictionary_round_trips() {
    let engine = engine();
    let dict = Value::map([("alpha", 1_i64), ("beta", 2_i64), ("7", 3_i64)]);
    let fetched = echo(&engine, "putDict", dict.clone()).unwrap();
    assert_eq!(fetched, dict);
    assert_eq!(fetched.get(7_i64), Some(&Value::Int(3)));
}

#[test]
fn long_key_dictionary_round_trips() {
    let engine = engine();
    let dict = Value::map([(Key::Int(1 << 40), "far"), (Key::Int(-1), "neg")]);
    let bytes = store_arg(&engine, "putLongDict", dict.clone()).unwrap();
    assert_eq!(&bytes[..4], &2_i32.to_le_bytes());
    assert_eq!(echo(&engine, "putLongDict", dict.clone()).unwrap(), dict);

    let bad = Value::map([("name", "x")]);
    assert!(store_arg(&engine, "putLongDict", bad).is_err());
}

#[test]
fn negative_counts_are_fatal() {
    let engine = engine();
    for function in ["putInts", "putDict"] {
        let request = engine
            .compile_and_store(Selector::Name(function), &Value::map([("x", Map::new())]))
            .unwrap();
        assert_eq!(
            engine.fetch_response(&request, &words(&[-1])).unwrap_err(),
            FetchError::Fatal(ExecError::NegativeCount(-1)),
            "{function}"
        );
    }
}

#[test]
fn huge_count_fails_without_preallocating() {
    let engine = engine();
    let request = engine
        .compile_and_store(Selector::Name("putInts"), &Value::map([("x", Map::new())]))
        .unwrap();
    let err = engine
        .fetch_response(&request, &words(&[i32::MAX, 1, 2]))
        .unwrap_err();
    assert!(matches!(err, FetchError::Mismatch(_)), "{err:?}");
}

#[test]
fn repeated_tuples_round_trip() {
    let engine = engine();
    let pairs = Value::map([
        ("n", Value::Int(2)),
        (
            "xs",
            Value::list([
                Value::map([("a", 1_i64), ("b", 2_i64)]),
                Value::map([("a", 3_i64), ("b", 4_i64)]),
            ]),
        ),
    ]);
    let bytes = store_arg(&engine, "putPairs", pairs.clone()).unwrap();
    assert_eq!(
        bytes,
        words(&[tl_engine_conformance::PAIRS, 2, 1, 2, 3, 4])
    );
    assert_eq!(echo(&engine, "putPairs", pairs.clone()).unwrap(), pairs);
}

#[test]
fn repeated_tuple_with_missing_element_fails() {
    let engine = engine();
    let pairs = Value::map([
        ("n", Value::Int(2)),
        ("xs", Value::list([Value::map([("a", 1_i64), ("b", 2_i64)])])),
    ]);
    assert!(store_arg(&engine, "putPairs", pairs).is_err());
}
