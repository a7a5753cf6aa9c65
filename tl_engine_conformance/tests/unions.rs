// Copyright 2026 the TL Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use tl_engine::{Engine, FetchError, Key, Limits, Mismatch, SerializeError, Value};
use tl_engine_conformance::{
    CIRCLE, EVENT_OTHER, PING, RECT, SQUARE, USER, echo, engine, schema, store_arg, words,
};

#[test]
fn discriminator_selects_constructor() {
    let engine = engine();
    let square = Value::map([("_", Value::str("square")), ("side", Value::Int(4))]);
    assert_eq!(
        store_arg(&engine, "putShape", square.clone()).unwrap(),
        words(&[SQUARE, 4])
    );
    assert_eq!(echo(&engine, "putShape", square.clone()).unwrap(), {
        let mut expected = Value::map([("side", Value::Int(4))]);
        expected
            .as_map_mut()
            .unwrap()
            .insert("_", Value::str("square"));
        expected
    });
}

#[test]
fn first_element_also_names_the_constructor() {
    let engine = engine();
    let rect = Value::map([
        (0_i64, Value::str("rect")),
        (1_i64, Value::Int(2)),
        (2_i64, Value::Int(5)),
    ]);
    assert_eq!(
        store_arg(&engine, "putShape", rect).unwrap(),
        words(&[RECT, 2, 5])
    );
}

#[test]
fn fetch_reports_constructor_name() {
    let engine = engine();
    let request = engine
        .compile_and_store(
            tl_engine::Selector::Name("putShape"),
            &Value::map([("x", Value::map([("_", "circle"), ("r", "1")]))]),
        )
        .unwrap();
    let fetched = engine
        .fetch_response(&request, &words(&[RECT, 7, 8]))
        .unwrap();
    let shape = fetched.get("result").unwrap();
    assert_eq!(shape.get("_"), Some(&Value::str("rect")));
    assert_eq!(shape.get("h"), Some(&Value::Int(8)));
}

#[test]
fn unknown_tag_without_default_fails() {
    let engine = engine();
    let request = engine
        .compile_and_store(
            tl_engine::Selector::Name("putShape"),
            &Value::map([("x", Value::map([("_", "circle"), ("r", "1")]))]),
        )
        .unwrap();
    let err = engine
        .fetch_response(&request, &words(&[0x1234_5678, 1]))
        .unwrap_err();
    assert!(
        matches!(
            err,
            FetchError::Mismatch(Mismatch::UnknownTag { tag: 0x1234_5678, .. })
        ),
        "{err:?}"
    );
}

#[test]
fn unknown_constructor_name_fails() {
    let engine = engine();
    let bad = Value::map([("_", "hexagon")]);
    assert!(matches!(
        store_arg(&engine, "putShape", bad),
        Err(SerializeError::Mismatch(Mismatch::UnknownConstructor(_)))
    ));
}

#[test]
fn constructor_guess_picks_first_fitting() {
    let engine = engine();
    let rect = Value::map([("w", 3_i64), ("h", 4_i64)]);
    assert_eq!(
        store_arg(&engine, "putShape", rect.clone()).unwrap(),
        words(&[RECT, 3, 4])
    );
    let circle = Value::map([("r", 9_i64)]);
    assert_eq!(
        store_arg(&engine, "putShape", circle).unwrap(),
        words(&[CIRCLE, 9])
    );

    let strict = Engine::with_limits(
        schema(),
        Limits {
            allow_constructor_guess: false,
            ..Limits::default()
        },
    );
    assert!(matches!(
        store_arg(&strict, "putShape", rect),
        Err(SerializeError::Mismatch(Mismatch::MissingDiscriminator(_)))
    ));
}

#[test]
fn optional_field_follows_its_bit() {
    let engine = engine();
    let anonymous = Value::map([("flags", 0_i64), ("id", 5_i64)]);
    assert_eq!(
        store_arg(&engine, "putUser", anonymous.clone()).unwrap(),
        words(&[USER, 0, 5])
    );
    let fetched = echo(&engine, "putUser", anonymous.clone()).unwrap();
    assert_eq!(fetched, anonymous);
    assert_eq!(fetched.get("name"), None);

    let named = Value::map([
        ("flags", Value::Int(1)),
        ("id", Value::Int(5)),
        ("name", Value::str("ann")),
    ]);
    assert_eq!(echo(&engine, "putUser", named.clone()).unwrap(), named);
}

#[test]
fn set_bit_requires_the_field() {
    let engine = engine();
    let user = Value::map([("flags", 1_i64), ("id", 5_i64)]);
    assert!(matches!(
        store_arg(&engine, "putUser", user),
        Err(SerializeError::Mismatch(Mismatch::MissingField(_)))
    ));
}

#[test]
fn maybe_follows_the_payload() {
    use tl_engine::ids::{ID_MAYBE_FALSE, ID_MAYBE_TRUE};

    let engine = engine();
    assert_eq!(
        store_arg(&engine, "putMaybe", Value::Int(6)).unwrap(),
        words(&[ID_MAYBE_TRUE, 6])
    );
    assert_eq!(
        store_arg(&engine, "putMaybe", Value::Bool(false)).unwrap(),
        words(&[ID_MAYBE_FALSE])
    );
    assert_eq!(echo(&engine, "putMaybe", Value::Int(6)).unwrap(), Value::Int(6));

    // A null field counts as absent.
    assert_eq!(
        store_arg(&engine, "putMaybe", Value::Null).unwrap_err(),
        SerializeError::Mismatch(Mismatch::MissingField(Key::name("x")))
    );

    let f = engine.schema().function_by_name("putMaybe").unwrap();
    let comb = engine.schema().combinator(f).unwrap();
    let fetched = engine.fetch_as(comb, &words(&[ID_MAYBE_FALSE])).unwrap();
    assert_eq!(fetched.get("result"), Some(&Value::Bool(false)));
}

#[test]
fn bare_union_fetch_omits_the_constructor_name() {
    let engine = engine();
    let circle = Value::map([("_", "circle"), ("r", "4")]);
    assert_eq!(
        store_arg(&engine, "putBareShape", circle).unwrap(),
        words(&[4])
    );

    let f = engine.schema().function_by_name("putBareShape").unwrap();
    let comb = engine.schema().combinator(f).unwrap();
    let fetched = engine.fetch_as(comb, &words(&[4])).unwrap();
    let shape = fetched.get("result").unwrap();
    assert_eq!(shape.get("r"), Some(&Value::Int(4)));
    assert_eq!(shape.get("_"), None);
}

#[test]
fn unknown_tag_falls_back_to_the_default_constructor() {
    let engine = engine();
    let other = Value::map([("_", Value::str("eventOther")), ("value", Value::Int(5))]);
    assert_eq!(
        store_arg(&engine, "putEvent", other).unwrap(),
        words(&[EVENT_OTHER, 5])
    );

    let f = engine.schema().function_by_name("putEvent").unwrap();
    let event = engine.schema().combinator(f).unwrap();

    let fetched = engine.fetch_as(event, &words(&[PING, 3])).unwrap();
    let ping = fetched.get("result").unwrap();
    assert_eq!(ping.get("_"), Some(&Value::str("ping")));
    assert_eq!(ping.get("id"), Some(&Value::Int(3)));

    // No constructor has tag 42; the default one reads starting at the tag word.
    let fetched = engine.fetch_as(event, &words(&[42])).unwrap();
    let fallback = fetched.get("result").unwrap();
    assert_eq!(fallback.get("_"), Some(&Value::str("eventOther")));
    assert_eq!(fallback.get("value"), Some(&Value::Int(42)));

    let f = engine.schema().function_by_name("putShape").unwrap();
    let shape = engine.schema().combinator(f).unwrap();
    let err = engine.fetch_as(shape, &words(&[42])).unwrap_err();
    assert!(
        matches!(err, FetchError::Mismatch(Mismatch::UnknownTag { tag: 42, .. })),
        "{err:?}"
    );
}
