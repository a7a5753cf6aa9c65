// Copyright 2026 the TL Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use tl_engine::Value;
use tl_engine::wire::{WireReader, WireWriter, padded_len};
use tl_engine_conformance::{echo, engine, store_arg, words};

#[test]
fn int_round_trips() {
    let engine = engine();
    for v in [0_i64, 1, -1, i64::from(i32::MAX), i64::from(i32::MIN)] {
        assert_eq!(echo(&engine, "putInt", Value::Int(v)).unwrap(), Value::Int(v));
    }
}

#[test]
fn int_out_of_range_is_rejected() {
    let engine = engine();
    assert!(store_arg(&engine, "putInt", Value::Int(1 << 40)).is_err());
}

#[test]
fn long_round_trips() {
    let engine = engine();
    for v in [0, -5, i64::MAX, i64::MIN] {
        assert_eq!(store_arg(&engine, "putLong", Value::Int(v)).unwrap().len(), 8);
        assert_eq!(echo(&engine, "putLong", Value::Int(v)).unwrap(), Value::Int(v));
    }
}

#[test]
fn double_round_trips() {
    let engine = engine();
    for v in [0.0, -1.5, 1e300, f64::MIN_POSITIVE] {
        assert_eq!(echo(&engine, "putDouble", Value::Float(v)).unwrap(), Value::Float(v));
    }
}

#[test]
fn scalars_coerce_on_store() {
    let engine = engine();
    assert_eq!(
        store_arg(&engine, "putInt", Value::str("42")).unwrap(),
        words(&[42])
    );
    assert_eq!(
        store_arg(&engine, "putInt", Value::Bool(true)).unwrap(),
        words(&[1])
    );
    assert_eq!(
        echo(&engine, "putString", Value::Int(17)).unwrap(),
        Value::str("17")
    );
}

#[test]
fn string_round_trips_across_framings() {
    let engine = engine();
    for len in [0_usize, 1, 3, 4, 253, 254, 255, 300, 70_000] {
        let s: Vec<u8> = (0..len).map(|i| u8::try_from(i % 251).unwrap()).collect();
        assert_eq!(
            echo(&engine, "putString", Value::Str(s.clone())).unwrap(),
            Value::Str(s),
            "length {len}"
        );
    }
}

#[test]
fn string_framing_sizes() {
    let engine = engine();
    let short = store_arg(&engine, "putString", Value::Str(vec![b'a'; 253])).unwrap();
    assert_eq!(short.len(), padded_len(1 + 253));
    assert_eq!(short[0], 253);

    let long = store_arg(&engine, "putString", Value::Str(vec![b'b'; 300])).unwrap();
    assert_eq!(long.len(), padded_len(4 + 300));
    assert_eq!(&long[..4], &[254, 44, 1, 0]);

    let empty = store_arg(&engine, "putString", Value::str("")).unwrap();
    assert_eq!(empty, vec![0, 0, 0, 0]);
}

#[test]
fn reserved_length_prefix_is_rejected() {
    let mut r = WireReader::new(&[255, 0, 0, 0]);
    assert!(r.read_string().is_err());

    let mut w = WireWriter::new();
    w.write_string(b"xyz").unwrap();
    assert_eq!(w.as_bytes(), &[3, b'x', b'y', b'z']);
}

#[test]
fn bool_round_trips() {
    let engine = engine();
    let t = store_arg(&engine, "putBool", Value::Bool(true)).unwrap();
    assert_eq!(t, words(&[tl_engine::ids::ID_BOOL_TRUE]));
    assert_eq!(echo(&engine, "putBool", Value::Bool(true)).unwrap(), Value::Bool(true));
    assert_eq!(echo(&engine, "putBool", Value::Bool(false)).unwrap(), Value::Bool(false));
    let named = Value::map([("_", "boolTrue")]);
    assert_eq!(echo(&engine, "putBool", named).unwrap(), Value::Bool(true));
}
