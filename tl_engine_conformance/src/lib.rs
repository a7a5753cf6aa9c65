// Copyright 2026 the TL Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared fixtures for the `tl_engine` conformance tests.
//!
//! The fixture schema declares a family of `put*` functions whose result type equals their single
//! argument type. Storing `{"x": v}` therefore produces the function tag followed by exactly the
//! bytes a server would send back for `v`, which [`echo`] replays as the response.

use tl_engine::expr::{FLAG_BARE, FLAG_DEFAULT_CONSTRUCTOR};
use tl_engine::schema::{
    ArgDecl, CombinatorDecl, ExprDecl, SchemaBuilder, SchemaVersion, TypeDecl, prelude,
};
use tl_engine::{Engine, FetchError, Schema, Selector, SerializeError, Value};

/// `Shape` type id.
pub const TYPE_SHAPE: i32 = 0x5a0e_0001;
/// `circle r:int = Shape`.
pub const CIRCLE: i32 = 0x5a0e_1001;
/// `square side:int = Shape`.
pub const SQUARE: i32 = 0x5a0e_1002;
/// `rect w:int h:int = Shape`.
pub const RECT: i32 = 0x5a0e_1003;
/// `User` type id.
pub const TYPE_USER: i32 = 0x5a0e_0002;
/// `user flags:# id:int name:flags.0?string = User`.
pub const USER: i32 = 0x5a0e_2001;
/// `Pairs` type id.
pub const TYPE_PAIRS: i32 = 0x5a0e_0003;
/// `pairs n:# xs:n*[a:int b:int] = Pairs`.
pub const PAIRS: i32 = 0x5a0e_3001;
/// `Event` type id; its last constructor is the fallback for unknown tags.
pub const TYPE_EVENT: i32 = 0x5a0e_0004;
/// `ping id:int = Event`.
pub const PING: i32 = 0x5a0e_4001;
/// `eventOther value:int = Event`.
pub const EVENT_OTHER: i32 = 0x5a0e_4002;

/// Function ids, in declaration order.
pub mod func {
    /// `putInt x:int = int`.
    pub const PUT_INT: i32 = 0x7e57_0001;
    /// `putLong x:long = long`.
    pub const PUT_LONG: i32 = 0x7e57_0002;
    /// `putDouble x:double = double`.
    pub const PUT_DOUBLE: i32 = 0x7e57_0003;
    /// `putString x:string = string`.
    pub const PUT_STRING: i32 = 0x7e57_0004;
    /// `putInts x:%(Vector int) = %(Vector int)`.
    pub const PUT_INTS: i32 = 0x7e57_0005;
    /// `putDict x:%(Dictionary int) = %(Dictionary int)`.
    pub const PUT_DICT: i32 = 0x7e57_0006;
    /// `putShape x:Shape = Shape`.
    pub const PUT_SHAPE: i32 = 0x7e57_0007;
    /// `putUser x:User = User`.
    pub const PUT_USER: i32 = 0x7e57_0008;
    /// `putPairs x:Pairs = Pairs`.
    pub const PUT_PAIRS: i32 = 0x7e57_0009;
    /// `putBool x:Bool = Bool`.
    pub const PUT_BOOL: i32 = 0x7e57_000a;
    /// `putLongDict x:%(LongKeyDictionary string) = %(LongKeyDictionary string)`.
    pub const PUT_LONG_DICT: i32 = 0x7e57_000b;
    /// `putMaybe x:(Maybe int) = Maybe int`.
    pub const PUT_MAYBE: i32 = 0x7e57_000c;
    /// `putBareShape x:%Shape = %Shape`.
    pub const PUT_BARE_SHAPE: i32 = 0x7e57_000d;
    /// `putEvent x:Event = Event`.
    pub const PUT_EVENT: i32 = 0x7e57_000e;
}

fn bare_apply(type_wire_id: i32, children: Vec<ExprDecl>) -> ExprDecl {
    ExprDecl::Type {
        type_wire_id,
        flags: FLAG_BARE,
        children,
    }
}

fn put(b: &mut SchemaBuilder, wire_id: i32, name: &str, owner: i32, ty: ExprDecl) {
    b.function(CombinatorDecl::new(wire_id, name, owner, ty.clone()).arg(ArgDecl::new("x", ty)));
}

/// Builds the fixture schema bytes.
#[must_use]
pub fn schema_bytes(version: SchemaVersion) -> Vec<u8> {
    let mut b = SchemaBuilder::with_prelude(version);

    b.ty(TypeDecl::new(TYPE_SHAPE, "Shape", 0));
    b.constructor(
        CombinatorDecl::new(CIRCLE, "circle", TYPE_SHAPE, ExprDecl::ty(TYPE_SHAPE))
            .arg(ArgDecl::new("r", ExprDecl::bare(prelude::TYPE_INT))),
    );
    b.constructor(
        CombinatorDecl::new(SQUARE, "square", TYPE_SHAPE, ExprDecl::ty(TYPE_SHAPE))
            .arg(ArgDecl::new("side", ExprDecl::bare(prelude::TYPE_INT))),
    );
    b.constructor(
        CombinatorDecl::new(RECT, "rect", TYPE_SHAPE, ExprDecl::ty(TYPE_SHAPE))
            .arg(ArgDecl::new("w", ExprDecl::bare(prelude::TYPE_INT)))
            .arg(ArgDecl::new("h", ExprDecl::bare(prelude::TYPE_INT))),
    );

    b.ty(TypeDecl::new(TYPE_USER, "User", 0));
    b.constructor(
        CombinatorDecl::new(USER, "user", TYPE_USER, ExprDecl::ty(TYPE_USER))
            .arg(ArgDecl::nat("flags", 0))
            .arg(ArgDecl::new("id", ExprDecl::bare(prelude::TYPE_INT)))
            .arg(ArgDecl::new("name", ExprDecl::bare(prelude::TYPE_STRING)).optional(0, 0)),
    );

    b.ty(TypeDecl::new(TYPE_PAIRS, "Pairs", 0));
    b.constructor(
        CombinatorDecl::new(PAIRS, "pairs", TYPE_PAIRS, ExprDecl::ty(TYPE_PAIRS))
            .arg(ArgDecl::nat("n", 0))
            .arg(ArgDecl::new(
                "xs",
                ExprDecl::array(
                    ExprDecl::NatVar { var: 0, diff: 0 },
                    vec![
                        ArgDecl::new("a", ExprDecl::bare(prelude::TYPE_INT)),
                        ArgDecl::new("b", ExprDecl::bare(prelude::TYPE_INT)),
                    ],
                ),
            )),
    );

    b.ty(TypeDecl::new(TYPE_EVENT, "Event", 0).flags(FLAG_DEFAULT_CONSTRUCTOR));
    b.constructor(
        CombinatorDecl::new(PING, "ping", TYPE_EVENT, ExprDecl::ty(TYPE_EVENT))
            .arg(ArgDecl::new("id", ExprDecl::bare(prelude::TYPE_INT))),
    );
    b.constructor(
        CombinatorDecl::new(EVENT_OTHER, "eventOther", TYPE_EVENT, ExprDecl::ty(TYPE_EVENT))
            .arg(ArgDecl::new("value", ExprDecl::bare(prelude::TYPE_INT))),
    );

    put(&mut b, func::PUT_INT, "putInt", prelude::TYPE_INT, ExprDecl::bare(prelude::TYPE_INT));
    put(&mut b, func::PUT_LONG, "putLong", prelude::TYPE_LONG, ExprDecl::bare(prelude::TYPE_LONG));
    put(
        &mut b,
        func::PUT_DOUBLE,
        "putDouble",
        prelude::TYPE_DOUBLE,
        ExprDecl::bare(prelude::TYPE_DOUBLE),
    );
    put(
        &mut b,
        func::PUT_STRING,
        "putString",
        prelude::TYPE_STRING,
        ExprDecl::bare(prelude::TYPE_STRING),
    );
    put(
        &mut b,
        func::PUT_INTS,
        "putInts",
        prelude::TYPE_VECTOR,
        bare_apply(prelude::TYPE_VECTOR, vec![ExprDecl::bare(prelude::TYPE_INT)]),
    );
    put(
        &mut b,
        func::PUT_DICT,
        "putDict",
        prelude::TYPE_DICTIONARY,
        bare_apply(prelude::TYPE_DICTIONARY, vec![ExprDecl::bare(prelude::TYPE_INT)]),
    );
    put(&mut b, func::PUT_SHAPE, "putShape", TYPE_SHAPE, ExprDecl::ty(TYPE_SHAPE));
    put(&mut b, func::PUT_USER, "putUser", TYPE_USER, ExprDecl::ty(TYPE_USER));
    put(&mut b, func::PUT_PAIRS, "putPairs", TYPE_PAIRS, ExprDecl::ty(TYPE_PAIRS));
    put(
        &mut b,
        func::PUT_BOOL,
        "putBool",
        tl_engine::ids::TYPE_ID_BOOL,
        ExprDecl::ty(tl_engine::ids::TYPE_ID_BOOL),
    );
    put(
        &mut b,
        func::PUT_LONG_DICT,
        "putLongDict",
        prelude::TYPE_LONG_KEY_DICTIONARY,
        bare_apply(
            prelude::TYPE_LONG_KEY_DICTIONARY,
            vec![ExprDecl::bare(prelude::TYPE_STRING)],
        ),
    );

    put(
        &mut b,
        func::PUT_MAYBE,
        "putMaybe",
        prelude::TYPE_MAYBE,
        ExprDecl::apply(prelude::TYPE_MAYBE, vec![ExprDecl::bare(prelude::TYPE_INT)]),
    );

    put(
        &mut b,
        func::PUT_BARE_SHAPE,
        "putBareShape",
        TYPE_SHAPE,
        ExprDecl::bare(TYPE_SHAPE),
    );
    put(&mut b, func::PUT_EVENT, "putEvent", TYPE_EVENT, ExprDecl::ty(TYPE_EVENT));

    b.build().expect("fixture schema encodes")
}

/// Loads the fixture schema.
#[must_use]
pub fn schema() -> Schema {
    Schema::load(&schema_bytes(SchemaVersion::V3)).expect("fixture schema loads")
}

/// An engine over the fixture schema.
#[must_use]
pub fn engine() -> Engine {
    Engine::new(schema())
}

/// Concatenates little-endian words.
#[must_use]
pub fn words(ws: &[i32]) -> Vec<u8> {
    ws.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Stores `{"x": value}` with `function` and returns the argument bytes (function tag stripped).
pub fn store_arg(engine: &Engine, function: &str, value: Value) -> Result<Vec<u8>, SerializeError> {
    let request = engine.compile_and_store(Selector::Name(function), &Value::map([("x", value)]))?;
    Ok(request.bytes[4..].to_vec())
}

/// Stores `value` as the argument of `function`, replays the argument bytes as the response and
/// returns the fetched `result`.
pub fn echo(engine: &Engine, function: &str, value: Value) -> Result<Value, FetchError> {
    let request = engine
        .compile_and_store(Selector::Name(function), &Value::map([("x", value)]))
        .expect("argument stores");
    let fetched = engine.fetch_response(&request, &request.bytes[4..])?;
    Ok(fetched.get("result").cloned().unwrap_or_default())
}
