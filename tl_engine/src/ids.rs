// Copyright 2026 the TL Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Well-known wire magics.
//!
//! Magics are compared as the signed 32-bit words that appear on the wire.

/// Type id of `#`, the natural-number type that variable-binding arguments use.
pub const ID_VAR_NUM: i32 = 0x7065_9eff_u32 as i32;
/// Type id of `Type`, the kind of type-variable arguments.
pub const ID_VAR_TYPE: i32 = 0x2cec_f817_u32 as i32;

/// `int ? = Int`.
pub const ID_INT: i32 = 0xa850_9bda_u32 as i32;
/// `long ? = Long`.
pub const ID_LONG: i32 = 0x2207_6cba_u32 as i32;
/// `double ? = Double`.
pub const ID_DOUBLE: i32 = 0x2210_c154_u32 as i32;
/// `string ? = String`.
pub const ID_STRING: i32 = 0xb528_6e24_u32 as i32;
/// `vector {t:Type} # [t] = Vector t`.
pub const ID_VECTOR: i32 = 0x1cb5_c415_u32 as i32;
/// `dictionary {t:Type} %(Vector %(DictionaryField t)) = Dictionary t`.
pub const ID_DICTIONARY: i32 = 0x1f4c_618f_u32 as i32;
/// `intKeyDictionary {t:Type} ... = IntKeyDictionary t`.
pub const ID_INT_KEY_DICTIONARY: i32 = 0x07ba_fc42_u32 as i32;
/// `longKeyDictionary {t:Type} ... = LongKeyDictionary t`.
pub const ID_LONG_KEY_DICTIONARY: i32 = 0xb424_d8f1_u32 as i32;
/// `maybeTrue {t:Type} value:t = Maybe t`.
pub const ID_MAYBE_TRUE: i32 = 0x3f9c_8ef8_u32 as i32;
/// `maybeFalse {t:Type} = Maybe t`.
pub const ID_MAYBE_FALSE: i32 = 0x2793_0a7b_u32 as i32;
/// `boolFalse = Bool`.
pub const ID_BOOL_FALSE: i32 = 0xbc79_9737_u32 as i32;
/// `boolTrue = Bool`.
pub const ID_BOOL_TRUE: i32 = 0x9972_75b5_u32 as i32;

/// Type id of `Bool`.
pub const TYPE_ID_BOOL: i32 = 0x250b_e282_u32 as i32;

/// Reserved response tag: the call failed and an error envelope follows.
pub const RPC_REQ_ERROR: i32 = 0x7ae4_32f5_u32 as i32;

/// Conventional error codes reported alongside locally detected failures.
pub mod error_code {
    /// Malformed request or response data.
    pub const SYNTAX: i32 = -1000;
    /// A response decoded completely but bytes were left over.
    pub const EXTRA_DATA: i32 = -1001;
    /// Response does not belong to the request it was matched with.
    pub const WRONG_QUERY_ID: i32 = -1003;
    /// The requested function is not in the schema.
    pub const UNKNOWN_FUNCTION_ID: i32 = -2000;
    /// The engine itself is misconfigured.
    pub const INTERNAL: i32 = -3000;
}
