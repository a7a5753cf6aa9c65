// Copyright 2026 the TL Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Record tags of the binary schema format.

/// Schema header, version 2 argument flag layout.
pub const TLS_SCHEMA_V2: u32 = 0x3a2f_9be2;
/// Schema header, version 3 argument flag layout.
pub const TLS_SCHEMA_V3: u32 = 0xe4a8_604b;
/// Type record.
pub const TLS_TYPE: u32 = 0x12eb_4386;
/// Combinator record.
pub const TLS_COMBINATOR: u32 = 0x5c0a_1ed5;
/// Left-hand side of a built-in combinator (no argument list follows).
pub const TLS_COMBINATOR_LEFT_BUILTIN: u32 = 0xcd21_1f63;
/// Left-hand side with an argument list.
pub const TLS_COMBINATOR_LEFT: u32 = 0x4c12_c6d9;
/// Right-hand side; the result type expression follows.
pub const TLS_COMBINATOR_RIGHT_V2: u32 = 0x2c06_4372;
/// Argument record.
pub const TLS_ARG_V2: u32 = 0x29df_e61b;
/// Expression wrapper around a type expression.
pub const TLS_EXPR_TYPE: u32 = 0xecc9_da78;
/// Expression wrapper around a natural-number expression.
pub const TLS_EXPR_NAT: u32 = 0xdcb4_9bd8;
/// Natural-number constant.
pub const TLS_NAT_CONST: u32 = 0xdcb4_9bd8;
/// Natural-number variable.
pub const TLS_NAT_VAR: u32 = 0x4e8a_14f0;
/// Type variable.
pub const TLS_TYPE_VAR: u32 = 0x0142_ceae;
/// Repeated tuple.
pub const TLS_ARRAY: u32 = 0xd9fb_20de;
/// Type application.
pub const TLS_TYPE_EXPR: u32 = 0xc186_3d08;

/// Argument flag bits that differ between schema versions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct ArgFlagLayout {
    pub(crate) opt_field: u32,
    pub(crate) has_vars: u32,
}

impl ArgFlagLayout {
    pub(crate) const fn for_version(version: u32) -> Self {
        let opt_field = if version >= 3 { 4 } else { 2 };
        Self {
            opt_field,
            has_vars: opt_field ^ 6,
        }
    }
}
