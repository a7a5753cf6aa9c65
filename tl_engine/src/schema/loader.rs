// Copyright 2026 the TL Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::AtomicUsize;

use hashbrown::HashMap;
use hashbrown::hash_map::Entry;
use once_cell::race::OnceBox;

use super::tags::{
    ArgFlagLayout, TLS_ARG_V2, TLS_ARRAY, TLS_COMBINATOR, TLS_COMBINATOR_LEFT,
    TLS_COMBINATOR_LEFT_BUILTIN, TLS_COMBINATOR_RIGHT_V2, TLS_EXPR_NAT, TLS_EXPR_TYPE,
    TLS_NAT_CONST, TLS_NAT_VAR, TLS_SCHEMA_V2, TLS_SCHEMA_V3, TLS_TYPE, TLS_TYPE_EXPR,
    TLS_TYPE_VAR,
};
use super::{Combinator, Schema, SchemaError, TlType};
use crate::expr::{Arg, CombinatorId, FLAG_NOCONS, FLAG_NOVAR, FLAG_OPT_FIELD, TypeExpr, TypeId};
use crate::wire::WireReader;

/// Deepest expression nesting the loader accepts.
const MAX_EXPR_DEPTH: u32 = 64;

/// Largest variable index a combinator may declare.
const MAX_COMBINATOR_VARS: i32 = 1 << 12;

const REQ_RESULT: &str = "ReqResult";

impl Schema {
    /// Loads a schema from its binary description.
    ///
    /// Nothing is published on failure: the whole graph is validated before a [`Schema`] is
    /// returned.
    pub fn load(bytes: &[u8]) -> Result<Self, SchemaError> {
        Loader {
            r: WireReader::new(bytes),
            layout: ArgFlagLayout::for_version(2),
            types: Vec::new(),
            declared: Vec::new(),
            type_by_wire_id: HashMap::new(),
        }
        .load()
    }
}

struct Loader<'a> {
    r: WireReader<'a>,
    layout: ArgFlagLayout,
    types: Vec<TlType>,
    declared: Vec<u32>,
    type_by_wire_id: HashMap<i32, TypeId>,
}

impl Loader<'_> {
    fn load(mut self) -> Result<Schema, SchemaError> {
        let version = match self.r.read_u32()? {
            TLS_SCHEMA_V2 => 2,
            TLS_SCHEMA_V3 => 3,
            other => return Err(SchemaError::BadVersionTag(other)),
        };
        self.layout = ArgFlagLayout::for_version(version);
        let schema_version = self.r.read_i32()?;
        let date = self.r.read_i32()?;

        let types_n = self.count()?;
        self.types.reserve(types_n.min(self.r.remaining_words()));
        for _ in 0..types_n {
            self.read_type()?;
        }

        let type_by_name: HashMap<Box<str>, TypeId> = self
            .types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), type_handle(i)))
            .collect();
        let req_result = type_by_name
            .get(REQ_RESULT)
            .copied()
            .filter(|&id| self.types.get(id.index()).is_some_and(|t| t.arity == 1))
            .ok_or(SchemaError::MissingReqResult)?;

        let mut combinators = Vec::new();
        let mut constructor_by_name = HashMap::new();
        let constructors_n = self.count()?;
        for _ in 0..constructors_n {
            let handle = combinator_handle(combinators.len());
            let (comb, owner_wire_id) = self.read_combinator(handle)?;
            let owner = self
                .type_by_wire_id
                .get(&owner_wire_id)
                .copied()
                .ok_or(SchemaError::UnknownType(owner_wire_id))?;
            if let Some(t) = self.types.get_mut(owner.index()) {
                t.constructors.push(handle);
            }
            constructor_by_name
                .entry(comb.name.clone())
                .or_insert(handle);
            combinators.push(Combinator {
                owner: Some(owner),
                ..comb
            });
        }

        let mut functions = Vec::new();
        let mut function_by_wire_id = HashMap::new();
        let mut function_by_name = HashMap::new();
        let functions_n = self.count()?;
        for _ in 0..functions_n {
            let handle = combinator_handle(combinators.len());
            let (comb, _result_type) = self.read_combinator(handle)?;
            match function_by_wire_id.entry(comb.wire_id) {
                Entry::Occupied(_) => return Err(SchemaError::DuplicateFunction(comb.wire_id)),
                Entry::Vacant(v) => {
                    v.insert(handle);
                }
            }
            function_by_name.insert(comb.name.clone(), handle);
            functions.push(handle);
            combinators.push(comb);
        }

        if !self.r.is_at_end() {
            return Err(SchemaError::TrailingData(self.r.remaining()));
        }

        for (t, &declared) in self.types.iter().zip(&self.declared) {
            if t.constructors.len() != declared as usize {
                return Err(SchemaError::ConstructorCountMismatch {
                    ty: t.name.clone(),
                    declared,
                    found: t.constructors.len(),
                });
            }
        }

        tracing::debug!(
            version,
            types = self.types.len(),
            constructors = constructors_n,
            functions = functions_n,
            "schema loaded"
        );

        Ok(Schema {
            version,
            schema_version,
            date,
            types: self.types,
            combinators,
            functions,
            type_by_wire_id: self.type_by_wire_id,
            type_by_name,
            function_by_wire_id,
            function_by_name,
            constructor_by_name,
            req_result,
            compile_count: AtomicUsize::new(0),
        })
    }

    fn count(&mut self) -> Result<usize, SchemaError> {
        let n = self.r.read_i32()?;
        usize::try_from(n).map_err(|_| SchemaError::NegativeCount(n))
    }

    fn expect_tag(&mut self, tag: u32, context: &'static str) -> Result<(), SchemaError> {
        let found = self.r.read_u32()?;
        if found == tag {
            Ok(())
        } else {
            Err(SchemaError::UnexpectedTag { context, found })
        }
    }

    fn read_name(&mut self) -> Result<Box<str>, SchemaError> {
        let raw = self.r.read_string()?;
        core::str::from_utf8(raw)
            .map(Box::from)
            .map_err(|_| SchemaError::InvalidName)
    }

    fn read_type(&mut self) -> Result<(), SchemaError> {
        self.expect_tag(TLS_TYPE, "type")?;
        let wire_id = self.r.read_i32()?;
        let name = self.read_name()?;
        let constructors_n = self.r.read_i32()?;
        let declared =
            u32::try_from(constructors_n).map_err(|_| SchemaError::NegativeCount(constructors_n))?;
        let mut flags = self.r.read_u32()?;
        let arity = self.r.read_i32()?;
        let arity = u32::try_from(arity).map_err(|_| SchemaError::NegativeCount(arity))?;
        let _reserved = self.r.read_i64()?;

        if matches!(&*name, "Maybe" | "Bool") {
            flags |= FLAG_NOCONS;
        }

        let handle = type_handle(self.types.len());
        match self.type_by_wire_id.entry(wire_id) {
            Entry::Occupied(_) => return Err(SchemaError::DuplicateType(wire_id)),
            Entry::Vacant(v) => {
                v.insert(handle);
            }
        }
        self.types.push(TlType {
            wire_id,
            name,
            arity,
            flags,
            constructors: Vec::new(),
        });
        self.declared.push(declared);
        Ok(())
    }

    /// Reads one combinator record; returns it with the type id from its header.
    fn read_combinator(
        &mut self,
        handle: CombinatorId,
    ) -> Result<(Combinator, i32), SchemaError> {
        self.expect_tag(TLS_COMBINATOR, "combinator")?;
        let wire_id = self.r.read_i32()?;
        let name = self.read_name()?;
        let type_wire_id = self.r.read_i32()?;

        let mut var_count = 0;
        let args = match self.r.read_u32()? {
            TLS_COMBINATOR_LEFT => self.read_args(&mut var_count, 0)?,
            TLS_COMBINATOR_LEFT_BUILTIN => Vec::new(),
            found => {
                return Err(SchemaError::UnexpectedTag {
                    context: "combinator left side",
                    found,
                });
            }
        };
        self.expect_tag(TLS_COMBINATOR_RIGHT_V2, "combinator right side")?;
        let result = self.read_type_expr(&mut var_count, 0)?;

        Ok((
            Combinator {
                wire_id,
                name,
                var_count,
                owner: None,
                args,
                result,
                handle,
                programs: OnceBox::new(),
            },
            type_wire_id,
        ))
    }

    fn read_args(&mut self, var_count: &mut u32, depth: u32) -> Result<Vec<Arg>, SchemaError> {
        let n = self.count()?;
        let mut args = Vec::with_capacity(n.min(self.r.remaining_words()));
        for _ in 0..n {
            self.expect_tag(TLS_ARG_V2, "argument")?;
            let name = self.read_name()?;
            let mut flags = self.r.read_u32()?;
            if flags & self.layout.opt_field != 0 {
                flags = (flags & !self.layout.opt_field) | FLAG_OPT_FIELD;
            }
            let var = if flags & self.layout.has_vars != 0 {
                flags &= !self.layout.has_vars;
                let raw = self.r.read_i32()?;
                Some(bind_var(raw, var_count)?)
            } else {
                None
            };
            let exist = if flags & FLAG_OPT_FIELD != 0 {
                let raw = self.r.read_i32()?;
                let exist_var = bind_var(raw, var_count)?;
                let bit = self.r.read_i32()?;
                let bit = u32::try_from(bit)
                    .ok()
                    .filter(|&b| b < 32)
                    .ok_or(SchemaError::BadVariable(bit))?;
                Some((exist_var, bit))
            } else {
                None
            };
            let ty = self.read_type_expr(var_count, depth + 1)?;
            if var.is_none() && exist.is_none() && ty.is_closed() {
                flags |= FLAG_NOVAR;
            }
            args.push(Arg {
                name,
                flags,
                var,
                exist,
                ty,
            });
        }
        Ok(args)
    }

    fn read_type_expr(&mut self, var_count: &mut u32, depth: u32) -> Result<TypeExpr, SchemaError> {
        if depth > MAX_EXPR_DEPTH {
            return Err(SchemaError::TooDeep);
        }
        match self.r.read_u32()? {
            TLS_TYPE_VAR => {
                let raw = self.r.read_i32()?;
                let var = bind_var(raw, var_count)?;
                let flags = self.r.read_u32()?;
                Ok(TypeExpr::TypeVar { var, flags })
            }
            TLS_TYPE_EXPR => {
                let wire_id = self.r.read_i32()?;
                let target = self
                    .type_by_wire_id
                    .get(&wire_id)
                    .copied()
                    .ok_or(SchemaError::UnknownType(wire_id))?;
                let mut flags = self.r.read_u32()? | FLAG_NOVAR;
                let found = self.r.read_i32()?;
                let t = self
                    .types
                    .get(target.index())
                    .ok_or(SchemaError::UnknownType(wire_id))?;
                if u32::try_from(found).ok() != Some(t.arity) {
                    return Err(SchemaError::ArityMismatch {
                        ty: t.name.clone(),
                        expected: t.arity,
                        found,
                    });
                }
                let arity = t.arity;
                let mut children = Vec::with_capacity((arity as usize).min(self.r.remaining_words()));
                for _ in 0..arity {
                    let child = self.read_expr(var_count, depth + 1)?;
                    if !child.is_closed() {
                        flags &= !FLAG_NOVAR;
                    }
                    children.push(child);
                }
                Ok(TypeExpr::Apply {
                    target,
                    flags,
                    children,
                })
            }
            TLS_ARRAY => {
                let multiplicity = self.read_nat_expr(var_count)?;
                let fields = self.read_args(var_count, depth + 1)?;
                let closed =
                    multiplicity.is_closed() && fields.iter().all(|f| f.flags & FLAG_NOVAR != 0);
                Ok(TypeExpr::Array {
                    multiplicity: Box::new(multiplicity),
                    fields,
                    flags: if closed { FLAG_NOVAR } else { 0 },
                })
            }
            found => Err(SchemaError::UnexpectedTag {
                context: "type expression",
                found,
            }),
        }
    }

    fn read_expr(&mut self, var_count: &mut u32, depth: u32) -> Result<TypeExpr, SchemaError> {
        match self.r.read_u32()? {
            TLS_EXPR_NAT => self.read_nat_expr(var_count),
            TLS_EXPR_TYPE => self.read_type_expr(var_count, depth),
            found => Err(SchemaError::UnexpectedTag {
                context: "expression",
                found,
            }),
        }
    }

    fn read_nat_expr(&mut self, var_count: &mut u32) -> Result<TypeExpr, SchemaError> {
        match self.r.read_u32()? {
            TLS_NAT_CONST => Ok(TypeExpr::NatConst(self.r.read_i32()?)),
            TLS_NAT_VAR => {
                let diff = self.r.read_i32()?;
                let raw = self.r.read_i32()?;
                Ok(TypeExpr::NatVar {
                    var: bind_var(raw, var_count)?,
                    diff,
                })
            }
            found => Err(SchemaError::UnexpectedTag {
                context: "natural-number expression",
                found,
            }),
        }
    }
}

/// Validates a variable index and raises the combinator's slot count to cover it.
fn bind_var(raw: i32, var_count: &mut u32) -> Result<u32, SchemaError> {
    if !(0..MAX_COMBINATOR_VARS).contains(&raw) {
        return Err(SchemaError::BadVariable(raw));
    }
    let var = raw.unsigned_abs();
    *var_count = (*var_count).max(var + 1);
    Ok(var)
}

fn type_handle(index: usize) -> TypeId {
    TypeId(u32::try_from(index).unwrap_or(u32::MAX))
}

fn combinator_handle(index: usize) -> CombinatorId {
    CombinatorId(u32::try_from(index).unwrap_or(u32::MAX))
}
