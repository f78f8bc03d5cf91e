//! Expression evaluator and update interpreter.
//!
//! AST nodes only carry parameter slots; the values live in a [`Bindings`]
//! environment that is passed explicitly to every call.

use crate::schema::Schema;
use crate::state::State;
use crate::value::Value;
use carri_syntax::{BinOp, CostExpr, Expr, UnaryOp, Update, ValueKind, VarRef};
use thiserror::Error;

/// Evaluation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("index {index} out of bounds for '{name}' with {length} values")]
    IndexOutOfBounds {
        name: String,
        index: i64,
        length: usize,
    },

    #[error("element {index} out of bounds for a collection of {length}")]
    ElementOutOfBounds { index: i64, length: usize },

    #[error("no live '{collection}' item with id {id}")]
    UnknownItem { collection: String, id: i64 },

    #[error("key not found: {0}")]
    KeyNotFound(i64),

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    Overflow,

    #[error("parameter slot {0} is not bound")]
    UnboundParameter(usize),

    #[error("'{0}' is constant")]
    ReadOnly(String),

    #[error("undefined storage for '{0}'")]
    UndefinedVariable(String),
}

pub type EvalResult<T> = Result<T, EvalError>;

/// Parameter and local values, indexed by scope slot.
///
/// Grows on demand; unbinding a slot leaves a hole.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    slots: Vec<Option<Value>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bindings with slot `i` holding `params[i]`.
    pub fn with_params(params: &[i64]) -> Self {
        Self {
            slots: params.iter().map(|p| Some(Value::Int(*p))).collect(),
        }
    }

    pub fn bind(&mut self, slot: usize, value: Value) {
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, None);
        }
        self.slots[slot] = Some(value);
    }

    pub fn unbind(&mut self, slot: usize) {
        if let Some(cell) = self.slots.get_mut(slot) {
            *cell = None;
        }
    }

    pub fn get(&self, slot: usize) -> Option<&Value> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    #[inline]
    pub fn is_bound(&self, slot: usize) -> bool {
        self.get(slot).is_some()
    }

}

/// Read-only evaluation context.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub schema: &'a Schema,
    pub state: &'a State,
    pub bindings: &'a Bindings,
}

impl<'a> EvalContext<'a> {
    pub fn new(schema: &'a Schema, state: &'a State, bindings: &'a Bindings) -> Self {
        Self {
            schema,
            state,
            bindings,
        }
    }
}

/// Evaluation methods on expressions.
pub trait Evaluate {
    fn evaluate(&self, schema: &Schema, state: &State, bindings: &Bindings) -> EvalResult<Value>;

    /// True iff every parameter this expression depends on is bound.
    fn is_applicable(&self, bindings: &Bindings) -> bool;
}

impl Evaluate for Expr {
    fn evaluate(&self, schema: &Schema, state: &State, bindings: &Bindings) -> EvalResult<Value> {
        eval(self, &EvalContext::new(schema, state, bindings))
    }

    fn is_applicable(&self, bindings: &Bindings) -> bool {
        self.applicable(&|slot| bindings.is_bound(slot))
    }
}

/// Evaluate an expression.
pub fn eval(expr: &Expr, ctx: &EvalContext) -> EvalResult<Value> {
    match expr {
        Expr::Int(n) => Ok(Value::int(*n)),
        Expr::Bool(b) => Ok(Value::bool(*b)),
        Expr::Entity { index, .. } => Ok(Value::int(*index as i64)),

        Expr::Param { slot, .. } => ctx
            .bindings
            .get(*slot)
            .cloned()
            .ok_or(EvalError::UnboundParameter(*slot)),

        // Literals keep their written order so `@` indexes by position.
        Expr::SetLit(elements) => elements
            .iter()
            .map(|e| eval(e, ctx))
            .collect::<EvalResult<Vec<_>>>()
            .map(Value::Seq),

        Expr::Read { var, name, index } => {
            let index = eval_int(index, ctx)?;
            read(ctx, *var, name, index)
        }

        Expr::Exists { entity, id, .. } => {
            let id = eval_int(id, ctx)?;
            Ok(Value::bool(ctx.state.entity_exists(ctx.schema, *entity, id)))
        }

        Expr::Unary { op, operand } => {
            let value = eval(operand, ctx)?;
            match op {
                UnaryOp::Not => Ok(Value::bool(!expect_bool(&value)?)),
                UnaryOp::Neg => expect_int(&value)?
                    .checked_neg()
                    .map(Value::int)
                    .ok_or(EvalError::Overflow),
            }
        }

        Expr::Binary { op, left, right } => eval_binary(*op, left, right, ctx),
    }
}

/// Evaluate an expression that must produce a boolean.
pub fn eval_bool(expr: &Expr, ctx: &EvalContext) -> EvalResult<bool> {
    expect_bool(&eval(expr, ctx)?)
}

/// Evaluate an expression that must produce an integer.
pub fn eval_int(expr: &Expr, ctx: &EvalContext) -> EvalResult<i64> {
    expect_int(&eval(expr, ctx)?)
}

fn eval_binary(op: BinOp, left: &Expr, right: &Expr, ctx: &EvalContext) -> EvalResult<Value> {
    // Short-circuit
    match op {
        BinOp::And => {
            return Ok(Value::bool(eval_bool(left, ctx)? && eval_bool(right, ctx)?));
        }
        BinOp::Or => {
            return Ok(Value::bool(eval_bool(left, ctx)? || eval_bool(right, ctx)?));
        }
        _ => {}
    }

    let l = eval(left, ctx)?;
    let r = eval(right, ctx)?;

    match op {
        BinOp::Eq => Ok(Value::bool(l == r)),
        BinOp::Ne => Ok(Value::bool(l != r)),
        BinOp::Lt => Ok(Value::bool(expect_int(&l)? < expect_int(&r)?)),
        BinOp::Le => Ok(Value::bool(expect_int(&l)? <= expect_int(&r)?)),
        BinOp::Gt => Ok(Value::bool(expect_int(&l)? > expect_int(&r)?)),
        BinOp::Ge => Ok(Value::bool(expect_int(&l)? >= expect_int(&r)?)),
        BinOp::In => contains(&r, &l).map(Value::bool),
        BinOp::Add => add(l, r),
        BinOp::Sub => sub(l, r),
        BinOp::Mul => expect_int(&l)?
            .checked_mul(expect_int(&r)?)
            .map(Value::int)
            .ok_or(EvalError::Overflow),
        BinOp::Div => {
            let divisor = expect_int(&r)?;
            if divisor == 0 {
                return Err(EvalError::DivisionByZero);
            }
            expect_int(&l)?
                .checked_div(divisor)
                .map(Value::int)
                .ok_or(EvalError::Overflow)
        }
        BinOp::Index => index(&l, &r),
        BinOp::And => Ok(Value::bool(expect_bool(&l)? && expect_bool(&r)?)),
        BinOp::Or => Ok(Value::bool(expect_bool(&l)? || expect_bool(&r)?)),
    }
}

fn add(l: Value, r: Value) -> EvalResult<Value> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => a.checked_add(b).map(Value::int).ok_or(EvalError::Overflow),
        (Value::Set(mut s), Value::Int(n)) => {
            s.insert(n);
            Ok(Value::Set(s))
        }
        (Value::Set(mut a), Value::Set(b)) => {
            a.extend(b);
            Ok(Value::Set(a))
        }
        (Value::Set(mut a), Value::Seq(b)) => {
            for element in &b {
                a.insert(expect_int(element)?);
            }
            Ok(Value::Set(a))
        }
        (l, _) => Err(type_mismatch("Int or Set", &l)),
    }
}

fn sub(l: Value, r: Value) -> EvalResult<Value> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => a.checked_sub(b).map(Value::int).ok_or(EvalError::Overflow),
        (Value::Set(mut s), Value::Int(n)) => {
            s.remove(&n);
            Ok(Value::Set(s))
        }
        (Value::Set(a), Value::Set(b)) => Ok(Value::Set(a.difference(&b).copied().collect())),
        (Value::Set(mut a), Value::Seq(b)) => {
            for element in &b {
                a.remove(&expect_int(element)?);
            }
            Ok(Value::Set(a))
        }
        (l, _) => Err(type_mismatch("Int or Set", &l)),
    }
}

/// `element ? collection`
fn contains(collection: &Value, element: &Value) -> EvalResult<bool> {
    match collection {
        Value::Set(s) => Ok(s.contains(&expect_int(element)?)),
        Value::Map(m) => Ok(m.contains_key(&expect_int(element)?)),
        Value::Seq(values) => Ok(values.contains(element)),
        other => Err(type_mismatch("Set", other)),
    }
}

/// `collection @ key`
fn index(collection: &Value, key: &Value) -> EvalResult<Value> {
    let key = expect_int(key)?;
    match collection {
        Value::Map(m) => m
            .get(&key)
            .copied()
            .map(Value::int)
            .ok_or(EvalError::KeyNotFound(key)),
        Value::Set(s) => usize::try_from(key)
            .ok()
            .and_then(|i| s.iter().nth(i))
            .copied()
            .map(Value::int)
            .ok_or(EvalError::ElementOutOfBounds {
                index: key,
                length: s.len(),
            }),
        Value::Seq(values) => usize::try_from(key)
            .ok()
            .and_then(|i| values.get(i))
            .cloned()
            .ok_or(EvalError::ElementOutOfBounds {
                index: key,
                length: values.len(),
            }),
        other => Err(type_mismatch("Map, Set or Seq", other)),
    }
}

fn read(ctx: &EvalContext, var: VarRef, name: &str, index: i64) -> EvalResult<Value> {
    match var {
        VarRef::Const(slot) => {
            let values = ctx
                .schema
                .constant(slot)
                .ok_or_else(|| EvalError::UndefinedVariable(name.to_string()))?;
            element(values, name, index).cloned()
        }
        VarRef::Var(slot) => {
            let values = ctx
                .state
                .var(slot)
                .ok_or_else(|| EvalError::UndefinedVariable(name.to_string()))?;
            element(values, name, index).cloned()
        }
        VarRef::Field {
            collection,
            field,
            constant,
        } => {
            let item = ctx
                .state
                .collection(collection)
                .and_then(|items| items.get(index))
                .ok_or_else(|| unknown_item(ctx.schema, collection, index))?;
            let fields: &[Value] = if constant { &item.consts } else { &item.vars };
            fields
                .get(field)
                .cloned()
                .ok_or_else(|| EvalError::UndefinedVariable(name.to_string()))
        }
    }
}

fn element<'v>(values: &'v [Value], name: &str, index: i64) -> EvalResult<&'v Value> {
    usize::try_from(index)
        .ok()
        .and_then(|i| values.get(i))
        .ok_or_else(|| EvalError::IndexOutOfBounds {
            name: name.to_string(),
            index,
            length: values.len(),
        })
}

fn unknown_item(schema: &Schema, collection: usize, id: i64) -> EvalError {
    EvalError::UnknownItem {
        collection: schema
            .collection(collection)
            .map(|c| c.name.clone())
            .unwrap_or_default(),
        id,
    }
}

// === Updates ===

/// Apply updates in declaration order.
pub fn apply_updates(
    updates: &[Update],
    schema: &Schema,
    state: &mut State,
    bindings: &mut Bindings,
) -> EvalResult<()> {
    for update in updates {
        apply_update(update, schema, state, bindings)?;
    }
    Ok(())
}

/// Apply one update.
///
/// `NewVal` locals stay bound afterwards so a following cost expression can
/// read them. `All` unbinds its iterator when the loop ends.
pub fn apply_update(
    update: &Update,
    schema: &Schema,
    state: &mut State,
    bindings: &mut Bindings,
) -> EvalResult<()> {
    match update {
        Update::SetIndexed {
            var,
            name,
            index,
            value,
        } => {
            let value = eval(value, &EvalContext::new(schema, state, bindings))?;
            write(schema, state, *var, name, *index, value)
        }

        Update::SetComputedIndex {
            var,
            name,
            index,
            value,
        } => {
            let ctx = EvalContext::new(schema, state, bindings);
            let index = eval_int(index, &ctx)?;
            let value = eval(value, &ctx)?;
            write(schema, state, *var, name, index, value)
        }

        Update::SetLocal { slot, value, .. } => {
            let value = eval(value, &EvalContext::new(schema, state, bindings))?;
            bindings.bind(*slot, value);
            Ok(())
        }

        Update::AddEntity {
            collection, fields, ..
        } => {
            let item = build_item(schema, state, bindings, *collection, fields)?;
            state
                .collection_mut(*collection)
                .ok_or_else(|| unknown_item(schema, *collection, -1))?
                .insert(item);
            Ok(())
        }

        Update::RemoveEntity { collection, id, .. } => {
            let id = eval_int(id, &EvalContext::new(schema, state, bindings))?;
            state
                .collection_mut(*collection)
                .and_then(|items| items.remove(id))
                .map(|_| ())
                .ok_or_else(|| unknown_item(schema, *collection, id))
        }

        Update::ReplaceEntity {
            collection,
            id,
            fields,
            ..
        } => {
            let id = eval_int(id, &EvalContext::new(schema, state, bindings))?;
            let item = build_item(schema, state, bindings, *collection, fields)?;
            state
                .collection_mut(*collection)
                .and_then(|items| items.replace(id, item))
                .map(|_| ())
                .ok_or_else(|| unknown_item(schema, *collection, id))
        }

        Update::BindParameter {
            slot, value, body, ..
        } => {
            let value = eval(value, &EvalContext::new(schema, state, bindings))?;
            bindings.bind(*slot, value);
            apply_updates(body, schema, state, bindings)
        }

        Update::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            let branch = if eval_bool(condition, &EvalContext::new(schema, state, bindings))? {
                then_branch
            } else {
                else_branch
            };
            apply_updates(branch, schema, state, bindings)
        }

        Update::ForAllEntities {
            slot,
            entity,
            filter,
            body,
            ..
        } => {
            // Iterate over the ids live at loop entry.
            let ids: Vec<i64> = state.entity_ids(schema, *entity).collect();
            for id in ids {
                if !state.entity_exists(schema, *entity, id) {
                    continue;
                }
                bindings.bind(*slot, Value::int(id));
                if let Some(filter) = filter {
                    if !eval_bool(filter, &EvalContext::new(schema, state, bindings))? {
                        continue;
                    }
                }
                apply_updates(body, schema, state, bindings)?;
            }
            bindings.unbind(*slot);
            Ok(())
        }

        Update::RepeatWhile { condition, body } => {
            while eval_bool(condition, &EvalContext::new(schema, state, bindings))? {
                apply_updates(body, schema, state, bindings)?;
            }
            Ok(())
        }
    }
}

/// Apply the cost updates, then evaluate the cost value.
pub fn eval_cost(
    cost: &CostExpr,
    schema: &Schema,
    state: &mut State,
    bindings: &mut Bindings,
) -> EvalResult<i64> {
    apply_updates(&cost.updates, schema, state, bindings)?;
    eval_int(&cost.value, &EvalContext::new(schema, state, bindings))
}

fn write(
    schema: &Schema,
    state: &mut State,
    var: VarRef,
    name: &str,
    index: i64,
    value: Value,
) -> EvalResult<()> {
    if var.is_constant() {
        return Err(EvalError::ReadOnly(name.to_string()));
    }
    if let Some(kind) = schema.kind_of(var) {
        check_kind(kind, &value)?;
    }
    match var {
        VarRef::Var(slot) => {
            let values = state
                .var_mut(slot)
                .ok_or_else(|| EvalError::UndefinedVariable(name.to_string()))?;
            let length = values.len();
            let cell = usize::try_from(index)
                .ok()
                .and_then(|i| values.get_mut(i))
                .ok_or_else(|| EvalError::IndexOutOfBounds {
                    name: name.to_string(),
                    index,
                    length,
                })?;
            *cell = value;
            Ok(())
        }
        VarRef::Field {
            collection, field, ..
        } => {
            let item = state
                .collection_mut(collection)
                .and_then(|items| items.get_mut(index))
                .ok_or_else(|| unknown_item(schema, collection, index))?;
            let cell = item
                .vars
                .get_mut(field)
                .ok_or_else(|| EvalError::UndefinedVariable(name.to_string()))?;
            *cell = value;
            Ok(())
        }
        VarRef::Const(_) => Err(EvalError::ReadOnly(name.to_string())),
    }
}

fn build_item(
    schema: &Schema,
    state: &State,
    bindings: &Bindings,
    collection: usize,
    fields: &[Expr],
) -> EvalResult<crate::state::Item> {
    let layout = schema
        .collection(collection)
        .ok_or_else(|| unknown_item(schema, collection, -1))?;
    let ctx = EvalContext::new(schema, state, bindings);
    let values = fields
        .iter()
        .map(|f| eval(f, &ctx))
        .collect::<EvalResult<Vec<_>>>()?;
    let row = layout.row(values).map_err(|field| EvalError::TypeMismatch {
        expected: kind_name(field.kind).to_string(),
        actual: format!("another kind for field '{}'", field.name),
    })?;
    Ok(row.into_item())
}

fn check_kind(kind: ValueKind, value: &Value) -> EvalResult<()> {
    if value.matches(kind) {
        Ok(())
    } else {
        Err(type_mismatch(kind_name(kind), value))
    }
}

fn kind_name(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Int => "Int",
        ValueKind::Bool => "Bool",
        ValueKind::Multy => "Set",
        ValueKind::Match => "Map",
    }
}

#[inline(always)]
pub fn expect_bool(val: &Value) -> EvalResult<bool> {
    val.as_bool().ok_or_else(|| type_mismatch("Bool", val))
}

#[inline(always)]
pub fn expect_int(val: &Value) -> EvalResult<i64> {
    val.as_int().ok_or_else(|| type_mismatch("Int", val))
}

pub(crate) fn type_mismatch(expected: &str, actual: &Value) -> EvalError {
    EvalError::TypeMismatch {
        expected: expected.to_string(),
        actual: actual.type_name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carri_syntax::{
        parse_cost, parse_domain, parse_expr, parse_problem, parse_updates, scan_blocks, Domain,
        Scope, SlotKind, SourceLine,
    };

    const DOMAIN: &str = "\
Start Domain:
Entities:
Vehicle, Location, Package
End Entities
Variables:
var charge INT - Vehicle
var location INT - Vehicle
const adjacent MULTY - Location
const distance MATCH - Location
var visited MULTY
items Package var package onEntity INT, const package destination INT
End Variables
End Domain
";

    const PROBLEM: &str = "\
Start Problem:
Vehicle: 2
Location: 3
charge: 5, 7
location: 0, 2
adjacent:
0. {1}
1. {0 2}
2. {1}
distance:
0. [1:4]
1. [0:4 2:3]
2. [1:3]
Package:
(0, 2)
(1, 0)
End Problem
";

    fn fixture() -> (Domain, Schema) {
        let domain = parse_domain(DOMAIN).unwrap();
        let problem = parse_problem(PROBLEM).unwrap();
        let schema = Schema::build(&domain, &problem).unwrap();
        (domain, schema)
    }

    fn scope(domain: &Domain) -> Scope {
        let vehicle = domain.symbols.lookup_entity("Vehicle").unwrap();
        let package = domain.symbols.lookup_entity("Package").unwrap();
        Scope::new()
            .extend("v", SlotKind::Entity(vehicle))
            .extend("p", SlotKind::Entity(package))
    }

    fn run(text: &str, params: &[i64]) -> EvalResult<Value> {
        let (domain, schema) = fixture();
        let expr = parse_expr(text, 1, 1, &domain.symbols, &scope(&domain)).unwrap();
        let state = schema.initial_state();
        expr.evaluate(&schema, &state, &Bindings::with_params(params))
    }

    fn updates(domain: &Domain, lines: &[&str]) -> Vec<Update> {
        let lines: Vec<SourceLine> = lines
            .iter()
            .enumerate()
            .map(|(i, t)| SourceLine::new(*t, i as u32 + 1, 1))
            .collect();
        let blocks = scan_blocks(&lines).unwrap();
        parse_updates(&blocks, &domain.symbols, &scope(domain))
            .unwrap()
            .0
    }

    #[test]
    fn test_arithmetic_and_logic() {
        assert_eq!(run("2 + 3 * 4", &[]).unwrap(), Value::int(14));
        assert_eq!(run("true and false", &[]).unwrap(), Value::bool(false));
        assert_eq!(run("7 / 2 - -1", &[]).unwrap(), Value::int(4));
        assert_eq!(run("not 1 = 2", &[]).unwrap(), Value::bool(true));
        assert_eq!(run("1 / 0", &[]).unwrap_err(), EvalError::DivisionByZero);
    }

    #[test]
    fn test_short_circuit_skips_errors() {
        assert_eq!(run("false and 1 / 0 = 1", &[]).unwrap(), Value::bool(false));
        assert_eq!(run("true or 1 / 0 = 1", &[]).unwrap(), Value::bool(true));
    }

    #[test]
    fn test_variable_reads() {
        assert_eq!(run("charge v", &[1]).unwrap(), Value::int(7));
        assert_eq!(run("charge 0 + charge 1", &[]).unwrap(), Value::int(12));
        assert_eq!(run("package destination p", &[0, 1]).unwrap(), Value::int(0));
        assert!(matches!(
            run("charge 5", &[]).unwrap_err(),
            EvalError::IndexOutOfBounds { index: 5, length: 2, .. }
        ));
        assert!(matches!(
            run("package onEntity p", &[0, 9]).unwrap_err(),
            EvalError::UnknownItem { id: 9, .. }
        ));
        assert_eq!(
            run("charge v", &[]).unwrap_err(),
            EvalError::UnboundParameter(0)
        );
    }

    #[test]
    fn test_containment() {
        assert_eq!(run("2 ? adjacent 1", &[]).unwrap(), Value::bool(true));
        assert_eq!(run("2 ? adjacent 0", &[]).unwrap(), Value::bool(false));
        assert_eq!(run("5 ? (1, 5, 9)", &[]).unwrap(), Value::bool(true));
        assert_eq!(run("0 ? distance 1", &[]).unwrap(), Value::bool(true));
    }

    #[test]
    fn test_indexing() {
        assert_eq!(run("distance 1 @ 2", &[]).unwrap(), Value::int(3));
        assert_eq!(run("distance 1 @ 1", &[]).unwrap_err(), EvalError::KeyNotFound(1));
        assert_eq!(run("(9, 5, 7) @ 0", &[]).unwrap(), Value::int(9));
        assert_eq!(run("(9, 5, 7) @ 1", &[]).unwrap(), Value::int(5));
        assert_eq!(run("(1, 1, 2) @ 2", &[]).unwrap(), Value::int(2));
        assert_eq!(
            run("(9, 5, 7) @ 3", &[]).unwrap_err(),
            EvalError::ElementOutOfBounds { index: 3, length: 3 }
        );
        assert_eq!(
            run("(true, false) @ 0", &[]).unwrap(),
            Value::bool(true)
        );
    }

    #[test]
    fn test_exists_and_entity_constant() {
        assert_eq!(run("Package exists 1", &[]).unwrap(), Value::bool(true));
        assert_eq!(run("Package exists 2", &[]).unwrap(), Value::bool(false));
        assert_eq!(run("Vehicle exists v", &[1]).unwrap(), Value::bool(true));
        assert_eq!(run("entity Package", &[]).unwrap(), Value::int(2));
    }

    #[test]
    fn test_set_arithmetic() {
        assert_eq!(run("adjacent 1 + 5", &[]).unwrap(), Value::set([0, 2, 5]));
        assert_eq!(run("adjacent 1 - 0", &[]).unwrap(), Value::set([2]));
        assert_eq!(
            run("adjacent 1 - adjacent 0", &[]).unwrap(),
            Value::set([0, 2])
        );
        assert_eq!(
            run("adjacent 1 + (7, 5, 7)", &[]).unwrap(),
            Value::set([0, 2, 5, 7])
        );
        assert_eq!(run("adjacent 1 - (0, 9)", &[]).unwrap(), Value::set([2]));
        assert!(run("adjacent 1 + (true, 1)", &[]).is_err());
    }

    #[test]
    fn test_assignments_check_kind_and_constness() {
        let (domain, schema) = fixture();
        let mut state = schema.initial_state();
        let mut bindings = Bindings::with_params(&[1, 0]);

        let ok = updates(&domain, &["charge v: charge v + 1", "visited: visited + 3"]);
        apply_updates(&ok, &schema, &mut state, &mut bindings).unwrap();
        assert_eq!(state.var(0).unwrap()[1], Value::int(8));
        assert_eq!(state.var(2).unwrap()[0], Value::set([3]));

        let wrong_kind = updates(&domain, &["charge v: true"]);
        assert!(matches!(
            apply_updates(&wrong_kind, &schema, &mut state, &mut bindings).unwrap_err(),
            EvalError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_item_updates() {
        let (domain, schema) = fixture();
        let mut state = schema.initial_state();
        let mut bindings = Bindings::with_params(&[1, 0]);

        let lines = updates(
            &domain,
            &[
                "Package add: (v, 1)",
                "package onEntity p: 2",
                "Package replace: 1 (0, 1)",
            ],
        );
        apply_updates(&lines, &schema, &mut state, &mut bindings).unwrap();
        let packages = state.collection(0).unwrap();
        assert_eq!(packages.len(), 3);
        assert_eq!(packages.get(2).unwrap().vars, vec![Value::int(1)]);
        assert_eq!(packages.get(0).unwrap().vars, vec![Value::int(2)]);
        assert_eq!(&*packages.get(1).unwrap().consts, &[Value::int(1)]);

        let remove = updates(&domain, &["Package remove: p"]);
        apply_updates(&remove, &schema, &mut state, &mut bindings).unwrap();
        assert!(!state.collection(0).unwrap().contains(0));
        assert!(matches!(
            apply_updates(&remove, &schema, &mut state, &mut bindings).unwrap_err(),
            EvalError::UnknownItem { id: 0, .. }
        ));
    }

    #[test]
    fn test_for_all_with_filter() {
        let (domain, schema) = fixture();
        let mut state = schema.initial_state();
        let mut bindings = Bindings::with_params(&[0, 0]);

        let lines = updates(
            &domain,
            &[
                "All (q - Package (package onEntity q = 1)):",
                "Package remove: q",
                "End",
            ],
        );
        apply_updates(&lines, &schema, &mut state, &mut bindings).unwrap();
        let ids: Vec<i64> = state.collection(0).unwrap().ids().copied().collect();
        assert_eq!(ids, vec![0]);
        assert!(!bindings.is_bound(2));
    }

    #[test]
    fn test_case_and_repeat() {
        let (domain, schema) = fixture();
        let mut state = schema.initial_state();
        let mut bindings = Bindings::with_params(&[0, 0]);

        let lines = updates(
            &domain,
            &[
                "Repeat (charge v < 10):",
                "charge v: charge v + 2",
                "End",
                "Case (charge v = 11):",
                "location v: 1",
                "Else:",
                "location v: 2",
                "End",
            ],
        );
        apply_updates(&lines, &schema, &mut state, &mut bindings).unwrap();
        assert_eq!(state.var(0).unwrap()[0], Value::int(11));
        assert_eq!(state.var(1).unwrap()[0], Value::int(1));
    }

    #[test]
    fn test_cost_reads_new_val_locals() {
        let (domain, schema) = fixture();
        let lines: Vec<SourceLine> = ["NewVal d: distance 1 @ 2", "d * 2"]
            .iter()
            .enumerate()
            .map(|(i, t)| SourceLine::new(*t, i as u32 + 1, 1))
            .collect();
        let blocks = scan_blocks(&lines).unwrap();
        let cost = parse_cost(&blocks, &domain.symbols, &scope(&domain)).unwrap();

        let mut state = schema.initial_state();
        let mut bindings = Bindings::with_params(&[0, 0]);
        assert_eq!(
            eval_cost(&cost, &schema, &mut state, &mut bindings).unwrap(),
            6
        );
    }

    #[test]
    fn test_constants_are_read_only() {
        let (domain, schema) = fixture();
        let mut state = schema.initial_state();
        let mut bindings = Bindings::new();
        // The parser refuses this line; built by hand to reach the interpreter.
        let update = Update::SetIndexed {
            var: domain.symbols.lookup_variable("package destination").unwrap(),
            name: "package destination".to_string(),
            index: 0,
            value: Expr::Int(1),
        };
        assert_eq!(
            apply_update(&update, &schema, &mut state, &mut bindings).unwrap_err(),
            EvalError::ReadOnly("package destination".to_string())
        );
    }

    #[test]
    fn test_bindings_grow_and_unbind() {
        let mut bindings = Bindings::new();
        bindings.bind(3, Value::int(1));
        assert!(bindings.is_bound(3));
        assert!(!bindings.is_bound(0));
        bindings.unbind(3);
        assert!(!bindings.is_bound(3));
        bindings.unbind(10);
    }
}
