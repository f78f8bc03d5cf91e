//! Abstract syntax tree for CARRI domains and problems.
//!
//! Names are resolved while parsing: variable reads carry a [`VarRef`] into
//! the storage layout, parameters carry the slot they occupy in a binding
//! environment, and entity references carry the entity type index.

use std::collections::BTreeSet;

/// Resolved reference to a variable's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarRef {
    /// Constant variable (slot in the constant table).
    Const(usize),
    /// Mutable variable (slot in the state's variable arrays).
    Var(usize),
    /// Field of a dynamic item collection.
    Field {
        collection: usize,
        /// Index within the constant or mutable field group.
        field: usize,
        constant: bool,
    },
}

impl VarRef {
    /// True if writes to this reference are rejected.
    pub fn is_constant(&self) -> bool {
        match self {
            VarRef::Const(_) => true,
            VarRef::Var(_) => false,
            VarRef::Field { constant, .. } => *constant,
        }
    }
}

/// Declared kind of a variable or item field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `INT`
    Int,
    /// `BOOL`
    Bool,
    /// `MULTY` (set of integers)
    Multy,
    /// `MATCH` (integer to integer map)
    Match,
}

impl ValueKind {
    /// Parse a kind keyword (`INT`, `BOOL`, `MULTY`, `MATCH`).
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "INT" => Some(ValueKind::Int),
            "BOOL" => Some(ValueKind::Bool),
            "MULTY" => Some(ValueKind::Multy),
            "MATCH" => Some(ValueKind::Match),
            _ => None,
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `not`
    Not,
    /// `-`
    Neg,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    /// `=` or `==`
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// `?` containment
    In,
    Add,
    Sub,
    Mul,
    Div,
    /// `@` indexing
    Index,
}

impl BinOp {
    /// Binding power for precedence climbing. `Index` is parsed as a postfix.
    pub fn precedence(&self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Eq
            | BinOp::Ne
            | BinOp::Lt
            | BinOp::Le
            | BinOp::Gt
            | BinOp::Ge
            | BinOp::In => 4,
            BinOp::Add | BinOp::Sub => 5,
            BinOp::Mul | BinOp::Div => 6,
            BinOp::Index => 8,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Or => "or",
            BinOp::And => "and",
            BinOp::Eq => "=",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::In => "?",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Index => "@",
        }
    }
}

/// Precedence of the comparison operators; `not` parses its operand here.
pub const COMPARISON_PRECEDENCE: u8 = 4;

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Integer literal.
    Int(i64),
    /// Boolean literal.
    Bool(bool),
    /// `(a, b, c)` literal, evaluates to a set.
    SetLit(Vec<Expr>),
    /// Parameter or local bound in the evaluation environment.
    Param { slot: usize, name: String },
    /// Read of a variable at a computed index (0 when no index is written).
    Read {
        var: VarRef,
        name: String,
        index: Box<Expr>,
    },
    /// `<Entity> exists <id>`
    Exists {
        entity: usize,
        name: String,
        id: Box<Expr>,
    },
    /// `entity <Name>`: the entity type index as a constant.
    Entity { index: usize, name: String },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    /// True iff every parameter slot this expression depends on is bound.
    ///
    /// This says nothing about the truth of the expression; it decides
    /// whether the expression can be evaluated yet.
    pub fn applicable<F: Fn(usize) -> bool>(&self, is_bound: &F) -> bool {
        match self {
            Expr::Int(_) | Expr::Bool(_) | Expr::Entity { .. } => true,
            Expr::Param { slot, .. } => is_bound(*slot),
            Expr::SetLit(elements) => elements.iter().all(|e| e.applicable(is_bound)),
            Expr::Read { index, .. } => index.applicable(is_bound),
            Expr::Exists { id, .. } => id.applicable(is_bound),
            Expr::Unary { operand, .. } => operand.applicable(is_bound),
            Expr::Binary { left, right, .. } => {
                left.applicable(is_bound) && right.applicable(is_bound)
            }
        }
    }

    /// Collect every parameter slot referenced by this expression.
    pub fn collect_params(&self, out: &mut BTreeSet<usize>) {
        match self {
            Expr::Int(_) | Expr::Bool(_) | Expr::Entity { .. } => {}
            Expr::Param { slot, .. } => {
                out.insert(*slot);
            }
            Expr::SetLit(elements) => {
                for e in elements {
                    e.collect_params(out);
                }
            }
            Expr::Read { index, .. } => index.collect_params(out),
            Expr::Exists { id, .. } => id.collect_params(out),
            Expr::Unary { operand, .. } => operand.collect_params(out),
            Expr::Binary { left, right, .. } => {
                left.collect_params(out);
                right.collect_params(out);
            }
        }
    }

    pub fn params(&self) -> BTreeSet<usize> {
        let mut out = BTreeSet::new();
        self.collect_params(&mut out);
        out
    }
}

/// A state update (one effect line or block).
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// `<var> <const index>: <value>`
    SetIndexed {
        var: VarRef,
        name: String,
        index: i64,
        value: Expr,
    },
    /// `<var> <index expr>: <value>`
    SetComputedIndex {
        var: VarRef,
        name: String,
        index: Expr,
        value: Expr,
    },
    /// `<local>: <value>` where the local was introduced by `NewVal`.
    SetLocal {
        slot: usize,
        name: String,
        value: Expr,
    },
    /// `<Entity> add: (<field>, ...)`
    AddEntity {
        entity: usize,
        collection: usize,
        fields: Vec<Expr>,
    },
    /// `<Entity> remove: <id>`
    RemoveEntity {
        entity: usize,
        collection: usize,
        id: Expr,
    },
    /// `<Entity> replace: <id> (<field>, ...)`
    ReplaceEntity {
        entity: usize,
        collection: usize,
        id: Expr,
        fields: Vec<Expr>,
    },
    /// `NewVal <name>: <value>` followed by the rest of its block.
    BindParameter {
        slot: usize,
        name: String,
        value: Expr,
        body: Vec<Update>,
    },
    /// `Case (<cond>): ... Else: ... End`
    Conditional {
        condition: Expr,
        then_branch: Vec<Update>,
        else_branch: Vec<Update>,
    },
    /// `All (<name> - <Entity>(<filter>)): ... End`
    ForAllEntities {
        slot: usize,
        name: String,
        entity: usize,
        filter: Option<Expr>,
        body: Vec<Update>,
    },
    /// `Repeat (<cond>): ... End`. Not bounded by the engine.
    RepeatWhile { condition: Expr, body: Vec<Update> },
}

/// Cost of an action: updates run in order, then the value is evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct CostExpr {
    pub updates: Vec<Update>,
    pub value: Expr,
}

impl CostExpr {
    /// The cost of an empty `Cost:` section.
    pub fn zero() -> Self {
        Self {
            updates: Vec::new(),
            value: Expr::Int(0),
        }
    }
}

impl Default for CostExpr {
    fn default() -> Self {
        Self::zero()
    }
}

/// `Name` or `Name (BaseRole)` in the `Entities:` section.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDecl {
    pub name: String,
    pub index: usize,
    pub base_role: Option<String>,
    /// Item collection index when the entity is dynamic.
    pub collection: Option<usize>,
    pub line: u32,
}

/// `const|var <Name> <KIND> - <EntityType> (role)`
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub kind: ValueKind,
    pub constant: bool,
    /// Owning entity type; `None` for a single global value.
    pub owner: Option<usize>,
    pub role: Option<String>,
    /// Slot in the constant or mutable table.
    pub slot: usize,
    pub line: u32,
}

/// One typed field of an item collection.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub kind: ValueKind,
    pub constant: bool,
    /// Index within the constant or mutable field group.
    pub slot: usize,
}

/// `items <Entity> var|const <field> <KIND>, ...`
#[derive(Debug, Clone, PartialEq)]
pub struct ItemsDecl {
    pub entity: usize,
    pub collection: usize,
    /// Fields in declaration order. The first is the on-entity relation.
    pub fields: Vec<FieldDecl>,
    pub line: u32,
}

impl ItemsDecl {
    pub fn const_field_count(&self) -> usize {
        self.fields.iter().filter(|f| f.constant).count()
    }

    pub fn var_field_count(&self) -> usize {
        self.fields.iter().filter(|f| !f.constant).count()
    }
}

/// An action parameter: `<name> - <EntityType>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    pub entity: usize,
}

/// An action, with inheritance already flattened.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDecl {
    pub name: String,
    /// Base-action tag used by planners outside the core.
    pub base_action: Option<String>,
    /// Parent action this one inherited from.
    pub parent: Option<String>,
    /// Parameters in slot order; slot 0 is the actor.
    pub params: Vec<ParamDecl>,
    pub preconditions: Vec<Expr>,
    pub conflicts: Vec<Expr>,
    pub effects: Vec<Update>,
    pub cost: CostExpr,
    pub line: u32,
}

/// An `EnvSteps:` or `IterStep:` block.
#[derive(Debug, Clone, PartialEq)]
pub struct StepDecl {
    pub name: String,
    pub effects: Vec<Update>,
    pub cost: CostExpr,
    pub line: u32,
}

/// A parsed domain file.
#[derive(Debug, Clone)]
pub struct Domain {
    pub symbols: crate::symbols::SymbolTable,
    pub variables: Vec<VarDecl>,
    pub items: Vec<ItemsDecl>,
    pub actions: Vec<ActionDecl>,
    pub env_steps: Vec<StepDecl>,
    pub iter_steps: Vec<StepDecl>,
}

impl Domain {
    pub fn entities(&self) -> &[EntityDecl] {
        self.symbols.entities()
    }

    pub fn action(&self, name: &str) -> Option<&ActionDecl> {
        self.actions.iter().find(|a| a.name == name)
    }
}

/// A literal value in a problem file.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Bool(bool),
    /// `{1 2 3}`
    Set(Vec<i64>),
    /// `[1:4 2:5]`
    Map(Vec<(i64, i64)>),
    /// `(a, b)` item row
    Tuple(Vec<Literal>),
}

/// One initial value; `index` is set for `k. value` lines.
#[derive(Debug, Clone, PartialEq)]
pub struct InitValue {
    pub index: Option<usize>,
    pub value: Literal,
    pub line: u32,
}

/// `Name: values` in a problem file. The name is an entity type
/// (cardinality or item rows) or a variable.
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemEntry {
    pub name: String,
    pub values: Vec<InitValue>,
    pub line: u32,
}

/// A parsed problem file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Problem {
    /// Initial values.
    pub initial: Vec<ProblemEntry>,
    /// Iteration batches separated by `*`; items only.
    pub iterations: Vec<Vec<ProblemEntry>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(slot: usize) -> Expr {
        Expr::Param {
            slot,
            name: format!("p{}", slot),
        }
    }

    #[test]
    fn test_applicable_tracks_transitive_params() {
        let expr = Expr::Binary {
            op: BinOp::Eq,
            left: Box::new(Expr::Read {
                var: VarRef::Field {
                    collection: 0,
                    field: 0,
                    constant: false,
                },
                name: "package onEntity".to_string(),
                index: Box::new(param(1)),
            }),
            right: Box::new(param(0)),
        };
        assert!(!expr.applicable(&|slot| slot == 0));
        assert!(!expr.applicable(&|slot| slot == 1));
        assert!(expr.applicable(&|slot| slot <= 1));
        assert_eq!(expr.params().into_iter().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_constants_are_always_applicable() {
        let expr = Expr::Binary {
            op: BinOp::Add,
            left: Box::new(Expr::Int(2)),
            right: Box::new(Expr::Entity {
                index: 1,
                name: "Location".to_string(),
            }),
        };
        assert!(expr.applicable(&|_| false));
        assert!(expr.params().is_empty());
    }

    #[test]
    fn test_kind_keywords() {
        assert_eq!(ValueKind::from_keyword("MULTY"), Some(ValueKind::Multy));
        assert_eq!(ValueKind::from_keyword("int"), None);
    }
}
