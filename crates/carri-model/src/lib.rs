//! Storage layout, simulation state, and evaluator for CARRI problems.

pub mod eval;
pub mod schema;
pub mod state;
pub mod value;

pub use eval::{
    apply_update, apply_updates, eval, eval_bool, eval_cost, eval_int, Bindings, EvalContext,
    EvalError, EvalResult, Evaluate,
};
pub use schema::{
    CollectionLayout, EntityLayout, EntityStorage, FieldLayout, ItemRow, NewItem, Schema,
    SchemaError, SchemaResult, VarLayout,
};
pub use state::{EntityIds, Item, ItemCollection, State};
pub use value::Value;
