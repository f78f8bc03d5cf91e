//! Action templates and the grounding search.
//!
//! A template's preconditions are reordered once, at construction, so that
//! each parameter position owns the contiguous range of conditions that
//! become decidable when that parameter is bound. Grounding binds the actor
//! at position 0 and backtracks over the live ids of every later
//! parameter's entity type, checking only the range scheduled for the
//! position just bound.

use carri_model::{
    apply_update, eval_bool, eval_cost, Bindings, EvalContext, EvalError, Evaluate, Schema, State,
    Value,
};
use carri_syntax::{ActionDecl, CostExpr, Expr, ParamDecl, Update};
use smallvec::SmallVec;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Error applying a grounded action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("{action}: conflicting preconditions no longer hold")]
    Conflicting { action: String },

    #[error("{action}: {source}")]
    Eval {
        action: String,
        #[source]
        source: EvalError,
    },
}

/// Concrete parameter values of a grounded action, in slot order.
pub type Params = SmallVec<[i64; 4]>;

/// One instance of an entity type, eligible to act.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Actor {
    pub entity: usize,
    pub id: i64,
}

/// Conditions reordered by the parameter position at which they become
/// decidable.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    order: Vec<Expr>,
    ranges: Vec<Range<usize>>,
}

impl Schedule {
    /// Partition `conditions` over `positions` parameter positions.
    ///
    /// Parameters `0..=i` are bound to a sentinel before position `i` takes
    /// every pending condition that no longer depends on an unbound slot.
    /// Conditions still pending after the last position are kept there.
    pub fn build(conditions: &[Expr], positions: usize) -> Self {
        let positions = positions.max(1);
        let mut sentinel = Bindings::new();
        let mut pending: Vec<Expr> = conditions.to_vec();
        let mut order = Vec::with_capacity(conditions.len());
        let mut ranges = Vec::with_capacity(positions);

        for position in 0..positions {
            sentinel.bind(position, Value::int(0));
            let (ready, rest): (Vec<Expr>, Vec<Expr>) =
                pending.into_iter().partition(|c| c.is_applicable(&sentinel));
            let start = order.len();
            order.extend(ready);
            ranges.push(start..order.len());
            pending = rest;
        }

        if !pending.is_empty() {
            let start = ranges.last().map_or(0, |r| r.start);
            order.extend(pending);
            if let Some(last) = ranges.last_mut() {
                *last = start..order.len();
            }
        }

        Self { order, ranges }
    }

    /// Conditions newly decidable at `position`.
    pub fn at(&self, position: usize) -> &[Expr] {
        match self.ranges.get(position) {
            Some(range) => &self.order[range.clone()],
            None => &[],
        }
    }

    /// Every condition, in scheduled order.
    pub fn all(&self) -> &[Expr] {
        &self.order
    }

    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// A parameterized action, ready for grounding.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionTemplate {
    pub name: String,
    pub base_action: Option<String>,
    /// Parameters in slot order; slot 0 is the actor.
    pub params: Vec<ParamDecl>,
    pub preconditions: Schedule,
    pub conflicts: Schedule,
    pub effects: Vec<Update>,
    pub cost: CostExpr,
}

impl ActionTemplate {
    pub fn from_decl(decl: &ActionDecl) -> Self {
        let positions = decl.params.len();
        let preconditions = Schedule::build(&decl.preconditions, positions);
        let conflicts = Schedule::build(&decl.conflicts, positions);
        debug!(
            action = %decl.name,
            params = positions,
            preconditions = ?preconditions.ranges(),
            conflicts = ?conflicts.ranges(),
            "scheduled preconditions"
        );
        Self {
            name: decl.name.clone(),
            base_action: decl.base_action.clone(),
            params: decl.params.clone(),
            preconditions,
            conflicts,
            effects: decl.effects.clone(),
            cost: decl.cost.clone(),
        }
    }

    /// Entity type of the actor parameter.
    pub fn actor_entity(&self) -> Option<usize> {
        self.params.first().map(|p| p.entity)
    }

    /// Every grounded action of this template for one actor, in
    /// candidate order.
    ///
    /// Candidates whose scheduled conditions fail, or raise an evaluation
    /// error, are skipped. An actor of any type other than parameter 0's
    /// grounds nothing.
    pub fn ground(self: &Arc<Self>, schema: &Schema, state: &State, actor: Actor) -> Vec<Action> {
        if self.actor_entity().is_some_and(|entity| entity != actor.entity) {
            return Vec::new();
        }
        if !state.entity_exists(schema, actor.entity, actor.id) {
            return Vec::new();
        }

        let mut grounder = Grounder {
            template: self,
            schema,
            state,
            bindings: Bindings::new(),
            params: Params::new(),
            found: Vec::new(),
        };

        if self.params.is_empty() {
            if grounder.passes(0) {
                grounder.emit();
            }
            return grounder.found;
        }

        grounder.bind(0, actor.id);
        if grounder.passes(0) {
            grounder.search(1);
        }
        grounder.unbind(0);
        grounder.found
    }
}

struct Grounder<'a> {
    template: &'a Arc<ActionTemplate>,
    schema: &'a Schema,
    state: &'a State,
    bindings: Bindings,
    params: Params,
    found: Vec<Action>,
}

impl Grounder<'_> {
    fn search(&mut self, position: usize) {
        if position == self.template.params.len() {
            self.emit();
            return;
        }

        let state = self.state;
        let entity = self.template.params[position].entity;
        for id in state.entity_ids(self.schema, entity) {
            self.bind(position, id);
            if self.passes(position) {
                self.search(position + 1);
            }
            self.unbind(position);
        }
    }

    fn bind(&mut self, position: usize, id: i64) {
        self.bindings.bind(position, Value::int(id));
        self.params.push(id);
    }

    fn unbind(&mut self, position: usize) {
        self.bindings.unbind(position);
        self.params.pop();
    }

    fn passes(&self, position: usize) -> bool {
        let ctx = EvalContext::new(self.schema, self.state, &self.bindings);
        let scheduled = self
            .template
            .preconditions
            .at(position)
            .iter()
            .chain(self.template.conflicts.at(position));
        for condition in scheduled {
            match eval_bool(condition, &ctx) {
                Ok(true) => {}
                Ok(false) => {
                    trace!(
                        action = %self.template.name,
                        params = ?self.params,
                        position,
                        "candidate rejected"
                    );
                    return false;
                }
                Err(error) => {
                    trace!(
                        action = %self.template.name,
                        params = ?self.params,
                        position,
                        %error,
                        "candidate rejected on evaluation error"
                    );
                    return false;
                }
            }
        }
        true
    }

    fn emit(&mut self) {
        self.found.push(Action {
            template: Arc::clone(self.template),
            params: self.params.clone(),
        });
    }
}

/// A template with every parameter bound.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    template: Arc<ActionTemplate>,
    params: Params,
}

impl Action {
    pub fn new(template: Arc<ActionTemplate>, params: Params) -> Self {
        Self { template, params }
    }

    pub fn template(&self) -> &Arc<ActionTemplate> {
        &self.template
    }

    pub fn name(&self) -> &str {
        &self.template.name
    }

    pub fn params(&self) -> &[i64] {
        &self.params
    }

    /// The acting instance.
    pub fn actor(&self) -> Option<Actor> {
        Some(Actor {
            entity: self.template.actor_entity()?,
            id: *self.params.first()?,
        })
    }

    fn bindings(&self) -> Bindings {
        Bindings::with_params(&self.params)
    }

    /// True if every precondition and every conflicting precondition holds.
    pub fn validate(&self, schema: &Schema, state: &State) -> bool {
        let bindings = self.bindings();
        let ctx = EvalContext::new(schema, state, &bindings);
        all_hold(self.template.preconditions.all(), &ctx)
            && all_hold(self.template.conflicts.all(), &ctx)
    }

    /// True if every conflicting precondition still holds.
    ///
    /// Used after sibling actions of the same step have changed the state.
    pub fn revalidate(&self, schema: &Schema, state: &State) -> bool {
        let bindings = self.bindings();
        all_hold(
            self.template.conflicts.all(),
            &EvalContext::new(schema, state, &bindings),
        )
    }

    /// Apply the effects, last declared first, then evaluate the cost.
    ///
    /// Runs against a snapshot and commits it to `state` only on success.
    pub fn apply(&self, schema: &Schema, state: &mut State) -> Result<i64, ActionError> {
        if !self.revalidate(schema, state) {
            return Err(ActionError::Conflicting {
                action: self.to_string(),
            });
        }
        let mut next = state.snapshot();
        let mut bindings = self.bindings();
        for effect in self.template.effects.iter().rev() {
            apply_update(effect, schema, &mut next, &mut bindings).map_err(|e| self.error(e))?;
        }
        let cost = eval_cost(&self.template.cost, schema, &mut next, &mut bindings)
            .map_err(|e| self.error(e))?;
        *state = next;
        Ok(cost)
    }

    /// Cost of applying this action in `state`, without committing anything.
    pub fn cost(&self, schema: &Schema, state: &State) -> Result<i64, ActionError> {
        let mut scratch = state.snapshot();
        self.apply(schema, &mut scratch)
    }

    fn error(&self, source: EvalError) -> ActionError {
        ActionError::Eval {
            action: self.to_string(),
            source,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.template.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, ")")
    }
}

fn all_hold(conditions: &[Expr], ctx: &EvalContext) -> bool {
    conditions
        .iter()
        .all(|c| eval_bool(c, ctx).unwrap_or(false))
}
