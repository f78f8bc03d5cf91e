//! Step-by-step simulation of a loaded problem.

use crate::action::{Action, ActionError, ActionTemplate, Actor};
use crate::config::SimulationConfig;
use carri_model::{apply_update, eval_cost, Bindings, EvalError, Schema, State};
use carri_syntax::{Domain, StepDecl};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Simulation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    #[error("step '{name}': {source}")]
    Step {
        name: String,
        #[source]
        source: EvalError,
    },

    #[error("iteration {iteration} adds to unknown item collection {collection}")]
    UnknownCollection { iteration: usize, collection: usize },
}

/// Chooses at most one action for an actor from its legal actions.
pub trait Policy {
    /// Index into `legal` of the chosen action, or `None` to stay idle.
    fn choose(&mut self, actor: Actor, legal: &[Action]) -> Option<usize>;
}

/// Picks the first legal action, so grounding order is the priority.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstLegal;

impl Policy for FirstLegal {
    fn choose(&mut self, _actor: Actor, legal: &[Action]) -> Option<usize> {
        if legal.is_empty() {
            None
        } else {
            Some(0)
        }
    }
}

/// An action applied during a step, with its cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub action: Action,
    pub cost: i64,
}

/// An action refused during a step.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub action: Action,
    pub error: ActionError,
}

/// What happened during one joint step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub applied: Vec<Applied>,
    pub rejected: Vec<Rejected>,
    /// Summed cost of the environment steps.
    pub env_cost: i64,
}

impl Outcome {
    pub fn cost(&self) -> i64 {
        self.applied.iter().map(|a| a.cost).sum::<i64>() + self.env_cost
    }

    pub fn is_idle(&self) -> bool {
        self.applied.is_empty()
    }
}

/// A joint step folded onto a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: State,
    pub outcome: Outcome,
}

/// Totals of a [`Simulator::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub steps: usize,
    pub actions: usize,
    pub rejected: usize,
    pub iterations: usize,
    pub cost: i64,
}

/// Owns the templates and the current state of one simulation run.
pub struct Simulator {
    schema: Arc<Schema>,
    templates: Vec<Arc<ActionTemplate>>,
    env_steps: Vec<StepDecl>,
    iter_steps: Vec<StepDecl>,
    config: SimulationConfig,
    state: State,
    steps: usize,
    iteration: usize,
}

impl Simulator {
    pub fn new(schema: Arc<Schema>, domain: &Domain) -> Self {
        Self::with_config(schema, domain, SimulationConfig::default())
    }

    pub fn with_config(schema: Arc<Schema>, domain: &Domain, config: SimulationConfig) -> Self {
        let templates = domain
            .actions
            .iter()
            .map(|decl| Arc::new(ActionTemplate::from_decl(decl)))
            .collect();
        let state = schema.initial_state();
        Self {
            schema,
            templates,
            env_steps: domain.env_steps.clone(),
            iter_steps: domain.iter_steps.clone(),
            config,
            state,
            steps: 0,
            iteration: 0,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn templates(&self) -> &[Arc<ActionTemplate>] {
        &self.templates
    }

    pub fn template(&self, name: &str) -> Option<&Arc<ActionTemplate>> {
        self.templates.iter().find(|t| t.name == name)
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Steps taken so far.
    pub fn step_count(&self) -> usize {
        self.steps
    }

    /// Iteration batches loaded so far.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// True if `template` can be grounded for instances of `entity`.
    ///
    /// Only the declared actor type qualifies. A base role is a tag for
    /// planners; it does not lend the parent type's actions or storage.
    pub fn eligible(&self, template: &ActionTemplate, entity: usize) -> bool {
        template.actor_entity() == Some(entity)
    }

    /// Entity types that act in at least one template.
    pub fn actors(&self) -> Vec<usize> {
        (0..self.schema.entities().len())
            .filter(|&entity| self.templates.iter().any(|t| self.eligible(t, entity)))
            .collect()
    }

    /// Every live actor instance in `state`, by entity type then id.
    pub fn actor_instances(&self, state: &State) -> Vec<Actor> {
        self.actors()
            .into_iter()
            .flat_map(|entity| {
                state
                    .entity_ids(&self.schema, entity)
                    .map(move |id| Actor { entity, id })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Legal actions for one actor, in template declaration order.
    pub fn legal_actions(&self, state: &State, actor: Actor) -> Vec<Action> {
        self.templates
            .iter()
            .filter(|t| self.eligible(t, actor.entity))
            .flat_map(|t| t.ground(&self.schema, state, actor))
            .collect()
    }

    /// Fold `chosen` into one joint step on a snapshot of `state`, then run
    /// the environment steps.
    ///
    /// Each action is revalidated against the state left by the ones
    /// before it; refused actions are reported, not applied.
    pub fn transition(
        &self,
        state: &State,
        chosen: &[Action],
    ) -> Result<Transition, SimulationError> {
        let mut next = state.snapshot();
        let mut outcome = Outcome::default();

        for action in chosen {
            match action.apply(&self.schema, &mut next) {
                Ok(cost) => outcome.applied.push(Applied {
                    action: action.clone(),
                    cost,
                }),
                Err(error) => {
                    debug!(action = %action, %error, "action rejected");
                    outcome.rejected.push(Rejected {
                        action: action.clone(),
                        error,
                    });
                }
            }
        }

        for step in &self.env_steps {
            outcome.env_cost += run_step(&self.schema, &mut next, step)?;
        }

        Ok(Transition {
            state: next,
            outcome,
        })
    }

    /// Ground every actor, let `policy` choose, and advance the state.
    pub fn step(&mut self, policy: &mut dyn Policy) -> Result<Outcome, SimulationError> {
        let mut chosen = Vec::new();
        for actor in self.actor_instances(&self.state) {
            let mut legal = self.legal_actions(&self.state, actor);
            if let Some(index) = policy.choose(actor, &legal) {
                if index < legal.len() {
                    chosen.push(legal.swap_remove(index));
                }
            }
        }

        let Transition { state, outcome } = self.transition(&self.state, &chosen)?;
        self.state = state;
        self.steps += 1;
        info!(
            step = self.steps,
            applied = outcome.applied.len(),
            rejected = outcome.rejected.len(),
            cost = outcome.cost(),
            "simulated step"
        );
        Ok(outcome)
    }

    /// Load the next iteration batch and run the iteration steps.
    ///
    /// Returns `false` once every batch has been loaded.
    pub fn advance_iteration(&mut self) -> Result<bool, SimulationError> {
        let Some(batch) = self.schema.iteration(self.iteration) else {
            return Ok(false);
        };
        let iteration = self.iteration;
        let mut next = self.state.snapshot();
        for new_item in batch {
            next.collection_mut(new_item.collection)
                .ok_or(SimulationError::UnknownCollection {
                    iteration,
                    collection: new_item.collection,
                })?
                .insert(new_item.row.clone().into_item());
        }
        for step in &self.iter_steps {
            run_step(&self.schema, &mut next, step)?;
        }
        self.state = next;
        self.iteration += 1;
        info!(iteration = self.iteration, items = batch.len(), "loaded iteration");
        Ok(true)
    }

    /// Step until the configured limits are reached.
    pub fn run(&mut self, policy: &mut dyn Policy) -> Result<RunSummary, SimulationError> {
        let mut summary = RunSummary::default();
        loop {
            if self.config.max_steps > 0 && summary.steps >= self.config.max_steps {
                break;
            }
            let outcome = self.step(policy)?;
            summary.steps += 1;
            summary.actions += outcome.applied.len();
            summary.rejected += outcome.rejected.len();
            summary.cost += outcome.cost();

            let due = self.config.steps_per_iteration > 0
                && self.steps % self.config.steps_per_iteration == 0;
            if due || outcome.is_idle() {
                if self.advance_iteration()? {
                    summary.iterations += 1;
                } else if outcome.is_idle() && self.config.stop_when_idle {
                    break;
                }
            }
        }
        info!(
            steps = summary.steps,
            actions = summary.actions,
            cost = summary.cost,
            "simulation finished"
        );
        Ok(summary)
    }
}

/// Run one environment or iteration step in place and return its cost.
fn run_step(schema: &Schema, state: &mut State, step: &StepDecl) -> Result<i64, SimulationError> {
    let error = |source| SimulationError::Step {
        name: step.name.clone(),
        source,
    };
    let mut bindings = Bindings::new();
    for effect in step.effects.iter().rev() {
        apply_update(effect, schema, state, &mut bindings).map_err(error)?;
    }
    eval_cost(&step.cost, schema, state, &mut bindings).map_err(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use carri_model::Value;
    use carri_syntax::{parse_domain, parse_problem};

    const DOMAIN: &str = "\
Start Domain:
Entities:
Vehicle, Drone (Vehicle), Package
End Entities
Variables:
var charge INT - Vehicle
var clock INT
items Package var package onEntity INT, const package weight INT
End Variables
Actions:
Charge: v - Vehicle
Precs:
charge v < 3
Confs:
charge v < 3
Effects:
charge v: charge v + 1
Cost:
1
End Action
Load: v - Vehicle, p - Package
Precs:
package onEntity p = 9
Confs:
package onEntity p = 9
Effects:
package onEntity p: v
End Action
End Actions
EnvSteps:
Tick:
Effects:
clock: clock + 1
End Step
End EnvSteps
IterStep:
Reset:
Effects:
clock: 0
End Step
End IterStep
End Domain
";

    const PROBLEM: &str = "\
Start Problem:
Vehicle: 2
Drone: 1
charge: 2, 3
Package:
(9, 1)
*
Package:
(9, 2)
(9, 3)
End Problem
";

    fn simulator() -> Simulator {
        let domain = parse_domain(DOMAIN).unwrap();
        let problem = parse_problem(PROBLEM).unwrap();
        let schema = Arc::new(Schema::build(&domain, &problem).unwrap());
        Simulator::new(schema, &domain)
    }

    #[test]
    fn test_base_role_does_not_make_an_actor() {
        let sim = simulator();
        assert_eq!(sim.actors(), vec![0]);
        let instances = sim.actor_instances(sim.state());
        assert_eq!(
            instances,
            vec![Actor { entity: 0, id: 0 }, Actor { entity: 0, id: 1 }]
        );
    }

    #[test]
    fn test_base_role_actor_never_touches_parent_slots() {
        let sim = simulator();
        let drone = Actor { entity: 1, id: 0 };
        let state = sim.state();
        assert!(sim.legal_actions(state, drone).is_empty());

        let charge = sim.template("Charge").unwrap();
        assert!(!sim.eligible(charge, 1));
        assert!(charge.ground(sim.schema(), state, drone).is_empty());
        assert_eq!(state.var(0).unwrap(), &[Value::int(2), Value::int(3)]);
    }

    #[test]
    fn test_transition_revalidates_siblings() {
        let sim = simulator();
        let state = sim.state();
        let a = sim.legal_actions(state, Actor { entity: 0, id: 0 });
        let b = sim.legal_actions(state, Actor { entity: 0, id: 1 });
        let load_a = a.iter().find(|x| x.name() == "Load").unwrap().clone();
        let load_b = b.iter().find(|x| x.name() == "Load").unwrap().clone();

        let transition = sim.transition(state, &[load_a, load_b]).unwrap();
        assert_eq!(transition.outcome.applied.len(), 1);
        assert_eq!(transition.outcome.rejected.len(), 1);
        assert!(matches!(
            transition.outcome.rejected[0].error,
            ActionError::Conflicting { .. }
        ));
        // Environment step ran once.
        assert_eq!(transition.state.var(1).unwrap()[0], Value::int(1));
        // The input state is untouched.
        assert_eq!(sim.state().var(1).unwrap()[0], Value::int(0));
    }

    #[test]
    fn test_step_with_first_legal() {
        let mut sim = simulator();
        let outcome = sim.step(&mut FirstLegal).unwrap();
        // Vehicle 0 charges and vehicle 1, already at 3, loads the package.
        // The drone has no actions of its own.
        let names: Vec<String> = outcome.applied.iter().map(|a| a.action.to_string()).collect();
        assert_eq!(names, vec!["Charge(0)", "Load(1, 0)"]);
        assert!(outcome.rejected.is_empty());
        assert_eq!(outcome.cost(), 1);
        assert_eq!(sim.step_count(), 1);
    }

    #[test]
    fn test_iterations_add_items_and_run_iter_steps() {
        let mut sim = simulator();
        sim.step(&mut FirstLegal).unwrap();
        assert!(sim.advance_iteration().unwrap());
        assert_eq!(sim.state().collection(0).unwrap().len(), 3);
        assert_eq!(sim.state().collection(0).unwrap().next_id(), 3);
        assert_eq!(sim.state().var(1).unwrap()[0], Value::int(0));
        assert!(!sim.advance_iteration().unwrap());
        assert_eq!(sim.iteration(), 1);
    }

    #[test]
    fn test_run_stops_when_idle() {
        let mut sim = simulator();
        let summary = sim.run(&mut FirstLegal).unwrap();
        assert_eq!(summary.iterations, 1);
        assert!(summary.steps < sim.config().max_steps);
        assert!(sim
            .state()
            .collection(0)
            .unwrap()
            .iter()
            .all(|(_, item)| item.vars[0] != Value::int(9)));
    }
}
