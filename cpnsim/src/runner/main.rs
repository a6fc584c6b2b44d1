use derive_builder::Builder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{policy::SelectionPolicy, veto::VetoRegistry, Verdict};
use crate::{
    error::{CpnError, Result},
    exec::{self, EnabledPair},
    expr::Binding,
    net::{CpnNet, Marking, NetSnapshot, StepEvent, StepOutcome},
};

#[derive(Builder, Clone, Debug)]
pub struct SimulationConfig {
    #[builder(default = "100")]
    pub max_steps: usize,
    /// Offer only the enabled pairs of the most urgent priority to the policy.
    #[builder(default)]
    pub respect_priority: bool,
    /// Checked between steps.
    #[builder(setter(strip_option), default)]
    pub stop: Option<CancellationToken>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig { max_steps: 100, respect_priority: false, stop: None }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimulationState {
    Idle,
    Stepping,
    /// No transition is enabled; no further step is possible.
    Terminated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Terminated,
    StepLimit,
    Cancelled,
}

#[derive(Clone, Debug)]
pub struct SimulationReport {
    pub events: Vec<StepEvent>,
    pub stop_reason: StopReason,
}

impl SimulationReport {
    pub fn steps(&self) -> usize {
        self.events.len()
    }

    pub fn fired(&self) -> usize {
        self.events.iter().filter(|evt| evt.outcome.fired()).count()
    }
}

/// Token-game driver: one writer of the marking, one step at a time.
pub struct Simulator<P: SelectionPolicy> {
    net: CpnNet,
    marking: Marking,
    policy: P,
    vetoes: VetoRegistry,
    config: SimulationConfig,
    state: SimulationState,
    step: usize,
}

impl<P: SelectionPolicy> Simulator<P> {
    pub fn new(net: CpnNet, marking: Marking, policy: P, config: SimulationConfig) -> Self {
        Simulator {
            net,
            marking,
            policy,
            vetoes: VetoRegistry::default(),
            config,
            state: SimulationState::Idle,
            step: 0,
        }
    }

    pub fn with_vetoes(mut self, vetoes: VetoRegistry) -> Self {
        self.vetoes = vetoes;
        self
    }

    pub fn net(&self) -> &CpnNet {
        &self.net
    }

    pub fn marking(&self) -> &Marking {
        &self.marking
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    /// Number of steps performed so far.
    pub fn steps(&self) -> usize {
        self.step
    }

    pub fn snapshot(&self) -> NetSnapshot {
        self.net.snapshot(&self.marking)
    }

    /// Enabled pairs offered to the policy in the current marking.
    pub fn enabled(&self) -> Vec<EnabledPair> {
        let mut pairs = exec::enabled_pairs(&self.net, &self.marking);
        if self.config.respect_priority {
            let priority = |pair: &EnabledPair| {
                self.net.transition(pair.transition).map(|tr| tr.priority()).unwrap_or(u32::MAX)
            };
            if let Some(most_urgent) = pairs.iter().map(priority).min() {
                pairs.retain(|pair| priority(pair) == most_urgent);
            }
        }
        pairs
    }

    /// Enabled bindings of one transition, looked up by name.
    pub fn enabled_for(&self, transition_name: &str) -> Result<Vec<Binding>> {
        let (id, _) = self
            .net
            .transition_by_name(transition_name)
            .ok_or_else(|| CpnError::UnknownTransition(transition_name.to_string()))?;
        Ok(exec::enabled(&self.net, &self.marking, id))
    }

    /// Perform one step. Returns None once no transition is enabled.
    #[tracing::instrument(level = "debug", skip(self), fields(step = self.step + 1))]
    pub fn step(&mut self) -> Result<Option<StepEvent>> {
        if self.state == SimulationState::Terminated {
            return Ok(None);
        }
        if self.config.stop.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(CpnError::Cancelled());
        }
        self.state = SimulationState::Stepping;

        let pairs = self.enabled();
        if pairs.is_empty() {
            info!(steps = self.step, "No transition is enabled.");
            self.state = SimulationState::Terminated;
            return Ok(None);
        }
        let idx = match self.policy.select(&self.net, &pairs) {
            Some(idx) if idx < pairs.len() => idx,
            choice => {
                warn!(?choice, candidates = pairs.len(), "Invalid choice, using the first candidate.");
                0
            }
        };
        let Some(EnabledPair { transition, binding }) = pairs.into_iter().nth(idx) else {
            return Err(CpnError::InconsistentState(format!("No candidate at index {idx}")));
        };
        let transition_name = self
            .net
            .transition(transition)
            .map(|tr| tr.name().to_string())
            .ok_or_else(|| CpnError::InconsistentState(format!("Could not find transition '{}'", transition.0)))?;

        let outcome = match self.vetoes.review(&transition_name, &binding) {
            Verdict::Skip => StepOutcome::Skipped,
            Verdict::Proceed => match exec::fire(&self.net, transition, &binding, &self.marking) {
                Ok(next) => {
                    let changes = exec::place_changes(&self.net, transition, &self.marking, &next);
                    self.marking = next;
                    StepOutcome::Fired(changes)
                }
                Err(err @ CpnError::TypeViolation { .. }) => {
                    warn!(transition = transition_name.as_str(), %binding, %err, "Firing aborted.");
                    StepOutcome::Aborted(err.to_string())
                }
                Err(err) => return Err(err),
            },
        };
        self.step += 1;
        let event = StepEvent { step: self.step, transition, transition_name, binding, outcome };
        debug!("{}", event);
        Ok(Some(event))
    }

    /// Step until no transition is enabled, the step bound is reached or the
    /// stop signal fires.
    #[tracing::instrument(level = "info", skip(self), fields(max_steps = self.config.max_steps))]
    pub fn run(&mut self) -> Result<SimulationReport> {
        let mut events = Vec::new();
        let stop_reason = loop {
            if events.len() >= self.config.max_steps {
                break StopReason::StepLimit;
            }
            match self.step() {
                Ok(Some(event)) => events.push(event),
                Ok(None) => break StopReason::Terminated,
                Err(CpnError::Cancelled()) => break StopReason::Cancelled,
                Err(err) => return Err(err),
            }
        };
        let report = SimulationReport { events, stop_reason };
        info!(steps = report.steps(), fired = report.fired(), ?stop_reason, "Simulation stopped.");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::ModelRecords,
        net::{build, BuildOptions},
        runner::{FirstEnabled, Manual},
    };

    const MODEL: &str = r#"{
        "globbox": {
            "colsets": [{"name": "INT", "subtype": "int"}],
            "variables": [{"type": "INT", "names": ["x"]}]
        },
        "page": {
            "places": [
                {"place_id": "A", "text": "A", "type": "INT", "initmark": "1`1 ++ 1`2"},
                {"place_id": "B", "text": "B", "type": "INT"}
            ],
            "transitions": [
                {"transition_id": "Slow", "text": "Slow", "priority": "P_LOW"},
                {"transition_id": "Fast", "text": "Fast", "priority": "P_HIGH"}
            ],
            "arcs": [
                {"orientation": "PtoT", "transend": "Slow", "placeend": "A", "expression": "x"},
                {"orientation": "TtoP", "transend": "Slow", "placeend": "B", "expression": "x"},
                {"orientation": "PtoT", "transend": "Fast", "placeend": "A", "expression": "x"},
                {"orientation": "TtoP", "transend": "Fast", "placeend": "B", "expression": "x * 10"}
            ]
        }
    }"#;

    fn simulator<P: SelectionPolicy>(policy: P, config: SimulationConfig) -> Simulator<P> {
        let (net, marking) =
            build(&ModelRecords::from_json_str(MODEL).unwrap(), &BuildOptions::default()).unwrap();
        Simulator::new(net, marking, policy, config)
    }

    #[test]
    fn runs_until_terminated() {
        let mut sim = simulator(FirstEnabled, SimulationConfig::default());
        assert_eq!(sim.state(), SimulationState::Idle);
        let report = sim.run().unwrap();
        assert_eq!(report.stop_reason, StopReason::Terminated);
        assert_eq!(report.steps(), 2);
        assert_eq!(sim.state(), SimulationState::Terminated);
        assert_eq!(sim.marking().count(crate::net::PlaceId(1)), 2);
        assert!(sim.step().unwrap().is_none());
    }

    #[test]
    fn priorities_restrict_the_candidates() {
        let config = SimulationConfigBuilder::default().respect_priority(true).build().unwrap();
        let sim = simulator(FirstEnabled, config);
        let pairs = sim.enabled();
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|p| sim.net().transition(p.transition).unwrap().name() == "Fast"));
        let sim = simulator(FirstEnabled, SimulationConfig::default());
        assert_eq!(sim.enabled().len(), 4);
    }

    #[test]
    fn step_limit_and_cancellation() {
        let config = SimulationConfigBuilder::default().max_steps(1usize).build().unwrap();
        let report = simulator(FirstEnabled, config).run().unwrap();
        assert_eq!(report.stop_reason, StopReason::StepLimit);
        assert_eq!(report.steps(), 1);

        let stop = CancellationToken::new();
        stop.cancel();
        let config = SimulationConfigBuilder::default().stop(stop).build().unwrap();
        let mut sim = simulator(FirstEnabled, config);
        let report = sim.run().unwrap();
        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(sim.steps(), 0);
    }

    #[test]
    fn vetoed_steps_do_not_fire() {
        let mut vetoes = VetoRegistry::new();
        vetoes.register("Slow", |_: &str, _: &Binding| Verdict::Skip);
        let config = SimulationConfigBuilder::default().max_steps(3usize).build().unwrap();
        let mut sim = simulator(FirstEnabled, config).with_vetoes(vetoes);
        let before = sim.marking().clone();
        let report = sim.run().unwrap();
        // Slow is the first candidate and is always vetoed
        assert!(report.events.iter().all(|evt| evt.outcome == StepOutcome::Skipped));
        assert_eq!(sim.marking(), &before);
    }

    #[test]
    fn invalid_manual_choices_fall_back_to_the_first_candidate() {
        let policy = Manual::new(|_: &CpnNet, _: &[EnabledPair]| Some(99));
        let mut sim = simulator(policy, SimulationConfig::default());
        let event = sim.step().unwrap().unwrap();
        assert_eq!(event.transition_name, "Slow");
        assert_eq!(sim.enabled_for("Slow").unwrap().len(), 1);
        assert!(matches!(sim.enabled_for("Nope"), Err(CpnError::UnknownTransition(_))));
    }
}
