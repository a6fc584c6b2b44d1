use std::collections::HashMap;

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::trace;

use crate::expr::Binding;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Proceed,
    /// The step performs no firing.
    Skip,
}

/// Reviews a chosen (transition, binding) pair before it fires.
pub trait VetoHook {
    fn review(&mut self, transition: &str, binding: &Binding) -> Verdict;
}

impl<F> VetoHook for F
where
    F: FnMut(&str, &Binding) -> Verdict,
{
    fn review(&mut self, transition: &str, binding: &Binding) -> Verdict {
        self(transition, binding)
    }
}

/// Veto hooks keyed by transition name. Transitions without a hook always
/// proceed.
#[derive(Default)]
pub struct VetoRegistry {
    hooks: HashMap<String, Box<dyn VetoHook + Send>>,
}

impl VetoRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H: VetoHook + Send + 'static>(&mut self, transition_name: &str, hook: H) {
        self.hooks.insert(transition_name.into(), Box::new(hook));
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn review(&mut self, transition: &str, binding: &Binding) -> Verdict {
        match self.hooks.get_mut(transition) {
            Some(hook) => {
                let verdict = hook.review(transition, binding);
                trace!(transition, ?verdict, "Veto hook answered.");
                verdict
            }
            None => Verdict::Proceed,
        }
    }
}

/// Proceeds with the given probability, skips otherwise. Models
/// probabilistic protocol outcomes.
#[derive(Clone, Debug)]
pub struct CoinFlip {
    rng: StdRng,
    probability: f64,
}

impl CoinFlip {
    pub fn new(seed: u64, probability: f64) -> Self {
        // NaN never proceeds
        let probability = if probability.is_nan() { 0.0 } else { probability.clamp(0.0, 1.0) };
        CoinFlip { rng: StdRng::seed_from_u64(seed), probability }
    }
}

impl VetoHook for CoinFlip {
    fn review(&mut self, _transition: &str, _binding: &Binding) -> Verdict {
        if self.rng.random_bool(self.probability) {
            Verdict::Proceed
        } else {
            Verdict::Skip
        }
    }
}

/// Proceeds only if two bound variables hold equal tokens.
#[derive(Clone, Debug)]
pub struct RequireEqual {
    left: String,
    right: String,
}

impl RequireEqual {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        RequireEqual { left: left.into(), right: right.into() }
    }
}

impl VetoHook for RequireEqual {
    fn review(&mut self, _transition: &str, binding: &Binding) -> Verdict {
        match (binding.get(&self.left), binding.get(&self.right)) {
            (Some(l), Some(r)) if l == r => Verdict::Proceed,
            _ => Verdict::Skip,
        }
    }
}
