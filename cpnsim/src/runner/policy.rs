use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{exec::EnabledPair, net::CpnNet};

/// Chooses which enabled pair fires in a step.
///
/// `candidates` is never empty. Returning None or an out-of-range index
/// makes the driver fall back to the first candidate.
pub trait SelectionPolicy {
    fn select(&mut self, net: &CpnNet, candidates: &[EnabledPair]) -> Option<usize>;
}

/// Always the first candidate. Candidates are ordered by transition id and
/// binding, so runs are reproducible.
#[derive(Default, Clone, Copy, Debug)]
pub struct FirstEnabled;

impl SelectionPolicy for FirstEnabled {
    fn select(&mut self, _net: &CpnNet, _candidates: &[EnabledPair]) -> Option<usize> {
        Some(0)
    }
}

/// Uniformly random choice.
#[derive(Clone, Debug)]
pub struct UniformRandom {
    rng: StdRng,
}

impl UniformRandom {
    pub fn new() -> Self {
        UniformRandom { rng: StdRng::from_os_rng() }
    }

    pub fn seeded(seed: u64) -> Self {
        UniformRandom { rng: StdRng::seed_from_u64(seed) }
    }
}

impl Default for UniformRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionPolicy for UniformRandom {
    fn select(&mut self, _net: &CpnNet, candidates: &[EnabledPair]) -> Option<usize> {
        Some(self.rng.random_range(0..candidates.len()))
    }
}

/// External collaborator answering manual choices.
pub trait Operator {
    fn choose(&mut self, net: &CpnNet, candidates: &[EnabledPair]) -> Option<usize>;
}

impl<F> Operator for F
where
    F: FnMut(&CpnNet, &[EnabledPair]) -> Option<usize>,
{
    fn choose(&mut self, net: &CpnNet, candidates: &[EnabledPair]) -> Option<usize> {
        self(net, candidates)
    }
}

/// Delegates every choice to an [`Operator`].
pub struct Manual<O: Operator> {
    operator: O,
}

impl<O: Operator> Manual<O> {
    pub fn new(operator: O) -> Self {
        Manual { operator }
    }

    pub fn operator(&self) -> &O {
        &self.operator
    }
}

impl<O: Operator> SelectionPolicy for Manual<O> {
    fn select(&mut self, net: &CpnNet, candidates: &[EnabledPair]) -> Option<usize> {
        self.operator.choose(net, candidates)
    }
}
