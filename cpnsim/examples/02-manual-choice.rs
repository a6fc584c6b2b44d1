use std::{
    io::{self, BufRead, Write},
    path::Path,
};

use cpnsim::{
    error::Result as CpnResult,
    exec::EnabledPair,
    runner::{Manual, SimulationState, Simulator},
    BuildOptions, CpnNet, SimulationConfig,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Prints the candidates and reads an index from stdin. An empty line or
/// end of input picks the first candidate.
fn ask(net: &CpnNet, candidates: &[EnabledPair]) -> Option<usize> {
    let mut stdout = io::stdout().lock();
    for (idx, pair) in candidates.iter().enumerate() {
        let name = net.transition(pair.transition).map(|tr| tr.name()).unwrap_or("?");
        let _ = writeln!(stdout, "  [{idx}] {name} {}", pair.binding);
    }
    let _ = write!(stdout, "choice> ");
    let _ = stdout.flush();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) if line.trim().is_empty() => Some(0),
        Ok(_) => line.trim().parse().ok(),
    }
}

fn main() -> CpnResult<()> {
    // set up logging
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(EnvFilter::try_new("info,cpnsim=info").unwrap())
        .init();

    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("models/protocol.json");
    let (net, marking) = cpnsim::load(&path, &BuildOptions::default())?;
    let mut simulator = Simulator::new(net, marking, Manual::new(ask), SimulationConfig::default());

    while let Some(event) = simulator.step()? {
        println!("{event}");
        if simulator.steps() >= 50 {
            warn!("Stopping after 50 steps.");
            break;
        }
    }
    if simulator.state() == SimulationState::Terminated {
        info!("Dead marking reached.");
    }
    Ok(())
}
