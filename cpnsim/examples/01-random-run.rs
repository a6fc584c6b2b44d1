use std::path::Path;

use cpnsim::{
    error::Result as CpnResult,
    runner::{CoinFlip, SimulationConfigBuilder, Simulator, UniformRandom, VetoRegistry},
    BuildOptions,
};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tracing::instrument(level = "info")]
fn run(seed: u64) -> CpnResult<()> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("models/protocol.json");
    let (net, marking) = cpnsim::load(&path, &BuildOptions::default())?;

    // lossy channels: packets and acks get through half of the time
    let mut vetoes = VetoRegistry::new();
    vetoes.register("Transmit Packet", CoinFlip::new(seed, 0.5));
    vetoes.register("Receive Ack", CoinFlip::new(seed.wrapping_add(1), 0.5));

    let config = SimulationConfigBuilder::default()
        .max_steps(200usize)
        .stop(CancellationToken::new())
        .build()?;
    let mut simulator =
        Simulator::new(net, marking, UniformRandom::seeded(seed), config).with_vetoes(vetoes);
    let report = simulator.run()?;

    let snapshot = simulator.snapshot();
    for place in &snapshot.places {
        info!(place = place.name.as_str(), marking = %place.marking, "Final marking.");
    }
    info!(steps = report.steps(), fired = report.fired(), stop_reason = ?report.stop_reason, "Bye.");
    Ok(())
}

fn main() -> CpnResult<()> {
    // set up logging
    tracing_subscriber::fmt()
        .with_span_events(
            tracing_subscriber::fmt::format::FmtSpan::CLOSE
                | tracing_subscriber::fmt::format::FmtSpan::NEW,
        )
        .compact()
        .with_env_filter(EnvFilter::try_new("info,cpnsim=debug").unwrap())
        .init();

    let seed = std::env::args().nth(1).and_then(|s| s.parse().ok()).unwrap_or(7);
    run(seed)
}
