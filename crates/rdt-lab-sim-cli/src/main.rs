use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;

use rdt_lab_abstract::SimConfig;
use rdt_lab_protocols::{DEFAULT_TIMEOUT, PairConfig, ProtocolKind, build_pair};
use rdt_lab_simulator::{SimulationReport, Simulator, scenario_runner};

/// Bounds runs that can never finish, such as one with every packet lost.
const DEFAULT_TIME_LIMIT: f64 = 100_000.0;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Protocol {
    /// One packet in flight, ACK/NAK receiver
    StopAndWait,
    /// Sliding window with cumulative ACKs
    Gbn,
}

impl From<Protocol> for ProtocolKind {
    fn from(protocol: Protocol) -> Self {
        match protocol {
            Protocol::StopAndWait => ProtocolKind::StopAndWait,
            Protocol::Gbn => ProtocolKind::GoBackN,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Stop-and-wait / Go-Back-N network simulator")]
struct Args {
    /// Transport protocol to run.
    #[arg(short, long, value_enum, default_value_t = Protocol::StopAndWait)]
    protocol: Protocol,

    /// Number of messages to simulate.
    #[arg(short, long, default_value_t = 10)]
    num_msgs: u32,

    /// Packet loss probability.
    #[arg(short = 'd', long, default_value_t = 0.0)]
    loss: f64,

    /// Packet corruption probability.
    #[arg(short = 'z', long, default_value_t = 0.0)]
    corrupt: f64,

    /// Average time between messages from the application.
    #[arg(short = 't', long, default_value_t = 100.0)]
    interval: f64,

    /// Number of distinct sequence numbers.
    #[arg(short = 'q', long, default_value_t = 16)]
    seqnum_limit: u32,

    /// Go-Back-N window size.
    #[arg(short, long, default_value_t = 8)]
    window_size: u32,

    /// Retransmission timeout.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT)]
    timeout: f64,

    /// Random seed for the channel and message source.
    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    /// Stop the run after this much simulated time.
    #[arg(long, default_value_t = DEFAULT_TIME_LIMIT)]
    time_limit: f64,

    /// Increase trace output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Run a scenario file instead of a generated message stream.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    info!("rdt-lab-sim starting…");

    let report = if let Some(path) = &args.scenario {
        let scenario_path = path
            .to_str()
            .context("Scenario path contains invalid UTF-8")?;
        scenario_runner::run_scenario(scenario_path)?
    } else {
        run_default_sim(&args)?
    };

    print_summary(&report);

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

impl Args {
    fn pair_config(&self) -> PairConfig {
        PairConfig::new(self.protocol.into(), self.seqnum_limit)
            .window_size(self.window_size)
            .timeout(self.timeout)
    }

    fn sim_config(&self) -> SimConfig {
        SimConfig {
            loss_rate: self.loss,
            corrupt_rate: self.corrupt,
            seed: self.seed,
            time_limit: Some(self.time_limit),
            ..Default::default()
        }
    }
}

fn run_default_sim(args: &Args) -> Result<SimulationReport> {
    let (sender, receiver) = build_pair(&args.pair_config())?;
    let mut sim = Simulator::new(args.sim_config(), sender, receiver)?;
    sim.schedule_message_stream(args.num_msgs, args.interval)
        .context("Invalid --interval")?;

    info!(
        "Starting {:?} simulation: {} messages, loss={}, corrupt={}",
        args.protocol, args.num_msgs, args.loss, args.corrupt
    );
    if let Err(err) = sim.run_until_complete() {
        warn!("Simulation aborted at t={:.2}", sim.current_time());
        return Err(err).context("Simulation aborted");
    }
    if sim.delivered.len() < args.num_msgs as usize {
        warn!(
            "Stopped at t={:.2} with {} of {} messages delivered",
            sim.current_time(),
            sim.delivered.len(),
            args.num_msgs
        );
    } else {
        info!("Simulation complete.");
    }
    Ok(sim.export_report())
}

fn print_summary(report: &SimulationReport) {
    println!("Simulated time:        {:.2}", report.duration);
    println!("Messages submitted:    {}", report.submitted.len());
    println!("Messages delivered:    {}", report.delivered.len());
    println!("Sender packets:        {}", report.sender_packet_count);
    println!("Receiver packets:      {}", report.receiver_packet_count);
    println!("Retransmissions:       {}", report.retransmissions());
    println!("Sender timeouts:       {}", report.sender_timeouts);
    println!(
        "Delivered in order:    {}",
        if report.delivered_in_order() { "yes" } else { "NO" }
    );
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_loss_run_stops_at_the_default_time_limit() {
        let args = Args::try_parse_from(["rdt-lab-sim", "--loss", "1.0", "-n", "2"]).unwrap();
        let report = run_default_sim(&args).unwrap();

        assert!(report.delivered.is_empty());
        assert!(report.sender_timeouts > 0);
        assert!(report.duration <= DEFAULT_TIME_LIMIT);
    }

    #[test]
    fn negative_interval_is_an_error() {
        let args = Args::try_parse_from(["rdt-lab-sim", "--interval=-1"]).unwrap();
        assert!(run_default_sim(&args).is_err());
    }

    #[test]
    fn out_of_range_rate_is_rejected() {
        let args = Args::try_parse_from(["rdt-lab-sim", "--corrupt", "2.0"]).unwrap();
        let err = run_default_sim(&args).unwrap_err();
        assert!(format!("{err:#}").contains("corrupt_rate"));
    }
}
