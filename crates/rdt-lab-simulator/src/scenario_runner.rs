use anyhow::{Context, Result, anyhow};
use rdt_lab_abstract::{Message, SimConfig, TestAction, TestAssertion, TestScenario};
use rdt_lab_protocols::{PairConfig, build_pair};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::engine::Simulator;
use crate::trace::SimulationReport;

const DEFAULT_MAX_DURATION: f64 = 100_000.0;

pub fn load_scenario(path: &Path) -> Result<TestScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    parse_scenario(&content)
}

pub fn parse_scenario(content: &str) -> Result<TestScenario> {
    toml::from_str(content).context("Failed to parse scenario")
}

/// Load, run and check the scenario stored at `scenario_path`.
pub fn run_scenario(scenario_path: &str) -> Result<SimulationReport> {
    let scenario = load_scenario(Path::new(scenario_path))?;
    run_test_scenario(&scenario)
}

/// Build a fresh entity pair for `scenario`, run it to completion and check its assertions.
pub fn run_test_scenario(scenario: &TestScenario) -> Result<SimulationReport> {
    info!("Running Scenario: {}", scenario.name);
    info!("Description: {}", scenario.description);

    let pair = PairConfig::from_settings(&scenario.protocol)?;
    let (sender, receiver) = build_pair(&pair)?;

    let mut config = SimConfig::default();
    scenario.config.apply_to(&mut config);

    let mut sim = Simulator::new(config, sender, receiver)
        .with_context(|| format!("Scenario '{}' has an invalid [config] table", scenario.name))?;
    configure_actions(&mut sim, &scenario.actions)?;

    let max_duration = scenario
        .assertions
        .iter()
        .find_map(|a| {
            if let TestAssertion::MaxDuration { time } = a {
                Some(*time)
            } else {
                None
            }
        })
        .unwrap_or(DEFAULT_MAX_DURATION);

    while sim
        .step()
        .with_context(|| format!("Scenario '{}' aborted", scenario.name))?
    {
        if sim.current_time() > max_duration {
            return Err(anyhow!("Test timed out after {} time units", max_duration));
        }
    }

    let report = sim.export_report();
    check_assertions(&report, &scenario.assertions)?;
    info!(
        "Scenario '{}' passed: {} delivered, {} sender packets, {} timeouts",
        scenario.name,
        report.delivered.len(),
        report.sender_packet_count,
        report.sender_timeouts
    );
    Ok(report)
}

/// Apply scripted application sends and deterministic faults.
pub fn configure_actions(sim: &mut Simulator, actions: &[TestAction]) -> Result<()> {
    for action in actions {
        match action {
            TestAction::AppSend { time, data } => {
                sim.schedule_app_send(*time, Message::from_slice(data.as_bytes()));
            }
            TestAction::MessageStream {
                count,
                mean_interval,
            } => {
                sim.schedule_message_stream(*count, *mean_interval)
                    .context("Invalid message_stream action")?;
            }
            TestAction::DropNextFromSenderSeq { seq } => {
                sim.add_drop_sender_seq_once(*seq);
            }
            TestAction::DropNextFromReceiverAck { ack } => {
                sim.add_drop_receiver_ack_once(*ack);
            }
            TestAction::CorruptNextFromSenderSeq { seq } => {
                sim.add_corrupt_sender_seq_once(*seq);
            }
            TestAction::CorruptNextFromReceiverAck { ack } => {
                sim.add_corrupt_receiver_ack_once(*ack);
            }
        }
    }
    Ok(())
}

pub fn check_assertions(report: &SimulationReport, assertions: &[TestAssertion]) -> Result<()> {
    for assertion in assertions {
        match assertion {
            TestAssertion::DataDelivered { data } => {
                let wanted = Message::from_slice(data.as_bytes());
                if !report.delivered.contains(&wanted) {
                    return Err(anyhow!(
                        "Assertion Failed: Data {:?} was not delivered",
                        data
                    ));
                }
            }
            TestAssertion::DeliveredInOrder => {
                if !report.delivered_in_order() {
                    return Err(anyhow!(
                        "Assertion Failed: delivered {} messages, submitted {}, or order differs",
                        report.delivered.len(),
                        report.submitted.len()
                    ));
                }
            }
            TestAssertion::DeliveredCount { count } => {
                if report.delivered.len() != *count {
                    return Err(anyhow!(
                        "Assertion Failed: delivered {} messages, expected {}",
                        report.delivered.len(),
                        count
                    ));
                }
            }
            TestAssertion::SenderPacketCount { min, max } => {
                check_range("Sender sent", "packets", report.sender_packet_count, *min, *max)?;
            }
            TestAssertion::TimeoutCount { min, max } => {
                check_range("Sender timed out", "times", report.sender_timeouts, *min, *max)?;
            }
            TestAssertion::MaxDuration { .. } => {
                // Checked during the run loop
            }
        }
    }
    Ok(())
}

fn check_range(what: &str, unit: &str, value: u32, min: u32, max: Option<u32>) -> Result<()> {
    if value < min {
        return Err(anyhow!(
            "Assertion Failed: {what} {value} {unit}, expected min {min}"
        ));
    }
    if let Some(max) = max
        && value > max
    {
        return Err(anyhow!(
            "Assertion Failed: {what} {value} {unit}, expected max {max}"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALTERNATING_BIT: &str = r#"
name = "alternating bit"
description = "two seqnums, one lost reply"

[protocol]
kind = "stop-and-wait"
seqnum_limit = 2

[config]
min_latency = 2.0
max_latency = 2.0

[[actions]]
type = "app_send"
time = 0.0
data = "first"

[[actions]]
type = "app_send"
time = 0.0
data = "second"

[[actions]]
type = "drop_next_from_receiver_ack"
ack = 1

[[assertions]]
type = "delivered_in_order"

[[assertions]]
type = "data_delivered"
data = "second"

[[assertions]]
type = "timeout_count"
min = 1
max = 1
"#;

    #[test]
    fn inline_scenario_runs_and_passes() {
        let scenario = parse_scenario(ALTERNATING_BIT).unwrap();
        let report = run_test_scenario(&scenario).unwrap();
        assert_eq!(report.delivered.len(), 2);
        assert_eq!(report.sender_packet_count, 3);
    }

    #[test]
    fn failed_assertion_is_reported() {
        let mut scenario = parse_scenario(ALTERNATING_BIT).unwrap();
        scenario
            .assertions
            .push(TestAssertion::DeliveredCount { count: 5 });
        let err = run_test_scenario(&scenario).unwrap_err();
        assert!(err.to_string().contains("expected 5"));
    }

    #[test]
    fn unknown_protocol_is_rejected() {
        let text = ALTERNATING_BIT.replace("stop-and-wait", "selective-repeat");
        let scenario = parse_scenario(&text).unwrap();
        assert!(run_test_scenario(&scenario).is_err());
    }

    #[test]
    fn inverted_latency_range_fails_instead_of_panicking() {
        let text = ALTERNATING_BIT.replace(
            "min_latency = 2.0\nmax_latency = 2.0",
            "min_latency = 10.0\nmax_latency = 1.0",
        );
        let scenario = parse_scenario(&text).unwrap();
        let err = run_test_scenario(&scenario).unwrap_err();
        assert!(format!("{err:#}").contains("latency range"));
    }

    #[test]
    fn negative_stream_interval_fails_instead_of_panicking() {
        let stream = "[[actions]]\ntype = \"message_stream\"\ncount = 3\nmean_interval = -1.0\n\n";
        let text = ALTERNATING_BIT.replacen("[[assertions]]", &format!("{stream}[[assertions]]"), 1);
        let scenario = parse_scenario(&text).unwrap();
        let err = run_test_scenario(&scenario).unwrap_err();
        assert!(format!("{err:#}").contains("mean_interval"));
    }
}
