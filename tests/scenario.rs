//! End-to-end wake/rendezvous runs in virtual time.

use uwb_lplisten::lpl::config::{INTERACTION_CEILING_MS, LISTENER_ADDRESS, WAKE_BURST_FRAMES};
use uwb_lplisten::lpl::{
    InteractionFrame, RendezvousDecision, RendezvousOutcome, WakeFrame, WakerConfig,
};
use uwb_lplisten::sim::{CycleRecord, Scenario, SimConfig};

const FRAME_TIME_NS: u64 = 1_130_000;

/// Burst starts spread over one listener period.
const PHASES_US: [u64; 6] = [0, 47, 123_456, 600_000, 1_100_000, 1_228_900];

fn run(phase_us: u64, bursts: u32) -> (Scenario, Vec<CycleRecord>) {
    let config = SimConfig {
        bursts,
        listener_phase_us: Some(phase_us),
        ..Default::default()
    };
    let mut scenario = Scenario::new(config).unwrap();
    let cycles = (0..bursts).map(|_| scenario.run_cycle().unwrap()).collect();
    (scenario, cycles)
}

#[test]
fn test_burst_always_captured_once() {
    for phase in PHASES_US {
        let (_, cycles) = run(phase, 1);
        let cycle = &cycles[0];
        assert_eq!(cycle.captures.len(), 1, "phase {} us", phase);

        let capture = cycle.captures[0];
        assert!(capture.captured_at_ns > cycle.burst_start_ns, "phase {} us", phase);
        assert!(capture.captured_at_ns <= cycle.burst_end_ns, "phase {} us", phase);
    }
}

#[test]
fn test_countdown_predicts_burst_end() {
    for phase in PHASES_US {
        let (_, cycles) = run(phase, 1);
        let cycle = &cycles[0];
        let capture = cycle.captures[0];
        let countdown = capture.report.disposition.countdown as u64;

        let predicted_end = capture.captured_at_ns + countdown * FRAME_TIME_NS;
        assert!(
            predicted_end.abs_diff(cycle.burst_end_ns) <= FRAME_TIME_NS,
            "phase {} us: predicted {} actual {}",
            phase,
            predicted_end,
            cycle.burst_end_ns
        );
    }
}

#[test]
fn test_addressed_cycle_answered() {
    for phase in PHASES_US {
        let (scenario, cycles) = run(phase, 1);
        let cycle = &cycles[0];
        assert_eq!(cycle.burst.target, LISTENER_ADDRESS);
        assert_eq!(
            cycle.captures[0].report.disposition.decision,
            RendezvousDecision::AddressedToMe
        );
        assert_eq!(
            cycle.outcome,
            RendezvousOutcome::Answered {
                len: 12,
                responder: Some(LISTENER_ADDRESS),
                seq_no: Some(0),
            },
            "phase {} us",
            phase
        );
        assert!(scenario.listener_radio().is_listening());
    }
}

#[test]
fn test_other_target_left_unanswered() {
    let (scenario, cycles) = run(600_000, 2);
    let cycle = &cycles[1];
    assert_ne!(cycle.burst.target, LISTENER_ADDRESS);
    assert!(matches!(cycle.outcome, RendezvousOutcome::Missed { .. }));

    let disposition = cycle.captures[0].report.disposition;
    assert_eq!(disposition.decision, RendezvousDecision::NotAddressed);
    assert!(disposition.sleep_ms >= disposition.remaining_ms + INTERACTION_CEILING_MS);
    assert_eq!(cycle.captures[0].report.interaction_seq, None);

    // Only the first cycle's answer is on air
    assert_eq!(scenario.air().sent_by(2).len(), 1);
}

#[test]
fn test_interaction_seq_increases_across_rendezvous() {
    let config = SimConfig {
        bursts: 3,
        listener_phase_us: Some(300_000),
        waker: WakerConfig::default(),
        ..Default::default()
    };
    let report = Scenario::new(config).unwrap().run().unwrap();

    let seqs: Vec<u8> = report
        .cycles
        .iter()
        .filter_map(|c| match c.outcome {
            RendezvousOutcome::Answered { seq_no, .. } => seq_no,
            _ => None,
        })
        .collect();
    assert_eq!(seqs, vec![0, 1, 2]);
    assert_eq!(report.listener.interactions_sent, 3);
    assert_eq!(report.waker.rendezvous, 3);
}

#[test]
fn test_bursts_count_down_to_zero() {
    let (scenario, _) = run(123_456, 2);
    let frames: Vec<WakeFrame> = scenario
        .air()
        .sent_by(1)
        .iter()
        .map(|t| WakeFrame::decode(&t.frame).unwrap())
        .collect();
    assert_eq!(frames.len(), 2 * WAKE_BURST_FRAMES as usize);

    for burst in frames.chunks(WAKE_BURST_FRAMES as usize) {
        let countdowns: Vec<u16> = burst.iter().map(|f| f.countdown).collect();
        let expected: Vec<u16> = (0..WAKE_BURST_FRAMES).rev().collect();
        assert_eq!(countdowns, expected);
    }
}

#[test]
fn test_answer_lands_in_receive_window() {
    let (scenario, cycles) = run(1_100_000, 1);
    let cycle = &cycles[0];
    let answers = scenario.air().sent_by(2);
    assert_eq!(answers.len(), 1);

    let answer = &answers[0];
    assert!(answer.start_ns > cycle.burst_end_ns);
    assert!(answer.end_ns < cycle.burst_end_ns + 50_000_000);
    let frame = InteractionFrame::decode(&answer.frame).unwrap();
    assert_eq!(frame.src_addr, LISTENER_ADDRESS);
}

#[test]
fn test_slow_oscillator_still_captured() {
    let config = SimConfig {
        bursts: 1,
        listener_phase_us: Some(400_000),
        osc_divisor: 2400,
        ..Default::default()
    };
    let report = Scenario::new(config).unwrap().run().unwrap();
    assert_eq!(report.cycles[0].captures.len(), 1);
    assert!(report.cycles[0].outcome.is_answered());
    assert!(report.listener_period_ns < 1_500_000_000);
}

#[test]
fn test_report_serialises() {
    let config = SimConfig {
        bursts: 1,
        listener_phase_us: Some(10_000),
        ..Default::default()
    };
    let report = Scenario::new(config).unwrap().run().unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["cycles"].as_array().map(Vec::len), Some(1));
    assert_eq!(json["listener"]["captured"], 1);
}
