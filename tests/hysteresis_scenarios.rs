//! Controller regression: hysteresis entry/exit and recommendation
//! mappings over the reference buffer tuning (capacity 50, Tcrit 0.15,
//! Tlow 0.3, Thigh 0.7, δ 0.05).

use palletflow::config::BufferConfig;
use palletflow::controller::{BufferState, HysteresisController};

fn reference_config() -> BufferConfig {
    BufferConfig {
        capacity: 50,
        low_threshold: 0.3,
        high_threshold: 0.7,
        critical_threshold: 0.15,
        dead_band: 0.05,
    }
}

#[test]
fn reference_level_feed_walks_the_expected_state_path() {
    let mut controller = HysteresisController::new(&reference_config());
    let feed = [0.60, 0.45, 0.28, 0.33, 0.36, 0.76, 0.66, 0.10, 0.21];
    let expected = [
        BufferState::Normal,
        BufferState::Normal,
        BufferState::Low,
        BufferState::Low,
        BufferState::Normal,
        BufferState::Overflow,
        BufferState::Normal,
        BufferState::Critical,
        BufferState::Low,
    ];

    for (level, want) in feed.iter().zip(expected.iter()) {
        controller.update_observation(*level, 50, 100.0);
        assert_eq!(controller.state(), *want, "at level {level}");
    }
}

#[test]
fn oscillation_within_the_dead_band_never_flips_state() {
    let mut controller = HysteresisController::new(&reference_config());
    // Settle into Low.
    controller.update_observation(0.28, 50, 100.0);
    assert_eq!(controller.state(), BufferState::Low);

    // Oscillate in (Tlow, Tlow + δ): recovery never fires.
    for level in [0.31, 0.34, 0.32, 0.33, 0.34, 0.31] {
        let change = controller.update_observation(level, 50, 100.0);
        assert!(change.is_none(), "chatter at {level}");
        assert_eq!(controller.state(), BufferState::Low);
    }
}

#[test]
fn recommendations_follow_the_state() {
    let mut controller = HysteresisController::new(&reference_config());

    // Critical at 0.10: everything is thrown at the buffer.
    controller.update_observation(0.10, 50, 100.0);
    assert!(controller.urgent_delivery_required());
    assert_eq!(controller.recommended_forklift_count(4), 4);
    // Deficit: (0.5 − 0.1) · 50 = 20 pallets.
    assert_eq!(controller.pallets_to_request(), 20);
    // Rate: 100·3 + 0.4·100·2 = 380 pal/h.
    assert!((controller.required_delivery_rate(100.0) - 380.0).abs() < 1e-9);

    // Overflow at 0.80 (from Normal): wind down to one forklift,
    // request nothing.
    let mut controller = HysteresisController::new(&reference_config());
    controller.update_observation(0.80, 50, 100.0);
    assert_eq!(controller.state(), BufferState::Overflow);
    assert!(!controller.urgent_delivery_required());
    assert_eq!(controller.recommended_forklift_count(4), 1);
    assert_eq!(controller.pallets_to_request(), 0);
}

#[test]
fn state_priority_mapping_is_stable() {
    assert_eq!(BufferState::Critical.delivery_priority(), 100);
    assert_eq!(BufferState::Low.delivery_priority(), 75);
    assert_eq!(BufferState::Normal.delivery_priority(), 50);
    assert_eq!(BufferState::Overflow.delivery_priority(), 10);
}
