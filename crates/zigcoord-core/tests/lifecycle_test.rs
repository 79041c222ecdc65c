#![allow(clippy::unwrap_used)]

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};
use zigcoord_api::NetworkParameters;
use zigcoord_core::{CoordinatorConfig, CoreError, NetworkState};

use common::{HOME, READY_TIMEOUT, config, coordinator, drain_states, lamp, radio, ready};

// ── Configuration ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn start_rejects_incomplete_config() {
    let radio = radio();
    let coordinator = coordinator(&radio);

    let missing_channel = CoordinatorConfig {
        channel: None,
        ..config()
    };
    let err = coordinator.start(missing_channel).await.unwrap_err();
    assert!(matches!(err, CoreError::Config { .. }), "got {err:?}");

    let broadcast_pan = CoordinatorConfig::new(0xFFFF, 15);
    assert!(matches!(
        coordinator.start(broadcast_pan).await,
        Err(CoreError::Config { .. })
    ));

    assert!(!coordinator.is_running());
    assert_eq!(coordinator.current_state(), NetworkState::Disconnected);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(radio.journal().opens, 0);
}

#[tokio::test(start_paused = true)]
async fn second_start_is_rejected_while_running() {
    let radio = radio();
    let coordinator = coordinator(&radio);

    assert_ok!(coordinator.start(config()).await);
    let err = assert_err!(coordinator.start(config()).await);
    assert!(matches!(err, CoreError::AlreadyRunning));

    coordinator.stop().await;
    assert_ok!(coordinator.start(config()).await);
    coordinator.wait_for_ready(READY_TIMEOUT).await.unwrap();
    coordinator.stop().await;
}

// ── Bring-up ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn first_attempt_waits_for_startup_delay() {
    let radio = radio();
    let coordinator = coordinator(&radio);
    let started = Instant::now();

    coordinator.start(config()).await.unwrap();
    assert_eq!(coordinator.current_state(), NetworkState::Disconnected);
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(coordinator.current_state(), NetworkState::Disconnected);
    assert_eq!(radio.journal().opens, 0);
    coordinator.wait_for_ready(READY_TIMEOUT).await.unwrap();

    let journal = radio.journal();
    assert_eq!(journal.initializations.len(), 1);
    assert!(journal.initializations[0].at - started >= Duration::from_secs(1));
    assert!(!journal.initializations[0].reset);
    coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failed_initializations_are_retried_after_delay() {
    let radio = radio().with_device(lamp());
    radio.fail_next_initializations(3);
    let coordinator = coordinator(&radio);
    let mut events = coordinator.events();

    coordinator.start(config()).await.unwrap();
    coordinator.wait_for_ready(READY_TIMEOUT).await.unwrap();

    let attempts = radio.journal().initializations;
    assert_eq!(attempts.len(), 4);
    for pair in attempts.windows(2) {
        assert!(
            pair[1].at - pair[0].at >= Duration::from_secs(15),
            "attempts only {:?} apart",
            pair[1].at - pair[0].at
        );
    }
    // Each failure closes the radio before the next try.
    assert_eq!(radio.journal().shutdowns, 3);

    let states = drain_states(&mut events);
    let failures = states
        .iter()
        .filter(|s| matches!(s, NetworkState::Failed { .. }))
        .count();
    assert_eq!(failures, 3);
    assert_eq!(states.last(), Some(&NetworkState::Ready));
    coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unavailable_hardware_is_retried() {
    let radio = radio();
    radio.fail_next_opens(2);
    let coordinator = ready(&radio).await;

    let journal = radio.journal();
    assert_eq!(journal.opens, 3);
    assert_eq!(journal.initializations.len(), 1);
    coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn declined_initialization_counts_as_failure() {
    let radio = radio();
    radio.decline_next_initializations(1);
    let coordinator = coordinator(&radio);
    let mut events = coordinator.events();

    coordinator.start(config()).await.unwrap();
    coordinator.wait_for_ready(READY_TIMEOUT).await.unwrap();

    assert_eq!(radio.journal().initializations.len(), 2);
    let declined = drain_states(&mut events).into_iter().any(|s| match s {
        NetworkState::Failed { reason } => reason.contains("declined"),
        _ => false,
    });
    assert!(declined);
    coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn mismatched_network_is_reset_to_target() {
    let radio = zigcoord_api::VirtualRadio::new(NetworkParameters {
        pan_id: 0x0bad,
        channel: 25,
    });
    let coordinator = coordinator(&radio);
    let mut events = coordinator.events();

    coordinator.start(config()).await.unwrap();
    coordinator.wait_for_ready(READY_TIMEOUT).await.unwrap();

    let first = radio.journal().initializations[0];
    assert!(first.reset);
    assert_eq!(first.params, HOME);
    assert_eq!(radio.current_network(), HOME);
    assert!(drain_states(&mut events).contains(&NetworkState::ResetPending));

    // The radio now holds our network: a restart needs no reset.
    coordinator.stop().await;
    coordinator.start(config()).await.unwrap();
    coordinator.wait_for_ready(READY_TIMEOUT).await.unwrap();
    let second = radio.journal().initializations[1];
    assert!(!second.reset);
    coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn channel_mismatch_alone_triggers_reset() {
    let radio = zigcoord_api::VirtualRadio::new(NetworkParameters {
        pan_id: HOME.pan_id,
        channel: 20,
    });
    let coordinator = ready(&radio).await;

    assert!(radio.journal().initializations[0].reset);
    assert_eq!(radio.current_network().channel, HOME.channel);
    coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn state_sequence_for_clean_start() {
    let radio = radio().with_device(lamp());
    let coordinator = coordinator(&radio);
    let mut events = coordinator.events();

    coordinator.start(config()).await.unwrap();
    coordinator.wait_for_ready(READY_TIMEOUT).await.unwrap();

    assert_eq!(
        drain_states(&mut events),
        vec![
            NetworkState::Initializing,
            NetworkState::Discovering,
            NetworkState::Ready,
        ]
    );
    coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn wait_for_ready_times_out_while_radio_keeps_failing() {
    let radio = radio();
    radio.fail_next_initializations(u32::MAX);
    let coordinator = coordinator(&radio);

    coordinator.start(config()).await.unwrap();
    let err = coordinator
        .wait_for_ready(Duration::from_secs(40))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Timeout { timeout_secs: 40 }));
    assert!(matches!(
        coordinator.current_state(),
        NetworkState::Failed { .. }
    ));
    coordinator.stop().await;
}

// ── Stop and restart ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn stop_during_retry_wait_ends_attempts() {
    let radio = radio();
    radio.fail_next_initializations(u32::MAX);
    let coordinator = coordinator(&radio);

    coordinator.start(config()).await.unwrap();
    coordinator
        .state_changes()
        .wait_for(|s| matches!(s, NetworkState::Failed { .. }))
        .await
        .unwrap();

    coordinator.stop().await;
    let attempts = radio.journal().initializations.len();
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(radio.journal().initializations.len(), attempts);
    assert_eq!(coordinator.current_state(), NetworkState::Disconnected);
    assert!(!coordinator.is_running());
}

#[tokio::test(start_paused = true)]
async fn stop_closes_radio_and_allows_restart() {
    let radio = radio().with_device(lamp());
    let coordinator = ready(&radio).await;
    assert!(radio.is_open());

    coordinator.stop().await;
    assert_eq!(coordinator.current_state(), NetworkState::Disconnected);
    assert!(!radio.is_open());
    assert!(radio.journal().shutdowns >= 1);
    assert!(matches!(
        coordinator.wait_for_ready(Duration::from_secs(5)).await,
        Err(CoreError::Timeout { .. })
    ));

    coordinator.start(config()).await.unwrap();
    coordinator.wait_for_ready(READY_TIMEOUT).await.unwrap();
    assert_eq!(radio.journal().initializations.len(), 2);
    assert_eq!(coordinator.devices().len(), 1);
    coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_without_start_is_harmless() {
    let radio = radio();
    let coordinator = coordinator(&radio);

    coordinator.stop().await;
    assert_eq!(coordinator.current_state(), NetworkState::Disconnected);
    assert_eq!(radio.journal().shutdowns, 0);
}
