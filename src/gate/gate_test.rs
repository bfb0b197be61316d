use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{Gate, GateState};
use crate::orchestrator::ScaleError;
use crate::support::scaler::{FakeScaler, Outcome};

const SCALE_TIMEOUT: Duration = Duration::from_secs(10);

fn gate(scaler: &Arc<FakeScaler>) -> Arc<Gate> {
    Arc::new(Gate::new(scaler.clone(), SCALE_TIMEOUT))
}

// Lets spawned tasks run until they park.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_gate_starts_idle() {
    let scaler = Arc::new(FakeScaler::new("whoami"));
    let gate = gate(&scaler);

    assert_eq!(gate.state(), GateState::Idle);
    assert_eq!(gate.name(), "whoami");
    assert_eq!(scaler.ups(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_admits_share_one_scale_up() {
    let scaler = Arc::new(FakeScaler::new("whoami").with_delay(Duration::from_secs(2)));
    let gate = gate(&scaler);
    let cancel = CancellationToken::new();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let gate = gate.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            gate.admit(Instant::now(), &cancel).await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    assert_eq!(scaler.ups(), 1, "exactly one activator");
    assert_eq!(gate.state(), GateState::Active);
}

#[tokio::test(start_paused = true)]
async fn test_active_gate_admits_without_scaling() {
    let scaler = Arc::new(FakeScaler::new("whoami"));
    let gate = gate(&scaler);
    let cancel = CancellationToken::new();

    gate.admit(Instant::now(), &cancel).await.unwrap();
    for _ in 0..5 {
        gate.admit(Instant::now(), &cancel).await.unwrap();
    }
    assert_eq!(scaler.ups(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_activation_reverts_to_idle_and_retries() {
    let scaler = Arc::new(FakeScaler::new("whoami").script(&[Outcome::Fail]));
    let gate = gate(&scaler);
    let cancel = CancellationToken::new();

    let err = gate.admit(Instant::now(), &cancel).await.unwrap_err();
    assert!(matches!(err, ScaleError::Orchestrator(_)), "got {err:?}");
    assert_eq!(gate.state(), GateState::Idle);

    gate.admit(Instant::now(), &cancel).await.unwrap();
    assert_eq!(scaler.ups(), 2);
    assert_eq!(gate.state(), GateState::Active);
}

#[tokio::test(start_paused = true)]
async fn test_waiters_after_failure_trigger_one_new_activation() {
    let scaler = Arc::new(
        FakeScaler::new("whoami")
            .with_delay(Duration::from_secs(1))
            .script(&[Outcome::Fail, Outcome::Ready]),
    );
    let gate = gate(&scaler);
    let cancel = CancellationToken::new();

    let activator = {
        let gate = gate.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { gate.admit(Instant::now(), &cancel).await })
    };
    settle().await;
    assert_eq!(gate.state(), GateState::Activating);

    let mut waiters = Vec::new();
    for _ in 0..5 {
        let gate = gate.clone();
        let cancel = cancel.clone();
        waiters.push(tokio::spawn(async move {
            gate.admit(Instant::now(), &cancel).await
        }));
    }

    let first = activator.await.unwrap();
    assert!(first.is_err(), "first activator sees the scripted failure");
    for w in waiters {
        w.await.unwrap().unwrap();
    }

    assert_eq!(scaler.ups(), 2, "one retry shared by all waiters");
    assert_eq!(gate.state(), GateState::Active);
}

#[tokio::test(start_paused = true)]
async fn test_wake_timeout_propagates_to_activator() {
    let scaler = Arc::new(FakeScaler::new("whoami").with_delay(SCALE_TIMEOUT * 2));
    let gate = gate(&scaler);

    let err = gate
        .admit(Instant::now(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ScaleError::WakeTimeout { .. }), "got {err:?}");
    assert_eq!(gate.state(), GateState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_last_active_never_moves_backwards() {
    let scaler = Arc::new(FakeScaler::new("whoami"));
    let gate = gate(&scaler);
    let cancel = CancellationToken::new();
    let t0 = Instant::now();

    gate.admit(t0, &cancel).await.unwrap();
    gate.admit(t0 + Duration::from_secs(10), &cancel).await.unwrap();
    gate.admit(t0 + Duration::from_secs(5), &cancel).await.unwrap();

    let snap = gate.snapshot();
    assert!(snap.is_active());
    assert_eq!(snap.last_active, t0 + Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_idle_window_starts_at_activator_arrival() {
    let scaler = Arc::new(FakeScaler::new("whoami").with_delay(Duration::from_secs(5)));
    let gate = gate(&scaler);
    let cancel = CancellationToken::new();
    let t0 = Instant::now();

    gate.admit(t0, &cancel).await.unwrap();
    assert_eq!(Instant::now(), t0 + Duration::from_secs(5));

    let snap = gate.snapshot();
    assert_eq!(snap.last_active, t0);
    let keep_alive = Duration::from_secs(60);
    assert!(gate.try_expire(snap.last_active, t0 + keep_alive, keep_alive));
}

#[tokio::test(start_paused = true)]
async fn test_canceled_waiter_leaves_activation_running() {
    let scaler = Arc::new(FakeScaler::new("whoami").script(&[Outcome::Hang]));
    let gate = gate(&scaler);
    let activator_cancel = CancellationToken::new();

    let activator = {
        let gate = gate.clone();
        let cancel = activator_cancel.clone();
        tokio::spawn(async move { gate.admit(Instant::now(), &cancel).await })
    };
    settle().await;

    let waiter_cancel = CancellationToken::new();
    let waiter = {
        let gate = gate.clone();
        let cancel = waiter_cancel.clone();
        tokio::spawn(async move { gate.admit(Instant::now(), &cancel).await })
    };
    settle().await;
    waiter_cancel.cancel();

    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, ScaleError::Canceled), "got {err:?}");
    assert_eq!(gate.state(), GateState::Activating);
    assert!(!activator.is_finished());

    activator_cancel.cancel();
    let err = activator.await.unwrap().unwrap_err();
    assert!(matches!(err, ScaleError::Canceled), "got {err:?}");
    assert_eq!(gate.state(), GateState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_activator_releases_waiters() {
    let scaler = Arc::new(FakeScaler::new("whoami").script(&[Outcome::Hang]));
    let gate = gate(&scaler);
    let cancel = CancellationToken::new();

    let activator = {
        let gate = gate.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { gate.admit(Instant::now(), &cancel).await })
    };
    settle().await;

    let waiter = {
        let gate = gate.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { gate.admit(Instant::now(), &cancel).await })
    };
    settle().await;

    activator.abort();
    assert!(activator.await.unwrap_err().is_cancelled());

    // The waiter takes over and the script is drained, so it succeeds.
    waiter.await.unwrap().unwrap();
    assert_eq!(scaler.ups(), 2);
    assert_eq!(gate.state(), GateState::Active);
}

#[tokio::test(start_paused = true)]
async fn test_try_expire_after_keep_alive() {
    let scaler = Arc::new(FakeScaler::new("whoami"));
    let gate = gate(&scaler);
    let keep_alive = Duration::from_secs(60);
    let t0 = Instant::now();

    gate.admit(t0, &CancellationToken::new()).await.unwrap();
    let snap = gate.snapshot();

    assert!(!gate.try_expire(snap.last_active, t0 + Duration::from_secs(59), keep_alive));
    assert_eq!(gate.state(), GateState::Active);
    assert_eq!(scaler.reservations(), 0);

    assert!(gate.try_expire(snap.last_active, t0 + keep_alive, keep_alive));
    assert_eq!(gate.state(), GateState::Idle);
    assert_eq!(scaler.reservations(), 1);

    // Expiring twice is a no-op.
    assert!(!gate.try_expire(snap.last_active, t0 + keep_alive, keep_alive));
    assert_eq!(scaler.reservations(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_try_expire_aborts_when_refreshed_after_snapshot() {
    let scaler = Arc::new(FakeScaler::new("whoami"));
    let gate = gate(&scaler);
    let cancel = CancellationToken::new();
    let keep_alive = Duration::from_secs(60);
    let t0 = Instant::now();

    gate.admit(t0, &cancel).await.unwrap();
    let observed = gate.snapshot();

    // A request lands one millisecond before the deadline, after the snapshot.
    gate.admit(t0 + keep_alive - Duration::from_millis(1), &cancel)
        .await
        .unwrap();

    assert!(!gate.try_expire(observed.last_active, t0 + keep_alive, keep_alive));
    assert_eq!(gate.state(), GateState::Active);
    assert_eq!(scaler.ups(), 1);
    assert_eq!(scaler.reservations(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_expired_gate_activates_again() {
    let scaler = Arc::new(FakeScaler::new("whoami"));
    let gate = gate(&scaler);
    let cancel = CancellationToken::new();
    let keep_alive = Duration::from_secs(60);
    let t0 = Instant::now();

    gate.admit(t0, &cancel).await.unwrap();
    assert!(gate.try_expire(t0, t0 + keep_alive, keep_alive));

    gate.admit(t0 + keep_alive, &cancel).await.unwrap();
    assert_eq!(scaler.ups(), 2);
    assert_eq!(gate.snapshot().last_active, t0 + keep_alive);
}
