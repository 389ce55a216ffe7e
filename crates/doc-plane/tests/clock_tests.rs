use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use doc_plane::{Clock, ManualClock};

async fn settle() {
    tokio::time::sleep(Duration::from_millis(25)).await;
}

#[tokio::test]
async fn zero_duration_sleep_returns_without_an_advance() {
    let clock = ManualClock::starting_now();
    clock.sleep(Duration::ZERO).await;
}

#[tokio::test]
async fn sleeper_stays_parked_until_the_deadline() {
    let clock = ManualClock::starting_now();
    let done = Arc::new(AtomicBool::new(false));
    let task = {
        let clock = clock.clone();
        let done = done.clone();
        tokio::spawn(async move {
            clock.sleep(Duration::from_millis(100)).await;
            done.store(true, Ordering::SeqCst);
        })
    };
    settle().await;
    clock.advance(Duration::from_millis(50));
    settle().await;
    assert!(!done.load(Ordering::SeqCst));
    clock.advance(Duration::from_millis(50));
    settle().await;
    assert!(done.load(Ordering::SeqCst));
    task.await.expect("join");
}

#[tokio::test]
async fn one_advance_releases_every_due_sleeper() {
    let clock = ManualClock::starting_now();
    let mut tasks = Vec::new();
    for _ in 0..3 {
        let clock = clock.clone();
        tasks.push(tokio::spawn(async move {
            clock.sleep(Duration::from_millis(10)).await;
        }));
    }
    settle().await;
    clock.advance(Duration::from_millis(10));
    for task in tasks {
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("released")
            .expect("join");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn advances_racing_the_sleepers_first_poll_are_not_lost() {
    let clock = ManualClock::starting_now();
    let sleeper = {
        let clock = clock.clone();
        tokio::spawn(async move {
            clock.sleep(Duration::from_millis(100)).await;
        })
    };
    // No coordination with the sleeper's first poll: the advances may land
    // before, between, or after its deadline check.
    for _ in 0..10 {
        clock.advance(Duration::from_millis(10));
    }
    tokio::time::timeout(Duration::from_secs(2), sleeper)
        .await
        .expect("sleeper released")
        .expect("join");
}
