//! Unit tests for worker reuse and slot recycling.

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crate::{Pool, PoolConfig, PoolError};

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn test_invalid_config_rejected() {
    assert_eq!(
        Pool::new(PoolConfig::new(0, Duration::from_secs(1))).unwrap_err(),
        PoolError::InvalidCapacity
    );
    assert_eq!(
        Pool::new(PoolConfig::new(1, Duration::ZERO)).unwrap_err(),
        PoolError::InvalidExpiry
    );
}

#[test]
fn test_sequential_tasks_reuse_one_worker() {
    let pool = Pool::with_capacity(4).unwrap();
    let (tx, rx) = mpsc::channel();

    for i in 0..10 {
        let tx = tx.clone();
        pool.submit(move || tx.send(i).unwrap()).unwrap();
        assert_eq!(rx.recv().unwrap(), i);
        assert!(wait_until(Duration::from_secs(1), || pool.idle() == 1));
    }

    assert_eq!(pool.running(), 1);
    assert_eq!(pool.allocated_slots(), 1);
}

#[test]
fn test_expired_slots_are_recycled() {
    let pool = Pool::new(PoolConfig::new(2, Duration::from_millis(30))).unwrap();
    let (tx, rx) = mpsc::channel();

    for round in 0..3 {
        for _ in 0..2 {
            let tx = tx.clone();
            pool.submit(move || {
                thread::sleep(Duration::from_millis(20));
                tx.send(round).unwrap();
            })
            .unwrap();
        }
        rx.recv().unwrap();
        rx.recv().unwrap();

        assert!(wait_until(Duration::from_secs(2), || pool.running() == 0));
        assert_eq!(pool.idle(), 0);
    }

    assert!(pool.allocated_slots() <= 2);
}
