use completable::{Future, FutureError, Status};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::channel;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
pub fn test_complete_then_get_returns_value() {
    let f = Future::new();

    f.complete("zomg".to_string()).unwrap();

    assert_eq!(f.get().unwrap(), "zomg");
    assert!(f.complete("other".to_string()).is_err());
    assert_eq!(f.get().unwrap(), "zomg");
}

#[test]
pub fn test_get_blocks_until_completed_on_other_thread() {
    let f = Future::new();
    let c = f.clone();

    thread::spawn(move || {
        thread::sleep(millis(50));
        c.complete(42u32).unwrap();
    });

    assert_eq!(f.get().unwrap(), 42);
}

#[test]
pub fn test_get_timeout_elapses_while_pending() {
    let f = Future::<u32>::new();

    let err = f.get_timeout(millis(20)).unwrap_err();

    assert!(matches!(err, FutureError::Timeout(d) if d == millis(20)));
    assert_eq!(f.status(), Status::Pending);
    assert!(f.complete(1).is_ok());
}

#[test]
pub fn test_get_timeout_wakes_on_completion() {
    let f = Future::new();
    let c = f.clone();

    thread::spawn(move || {
        thread::sleep(millis(20));
        c.complete("late").unwrap();
    });

    assert_eq!(f.get_timeout(Duration::from_secs(10)).unwrap(), "late");
}

#[test]
pub fn test_cancel_wakes_blocked_getter() {
    let f = Future::<u32>::new();
    let c = f.clone();

    thread::spawn(move || {
        thread::sleep(millis(50));
        assert!(c.cancel());
    });

    assert!(f.get().unwrap_err().is_cancellation_error());
}

#[test]
pub fn test_continuations_before_and_after_completion_each_run_once() {
    let f = Future::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = channel();

    for _ in 0..3 {
        let hits = hits.clone();
        let tx = tx.clone();
        f.on_complete(move |v: u32| {
            hits.fetch_add(1, Ordering::SeqCst);
            tx.send(v).unwrap();
        }, |_| panic!("unexpected error"));
    }

    f.complete(5).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    let h = hits.clone();
    f.on_complete(move |v| {
        h.fetch_add(1, Ordering::SeqCst);
        tx.send(v).unwrap();
    }, |_| panic!("unexpected error"));

    assert_eq!(hits.load(Ordering::SeqCst), 4);
    assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![5, 5, 5, 5]);
}

#[test]
pub fn test_on_error_receives_cancellation() {
    let f = Future::<u32>::new();
    let (tx, rx) = channel();

    let done = f.on_complete(|_| panic!("unexpected value"), move |e| tx.send(e).unwrap());

    f.cancel();

    assert!(rx.recv().unwrap().is_cancellation_error());
    assert!(done.get().is_ok());
}

#[test]
pub fn test_map_completed_future() {
    let f = Future::completed(20u32);

    let m = f.map(|v| v * 2 + 2);

    assert_eq!(m.get().unwrap(), 42);
}

#[test]
pub fn test_map_registered_before_completion() {
    let f = Future::new();
    let m = f.map(|s: &'static str| s.len());

    assert_eq!(m.status(), Status::Pending);
    f.complete("four").unwrap();

    assert_eq!(m.get().unwrap(), 4);
}

#[test]
pub fn test_map_cancelled_future_is_cancelled() {
    let f = Future::<u32>::new();
    let invoked = Arc::new(AtomicUsize::new(0));
    let i = invoked.clone();

    let m = f.map(move |v| {
        i.fetch_add(1, Ordering::SeqCst);
        v
    });

    assert!(f.cancel());

    assert_eq!(m.status(), Status::Cancelled);
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
}

#[test]
pub fn test_map_propagates_failure_cause() {
    let f = Future::<u32>::new();
    let m = f.map(|v| v + 1);

    f.fail("nope").unwrap();

    let err = m.get().unwrap_err();
    assert_eq!(err.cause().unwrap().to_string(), "nope");
}

#[test]
pub fn test_map_panic_fails_derived_future() {
    let f = Future::completed(1u32);

    let m = f.map(|_| -> u32 { panic!("bad transform") });

    let err = m.get().unwrap_err();
    assert!(err.is_execution_error());
    assert!(err.to_string().contains("bad transform"));
    assert_eq!(f.get().unwrap(), 1);
}

#[test]
pub fn test_and_then_links_inner_future() {
    let f = Future::new();
    let inner = Future::new();
    let i = inner.clone();

    let chained = f.and_then(move |v: u32| i.map(move |w: u32| v + w));

    f.complete(1).unwrap();
    assert_eq!(chained.status(), Status::Pending);

    inner.complete(2).unwrap();
    assert_eq!(chained.get().unwrap(), 3);
}

#[test]
pub fn test_and_then_propagates_inner_cancellation() {
    let inner = Future::<u32>::new();
    let i = inner.clone();

    let chained = Future::completed(()).and_then(move |()| i);

    inner.cancel();
    assert!(chained.get().unwrap_err().is_cancellation_error());
}

#[test]
pub fn test_cancelling_derived_future_leaves_source_pending() {
    let f = Future::<u32>::new();
    let m = f.map(|v| v);

    assert!(m.cancel());

    assert_eq!(f.status(), Status::Pending);
    f.complete(3).unwrap();
    assert!(m.get().unwrap_err().is_cancellation_error());
}

#[test]
pub fn test_racing_terminal_transitions_have_one_winner() {
    for _ in 0..50 {
        let f = Future::<usize>::new();
        let workers = 8;
        let barrier = Arc::new(Barrier::new(workers));
        let wins = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..workers)
            .map(|i| {
                let f = f.clone();
                let barrier = barrier.clone();
                let wins = wins.clone();

                thread::spawn(move || {
                    barrier.wait();

                    let won = match i % 3 {
                        0 => f.complete(i).is_ok(),
                        1 => f.fail(format!("worker {}", i)).is_ok(),
                        _ => f.cancel(),
                    };

                    if won {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }

                    f.poll().unwrap().map_err(|e| e.to_string())
                })
            })
            .collect();

        let observed: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(wins.load(Ordering::SeqCst), 1);

        let last = f.get().map_err(|e| e.to_string());
        for seen in observed {
            assert_eq!(seen, last);
        }
    }
}

#[test]
pub fn test_on_complete_racing_complete_runs_each_callback_once() {
    for _ in 0..50 {
        let f = Future::<usize>::new();
        let registrars = 7;
        let barrier = Arc::new(Barrier::new(registrars + 1));
        let hits = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = channel();

        let handles: Vec<_> = (0..registrars)
            .map(|_| {
                let f = f.clone();
                let barrier = barrier.clone();
                let hits = hits.clone();
                let tx = tx.clone();

                thread::spawn(move || {
                    barrier.wait();

                    f.on_complete(move |v| {
                        hits.fetch_add(1, Ordering::SeqCst);
                        tx.send(v).unwrap();
                    }, |e| panic!("unexpected error: {}", e))
                })
            })
            .collect();

        let c = f.clone();
        let b = barrier.clone();
        let producer = thread::spawn(move || {
            b.wait();
            c.complete(99).unwrap();
        });

        producer.join().unwrap();

        for h in handles {
            // Each callback has run once the future it returned is done
            h.join().unwrap().get().unwrap();
        }

        assert_eq!(hits.load(Ordering::SeqCst), registrars);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![99; registrars]);
    }
}

const CHAIN_LEN: u64 = 100_000;

// Runs `op` on a thread with a 2 MiB stack
fn on_small_stack<F>(op: F)
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(op)
        .unwrap()
        .join()
        .unwrap();
}

#[test]
pub fn test_completing_long_map_chain_does_not_overflow() {
    on_small_stack(|| {
        let f = Future::<u64>::new();
        let mut last = f.clone();

        for _ in 0..CHAIN_LEN {
            last = last.map(|v| v + 1);
        }

        f.complete(0).unwrap();

        assert_eq!(last.get().unwrap(), CHAIN_LEN);
    });
}

#[test]
pub fn test_long_and_then_chain_does_not_overflow() {
    on_small_stack(|| {
        let f = Future::<u64>::new();
        let mut last = f.clone();

        for _ in 0..CHAIN_LEN {
            last = last.and_then(|v| Future::completed(v + 1));
        }

        f.complete(0).unwrap();

        assert_eq!(last.get().unwrap(), CHAIN_LEN);
    });
}

#[test]
pub fn test_dropping_long_pending_chain_does_not_overflow() {
    on_small_stack(|| {
        let f = Future::<u64>::new();
        let mut last = f.clone();

        for _ in 0..CHAIN_LEN {
            last = last.map(|v| v + 1);
        }

        drop(last);
        drop(f);
    });
}

#[test]
pub fn test_cancelling_long_chain_cancels_the_tail() {
    on_small_stack(|| {
        let f = Future::<u64>::new();
        let mut last = f.clone();

        for _ in 0..CHAIN_LEN {
            last = last.map(|v| v + 1);
        }

        assert!(f.cancel());

        assert!(last.get().unwrap_err().is_cancellation_error());
    });
}

proptest! {
    #[test]
    fn prop_first_completion_is_never_overwritten(first in any::<i64>(), rest in prop::collection::vec(any::<i64>(), 0..8)) {
        let f = Future::new();
        f.complete(first).unwrap();

        for v in rest {
            let rejected = matches!(f.complete(v), Err(FutureError::IllegalState(Status::Completed)));
            prop_assert!(rejected);
            prop_assert!(!f.cancel());
        }

        prop_assert_eq!(f.get().unwrap(), first);
    }

    #[test]
    fn prop_continuations_fire_in_registration_order(count in 0usize..32) {
        let f = Future::new();
        let (tx, rx) = channel();

        for i in 0..count {
            let tx = tx.clone();
            f.on_complete(move |()| tx.send(i).unwrap(), |_| {});
        }

        f.complete(()).unwrap();

        prop_assert_eq!(rx.try_iter().collect::<Vec<_>>(), (0..count).collect::<Vec<_>>());
    }
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
