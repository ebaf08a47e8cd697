//! Concurrent connect, disconnect and invoke on one delegate.

use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Instant;
use tether_signal::{Collect, Connection, Delegate, Event, Registry, ScopedConnection, Slot, Spin};

struct Counted(Arc<AtomicUsize>);

impl Counted {
    fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl Drop for Counted {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn churn_under_invocation() {
    const NUM_THREADS: usize = 6;
    const OPS_PER_THREAD: usize = 5_000;

    let event: Arc<Event<usize>> = Arc::new(Event::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let destroyed = Arc::new(AtomicUsize::new(0));
    let created = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(NUM_THREADS));
    let start = Instant::now();

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|_| {
            let event = event.clone();
            let calls = calls.clone();
            let destroyed = destroyed.clone();
            let created = created.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let mut rng = rand::rng();
                let mut mine: Vec<Connection> = Vec::new();
                barrier.wait();
                for i in 0..OPS_PER_THREAD {
                    match rng.random_range(0..4) {
                        0 => {
                            let calls = calls.clone();
                            let token = Counted(destroyed.clone());
                            created.fetch_add(1, Ordering::Relaxed);
                            mine.push(event.connect(move |_| {
                                assert_ne!(token.id(), 0);
                                calls.fetch_add(1, Ordering::Relaxed);
                            }));
                        }
                        1 if !mine.is_empty() => {
                            let i = rng.random_range(0..mine.len());
                            mine.swap_remove(i).disconnect();
                        }
                        _ => event.invoke(&i),
                    }
                }
                for conn in mine {
                    conn.disconnect();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    println!(
        "Churn: {} ops, {} calls in {:?}",
        NUM_THREADS * OPS_PER_THREAD,
        calls.load(Ordering::Relaxed),
        start.elapsed()
    );
    assert!(event.is_empty());
    assert_eq!(
        destroyed.load(Ordering::SeqCst),
        created.load(Ordering::SeqCst),
        "every disconnected subscriber must be destroyed"
    );
}

#[test]
#[cfg_attr(miri, ignore)]
fn disconnect_is_visible_to_later_invocations() {
    const ROUNDS: usize = 500;

    let event: Arc<Delegate<(), usize, Collect<usize>, Spin>> = Arc::new(Delegate::new());
    let _anchor = ScopedConnection::new(event.connect(|_| 0));

    for round in 1..=ROUNDS {
        let conn = event.connect(move |_| round);
        let barrier = Arc::new(Barrier::new(2));

        let invoker = {
            let event = event.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                event.invoke(&())
            })
        };
        barrier.wait();
        conn.disconnect();

        // Started before or after the disconnect; either way, at most once.
        let seen = invoker.join().unwrap();
        assert!(seen.iter().filter(|&&r| r == round).count() <= 1);
        assert!(!event.invoke(&()).contains(&round), "round {round}");
    }
    assert_eq!(event.len(), 1);
}

#[test]
#[cfg_attr(miri, ignore)]
fn fresh_subscriber_survives_concurrent_compaction() {
    const CHURN_THREADS: usize = 3;
    const ROUNDS: usize = 5_000;

    type Callback = dyn Fn(&()) -> usize + Send + Sync;

    fn add(registry: &Registry<Callback>, id: usize) -> Connection {
        registry.add(move |_: &()| id, |slot| slot as &Slot<Callback>)
    }

    let registry: Arc<Registry<Callback>> = Arc::new(Registry::new());
    let stop = Arc::new(AtomicBool::new(false));

    // Constant add/disconnect traffic keeps the live ratio low enough that
    // most snapshots take the compacting path.
    let churners: Vec<_> = (0..CHURN_THREADS)
        .map(|_| {
            let registry = registry.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    add(&registry, usize::MAX).disconnect();
                    drop(registry.snapshot());
                }
            })
        })
        .collect();

    let mut missing = 0;
    let mut kept = Vec::with_capacity(ROUNDS);
    for id in 0..ROUNDS {
        let conn = add(&registry, id);
        let seen = registry
            .snapshot()
            .iter()
            .any(|slot| (slot.callable())(&()) == id);
        if conn.connected() && !seen {
            missing += 1;
        }
        // Disconnect most of them so the list keeps churning; keep a few to
        // check they stay reachable.
        if id % 64 == 0 {
            kept.push((id, conn));
        } else {
            conn.disconnect();
        }
    }

    stop.store(true, Ordering::Relaxed);
    for h in churners {
        h.join().unwrap();
    }

    assert_eq!(missing, 0, "connected subscribers missing from the next snapshot");
    let ids: Vec<usize> = registry
        .snapshot()
        .iter()
        .map(|slot| (slot.callable())(&()))
        .collect();
    let expected: Vec<usize> = kept.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, expected);
    assert_eq!(registry.len(), kept.len());
}
