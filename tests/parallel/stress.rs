//! Randomized instructions over a handful of resources, with the access
//! protocol re-checked from inside the instruction bodies.

use crate::support;
use depflow::Engine;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const N_TAGS: usize = 4;
const N_INSTRUCTIONS: usize = 200;

#[test]
fn randomized_instructions_respect_the_access_protocol() {
    support::init_logging();
    let mut rng = rand::thread_rng();

    let engine = Engine::new();
    let tags: Vec<_> = (0..N_TAGS)
        .map(|i| engine.new_named_variable(&format!("t{}", i)).unwrap())
        .collect();

    let writer_active: Arc<Vec<AtomicUsize>> =
        Arc::new((0..N_TAGS).map(|_| AtomicUsize::new(0)).collect());
    let reader_active: Arc<Vec<AtomicUsize>> =
        Arc::new((0..N_TAGS).map(|_| AtomicUsize::new(0)).collect());
    let mutator_log: Arc<Vec<Mutex<Vec<usize>>>> =
        Arc::new((0..N_TAGS).map(|_| Mutex::new(Vec::new())).collect());
    let violations = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    {
        let _running = engine.scope().unwrap();
        for id in 0..N_INSTRUCTIONS {
            let mut read_idx = Vec::new();
            let mut mutate_idx = Vec::new();
            for t in 0..N_TAGS {
                if rng.gen_bool(0.25) {
                    mutate_idx.push(t);
                } else if rng.gen_bool(0.35) {
                    read_idx.push(t);
                }
            }
            if read_idx.is_empty() && mutate_idx.is_empty() {
                mutate_idx.push(rng.gen_range(0..N_TAGS));
            }

            let reads: Vec<_> = read_idx.iter().map(|&t| tags[t].clone()).collect();
            let mutates: Vec<_> = mutate_idx.iter().map(|&t| tags[t].clone()).collect();

            let body = {
                let writer_active = Arc::clone(&writer_active);
                let reader_active = Arc::clone(&reader_active);
                let mutator_log = Arc::clone(&mutator_log);
                let violations = Arc::clone(&violations);
                let completed = Arc::clone(&completed);
                move || {
                    for &t in &mutate_idx {
                        if writer_active[t].fetch_add(1, Ordering::SeqCst) != 0
                            || reader_active[t].load(Ordering::SeqCst) != 0
                        {
                            let _ = violations.fetch_add(1, Ordering::SeqCst);
                        }
                        mutator_log[t].lock().push(id);
                    }
                    for &t in &read_idx {
                        let _ = reader_active[t].fetch_add(1, Ordering::SeqCst);
                        if writer_active[t].load(Ordering::SeqCst) != 0 {
                            let _ = violations.fetch_add(1, Ordering::SeqCst);
                        }
                    }

                    thread::sleep(Duration::from_micros((id % 7) as u64 * 300));

                    for &t in &read_idx {
                        let _ = reader_active[t].fetch_sub(1, Ordering::SeqCst);
                    }
                    for &t in &mutate_idx {
                        let _ = writer_active[t].fetch_sub(1, Ordering::SeqCst);
                    }
                    let _ = completed.fetch_add(1, Ordering::SeqCst);
                }
            };
            engine.push(body, &reads, &mutates).unwrap();
        }
    }

    assert_eq!(completed.load(Ordering::SeqCst), N_INSTRUCTIONS);
    assert_eq!(
        violations.load(Ordering::SeqCst),
        0,
        "writer exclusion was violated"
    );

    // Per resource, mutators ran in submission order.
    for (t, log) in mutator_log.iter().enumerate() {
        let ids = log.lock();
        assert!(
            ids.windows(2).all(|pair| pair[0] < pair[1]),
            "mutators of t{} ran out of order: {:?}",
            t,
            *ids
        );
    }
}
