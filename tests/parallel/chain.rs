//! Regression coverage for tightly dependent chains, where one resource
//! links each instruction to the next.

use depflow::Engine;
use parking_lot::Mutex;
use std::sync::Arc;

// A = B + C; D = A + Z; C = D. Every pair of instructions shares a
// resource, so all three serialize through the dependency discipline no
// matter how the workers interleave.
#[test]
fn tightly_dependent_chain_serializes() {
    for _ in 0..20 {
        let engine = Engine::new();
        let a_tag = engine.new_named_variable("A").unwrap();
        let b_tag = engine.new_named_variable("B").unwrap();
        let c_tag = engine.new_named_variable("C").unwrap();
        let d_tag = engine.new_named_variable("D").unwrap();
        let z_tag = engine.new_named_variable("Z").unwrap();

        let a = Arc::new(Mutex::new(0.0f64));
        let b = Arc::new(Mutex::new(1.0f64));
        let c = Arc::new(Mutex::new(2.0f64));
        let d = Arc::new(Mutex::new(0.0f64));
        let z = Arc::new(Mutex::new(10.0f64));

        {
            let _running = engine.scope().unwrap();
            engine
                .push(
                    {
                        let (a, b, c) = (Arc::clone(&a), Arc::clone(&b), Arc::clone(&c));
                        move || *a.lock() = *b.lock() + *c.lock()
                    },
                    &[b_tag.clone(), c_tag.clone()],
                    &[a_tag.clone()],
                )
                .unwrap();
            engine
                .push(
                    {
                        let (a, d, z) = (Arc::clone(&a), Arc::clone(&d), Arc::clone(&z));
                        move || *d.lock() = *a.lock() + *z.lock()
                    },
                    &[a_tag.clone(), z_tag.clone()],
                    &[d_tag.clone()],
                )
                .unwrap();
            engine
                .push(
                    {
                        let (c, d) = (Arc::clone(&c), Arc::clone(&d));
                        move || *c.lock() = *d.lock()
                    },
                    &[d_tag.clone()],
                    &[c_tag.clone()],
                )
                .unwrap();
        }

        assert_eq!(*a.lock(), 3.0);
        assert_eq!(*d.lock(), 13.0);
        assert_eq!(*c.lock(), 13.0);
    }
}

// The same shape with the middle instruction reading its own output tag:
// push(fn, R, W) with overlapping sets behaves as push(fn, R \ W, W).
#[test]
fn overlapping_read_and_mutate_sets_count_once() {
    let engine = Engine::new();
    let acc_tag = engine.new_named_variable("acc").unwrap();
    let acc = Arc::new(Mutex::new(0u64));

    {
        let _running = engine.scope().unwrap();
        for i in 1..=10 {
            engine
                .push(
                    {
                        let acc = Arc::clone(&acc);
                        move || *acc.lock() += i
                    },
                    // Reading and mutating the same resource is one claim
                    // under the mutate discipline.
                    &[acc_tag.clone()],
                    &[acc_tag.clone()],
                )
                .unwrap();
        }
    }

    assert_eq!(*acc.lock(), 55);
}
