//! A failing instruction must still release the resources it holds;
//! otherwise every later toucher of those resources deadlocks the drain.

use crate::support;
use depflow::Engine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[test]
fn panicking_writer_releases_its_resource() {
    support::init_logging();
    let engine = Engine::new();
    let q = engine.new_named_variable("Q").unwrap();
    let reader_ran = Arc::new(AtomicBool::new(false));

    {
        let _running = engine.scope().unwrap();
        engine
            .push(|| panic!("kernel failure"), &[], &[q.clone()])
            .unwrap();
        engine
            .push(
                {
                    let reader_ran = Arc::clone(&reader_ran);
                    move || reader_ran.store(true, Ordering::SeqCst)
                },
                &[q.clone()],
                &[],
            )
            .unwrap();
    }

    // The scope exit returning at all shows the drain was not wedged.
    assert!(reader_ran.load(Ordering::SeqCst));
}

#[test]
fn panicking_body_still_reports_completion() {
    support::init_logging();
    let engine = Engine::new();
    let q = engine.new_named_variable("Q").unwrap();
    let completed = Arc::new(AtomicBool::new(false));

    {
        let _running = engine.scope().unwrap();
        engine
            .push_with_completion(
                || panic!("kernel failure"),
                &[],
                &[q.clone()],
                {
                    let completed = Arc::clone(&completed);
                    move || completed.store(true, Ordering::SeqCst)
                },
            )
            .unwrap();
    }

    assert!(completed.load(Ordering::SeqCst));
}

#[test]
fn resource_stays_usable_across_cycles_after_a_panic() {
    let engine = Engine::new();
    let q = engine.new_named_variable("Q").unwrap();
    let fired = Arc::new(AtomicBool::new(false));

    engine.start().unwrap();
    engine.push(|| panic!("first cycle"), &[], &[q.clone()]).unwrap();
    engine.stop().unwrap();

    engine.start().unwrap();
    engine
        .push(
            {
                let fired = Arc::clone(&fired);
                move || fired.store(true, Ordering::SeqCst)
            },
            &[],
            &[q],
        )
        .unwrap();
    engine.stop().unwrap();

    assert!(fired.load(Ordering::SeqCst));
}
