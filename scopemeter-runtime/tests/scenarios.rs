//! End-to-end timing scenarios on the calling thread's own tree.
//!
//! Each test runs on its own harness thread, so its local tree starts empty.

use std::thread;
use std::time::Duration;

use scopemeter_runtime::{enter, render, reset_local, with_local_tree, RenderOptions};

const TEN_MS: Duration = Duration::from_millis(10);
/// Upper slack for sleep overshoot on loaded CI machines.
const SLACK: Duration = Duration::from_millis(40);

fn work() {
    let _g = enter("work");
    thread::sleep(TEN_MS);
}

fn inner() {
    let _g = enter("inner");
    thread::sleep(TEN_MS);
}

fn outer() {
    let _g = enter("outer");
    thread::sleep(TEN_MS);
    inner();
}

#[test]
fn repeated_calls_accumulate_real_time() {
    work();
    work();

    with_local_tree(|tree| {
        let work = tree.root().child("work").unwrap();
        assert_eq!(work.call_count(), 2);
        let real = work.real_duration();
        assert!(real >= 2 * TEN_MS, "real {real:?} below sleep time");
        assert!(real < 2 * TEN_MS + SLACK, "real {real:?} far above sleep time");
    });
}

#[test]
fn outer_body_excludes_inner() {
    outer();

    with_local_tree(|tree| {
        let outer = tree.root().child("outer").unwrap();
        let inner = outer.child("inner").unwrap();

        assert_eq!(outer.call_count(), 1);
        assert_eq!(inner.call_count(), 1);
        assert!(outer.real_duration() >= inner.real_duration());
        assert_eq!(
            outer.real_node_duration(),
            outer.real_duration() - inner.real_duration()
        );
        assert!(outer.real_node_duration() >= TEN_MS);
        assert!(inner.real_duration() >= TEN_MS);
    });
}

#[test]
fn recursion_nests_by_depth() {
    fn countdown(n: u32) {
        let _g = enter("countdown");
        if n > 0 {
            countdown(n - 1);
        }
    }

    countdown(3);
    with_local_tree(|tree| {
        let mut branch = tree.root().child("countdown").unwrap();
        for _ in 0..3 {
            assert_eq!(branch.call_count(), 1);
            branch = branch.child("countdown").unwrap();
        }
        assert!(!branch.has_children());
        assert_eq!(tree.totals()["countdown"].calls, 4);
    });
}

#[test]
fn report_lists_scopes_in_ascending_order() {
    {
        let _fast = enter("report_fast");
        thread::sleep(Duration::from_millis(2));
    }
    {
        let _slow = enter("report_slow");
        thread::sleep(Duration::from_millis(20));
    }

    let text = with_local_tree(|tree| render::branch_durations(tree, &RenderOptions::default()));
    let fast = text.find("report_fast").expect("fast listed");
    let slow = text.find("report_slow").expect("slow listed");
    assert!(fast < slow, "ascending order expected:\n{text}");
}

#[test]
fn reset_local_clears_measurements() {
    work();
    reset_local();
    with_local_tree(|tree| assert!(tree.is_empty()));
    work();
    with_local_tree(|tree| {
        assert_eq!(tree.root().child("work").unwrap().call_count(), 1);
    });
}
