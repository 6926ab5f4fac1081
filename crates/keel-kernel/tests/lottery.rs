//! Statistical and determinism checks for the ticket-weighted policy.

use keel_kernel::{Policy, Random, Scheduler, ThreadHandle};

fn handle(id: u32) -> ThreadHandle {
    ThreadHandle::new(id).expect("nonzero handle")
}

#[test]
fn ticket_counts_weight_the_draw() {
    let mut sched = Scheduler::new(Policy::Lottery, Random::seeded(0xC0FFEE));
    let poor = handle(1);
    let rich = handle(2);
    sched.set_base_priority(poor, 1);
    sched.set_base_priority(rich, 99);
    let q = sched.new_queue(true);
    sched.enqueue(q, poor);
    sched.enqueue(q, rich);

    let draws = 10_000;
    let mut rich_wins = 0;
    for _ in 0..draws {
        if sched.select(q) == Some(rich) {
            rich_wins += 1;
        }
    }
    // expectation is 9_900 of 10_000; the band is ~8 standard deviations
    assert!(
        (9_800..=9_980).contains(&rich_wins),
        "rich won {rich_wins} of {draws} draws"
    );
}

#[test]
fn single_waiter_always_wins() {
    let mut sched = Scheduler::new(Policy::Lottery, Random::seeded(1));
    let only = handle(1);
    let q = sched.new_queue(true);
    sched.enqueue(q, only);
    for _ in 0..100 {
        assert_eq!(sched.select(q), Some(only));
    }
}

#[test]
fn seeded_draws_replay_identically() {
    let build = || {
        let mut sched = Scheduler::new(Policy::Lottery, Random::seeded(42));
        let q = sched.new_queue(true);
        for id in 1..=5 {
            let t = handle(id);
            sched.set_base_priority(t, id * 7);
            sched.enqueue(q, t);
        }
        (sched, q)
    };
    let (mut a, qa) = build();
    let (mut b, qb) = build();
    for _ in 0..200 {
        assert_eq!(a.select(qa), b.select(qb));
    }
}
