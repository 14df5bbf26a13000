use grading::*;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tickos::thread::{Current, JoinHandle, ThreadBuilder, ThreadState, get_state_by_tid};
use tickos_threads::TernaryReaction;

fn spawn_a(reaction: &Arc<TernaryReaction>) -> JoinHandle {
    let reaction = reaction.clone();
    ThreadBuilder::new("a").spawn(move || reaction.a_ready())
}

fn spawn_b(reaction: &Arc<TernaryReaction>) -> JoinHandle {
    let reaction = reaction.clone();
    ThreadBuilder::new("b").spawn(move || reaction.b_ready())
}

/// Two A threads and one B thread, five times over.
fn run_water(reaction: &Arc<TernaryReaction>) {
    let mut handles = Vec::new();
    for _ in 0..5 {
        handles.push(spawn_a(reaction));
        handles.push(spawn_a(reaction));
        handles.push(spawn_b(reaction));
    }
    for handle in handles {
        assert_eq!(handle.join(), 0);
    }
}

pub fn water() {
    let reaction = Arc::new(TernaryReaction::new());
    run_water(&reaction);
    assert_eq!(reaction.reactions(), 5);
    assert_eq!(reaction.waiting_a(), 0);
    assert_eq!(reaction.waiting_b(), 0);
}

#[assert_log_count("Reaction", 5)]
pub fn reaction_is_logged() {
    run_water(&Arc::new(TernaryReaction::new()));
}

pub fn none_before_group() {
    let reaction = Arc::new(TernaryReaction::new());

    let first = [spawn_a(&reaction), spawn_b(&reaction)];
    while reaction.waiting_a() + reaction.waiting_b() < 2 {
        Current::yield_now();
    }
    assert_eq!(reaction.reactions(), 0, "One A and one B must not react.");

    let last = spawn_a(&reaction);
    assert_eq!(last.join(), 0);
    for handle in first {
        assert_eq!(handle.join(), 0);
    }
    assert_eq!(reaction.reactions(), 1);

    let lonely = Arc::new(TernaryReaction::new());
    let _bs = [spawn_b(&lonely), spawn_b(&lonely), spawn_b(&lonely)];
    let _a = spawn_a(&lonely);
    while lonely.waiting_a() + lonely.waiting_b() < 4 {
        Current::yield_now();
    }
    assert_eq!(lonely.reactions(), 0, "B participants alone must not react.");
}

pub fn reaction_counts() {
    for (a, b) in [(2, 1), (4, 1), (1, 3), (6, 3), (7, 2), (3, 5), (9, 4)] {
        let fired = Arc::new(AtomicUsize::new(0));
        let reaction = {
            let fired = fired.clone();
            Arc::new(TernaryReaction::with_reaction(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            }))
        };

        // Interleave the arrivals: A, B, A, B, ... until one kind runs out.
        let (mut left_a, mut left_b) = (a, b);
        let mut handles = Vec::new();
        while left_a + left_b > 0 {
            if left_a > 0 {
                handles.push(spawn_a(&reaction));
                left_a -= 1;
            }
            if left_b > 0 {
                handles.push(spawn_b(&reaction));
                left_b -= 1;
            }
        }

        // Once nobody can run, every survivor sleeps inside the reaction.
        while handles.iter().any(|handle| {
            matches!(
                get_state_by_tid(handle.tid),
                Ok(ThreadState::Runnable | ThreadState::Running)
            )
        }) {
            Current::yield_now();
        }

        let expected = (a / 2).min(b);
        assert_eq!(reaction.reactions(), expected, "{a} A and {b} B");
        assert_eq!(fired.load(Ordering::SeqCst), expected, "{a} A and {b} B");
        assert_eq!(reaction.waiting_a(), a - 2 * expected);
        assert_eq!(reaction.waiting_b(), b - expected);
    }
}
