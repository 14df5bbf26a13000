//! # Ternary reaction.
//!
//! A [`TernaryReaction`] assembles groups of three participants: two of kind
//! A and one of kind B. Think of hydrogen and oxygen atoms making water. A
//! participant announces itself with [`a_ready`] or [`b_ready`]. If its
//! arrival completes a group, it wakes the two waiting partners, fires the
//! reaction and returns; otherwise it waits to be picked up by a later
//! arrival.
//!
//! Every waiting participant sleeps on its own condition variable, so the
//! participant completing a group wakes exactly its partners. The queues never
//! hold enough participants to assemble a group: the arrival that could
//! complete one always does. With `a` arrivals of kind A and `b` of kind B,
//! exactly `min(a / 2, b)` reactions fire.
//!
//! [`a_ready`]: TernaryReaction::a_ready
//! [`b_ready`]: TernaryReaction::b_ready
use crate::sync::ConditionVariable;
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tickos::{
    sync::{Lock, SpinLock},
    thread::Current,
};

type Reaction = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Reactants {
    a: VecDeque<Arc<ConditionVariable>>,
    b: VecDeque<Arc<ConditionVariable>>,
}

/// Groups two A participants with one B participant.
pub struct TernaryReaction {
    lock: Arc<Lock>,
    reactants: SpinLock<Reactants>,
    reactions: AtomicUsize,
    on_reaction: Reaction,
}

impl Default for TernaryReaction {
    fn default() -> Self {
        Self::new()
    }
}

impl TernaryReaction {
    /// Creates a reaction that logs every fired reaction.
    pub fn new() -> Self {
        Self::with_reaction(|| log::info!("Reaction: 2 A + 1 B combined."))
    }

    /// Creates a reaction that runs `on_reaction` every time a group is
    /// assembled.
    ///
    /// `on_reaction` runs on the thread completing the group, while the
    /// reaction's lock is held.
    pub fn with_reaction(on_reaction: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            lock: Arc::new(Lock::new()),
            reactants: SpinLock::new(Reactants::default()),
            reactions: AtomicUsize::new(0),
            on_reaction: Box::new(on_reaction),
        }
    }

    /// Announces an A participant.
    ///
    /// Returns once the participant took part in a reaction.
    pub fn a_ready(&self) {
        log::debug!("A participant call: thread {}", Current::get_tid());
        self.lock.acquire();
        let mut reactants = self.reactants.lock();
        if reactants.a.is_empty() || reactants.b.is_empty() {
            let me = Arc::new(ConditionVariable::new(self.lock.clone()));
            reactants.a.push_back(me.clone());
            reactants.unlock();
            me.sleep();
        } else {
            let partners = [reactants.b.pop_front(), reactants.a.pop_front()];
            reactants.unlock();
            self.react(partners);
        }
        self.lock.release();
    }

    /// Announces a B participant.
    ///
    /// Returns once the participant took part in a reaction.
    pub fn b_ready(&self) {
        log::debug!("B participant call: thread {}", Current::get_tid());
        self.lock.acquire();
        let mut reactants = self.reactants.lock();
        if reactants.a.len() < 2 {
            let me = Arc::new(ConditionVariable::new(self.lock.clone()));
            reactants.b.push_back(me.clone());
            reactants.unlock();
            me.sleep();
        } else {
            let partners = [reactants.a.pop_front(), reactants.a.pop_front()];
            reactants.unlock();
            self.react(partners);
        }
        self.lock.release();
    }

    fn react(&self, partners: [Option<Arc<ConditionVariable>>; 2]) {
        for partner in partners.into_iter().flatten() {
            partner.wake();
        }
        self.reactions.fetch_add(1, Ordering::SeqCst);
        (self.on_reaction)();
    }

    /// Number of reactions fired so far.
    pub fn reactions(&self) -> usize {
        self.reactions.load(Ordering::SeqCst)
    }

    /// Number of A participants waiting for partners.
    pub fn waiting_a(&self) -> usize {
        let reactants = self.reactants.lock();
        let len = reactants.a.len();
        reactants.unlock();
        len
    }

    /// Number of B participants waiting for partners.
    pub fn waiting_b(&self) -> usize {
        let reactants = self.reactants.lock();
        let len = reactants.b.len();
        reactants.unlock();
        len
    }
}
