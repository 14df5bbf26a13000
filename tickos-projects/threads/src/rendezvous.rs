//! # Rendezvous.
//!
//! A [`Rendezvous`] pairs speakers with listeners. Each [`speak`] is matched
//! with exactly one [`listen`], and the speaker's value is handed to that
//! listener. Whoever arrives first waits for a partner; whoever arrives second
//! completes the exchange without blocking.
//!
//! Each waiting participant gets its own condition variable, so a wakeup is
//! always addressed to the intended partner. Participants of the same role are
//! paired in arrival order. At any time, at most one of the two waiting queues
//! is non-empty.
//!
//! [`speak`]: Rendezvous::speak
//! [`listen`]: Rendezvous::listen
use crate::sync::ConditionVariable;
use std::{collections::VecDeque, sync::Arc};
use tickos::{
    sync::{Lock, SpinLock},
    thread::Current,
};

/// A thread waiting in [`Rendezvous::speak`] or [`Rendezvous::listen`].
struct Pending<T> {
    cond: ConditionVariable,
    slot: SpinLock<Option<T>>,
}

impl<T> Pending<T> {
    fn new(lock: Arc<Lock>, value: Option<T>) -> Arc<Self> {
        Arc::new(Self {
            cond: ConditionVariable::new(lock),
            slot: SpinLock::new(value),
        })
    }

    fn put(&self, value: T) {
        let mut slot = self.slot.lock();
        *slot = Some(value);
        slot.unlock();
    }

    fn take(&self) -> T {
        let mut slot = self.slot.lock();
        let value = slot.take();
        slot.unlock();
        match value {
            Some(value) => value,
            None => unreachable!("A rendezvous delivers exactly one value per pair."),
        }
    }
}

struct Queues<T> {
    speakers: VecDeque<Arc<Pending<T>>>,
    listeners: VecDeque<Arc<Pending<T>>>,
}

/// A synchronous, unbuffered channel between speakers and listeners.
pub struct Rendezvous<T> {
    lock: Arc<Lock>,
    queues: SpinLock<Queues<T>>,
}

impl<T: Send> Default for Rendezvous<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> Rendezvous<T> {
    /// Creates a rendezvous with nobody waiting.
    pub fn new() -> Self {
        Self {
            lock: Arc::new(Lock::new()),
            queues: SpinLock::new(Queues {
                speakers: VecDeque::new(),
                listeners: VecDeque::new(),
            }),
        }
    }

    /// Hands `value` to a listener, waiting for one if none is waiting.
    pub fn speak(&self, value: T) {
        self.lock.acquire();
        log::debug!("Speaker call: thread {}", Current::get_tid());

        let mut queues = self.queues.lock();
        match queues.listeners.pop_front() {
            Some(listener) => {
                queues.unlock();
                listener.put(value);
                listener.cond.wake();
            }
            None => {
                let me = Pending::new(self.lock.clone(), Some(value));
                queues.speakers.push_back(me.clone());
                queues.unlock();
                me.cond.sleep();
            }
        }

        self.lock.release();
    }

    /// Receives a value from a speaker, waiting for one if none is waiting.
    pub fn listen(&self) -> T {
        self.lock.acquire();
        log::debug!("Listener call: thread {}", Current::get_tid());

        let mut queues = self.queues.lock();
        let value = match queues.speakers.pop_front() {
            Some(speaker) => {
                queues.unlock();
                let value = speaker.take();
                speaker.cond.wake();
                value
            }
            None => {
                let me = Pending::new(self.lock.clone(), None);
                queues.listeners.push_back(me.clone());
                queues.unlock();
                me.cond.sleep();
                me.take()
            }
        };

        self.lock.release();
        value
    }

    /// Number of speakers waiting for a listener.
    pub fn waiting_speakers(&self) -> usize {
        let queues = self.queues.lock();
        let len = queues.speakers.len();
        queues.unlock();
        len
    }

    /// Number of listeners waiting for a speaker.
    pub fn waiting_listeners(&self) -> usize {
        let queues = self.queues.lock();
        let len = queues.listeners.len();
        queues.unlock();
        len
    }
}
