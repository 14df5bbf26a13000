use grading::*;
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tickos::{
    InterruptGuard, InterruptState,
    sync::{Lock, SpinLock},
    thread::{Current, ThreadBuilder, ThreadState, get_state_by_tid},
};
use tickos_threads::ConditionVariable;

pub fn sleep_reacquires_lock() {
    let lock = Arc::new(Lock::new());
    let cond = Arc::new(ConditionVariable::new(lock.clone()));
    let ready = Arc::new(AtomicBool::new(false));

    lock.acquire();
    let waker = {
        let (lock, cond, ready) = (lock.clone(), cond.clone(), ready.clone());
        ThreadBuilder::new("waker").spawn(move || {
            lock.acquire();
            ready.store(true, Ordering::SeqCst);
            cond.wake();
            lock.release();
        })
    };
    while !ready.load(Ordering::SeqCst) {
        cond.sleep();
        assert!(
            lock.is_held_by_current_thread(),
            "sleep() must return with the lock held."
        );
    }
    lock.release();
    assert_eq!(waker.join(), 0);
}

pub fn sleep_restores_interrupt_state() {
    let lock = Arc::new(Lock::new());
    let cond = Arc::new(ConditionVariable::new(lock.clone()));

    for masked in [true, false] {
        lock.acquire();
        let waker = {
            let (lock, cond) = (lock.clone(), cond.clone());
            ThreadBuilder::new("waker").spawn(move || {
                lock.acquire();
                cond.wake();
                lock.release();
            })
        };

        let guard = masked.then(InterruptGuard::new);
        cond.sleep();
        let expected = if masked {
            InterruptState::Off
        } else {
            InterruptState::On
        };
        assert_eq!(
            InterruptState::current(),
            expected,
            "sleep() must return with the interrupt state of its caller."
        );
        drop(guard);

        lock.release();
        assert_eq!(waker.join(), 0);
    }
}

pub fn wake_all_in_order() {
    const SLEEPERS: usize = 4;

    let lock = Arc::new(Lock::new());
    let cond = Arc::new(ConditionVariable::new(lock.clone()));
    let arrived = Arc::new(SpinLock::new(Vec::new()));
    let woken = Arc::new(SpinLock::new(Vec::new()));

    let sleepers = (0..SLEEPERS)
        .map(|id| {
            let (lock, cond) = (lock.clone(), cond.clone());
            let (arrived, woken) = (arrived.clone(), woken.clone());
            ThreadBuilder::new("sleeper").spawn(move || {
                lock.acquire();
                let mut guard = arrived.lock();
                guard.push(id);
                guard.unlock();

                cond.sleep();

                let mut guard = woken.lock();
                guard.push(id);
                guard.unlock();
                lock.release();
            })
        })
        .collect::<Vec<_>>();

    while cond.num_waiters() < SLEEPERS {
        Current::yield_now();
    }
    lock.acquire();
    cond.wake_all();
    assert_eq!(cond.num_waiters(), 0);
    lock.release();

    for sleeper in sleepers {
        assert_eq!(sleeper.join(), 0);
    }

    let (arrived, woken) = (arrived.lock(), woken.lock());
    assert_eq!(woken.len(), SLEEPERS);
    assert_eq!(*arrived, *woken, "Sleepers must wake up in arrival order.");
    woken.unlock();
    arrived.unlock();
}

pub fn wake_without_waiters() {
    let lock = Arc::new(Lock::new());
    let cond = ConditionVariable::new(lock.clone());

    lock.acquire();
    cond.wake();
    cond.wake_all();
    assert_eq!(cond.num_waiters(), 0);
    lock.release();
}

#[assert_exit_code(-1)]
pub fn sleep_without_lock() {
    let cond = ConditionVariable::new(Arc::new(Lock::new()));
    cond.sleep();
}

#[assert_exit_code(-1)]
pub fn wake_without_lock() {
    let lock = Arc::new(Lock::new());
    let cond = ConditionVariable::new(lock.clone());
    let holder = ThreadBuilder::new("holder").spawn(move || lock.acquire());
    assert_eq!(holder.join(), 0);

    // The lock is held, but not by us.
    cond.wake();
}

pub fn sleeper_is_parked() {
    let lock = Arc::new(Lock::new());
    let cond = Arc::new(ConditionVariable::new(lock.clone()));

    let sleeper = {
        let (lock, cond) = (lock.clone(), cond.clone());
        ThreadBuilder::new("sleeper").spawn(move || {
            lock.acquire();
            cond.sleep();
            lock.release();
        })
    };
    while cond.num_waiters() == 0 {
        Current::yield_now();
    }
    assert_eq!(
        get_state_by_tid(sleeper.tid),
        Ok(ThreadState::Parked),
        "A thread sleeping on a condition variable should be in Parked state"
    );

    lock.acquire();
    cond.wake();
    lock.release();
    assert_eq!(sleeper.join(), 0);
}

const CAPACITY: usize = 2;

struct Buffer {
    lock: Arc<Lock>,
    items: SpinLock<VecDeque<usize>>,
    not_full: ConditionVariable,
    not_empty: ConditionVariable,
}

impl Buffer {
    fn new() -> Self {
        let lock = Arc::new(Lock::new());
        Self {
            not_full: ConditionVariable::new(lock.clone()),
            not_empty: ConditionVariable::new(lock.clone()),
            lock,
            items: SpinLock::new(VecDeque::new()),
        }
    }

    fn len(&self) -> usize {
        let items = self.items.lock();
        let len = items.len();
        items.unlock();
        len
    }

    fn put(&self, value: usize) {
        self.lock.acquire();
        while self.len() == CAPACITY {
            self.not_full.sleep();
        }
        let mut items = self.items.lock();
        items.push_back(value);
        items.unlock();
        self.not_empty.wake();
        self.lock.release();
    }

    fn get(&self) -> usize {
        self.lock.acquire();
        while self.len() == 0 {
            self.not_empty.sleep();
        }
        let mut items = self.items.lock();
        let value = items.pop_front();
        items.unlock();
        self.not_full.wake();
        self.lock.release();
        value.expect("A consumer leaves the loop only if an item is available.")
    }
}

pub fn bounded_buffer() {
    const WORKERS: usize = 3;
    const ITEMS: usize = 10;

    let buffer = Arc::new(Buffer::new());
    let output = Arc::new(SpinLock::new(Vec::new()));

    let consumers = (0..WORKERS)
        .map(|_| {
            let (buffer, output) = (buffer.clone(), output.clone());
            ThreadBuilder::new("consumer").spawn(move || {
                for _ in 0..ITEMS {
                    let value = buffer.get();
                    let mut guard = output.lock();
                    guard.push(value);
                    guard.unlock();
                }
            })
        })
        .collect::<Vec<_>>();
    let producers = (0..WORKERS)
        .map(|p| {
            let buffer = buffer.clone();
            ThreadBuilder::new("producer").spawn(move || {
                for i in 0..ITEMS {
                    buffer.put(p * ITEMS + i);
                }
            })
        })
        .collect::<Vec<_>>();

    for worker in consumers.into_iter().chain(producers) {
        assert_eq!(worker.join(), 0);
    }

    let mut output = output.lock();
    output.sort();
    assert_eq!(*output, (0..WORKERS * ITEMS).collect::<Vec<_>>());
    output.unlock();
    assert_eq!(buffer.len(), 0);
}
