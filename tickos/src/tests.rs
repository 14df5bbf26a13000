use crate::{
    KernelError, SystemConfiguration, SystemConfigurationBuilder, boot, claim_timer,
    sync::{Lock, SpinLock},
    thread::{
        Current, Thread, ThreadBuilder, ThreadState, get_state_by_tid, scheduler::Scheduler,
    },
};
use abyss::interrupt::InterruptState;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

fn config() -> SystemConfiguration {
    SystemConfigurationBuilder::new().quiet(true).build()
}

/// A machine whose timer never interrupts the test.
fn calm() -> SystemConfiguration {
    SystemConfigurationBuilder::new()
        .timer_period(1_000_000_000)
        .tick_budget(None)
        .quiet(true)
        .build()
}

#[test]
fn boot_reports_main_exit_code() {
    assert_eq!(boot(&config(), || ()), Ok(0));
    assert_eq!(boot(&config(), || Current::exit(7)), Ok(7));
    assert_eq!(boot(&config(), || panic!("expected panic")), Ok(-1));
}

#[test]
fn zero_period_is_rejected() {
    let config = SystemConfigurationBuilder::new().timer_period(0).build();
    assert_eq!(boot(&config, || ()), Err(KernelError::InvalidArgument));
}

#[test]
fn join_collects_exit_codes() {
    let code = boot(&config(), || {
        let ok = ThreadBuilder::new("ok").spawn(|| ());
        let exited = ThreadBuilder::new("exited").spawn(|| Current::exit(3));
        let panicked = ThreadBuilder::new("panicked").spawn(|| panic!("expected panic"));
        assert_eq!(ok.join(), 0);
        assert_eq!(exited.join(), 3);
        assert_eq!(panicked.join(), -1);
    });
    assert_eq!(code, Ok(0));
}

#[test]
fn threads_run_in_fifo_order() {
    let code = boot(&calm(), || {
        let order = Arc::new(SpinLock::new(Vec::new()));
        let handles = (0..3)
            .map(|i| {
                let order = order.clone();
                ThreadBuilder::new("fifo").spawn(move || {
                    let mut guard = order.lock();
                    guard.push(i);
                    guard.unlock();
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            assert_eq!(handle.join(), 0);
        }
        let guard = order.lock();
        assert_eq!(*guard, vec![0, 1, 2]);
        guard.unlock();
    });
    assert_eq!(code, Ok(0));
}

/// Runs the most recently queued thread first and counts timer interrupts.
struct Lifo {
    stack: SpinLock<Vec<Arc<Thread>>>,
    ticks: Arc<AtomicUsize>,
}

impl Scheduler for Lifo {
    fn next_to_run(&self) -> Option<Arc<Thread>> {
        let mut guard = self.stack.lock();
        let th = guard.pop();
        guard.unlock();
        th
    }
    fn push_to_queue(&self, th: Arc<Thread>) {
        let mut guard = self.stack.lock();
        guard.push(th);
        guard.unlock();
    }
    fn timer_tick(&self) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }
}

fn lifo(ticks: &Arc<AtomicUsize>) -> impl Fn() -> Lifo + Send + Sync + 'static {
    let ticks = ticks.clone();
    move || Lifo {
        stack: SpinLock::new(Vec::new()),
        ticks: ticks.clone(),
    }
}

#[test]
fn custom_scheduler_runs_newest_first() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let config = SystemConfigurationBuilder::new()
        .set_scheduler(lifo(&ticks))
        .timer_period(1_000_000_000)
        .kernel_tick(7)
        .tick_budget(None)
        .quiet(true)
        .build();
    let code = boot(&config, || {
        let order = Arc::new(SpinLock::new(Vec::new()));
        let handles = (0..3)
            .map(|i| {
                let order = order.clone();
                ThreadBuilder::new("lifo").spawn(move || {
                    let mut guard = order.lock();
                    guard.push(i);
                    guard.unlock();
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            assert_eq!(handle.join(), 0);
        }
        let guard = order.lock();
        assert_eq!(*guard, vec![2, 1, 0]);
        guard.unlock();

        let before = crate::clock::now();
        InterruptState::disable().restore();
        assert_eq!(crate::clock::now() - before, 7);
    });
    assert_eq!(code, Ok(0));
    assert_eq!(ticks.load(Ordering::SeqCst), 0);
}

#[test]
fn scheduler_sees_every_timer_tick() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let config = SystemConfigurationBuilder::new()
        .set_scheduler(lifo(&ticks))
        .timer_period(100)
        .kernel_tick(7)
        .tick_budget(None)
        .quiet(true)
        .build();
    let code = boot(&config, || {
        while crate::clock::now() < 1000 {
            InterruptState::disable().restore();
        }
    });
    assert_eq!(code, Ok(0));
    // Interrupts are at least a period apart and late by less than a few
    // kernel ticks.
    let ticks = ticks.load(Ordering::SeqCst);
    assert!((8..=10).contains(&ticks), "{ticks} timer interrupts");
}

#[test]
fn timer_preempts_a_spinning_thread() {
    let code = boot(&config(), || {
        let flag = Arc::new(AtomicBool::new(false));
        let child = {
            let flag = flag.clone();
            ThreadBuilder::new("flagger").spawn(move || flag.store(true, Ordering::SeqCst))
        };
        let start = crate::clock::now();
        while !flag.load(Ordering::SeqCst) {
            // Each unmask costs a kernel tick; the timer eventually yields.
            InterruptState::disable().restore();
        }
        assert!(crate::clock::now() > start);
        assert_eq!(child.join(), 0);
    });
    assert_eq!(code, Ok(0));
}

#[test]
fn stuck_machine_exhausts_budget() {
    let config = SystemConfigurationBuilder::new()
        .tick_budget(Some(20_000))
        .quiet(true)
        .build();
    let code = boot(&config, || Current::park_with(drop));
    assert_eq!(code, Err(KernelError::TickBudgetExhausted));
}

#[test]
fn lock_gives_mutual_exclusion() {
    let code = boot(&config(), || {
        let lock = Arc::new(Lock::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let handles = (0..4)
            .map(|_| {
                let (lock, inside) = (lock.clone(), inside.clone());
                ThreadBuilder::new("locker").spawn(move || {
                    for _ in 0..10 {
                        lock.acquire();
                        assert!(lock.is_held_by_current_thread());
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        Current::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                        lock.release();
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            assert_eq!(handle.join(), 0);
        }
        assert!(!lock.is_held_by_current_thread());
    });
    assert_eq!(code, Ok(0));
}

#[test]
fn lock_misuse_kills_the_thread() {
    let code = boot(&config(), || {
        let lock = Arc::new(Lock::new());
        let recursive = {
            let lock = lock.clone();
            ThreadBuilder::new("recursive").spawn(move || {
                lock.acquire();
                lock.acquire();
            })
        };
        assert_eq!(recursive.join(), -1);

        let foreign = Arc::new(Lock::new());
        let release = {
            let foreign = foreign.clone();
            ThreadBuilder::new("release").spawn(move || foreign.release())
        };
        assert_eq!(release.join(), -1);
    });
    assert_eq!(code, Ok(0));
}

#[test]
fn waiter_is_parked() {
    let code = boot(&config(), || {
        let lock = Arc::new(Lock::new());
        lock.acquire();
        let waiter = {
            let lock = lock.clone();
            ThreadBuilder::new("waiter").spawn(move || {
                lock.acquire();
                lock.release();
            })
        };
        Current::yield_now();
        assert_eq!(get_state_by_tid(waiter.tid), Ok(ThreadState::Parked));
        lock.release();
        let tid = waiter.tid;
        assert_eq!(waiter.join(), 0);
        assert_eq!(get_state_by_tid(tid), Err(KernelError::InvalidArgument));
    });
    assert_eq!(code, Ok(0));
}

#[test]
fn timer_can_be_claimed_once() {
    let code = boot(&config(), || {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        assert_eq!(
            claim_timer(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            Ok(())
        );
        assert_eq!(claim_timer(|| ()), Err(KernelError::Busy));
        while fired.load(Ordering::SeqCst) < 3 {
            Current::yield_now();
        }
    });
    assert_eq!(code, Ok(0));
}
