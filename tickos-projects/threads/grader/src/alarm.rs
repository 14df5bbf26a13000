use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tickos::{
    InterruptGuard, KernelError, clock, machine,
    sync::SpinLock,
    thread::{Current, ThreadBuilder},
};
use tickos_threads::TimedWaitQueue;

fn install() -> Arc<TimedWaitQueue> {
    TimedWaitQueue::install().expect("The timer of a fresh machine must be free.")
}

/// Longest delay between a deadline and the return of `wait_until`.
fn release_slack() -> u64 {
    let machine = machine();
    let interval = match machine.seed {
        Some(_) => 2 * machine.timer_period,
        None => machine.timer_period,
    };
    interval + 4 * machine.kernel_tick
}

pub fn wake_order() {
    let queue = install();
    let woken = Arc::new(SpinLock::new(Vec::new()));

    let sleepers = [(1, 3000), (2, 2000), (3, 1000)].map(|(id, ticks)| {
        let (queue, woken) = (queue.clone(), woken.clone());
        ThreadBuilder::new("sleeper").spawn(move || {
            let start = clock::now();
            queue.wait_until(ticks);
            assert!(
                clock::now() >= start + ticks as u64,
                "Sleeper {id} woke up before its deadline."
            );
            let mut guard = woken.lock();
            guard.push(id);
            guard.unlock();
        })
    });
    for sleeper in sleepers {
        assert_eq!(sleeper.join(), 0);
    }

    let guard = woken.lock();
    assert_eq!(*guard, [3, 2, 1]);
    guard.unlock();
    assert_eq!(queue.num_sleepers(), 0);
}

pub fn deadline_bound() {
    let queue = install();
    for ticks in [1, 10, 499, 500, 501, 1234, 5000] {
        let start = clock::now();
        queue.wait_until(ticks);
        let now = clock::now();
        let deadline = start + ticks as u64;
        assert!(now >= deadline, "wait_until({ticks}) returned at {now}, before {deadline}.");
        assert!(
            now <= deadline + release_slack(),
            "wait_until({ticks}) returned at {now}, long after {deadline}."
        );
    }
}

pub fn zero_wait() {
    let queue = install();
    let start = clock::now();
    queue.wait_until(0);
    let now = clock::now();
    assert!(now >= start);
    assert!(now <= start + release_slack());
}

pub fn negative_wait() {
    let queue = install();
    for ticks in [-1, -100, i64::MIN] {
        let start = clock::now();
        queue.wait_until(ticks);
        let now = clock::now();
        assert!(now >= start);
        assert!(
            now <= start + release_slack(),
            "wait_until({ticks}) was not released on the next timer interrupt."
        );
    }
}

pub fn same_deadline() {
    const SLEEPERS: usize = 4;

    let queue = install();
    let deadline = clock::now() + 5000;
    let released = Arc::new(AtomicUsize::new(0));

    let sleepers = (0..SLEEPERS)
        .map(|_| {
            let (queue, released) = (queue.clone(), released.clone());
            ThreadBuilder::new("sleeper").spawn(move || {
                queue.wait_until(deadline as i64 - clock::now() as i64);
                assert!(clock::now() >= deadline);
                // Everybody sharing the deadline left the queue on the same tick.
                assert_eq!(queue.num_sleepers(), 0);
                released.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect::<Vec<_>>();
    for sleeper in sleepers {
        assert_eq!(sleeper.join(), 0);
    }
    assert_eq!(released.load(Ordering::SeqCst), SLEEPERS);
}

pub fn staggered_deadlines() {
    const OFFSETS: [u64; 12] = [
        2000, 250, 1500, 750, 2750, 500, 2250, 1750, 1000, 2500, 0, 1250,
    ];

    let queue = install();
    let base = clock::now() + 5000;
    let woken = Arc::new(SpinLock::new(Vec::new()));

    let mut sleepers = Vec::new();
    for offset in OFFSETS {
        let deadline = base + offset;
        let (queue, woken) = (queue.clone(), woken.clone());
        sleepers.push(ThreadBuilder::new("sleeper").spawn(move || {
            // Masked from release to record: records follow release order.
            let _guard = InterruptGuard::new();
            queue.wait_until(deadline as i64 - clock::now() as i64);
            let mut guard = woken.lock();
            guard.push((deadline, clock::now()));
            guard.unlock();
        }));
        for _ in 0..5 {
            Current::yield_now();
        }
    }
    for sleeper in sleepers {
        assert_eq!(sleeper.join(), 0);
    }

    let woken = woken.lock();
    assert_eq!(woken.len(), OFFSETS.len());
    for &(deadline, now) in woken.iter() {
        assert!(now >= deadline, "A sleeper of {deadline} woke up at {now}.");
    }
    assert!(
        woken.windows(2).all(|pair| pair[0].0 <= pair[1].0),
        "Sleepers must be released in deadline order: {:?}",
        *woken
    );
    woken.unlock();
    assert_eq!(queue.num_sleepers(), 0);
}

/// Virtual time the current thread needs for a fixed amount of yields while
/// other threads wait for 1000 ticks.
fn time_to_yield(queue: &Arc<TimedWaitQueue>, busy: bool) -> u64 {
    const SLEEPERS: usize = 5;
    const YIELDS: usize = 50;

    let sleepers = (0..SLEEPERS)
        .map(|_| {
            let queue = queue.clone();
            ThreadBuilder::new("sleeper").spawn(move || {
                if busy {
                    queue.wait_until_busy(1000);
                } else {
                    queue.wait_until(1000);
                }
            })
        })
        .collect::<Vec<_>>();

    let start = clock::now();
    for _ in 0..YIELDS {
        Current::yield_now();
    }
    let elapsed = clock::now() - start;

    for sleeper in sleepers {
        assert_eq!(sleeper.join(), 0);
    }
    elapsed
}

pub fn blocking_leaves_cpu() {
    let queue = install();
    let busy = time_to_yield(&queue, true);
    let blocking = time_to_yield(&queue, false);
    log::info!("Yielding next to sleepers: {busy} ticks if they spin, {blocking} ticks if they block.");
    assert!(
        blocking < busy,
        "Blocked sleepers must not compete for the processor."
    );
}

pub fn single_install() {
    let _queue = install();
    assert_eq!(TimedWaitQueue::install().err(), Some(KernelError::Busy));
}
