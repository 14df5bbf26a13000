//! Thread abstraction, an abstraction of the cpu.
//!
//! ## The threading model
//!
//! An executing kernel consists of a collection of threads, each with their
//! own stack and local state. Every kernel thread is backed by a host thread,
//! but only the thread holding the processor makes progress: a context switch
//! hands the processor to the next thread and parks the previous one until it
//! is scheduled again.
//!
//! A thread blocks itself with [`Current::park_with`], which gives a
//! [`ParkHandle`] to the caller's closure before the thread sleeps. The
//! handle is the only way to make the thread runnable again, and it is
//! consumed by [`ParkHandle::unpark`], so a parked thread cannot be woken
//! twice.
pub mod scheduler;

use crate::{KernelError, interrupt::TimerHandler};
use abyss::{Cpu, interrupt::InterruptGuard, spinlock::SpinLock};
use core::{
    cell::OnceCell,
    sync::atomic::{AtomicU64, Ordering},
};
use crossbeam_utils::sync::{Parker, Unparker};
use scheduler::{Scheduler, reschedule};
use std::{
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

/// Size of each thread's stack.
pub const STACK_SIZE: usize = 0x100000;

const NO_THREAD: u64 = u64::MAX;

/// A possible state of the thread.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ThreadState {
    /// Thread is runnable.
    Runnable,
    /// Thread is running.
    Running,
    /// Thread is exited with exitcode.
    Exited(i32),
    /// Thread is parked.
    Parked,
}

/// An thread abstraction.
pub struct Thread {
    /// Thread id
    pub tid: u64,
    /// Thread name
    pub name: String,
    state: SpinLock<ThreadState>,
    joiners: SpinLock<Vec<ParkHandle>>,
    unparker: Unparker,
}

impl Thread {
    /// Reads the state of the thread.
    pub fn state(&self) -> ThreadState {
        let guard = self.state.lock();
        let state = *guard;
        guard.unlock();
        state
    }

    fn set_state(&self, state: ThreadState) {
        let mut guard = self.state.lock();
        *guard = state;
        guard.unlock();
    }
}

impl core::fmt::Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Thread")
            .field("tid", &self.tid)
            .field("name", &self.name)
            .finish()
    }
}

/// The kernel state of one machine.
pub(crate) struct Kernel {
    pub(crate) cpu: Arc<Cpu>,
    pub(crate) scheduler: Box<dyn Scheduler>,
    pub(crate) timer_handler: SpinLock<Option<TimerHandler>>,
    threads: SpinLock<BTreeMap<u64, Arc<Thread>>>,
    running: AtomicU64,
    next_tid: AtomicU64,
    boot_tid: AtomicU64,
    halt: SpinLock<Option<Result<i32, KernelError>>>,
    host: Unparker,
}

impl Kernel {
    pub(crate) fn new(cpu: Arc<Cpu>, scheduler: Box<dyn Scheduler>, host: Unparker) -> Arc<Self> {
        Arc::new(Self {
            cpu,
            scheduler,
            timer_handler: SpinLock::new(None),
            threads: SpinLock::new(BTreeMap::new()),
            running: AtomicU64::new(NO_THREAD),
            next_tid: AtomicU64::new(0),
            boot_tid: AtomicU64::new(NO_THREAD),
            halt: SpinLock::new(None),
            host,
        })
    }

    pub(crate) fn set_boot_thread(&self, tid: u64) {
        self.boot_tid.store(tid, Ordering::SeqCst);
    }

    /// Hands the processor to the first runnable thread.
    pub(crate) fn start(&self) {
        if let Some(th) = self.scheduler.next_to_run() {
            th.set_state(ThreadState::Running);
            self.switch_to(&th);
        }
    }

    fn switch_to(&self, next: &Thread) {
        self.running.store(next.tid, Ordering::SeqCst);
        next.unparker.unpark();
    }

    /// Powers the machine off with `result`. Only the first result is kept.
    pub(crate) fn halt(&self, result: Result<i32, KernelError>) {
        let mut guard = self.halt.lock();
        if guard.is_none() {
            *guard = Some(result);
        }
        guard.unlock();

        self.cpu.power_off();
        self.cpu.timer().set_interrupt_handler(None);
        let mut guard = self.timer_handler.lock();
        let handler = guard.take();
        guard.unlock();
        drop(handler);

        let mut guard = self.threads.lock();
        let threads = core::mem::take(&mut *guard);
        guard.unlock();
        for th in threads.values() {
            th.unparker.unpark();
        }
        self.host.unpark();
    }

    pub(crate) fn halt_result(&self) -> Option<Result<i32, KernelError>> {
        let guard = self.halt.lock();
        let result = *guard;
        guard.unlock();
        result
    }
}

/// Payload of the unwind started by [`Current::exit`].
struct ThreadExit(i32);

/// Payload of the unwind that ends threads still alive at power off.
struct Halted;

fn unwind_halted() -> ! {
    panic::resume_unwind(Box::new(Halted))
}

struct Context {
    kernel: Arc<Kernel>,
    thread: Arc<Thread>,
    parker: Parker,
}

thread_local! {
    static CONTEXT: OnceCell<Context> = const { OnceCell::new() };
}

fn with_context<R>(f: impl FnOnce(&Context) -> R) -> R {
    CONTEXT.with(|cell| match cell.get() {
        Some(ctx) => f(ctx),
        None => panic!("Not running on a kernel thread."),
    })
}

fn context() -> (Arc<Kernel>, Arc<Thread>) {
    with_context(|ctx| (ctx.kernel.clone(), ctx.thread.clone()))
}

pub(crate) fn kernel() -> Arc<Kernel> {
    with_context(|ctx| ctx.kernel.clone())
}

/// Blocks the host thread until `th` holds the processor.
fn wait_for_cpu(kernel: &Kernel, th: &Thread) {
    while kernel.running.load(Ordering::SeqCst) != th.tid {
        if kernel.cpu.is_powered_off() {
            unwind_halted();
        }
        with_context(|ctx| ctx.parker.park());
    }
}

/// Get specified thread's [`ThreadState`] by TID (Thread ID).
///
/// Exited threads are forgotten, so their tid yields
/// [`KernelError::InvalidArgument`].
pub fn get_state_by_tid(tid: u64) -> Result<ThreadState, KernelError> {
    let kernel = kernel();
    let threads = kernel.threads.lock();
    let th = threads.get(&tid).cloned();
    threads.unlock();
    th.map(|th| th.state()).ok_or(KernelError::InvalidArgument)
}

/// Run a function `f` with current thread as an argument.
#[inline]
pub fn with_current<R>(f: impl FnOnce(&Thread) -> R) -> R {
    with_context(|ctx| f(&ctx.thread))
}

/// A handle to join thread.
pub struct JoinHandle {
    /// Thread id of this handle.
    pub tid: u64,
    th: Arc<Thread>,
}

impl JoinHandle {
    /// Join this handle and returns exit code.
    ///
    /// A thread that panicked reports `-1`.
    pub fn join(self) -> i32 {
        assert_ne!(self.tid, Current::get_tid(), "A thread cannot join itself.");
        loop {
            let _guard = InterruptGuard::new();
            if let ThreadState::Exited(code) = self.th.state() {
                return code;
            }
            let th = &self.th;
            Current::park_with(|handle| {
                let mut joiners = th.joiners.lock();
                joiners.push(handle);
                joiners.unlock();
            });
        }
    }
}

/// A handle that represent the parked thread.
pub struct ParkHandle {
    th: Arc<Thread>,
    kernel: Arc<Kernel>,
}

impl ParkHandle {
    /// Thread id of the parked thread.
    pub fn tid(&self) -> u64 {
        self.th.tid
    }

    /// Consume the handle and unpark the underlying thread.
    ///
    /// Callable from interrupt handlers.
    pub fn unpark(self) {
        let _guard = InterruptGuard::new();
        let Self { th, kernel } = self;
        th.set_state(ThreadState::Runnable);
        kernel.scheduler.push_to_queue(th);
    }
}

impl core::fmt::Debug for ParkHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("ParkHandle").field(&self.th.tid).finish()
    }
}

/// The opaque structure indicating the running thread on the current cpu.
pub struct Current {
    _p: (),
}

impl Current {
    /// Run a function `f` with [`ParkHandle`] for current thread, and then park
    /// the current thread.
    ///
    /// Interrupts stay masked from the moment the thread is marked parked
    /// until it leaves the processor, so a timer handler cannot observe a
    /// half-parked thread.
    pub fn park_with(f: impl FnOnce(ParkHandle)) {
        let _guard = InterruptGuard::new();
        let (kernel, th) = context();
        assert!(
            !kernel.cpu.in_handler(),
            "Try to park a thread in an interrupt handler."
        );
        th.set_state(ThreadState::Parked);
        f(ParkHandle {
            th: th.clone(),
            kernel: kernel.clone(),
        });
        reschedule(&kernel, &th);
    }

    /// Gives up the processor, staying runnable.
    ///
    /// Inside an interrupt handler the yield is deferred until the handler
    /// returns.
    pub fn yield_now() {
        let (kernel, th) = context();
        if kernel.cpu.in_handler() {
            kernel.cpu.request_yield();
            return;
        }
        let _guard = InterruptGuard::new();
        th.set_state(ThreadState::Runnable);
        kernel.scheduler.push_to_queue(th.clone());
        reschedule(&kernel, &th);
    }

    /// Exit the current thread with `exit_code`.
    pub fn exit(exit_code: i32) -> ! {
        panic::resume_unwind(Box::new(ThreadExit(exit_code)))
    }

    /// Get the current thread's id.
    pub fn get_tid() -> u64 {
        with_current(|th| th.tid)
    }

    /// Starts recording log output of this machine instead of printing it.
    #[doc(hidden)]
    pub fn hook_console() {
        let kernel = kernel();
        assert!(
            kernel.cpu.hook_console(),
            "Fail to hook console: already hooked."
        );
    }

    /// Stops recording and returns the recorded lines.
    #[doc(hidden)]
    pub fn finish_hook() -> Option<Vec<String>> {
        kernel().cpu.finish_hook()
    }
}

/// A struct to build a new thread.
pub struct ThreadBuilder {
    name: String,
}

impl ThreadBuilder {
    /// Create a new thread builder for thread `name`.
    pub fn new<I>(name: I) -> Self
    where
        String: From<I>,
    {
        Self {
            name: String::from(name),
        }
    }

    /// Spawn the thread.
    ///
    /// The new thread is runnable but does not run before the current thread
    /// gives up the processor.
    pub fn spawn<F: FnOnce() + Send + 'static>(self, thread_fn: F) -> JoinHandle {
        spawn_on(&kernel(), self.name, thread_fn)
    }
}

pub(crate) fn spawn_on<F: FnOnce() + Send + 'static>(
    kernel: &Arc<Kernel>,
    name: String,
    thread_fn: F,
) -> JoinHandle {
    let _guard = InterruptGuard::new();
    let parker = Parker::new();
    let th = Arc::new(Thread {
        tid: kernel.next_tid.fetch_add(1, Ordering::SeqCst),
        name,
        state: SpinLock::new(ThreadState::Runnable),
        joiners: SpinLock::new(Vec::new()),
        unparker: parker.unparker().clone(),
    });

    let mut threads = kernel.threads.lock();
    threads.insert(th.tid, th.clone());
    threads.unlock();

    let (k, t) = (kernel.clone(), th.clone());
    if let Err(e) = std::thread::Builder::new()
        .name(th.name.clone())
        .stack_size(STACK_SIZE)
        .spawn(move || thread_start(k, t, parker, thread_fn))
    {
        panic!("Failed to spawn thread {:?}: {e}", th.name);
    }

    kernel.scheduler.push_to_queue(th.clone());
    JoinHandle { tid: th.tid, th }
}

/// The very beginning of the thread.
fn thread_start<F: FnOnce()>(kernel: Arc<Kernel>, th: Arc<Thread>, parker: Parker, thread_fn: F) {
    abyss::cpu::enter(kernel.cpu.clone());
    CONTEXT.with(|cell| {
        if cell
            .set(Context {
                kernel,
                thread: th,
                parker,
            })
            .is_err()
        {
            unreachable!("A host thread runs a single kernel thread.");
        }
    });

    let outcome = panic::catch_unwind(AssertUnwindSafe(move || {
        let (kernel, th) = context();
        wait_for_cpu(&kernel, &th);
        drop((kernel, th));
        abyss::interrupt::InterruptState::enable();
        thread_fn();
    }));
    let exit_code = match outcome {
        Ok(()) => 0,
        Err(payload) if payload.is::<Halted>() => return,
        Err(payload) => match payload.downcast::<ThreadExit>() {
            Ok(exit) => exit.0,
            Err(_) => -1,
        },
    };
    do_exit(exit_code);
}

fn do_exit(exit_code: i32) {
    InterruptGuard::new().consume();
    let (kernel, th) = context();
    th.set_state(ThreadState::Exited(exit_code));

    let mut threads = kernel.threads.lock();
    threads.remove(&th.tid);
    threads.unlock();

    let mut joiners = th.joiners.lock();
    let joiners_to_wake = core::mem::take(&mut *joiners);
    joiners.unlock();
    for joiner in joiners_to_wake {
        joiner.unpark();
    }

    if th.tid == kernel.boot_tid.load(Ordering::SeqCst) {
        kernel.halt(Ok(exit_code));
    } else {
        reschedule(&kernel, &th);
    }
}
