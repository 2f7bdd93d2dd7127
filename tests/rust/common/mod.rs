// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![allow(dead_code)]

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::hostport::{
    critical_section,
    minimum_bootstrap_size,
    prepare,
    BootstrapHandle,
    Config,
    Kernel,
    Port,
    TaskArgument,
    TaskEntry,
};
use ::rand::{
    rngs::SmallRng,
    Rng,
    SeedableRng,
};
use ::std::{
    hint,
    sync::{
        atomic::{
            AtomicBool,
            AtomicU64,
            AtomicUsize,
            Ordering,
        },
        Arc,
        Mutex,
        MutexGuard,
        OnceLock,
        PoisonError,
    },
    thread,
    time::{
        Duration,
        Instant,
    },
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Upper bound on how long a test waits for the tasks to make progress.
pub const DEADLINE: Duration = Duration::from_secs(20);

//======================================================================================================================
// Structures
//======================================================================================================================

/// Round-robin kernel. Tasks are scheduled in slot order, either when they yield or, if preemption is enabled, on
/// every tick. All of the selection state is atomic, so this is safe to drive from the tick handler.
pub struct RoundRobinKernel {
    tasks: OnceLock<Vec<BootstrapHandle>>,
    /// Number of tasks in the rotation.
    count: AtomicUsize,
    current: AtomicUsize,
    high_ready: AtomicUsize,
    preempt: AtomicBool,
    ticks: AtomicU64,
    nesting: AtomicUsize,
    started: AtomicBool,
}

/// Shared state of a test.
pub struct Harness {
    pub port: Arc<Port>,
    pub kernel: Arc<RoundRobinKernel>,
    /// Entries recorded by tasks, always from inside of a critical section.
    pub log: Mutex<Vec<(usize, usize)>>,
    /// Number of times each task went through its loop.
    pub runs: Vec<AtomicU64>,
    /// Address of the argument each task was started with.
    pub arguments: Vec<AtomicUsize>,
    /// Critical sections observed by tasks, and how many of them saw a tick.
    pub windows: AtomicU64,
    pub violations: AtomicU64,
    /// Critical sections that were followed right away by a pending tick.
    pub released: AtomicU64,
    pub quiesce: AtomicBool,
    rng: Mutex<SmallRng>,
}

/// Argument of every test task.
pub struct TaskContext {
    pub harness: Arc<Harness>,
    pub index: usize,
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Builds a port configuration.
pub fn config(max_tasks: usize, ticks_per_sec: u32) -> Result<Config> {
    Ok(Config::from_yaml_str(&format!(
        "hostport:\n  max_tasks: {}\n  ticks_per_sec: {}\n  min_tick_interval_us: 1000\n",
        max_tasks, ticks_per_sec
    ))?)
}

/// Polls `condition` until it holds or the deadline expires.
pub fn wait_until<F: FnMut() -> bool>(mut condition: F) -> bool {
    let deadline: Instant = Instant::now() + DEADLINE;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Busy waits for `duration`.
pub fn spin_for(duration: Duration) {
    let start: Instant = Instant::now();
    while start.elapsed() < duration {
        hint::spin_loop();
    }
}

/// Parks the calling task thread for good.
fn idle() -> ! {
    loop {
        thread::park();
    }
}

/// Task that counts its runs and busy waits, relying on preemption to give up the processor.
pub fn spinning_task(argument: TaskArgument) -> ! {
    let context: Arc<TaskContext> = TaskContext::enter(argument);
    loop {
        context.checkpoint();
        context.count_run();
        spin_for(Duration::from_micros(200));
    }
}

/// Task that yields to the next one in slot order after every run.
pub fn yielding_task(argument: TaskArgument) -> ! {
    let context: Arc<TaskContext> = TaskContext::enter(argument);
    loop {
        context.checkpoint();
        context.count_run();
        critical_section(|_| {
            context.record(context.index);
            let _ = context.harness.kernel.rotate(&context.harness.port);
        });
    }
}

/// Task that switches to a randomly chosen task, possibly itself, after every run.
pub fn random_task(argument: TaskArgument) -> ! {
    let context: Arc<TaskContext> = TaskContext::enter(argument);
    loop {
        context.checkpoint();
        context.count_run();
        critical_section(|_| {
            let next: usize = context.harness.pick(context.harness.kernel.count());
            context.record(next);
            let _ = context.harness.kernel.switch_to(&context.harness.port, next);
        });
    }
}

/// Task that records a begin and an end entry inside of one critical section, busy waiting in between.
pub fn bracketing_task(argument: TaskArgument) -> ! {
    let context: Arc<TaskContext> = TaskContext::enter(argument);
    loop {
        context.checkpoint();
        context.count_run();
        critical_section(|_| {
            context.record(0);
            spin_for(Duration::from_micros(1500));
            context.record(1);
        });
        spin_for(Duration::from_micros(500));
    }
}

/// Task that checks whether ticks get through its critical sections.
pub fn masking_task(argument: TaskArgument) -> ! {
    let context: Arc<TaskContext> = TaskContext::enter(argument);
    let kernel: &RoundRobinKernel = &context.harness.kernel;
    loop {
        context.checkpoint();
        context.count_run();

        let before: u64 = kernel.ticks();
        let inside: u64 = critical_section(|_| {
            let entered: u64 = kernel.ticks();
            // Several tick intervals.
            spin_for(Duration::from_millis(4));
            kernel.ticks() - entered
        });
        let after: u64 = kernel.ticks();

        context.harness.windows.fetch_add(1, Ordering::Relaxed);
        if inside != 0 {
            context.harness.violations.fetch_add(1, Ordering::Relaxed);
        }
        if after > before {
            context.harness.released.fetch_add(1, Ordering::Relaxed);
        }
        spin_for(Duration::from_millis(2));
    }
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl RoundRobinKernel {
    pub fn new(preempt: bool) -> Self {
        Self {
            tasks: OnceLock::new(),
            count: AtomicUsize::new(0),
            current: AtomicUsize::new(0),
            high_ready: AtomicUsize::new(0),
            preempt: AtomicBool::new(preempt),
            ticks: AtomicU64::new(0),
            nesting: AtomicUsize::new(0),
            started: AtomicBool::new(false),
        }
    }

    /// Hands the task table to the kernel.
    pub fn install(&self, tasks: Vec<BootstrapHandle>) -> Result<()> {
        self.tasks
            .set(tasks)
            .map_err(|_| anyhow::anyhow!("task table was already installed"))
    }

    pub fn task(&self, index: usize) -> Result<&BootstrapHandle> {
        self.tasks
            .get()
            .and_then(|tasks| tasks.get(index))
            .ok_or(anyhow::anyhow!("no such task (index={})", index))
    }

    /// Adds one task to the rotation.
    pub fn admit(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    pub fn current_index(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn set_preempt(&self, preempt: bool) {
        self.preempt.store(preempt, Ordering::Release);
    }

    /// Selects `next` and switches to it. Must be called from the current task.
    pub fn switch_to(&self, port: &Port, next: usize) -> Result<(), ::hostport::Fail> {
        critical_section(|_| {
            self.high_ready.store(next, Ordering::Release);
            port.switch_context()
        })
    }

    /// Yields to the next task in slot order. Must be called from the current task.
    pub fn rotate(&self, port: &Port) -> Result<(), ::hostport::Fail> {
        let count: usize = self.count().max(1);
        self.switch_to(port, (self.current_index() + 1) % count)
    }

    fn handle(&self, index: usize) -> Option<BootstrapHandle> {
        self.tasks.get().and_then(|tasks| tasks.get(index)).cloned()
    }
}

impl Harness {
    /// Creates a port with `ntasks` prepared tasks, running `entry`. Nothing is registered yet.
    pub fn new(config: &Config, ntasks: usize, entry: TaskEntry, preempt: bool) -> Result<Arc<Self>> {
        let kernel: Arc<RoundRobinKernel> = Arc::new(RoundRobinKernel::new(preempt));
        let kernel_object: Arc<dyn Kernel> = kernel.clone();
        let port: Arc<Port> = Port::new(config, kernel_object)?;

        let harness: Arc<Harness> = Arc::new(Self {
            port,
            kernel,
            log: Mutex::new(Vec::new()),
            runs: (0..ntasks).map(|_| AtomicU64::new(0)).collect(),
            arguments: (0..ntasks).map(|_| AtomicUsize::new(0)).collect(),
            windows: AtomicU64::new(0),
            violations: AtomicU64::new(0),
            released: AtomicU64::new(0),
            quiesce: AtomicBool::new(false),
            rng: Mutex::new(SmallRng::seed_from_u64(0x5eed)),
        });

        let tasks: Vec<BootstrapHandle> = (0..ntasks)
            .map(|index| {
                let argument: TaskArgument = Arc::new(TaskContext {
                    harness: harness.clone(),
                    index,
                });
                prepare(entry, argument, minimum_bootstrap_size())
            })
            .collect();
        harness.kernel.install(tasks)?;
        Ok(harness)
    }

    /// Registers the task with `index` and adds it to the rotation.
    pub fn register(&self, index: usize) -> Result<usize, ::hostport::Fail> {
        let handle: BootstrapHandle = match self.kernel.task(index) {
            Ok(handle) => handle.clone(),
            Err(e) => return Err(::hostport::Fail::new(libc::ESRCH, &e.to_string())),
        };
        let slot: usize = self.port.register(&handle)?;
        self.kernel.admit();
        Ok(slot)
    }

    /// Registers every prepared task.
    pub fn register_all(&self) -> Result<()> {
        for index in 0..self.runs.len() {
            self.register(index)?;
        }
        Ok(())
    }

    pub fn runs(&self, index: usize) -> u64 {
        self.runs[index].load(Ordering::Acquire)
    }

    pub fn log(&self) -> MutexGuard<'_, Vec<(usize, usize)>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stops the tick source and parks every task for good.
    pub fn finish(&self) {
        self.quiesce.store(true, Ordering::Release);
        self.port.stop_ticking();
    }

    fn pick(&self, count: usize) -> usize {
        let mut rng: MutexGuard<SmallRng> = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen_range(0..count.max(1))
    }
}

impl TaskContext {
    /// Recovers the context from the argument of a task, and records the argument for identity checks.
    fn enter(argument: TaskArgument) -> Arc<Self> {
        let address: usize = Arc::as_ptr(&argument) as *const () as usize;
        let context: Arc<TaskContext> = match argument.downcast::<TaskContext>() {
            Ok(context) => context,
            Err(_) => panic!("task argument is not a task context"),
        };
        context.harness.arguments[context.index].store(address, Ordering::Release);
        context
    }

    /// Parks the task for good once the test is over.
    fn checkpoint(&self) {
        if self.harness.quiesce.load(Ordering::Acquire) {
            idle();
        }
    }

    fn count_run(&self) {
        self.harness.runs[self.index].fetch_add(1, Ordering::AcqRel);
    }

    /// Appends an entry to the log. Must be called from inside of a critical section.
    fn record(&self, value: usize) {
        self.harness.log().push((self.index, value));
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Kernel for RoundRobinKernel {
    fn current(&self) -> Option<BootstrapHandle> {
        self.handle(self.current.load(Ordering::Acquire))
    }

    fn high_ready(&self) -> Option<BootstrapHandle> {
        self.handle(self.high_ready.load(Ordering::Acquire))
    }

    fn promote_high_ready(&self) {
        self.current
            .store(self.high_ready.load(Ordering::Acquire), Ordering::Release);
    }

    fn start_hook(&self) {
        self.started.store(true, Ordering::Release);
    }

    fn int_enter(&self) {
        self.nesting.fetch_add(1, Ordering::AcqRel);
    }

    fn time_tick(&self) {
        self.ticks.fetch_add(1, Ordering::AcqRel);
    }

    fn int_exit(&self, port: &Port) {
        self.nesting.fetch_sub(1, Ordering::AcqRel);
        let count: usize = self.count();
        if self.preempt.load(Ordering::Acquire) && count > 1 {
            self.high_ready
                .store((self.current_index() + 1) % count, Ordering::Release);
            let _ = port.switch_context();
        }
    }
}
