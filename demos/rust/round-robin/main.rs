// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![cfg_attr(feature = "strict", deny(warnings))]
#![deny(clippy::all)]

//======================================================================================================================
// Modules
//======================================================================================================================

mod args;

//======================================================================================================================
// Imports
//======================================================================================================================

use self::args::ProgramArguments;
use ::anyhow::Result;
use ::hostport::{
    critical_section,
    prepare,
    BootstrapHandle,
    Config,
    Fail,
    Kernel,
    Port,
    TaskArgument,
};
use ::std::{
    sync::{
        atomic::{
            AtomicU32,
            AtomicU64,
            AtomicUsize,
            Ordering,
        },
        Arc,
        OnceLock,
    },
    thread,
    time::Duration,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Stack region reserved for every task.
const TASK_STACK_SIZE: usize = 256 * 1024;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Kernel that runs ready tasks in slot order and falls back to an idle task, which is always the last one. A task
/// gives up the processor by delaying itself for some ticks.
struct DelayKernel {
    tasks: OnceLock<Vec<BootstrapHandle>>,
    /// Remaining delay of each task, in ticks.
    delays: Vec<AtomicU32>,
    current: AtomicUsize,
    high_ready: AtomicUsize,
    ticks: AtomicU64,
}

/// Argument of an application task.
struct TaskInfo {
    name: String,
    delay: u32,
    port: Arc<Port>,
    kernel: Arc<DelayKernel>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl DelayKernel {
    fn new(ntasks: usize) -> Self {
        Self {
            tasks: OnceLock::new(),
            delays: (0..ntasks).map(|_| AtomicU32::new(0)).collect(),
            current: AtomicUsize::new(0),
            high_ready: AtomicUsize::new(0),
            ticks: AtomicU64::new(0),
        }
    }

    fn install(&self, tasks: Vec<BootstrapHandle>) -> Result<()> {
        self.tasks
            .set(tasks)
            .map_err(|_| anyhow::anyhow!("task table was already installed"))
    }

    fn idle_index(&self) -> usize {
        self.delays.len() - 1
    }

    /// First ready application task after `from`, in slot order. Falls back to the idle task.
    fn select(&self, from: usize) -> usize {
        let napps: usize = self.idle_index();
        (1..=napps)
            .map(|step| (from + step) % napps)
            .find(|&index| self.delays[index].load(Ordering::Acquire) == 0)
            .unwrap_or(napps)
    }

    /// Delays the current task for `ticks` ticks and switches to the next ready one.
    fn delay(&self, port: &Port, ticks: u32) -> Result<(), Fail> {
        critical_section(|_| {
            let me: usize = self.current.load(Ordering::Acquire);
            self.delays[me].store(ticks, Ordering::Release);
            self.high_ready.store(self.select(me), Ordering::Release);
            port.switch_context()
        })
    }

    fn handle(&self, index: usize) -> Option<BootstrapHandle> {
        self.tasks.get().and_then(|tasks| tasks.get(index)).cloned()
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Kernel for DelayKernel {
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

    fn int_enter(&self) {}

    fn time_tick(&self) {
        self.ticks.fetch_add(1, Ordering::AcqRel);
        for delay in self.delays.iter() {
            let _ = delay.fetch_update(Ordering::AcqRel, Ordering::Acquire, |ticks| ticks.checked_sub(1));
        }
    }

    fn int_exit(&self, port: &Port) {
        // Only the idle task is preempted.
        let idle: usize = self.idle_index();
        if self.current.load(Ordering::Acquire) != idle {
            return;
        }
        let next: usize = self.select(idle);
        if next != idle {
            self.high_ready.store(next, Ordering::Release);
            let _ = port.switch_context();
        }
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Application task: says hello and sleeps.
fn app_task(argument: TaskArgument) -> ! {
    if let Ok(info) = argument.downcast::<TaskInfo>() {
        loop {
            // Standard output takes a process-wide lock.
            critical_section(|_| {
                println!("{}: tick {}", info.name, info.kernel.ticks.load(Ordering::Acquire));
            });
            if let Err(e) = info.kernel.delay(&info.port, info.delay) {
                critical_section(|_| eprintln!("{}: cannot delay ({:?})", info.name, e));
                break;
            }
        }
    }
    idle()
}

/// Idle task.
fn idle_task(_: TaskArgument) -> ! {
    idle()
}

fn idle() -> ! {
    loop {
        thread::sleep(Duration::from_millis(1));
    }
}

/// Loads the configuration, applying command line overrides.
fn load_config(args: &ProgramArguments) -> Result<Config> {
    let mut config: Config = match args.config_path() {
        Some(config_path) => Config::new(&config_path)?,
        None => Config::default(),
    };
    if let Some(ticks_per_sec) = args.ticks_per_sec() {
        config.set_ticks_per_sec(ticks_per_sec)?;
    }
    Ok(config)
}

fn main() -> Result<()> {
    let args: ProgramArguments = ProgramArguments::new(
        "round-robin",
        "Runs a few delaying tasks and an idle task on top of the host port.",
    )?;
    let config: Config = load_config(&args)?;

    // Application tasks plus the idle task.
    let ntasks: usize = args.tasks() + 1;
    let kernel: Arc<DelayKernel> = Arc::new(DelayKernel::new(ntasks));
    let kernel_object: Arc<dyn Kernel> = kernel.clone();
    let port: Arc<Port> = Port::new(&config, kernel_object)?;

    let handles: Vec<BootstrapHandle> = (0..ntasks)
        .map(|index| {
            if index + 1 < ntasks {
                let info: TaskArgument = Arc::new(TaskInfo {
                    name: format!("task-{}", index),
                    // Larger slots sleep longer.
                    delay: (index as u32 + 1) * 10,
                    port: port.clone(),
                    kernel: kernel.clone(),
                });
                prepare(app_task, info, TASK_STACK_SIZE)
            } else {
                prepare(idle_task, Arc::new(()), TASK_STACK_SIZE)
            }
        })
        .collect();
    kernel.install(handles.clone())?;

    // A partially registered system is never started.
    for handle in handles.iter() {
        port.register(handle)?;
    }

    match port.start() {
        Ok(never) => match never {},
        Err(e) => Err(e.into()),
    }
}
