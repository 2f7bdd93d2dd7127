// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

pub mod bootstrap;
pub mod coordinator;
pub mod critical;
mod lifecycle;
mod switch;
mod tick;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::coordinator::PortStats;

//======================================================================================================================
// Imports
//======================================================================================================================

use self::{
    bootstrap::BootstrapHandle,
    coordinator::Coordinator,
    critical::CriticalSection,
    tick::TickSource,
};
use crate::{
    config::Config,
    pal::{
        self,
        NativeThread,
    },
    runtime::{
        fail::Fail,
        kernel::Kernel,
        logging,
    },
};
use ::std::{
    convert::Infallible,
    sync::{
        atomic::{
            AtomicBool,
            AtomicU64,
            Ordering,
        },
        Arc,
    },
    thread,
    time::Duration,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Host port of a kernel. Runs every task of the kernel on its own thread and makes sure only one of them executes at
/// a time.
pub struct Port {
    kernel: Arc<dyn Kernel>,
    coordinator: Coordinator,
    ticker: TickSource,
    /// Number of ticks taken by task threads.
    ticks: AtomicU64,
    launched: AtomicBool,
    tick_interval: Duration,
    min_tick_interval: Duration,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Port {
    /// Creates a port for `kernel`, sized and clocked according to `config`.
    pub fn new(config: &Config, kernel: Arc<dyn Kernel>) -> Result<Arc<Self>, Fail> {
        logging::initialize();

        let max_tasks: usize = config.max_tasks()?;
        let tick_interval: Duration = config.tick_interval()?;
        let min_tick_interval: Duration = config.min_tick_interval()?;
        info!(
            "new(): creating port (max_tasks={}, tick_interval={:?}, min_tick_interval={:?})",
            max_tasks, tick_interval, min_tick_interval
        );

        Ok(Arc::new(Self {
            kernel,
            coordinator: Coordinator::new(max_tasks),
            ticker: TickSource::new(),
            ticks: AtomicU64::new(0),
            launched: AtomicBool::new(false),
            tick_interval,
            min_tick_interval,
        }))
    }

    /// Start routine. Waits until every registered task parked, dispatches the current task of the kernel and arms
    /// the tick source, then idles the calling thread forever. Only returns on a startup failure.
    pub fn start(self: &Arc<Self>) -> Result<Infallible, Fail> {
        self.launch()?;
        loop {
            thread::park();
        }
    }

    /// Same as [Port::start], but returns to the caller once the first task was dispatched. The calling thread must
    /// stay alive, as the start routine would.
    pub fn launch(self: &Arc<Self>) -> Result<(), Fail> {
        if self.launched.swap(true, Ordering::AcqRel) {
            let cause: String = String::from("port was already started");
            error!("launch(): {}", cause);
            return Err(Fail::new(libc::EALREADY, &cause));
        }

        // A failed attempt leaves the port as it was, so the caller may fix the kernel and retry.
        let first: usize = match self.resolve_first_task() {
            Ok(slot) => slot,
            Err(e) => {
                self.launched.store(false, Ordering::Release);
                return Err(e);
            },
        };

        self.kernel.start_hook();
        if let Err(e) = self.coordinator.dispatch_first(first) {
            self.launched.store(false, Ordering::Release);
            return Err(e);
        }
        info!("launch(): first task dispatched (slot={})", first);

        if let Err(e) = self.start_ticking(self.tick_interval) {
            warn!("launch(): running without preemption ({:?})", e);
        }
        Ok(())
    }

    /// Waits for the startup barrier, then returns the slot of the task the kernel wants to run first.
    fn resolve_first_task(&self) -> Result<usize, Fail> {
        self.coordinator.await_all_parked()?;
        let created: usize = self.coordinator.lock().created();
        match Self::slot_of(self.kernel.current()) {
            Ok(slot) if slot < created => Ok(slot),
            Ok(slot) => {
                let cause: String = format!("kernel selected a task of another port (slot={})", slot);
                error!("launch(): {}", cause);
                Err(Fail::new(libc::ESRCH, &cause))
            },
            Err(e) => {
                error!("launch(): kernel did not select a task to run first");
                Err(e)
            },
        }
    }

    /// Arms the tick source. Intervals finer than the host granularity are clamped.
    pub fn start_ticking(self: &Arc<Self>, interval: Duration) -> Result<(), Fail> {
        let _section: CriticalSection = CriticalSection::enter();
        let interval: Duration = if interval < self.min_tick_interval {
            warn!(
                "start_ticking(): clamping tick interval (requested={:?}, granted={:?})",
                interval, self.min_tick_interval
            );
            self.min_tick_interval
        } else {
            interval
        };
        self.ticker.start(self, interval)
    }

    /// Disarms the tick source. The dispatched task keeps running, but is no longer preempted.
    pub fn stop_ticking(&self) {
        let _section: CriticalSection = CriticalSection::enter();
        if self.ticker.stop().is_none() {
            debug!("stop_ticking(): tick source was not armed");
        }
    }

    /// Stops the tick source, runs `hook` and then rearms the tick source with the interval it had.
    pub fn system_reset<F: FnOnce()>(self: &Arc<Self>, hook: F) -> Result<(), Fail> {
        let _section: CriticalSection = CriticalSection::enter();
        let interval: Duration = self.ticker.stop().unwrap_or(self.tick_interval);
        info!("system_reset(): resetting (interval={:?})", interval);
        hook();
        self.start_ticking(interval)
    }

    /// Takes a snapshot of the port.
    pub fn stats(&self) -> PortStats {
        let _section: CriticalSection = CriticalSection::enter();
        PortStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            ..self.coordinator.stats()
        }
    }

    /// Kernel driven by this port.
    pub fn kernel(&self) -> &Arc<dyn Kernel> {
        &self.kernel
    }

    /// Number of tasks this port admits.
    pub fn max_tasks(&self) -> usize {
        self.coordinator.capacity()
    }

    /// Configured tick interval.
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Interval the tick source is armed with.
    pub fn armed_interval(&self) -> Option<Duration> {
        let _section: CriticalSection = CriticalSection::enter();
        self.ticker.interval()
    }

    /// Slot of a task named by the kernel.
    fn slot_of(handle: Option<BootstrapHandle>) -> Result<usize, Fail> {
        match handle.as_ref().and_then(BootstrapHandle::slot) {
            Some(slot) => Ok(slot),
            None => Err(Fail::from_static(libc::ESRCH, "kernel named a task that was not registered")),
        }
    }

    /// Posts a tick to the dispatched task thread. Runs on the timer thread.
    fn deliver_tick(&self) {
        let thread: Option<NativeThread> = self.coordinator.dispatched_thread();
        if let Some(thread) = thread {
            if let Err(e) = pal::send_tick(thread) {
                warn!("deliver_tick(): {:?}", e);
            }
        }
    }

    /// Tick processing. Runs in the tick handler, on the dispatched task thread.
    fn on_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.kernel.int_enter();
        self.kernel.time_tick();
        self.kernel.int_exit(self);
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
