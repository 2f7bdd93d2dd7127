// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    pal,
    port::{
        critical::CriticalSection,
        lifecycle,
        Port,
    },
    runtime::fail::Fail,
};
use ::crossbeam_channel::{
    select,
    Receiver,
    Sender,
};
use ::libc::c_int;
use ::std::{
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        OnceLock,
        PoisonError,
        Weak,
    },
    thread::{
        self,
        JoinHandle,
    },
    time::{
        Duration,
        Instant,
    },
};

//======================================================================================================================
// Static Variables
//======================================================================================================================

/// Outcome of installing the tick handler. The handler is process-wide and installed once.
static HANDLER: OnceLock<Result<(), Fail>> = OnceLock::new();

//======================================================================================================================
// Structures
//======================================================================================================================

/// Timer thread that posts ticks to the dispatched task thread.
struct TimerThread {
    interval: Duration,
    /// Dropping this stops the timer thread.
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

/// Periodic tick source of a port.
pub struct TickSource {
    timer: Mutex<Option<TimerThread>>,
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Handler of the tick signal. Runs on the task thread the tick was posted to, on top of whatever that thread was
/// doing outside of a critical section.
extern "C" fn on_tick_signal(_signum: c_int) {
    let errno: c_int = pal::errno();
    if let Some((port, _)) = lifecycle::current_task() {
        // Task threads keep a strong reference to their port and never exit.
        let port: &Port = unsafe { &*port };
        port.on_tick();
    }
    pal::set_errno(errno);
}

/// Installs the tick handler, unless some earlier call did it already.
fn install_handler() -> Result<(), Fail> {
    HANDLER
        .get_or_init(|| pal::install_tick_handler(on_tick_signal))
        .clone()
}

/// Body of the timer thread.
fn run_timer(port: Weak<Port>, interval: Duration, stop: Receiver<()>) {
    let ticker: Receiver<Instant> = ::crossbeam_channel::tick(interval);
    loop {
        select! {
            recv(ticker) -> _ => match port.upgrade() {
                Some(port) => port.deliver_tick(),
                None => break,
            },
            // Disconnected when the handle is dropped.
            recv(stop) -> _ => break,
        }
    }
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl TickSource {
    /// Creates a tick source that is not armed.
    pub fn new() -> Self {
        Self {
            timer: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<TimerThread>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arms the tick source to post a tick to `port` every `interval`.
    pub fn start(&self, port: &Arc<Port>, interval: Duration) -> Result<(), Fail> {
        let mut timer: MutexGuard<Option<TimerThread>> = self.lock();
        if let Some(running) = timer.as_ref() {
            let cause: String = format!("tick source is already armed (interval={:?})", running.interval);
            error!("start(): {}", cause);
            return Err(Fail::new(libc::EBUSY, &cause));
        }

        install_handler()?;

        let (stop, stopped): (Sender<()>, Receiver<()>) = ::crossbeam_channel::bounded(0);
        let weak: Weak<Port> = Arc::downgrade(port);

        // The timer thread must never take a tick itself.
        let _section: CriticalSection = CriticalSection::enter();
        let thread: JoinHandle<()> = thread::Builder::new()
            .name(String::from("tick"))
            .spawn(move || run_timer(weak, interval, stopped))
            .map_err(|e| {
                let cause: String = format!("cannot create timer thread: {}", e);
                error!("start(): {}", cause);
                Fail::new(e.raw_os_error().unwrap_or(libc::EAGAIN), &cause)
            })?;

        debug!("start(): tick source armed (interval={:?})", interval);
        *timer = Some(TimerThread {
            interval,
            stop,
            thread,
        });
        Ok(())
    }

    /// Disarms the tick source. Returns the interval it was armed with, if it was.
    pub fn stop(&self) -> Option<Duration> {
        let timer: Option<TimerThread> = self.lock().take();
        timer.map(|timer| {
            drop(timer.stop);
            if timer.thread.join().is_err() {
                warn!("stop(): timer thread panicked");
            }
            debug!("stop(): tick source disarmed");
            timer.interval
        })
    }

    /// Interval the tick source is armed with.
    pub fn interval(&self) -> Option<Duration> {
        self.lock().as_ref().map(|timer| timer.interval)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for TickSource {
    fn default() -> Self {
        Self::new()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
