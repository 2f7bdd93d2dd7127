// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod common;

//======================================================================================================================
// Imports
//======================================================================================================================

use self::common::Harness;
use ::anyhow::Result;
use ::hostport::{
    ensure_eq,
    ensure_neq,
    PortStats,
};
use ::std::{
    sync::{
        atomic::Ordering,
        Arc,
    },
    thread,
    time::Duration,
};

//======================================================================================================================
// Startup
//======================================================================================================================

/// Once the start routine returns, one task runs and every other one is parked.
#[test]
fn first_task_runs_alone() -> Result<()> {
    let ntasks: usize = 4;
    let harness: Arc<Harness> = Harness::new(&common::config(8, 100)?, ntasks, common::spinning_task, false)?;
    harness.register_all()?;

    harness.port.launch()?;
    ensure_eq!(harness.kernel.has_started(), true);
    ensure_eq!(common::wait_until(|| harness.runs(0) > 0), true);

    // Without preemption nor yields, nobody else ever gets to run.
    thread::sleep(Duration::from_millis(50));
    let stats: PortStats = harness.port.stats();
    ensure_eq!(stats.released, true);
    ensure_eq!(stats.created, ntasks);
    ensure_eq!(stats.started, ntasks);
    ensure_eq!(stats.parked, ntasks - 1);
    ensure_eq!(stats.owners(), 1);
    ensure_eq!(stats.dispatched, Some(0));
    for index in 1..ntasks {
        ensure_eq!(harness.runs(index), 0);
    }

    harness.finish();
    Ok(())
}

/// A task runs with exactly the argument it was prepared with.
#[test]
fn entry_receives_its_argument() -> Result<()> {
    let harness: Arc<Harness> = Harness::new(&common::config(4, 100)?, 2, common::yielding_task, false)?;
    harness.register_all()?;
    harness.port.launch()?;
    ensure_eq!(common::wait_until(|| harness.runs(0) > 0 && harness.runs(1) > 0), true);

    for index in 0..2 {
        let expected: usize = Arc::as_ptr(harness.kernel.task(index)?.argument()) as *const () as usize;
        ensure_eq!(harness.arguments[index].load(Ordering::Acquire), expected);
    }
    ensure_eq!(harness.kernel.task(0)?.ptr_eq(harness.kernel.task(1)?), false);
    ensure_neq!(
        harness.arguments[0].load(Ordering::Acquire),
        harness.arguments[1].load(Ordering::Acquire)
    );

    harness.finish();
    Ok(())
}

/// The start routine runs once per port.
#[test]
fn launch_twice_fails() -> Result<()> {
    let harness: Arc<Harness> = Harness::new(&common::config(4, 100)?, 1, common::spinning_task, false)?;
    harness.register_all()?;
    harness.port.launch()?;
    ensure_eq!(harness.port.launch().map_err(|e| e.errno), Err(libc::EALREADY));
    harness.finish();
    Ok(())
}

/// Starting a port that has no task is a misuse.
#[test]
fn launch_without_tasks_fails() -> Result<()> {
    let harness: Arc<Harness> = Harness::new(&common::config(4, 100)?, 0, common::spinning_task, false)?;
    ensure_eq!(harness.port.launch().map_err(|e| e.errno), Err(libc::EINVAL));
    ensure_eq!(harness.port.stats().released, false);
    Ok(())
}

/// A task registered after the start routine parks until the kernel selects it.
#[test]
fn late_task_parks_until_selected() -> Result<()> {
    let harness: Arc<Harness> = Harness::new(&common::config(4, 100)?, 3, common::yielding_task, false)?;
    harness.register(0)?;
    harness.register(1)?;
    harness.port.launch()?;
    ensure_eq!(common::wait_until(|| harness.runs(1) > 0), true);

    ensure_eq!(harness.register(2)?, 2);
    ensure_eq!(common::wait_until(|| harness.runs(2) > 0), true);
    ensure_eq!(harness.port.stats().started, 3);

    harness.finish();
    Ok(())
}

/// Only the thread of the current task may switch.
#[test]
fn switch_from_foreign_thread_fails() -> Result<()> {
    let harness: Arc<Harness> = Harness::new(&common::config(4, 100)?, 2, common::spinning_task, false)?;
    harness.register_all()?;
    harness.port.launch()?;
    ensure_eq!(harness.port.switch_context().map_err(|e| e.errno), Err(libc::EPERM));
    ensure_eq!(harness.port.stats().switches, 0);
    harness.finish();
    Ok(())
}
