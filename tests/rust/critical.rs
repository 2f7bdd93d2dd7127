// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod common;

//======================================================================================================================
// Imports
//======================================================================================================================

use self::common::Harness;
use ::anyhow::Result;
use ::hostport::{
    critical_section,
    enter_critical,
    ensure_eq,
    exit_critical,
    CriticalSection,
};
use ::std::sync::{
    atomic::Ordering,
    Arc,
};

//======================================================================================================================
// Critical Sections
//======================================================================================================================

/// Ticks are held back while a task is inside of a critical section, and are taken once it leaves.
#[test]
fn no_tick_inside_critical_section() -> Result<()> {
    let harness: Arc<Harness> = Harness::new(&common::config(4, 1000)?, 1, common::masking_task, true)?;
    harness.register_all()?;
    harness.port.launch()?;
    ensure_eq!(
        common::wait_until(|| harness.windows.load(Ordering::Acquire) >= 50),
        true
    );
    harness.finish();

    ensure_eq!(harness.violations.load(Ordering::Acquire), 0);
    // Ticks keep flowing outside of critical sections.
    ensure_eq!(harness.released.load(Ordering::Acquire) > 0, true);
    let ticks: u64 = harness.kernel.ticks();
    ensure_eq!(ticks > 0, true);
    // The port counts a tick before the kernel processes it.
    ensure_eq!(harness.port.stats().ticks >= ticks, true);
    Ok(())
}

/// Critical sections nest: only the outermost exit gives ticks back.
#[test]
fn nested_sections_restore_outer_state() -> Result<()> {
    let outer: CriticalSection = enter_critical();
    let nested: bool = critical_section(|_| {
        let inner: CriticalSection = enter_critical();
        exit_critical(inner);
        hostport::port::critical::is_masked()
    });
    ensure_eq!(nested, true);
    ensure_eq!(hostport::port::critical::is_masked(), true);
    exit_critical(outer);
    Ok(())
}
