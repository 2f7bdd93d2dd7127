// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

/// Upper bound on the number of tasks a port may host. This sizes the slot table.
/// Matches the number of priority levels of the kernel (one task per priority).
pub const MAX_TASKS: usize = 64;

/// Default number of tasks admitted by a port.
pub const DEFAULT_MAX_TASKS: usize = 16;

/// Default kernel time base, in ticks per second.
pub const DEFAULT_TICKS_PER_SEC: u32 = 100;

/// Default granularity floor of the host timer, in microseconds.
pub const DEFAULT_MIN_TICK_INTERVAL_US: u64 = 1000;

/// Number of microseconds in a second.
pub const MICROS_PER_SEC: u64 = 1_000_000;

/// Smallest stack region that is handed to the host as the stack of a task thread. Regions below this only carry the
/// bootstrap record and the thread gets the host default stack.
pub const MIN_TASK_STACK_SIZE: usize = 64 * 1024;
