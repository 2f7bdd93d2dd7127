// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Host-process port for a single-core real-time kernel.
//!
//! Every kernel task runs on its own native thread, but only one of them is ever allowed to execute: all other task
//! threads sit parked on their own condition variable. A context switch hands the baton over by signaling the
//! condition of the next task and then parking the current one, all under a single coordination lock. Preemption is
//! emulated with a periodic, thread-directed signal that lands on whichever task thread is currently dispatched, and
//! critical sections mask that signal on the calling thread.
//!
//! The task selection algorithm is not part of this crate. It is supplied through the [runtime::kernel::Kernel]
//! trait.

#![cfg_attr(feature = "strict", deny(warnings))]
#![deny(clippy::all)]

#[macro_use]
extern crate log;

pub mod config;
pub mod pal;
pub mod port;
pub mod runtime;

pub use self::{
    config::Config,
    port::{
        bootstrap::{
            minimum_bootstrap_size,
            prepare,
            BootstrapHandle,
            TaskArgument,
            TaskEntry,
        },
        critical::{
            critical_section,
            enter_critical,
            exit_critical,
            CriticalSection,
        },
        Port,
        PortStats,
    },
    runtime::{
        fail::Fail,
        kernel::Kernel,
    },
};

//======================================================================================================================
// Macros
//======================================================================================================================

/// Ensures that two expressions are equal, bailing out with an [anyhow::Error] otherwise.
#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr) => ({
        match (&$left, &$right) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    anyhow::bail!(r#"ensure failed: `(left == right)`
  left: `{:?}`,
 right: `{:?}`"#, left_val, right_val)
                }
            }
        }
    });
    ($left:expr, $right:expr,) => ({
        $crate::ensure_eq!($left, $right)
    });
}

/// Ensures that two expressions are not equal, bailing out with an [anyhow::Error] otherwise.
#[macro_export]
macro_rules! ensure_neq {
    ($left:expr, $right:expr) => ({
        match (&$left, &$right) {
            (left_val, right_val) => {
                if *left_val == *right_val {
                    anyhow::bail!(r#"ensure failed: `(left != right)`
  left: `{:?}`,
 right: `{:?}`"#, left_val, right_val)
                }
            }
        }
    });
    ($left:expr, $right:expr,) => ({
        $crate::ensure_neq!($left, $right)
    });
}
