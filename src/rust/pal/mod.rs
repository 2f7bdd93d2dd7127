// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// PAL: Platform Abstraction Layer
//======================================================================================================================

// This is the platform abstraction layer designed to hide how the host masks and delivers the tick signal. Everything
// in here is a thin wrapper over POSIX thread and signal calls.

pub mod constants;

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod linux;
        pub use self::linux::*;
    } else {
        compile_error!("the host port relies on POSIX thread-directed signals and supports Linux only");
    }
}
