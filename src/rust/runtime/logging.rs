// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use ::flexi_logger::{
    Logger,
    LoggerHandle,
};
use ::std::sync::{
    Mutex,
    Once,
    OnceLock,
};

//==============================================================================
// Constants
//==============================================================================

/// Log specification used when `RUST_LOG` is not set.
const DEFAULT_LOG_SPEC: &str = "info";

//==============================================================================
// Static Variables
//==============================================================================

/// Guardian to the logging initialize function.
static INIT_LOG: Once = Once::new();

/// Keeps the logger alive for the lifetime of the process.
static LOGGER: OnceLock<Mutex<LoggerHandle>> = OnceLock::new();

//==============================================================================
// Standalone Functions
//==============================================================================

/// Initializes logging features.
pub fn initialize() {
    INIT_LOG.call_once(|| {
        // Another logger may already be installed (e.g. by the embedding application).
        match Logger::try_with_env_or_str(DEFAULT_LOG_SPEC).and_then(|logger| logger.start()) {
            Ok(handle) => {
                let _ = LOGGER.set(Mutex::new(handle));
            },
            Err(e) => eprintln!("logging::initialize(): failed to start logger ({:?})", e),
        }
    });
}
