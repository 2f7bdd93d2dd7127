// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::clap::{
    Arg,
    ArgMatches,
    Command,
};

//======================================================================================================================
// Program Arguments
//======================================================================================================================

/// Program Arguments
#[derive(Debug)]
pub struct ProgramArguments {
    /// Number of application tasks.
    tasks: usize,
    /// Kernel time base, overriding the configuration.
    ticks_per_sec: Option<u32>,
    /// Path to the configuration file.
    config_path: Option<String>,
}

impl ProgramArguments {
    /// Default number of application tasks.
    const DEFAULT_TASKS: usize = 4;

    /// Parses the program arguments from the command line interface.
    pub fn new(app_name: &'static str, app_about: &'static str) -> Result<Self> {
        let matches: ArgMatches = Command::new(app_name)
            .about(app_about)
            .arg(
                Arg::new("tasks")
                    .long("tasks")
                    .value_parser(clap::value_parser!(usize))
                    .required(false)
                    .value_name("N")
                    .help("Sets the number of application tasks"),
            )
            .arg(
                Arg::new("ticks-per-sec")
                    .long("ticks-per-sec")
                    .value_parser(clap::value_parser!(u32))
                    .required(false)
                    .value_name("HZ")
                    .help("Sets the kernel time base"),
            )
            .arg(
                Arg::new("config")
                    .long("config")
                    .value_parser(clap::value_parser!(String))
                    .required(false)
                    .value_name("PATH")
                    .help("Sets the configuration file"),
            )
            .get_matches();

        let tasks: usize = matches
            .get_one::<usize>("tasks")
            .copied()
            .unwrap_or(Self::DEFAULT_TASKS);
        if tasks == 0 {
            anyhow::bail!("at least one application task is required");
        }

        let ticks_per_sec: Option<u32> = matches.get_one::<u32>("ticks-per-sec").copied();
        if ticks_per_sec == Some(0) {
            anyhow::bail!("invalid tick frequency");
        }

        // The command line wins over the environment.
        let config_path: Option<String> = matches
            .get_one::<String>("config")
            .cloned()
            .or_else(|| ::std::env::var("CONFIG_PATH").ok());

        Ok(Self {
            tasks,
            ticks_per_sec,
            config_path,
        })
    }

    /// Returns the `tasks` command line argument.
    pub fn tasks(&self) -> usize {
        self.tasks
    }

    /// Returns the `ticks-per-sec` command line argument.
    pub fn ticks_per_sec(&self) -> Option<u32> {
        self.ticks_per_sec
    }

    /// Returns the `config` command line argument.
    pub fn config_path(&self) -> Option<String> {
        self.config_path.clone()
    }
}
