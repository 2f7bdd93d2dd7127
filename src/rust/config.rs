// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    limits,
};
use ::std::{
    fs,
    ops::Index,
    str::FromStr,
    time::Duration,
};
use ::yaml_rust::{
    yaml::Hash,
    Yaml,
    YamlLoader,
};

//======================================================================================================================
// Constants
//======================================================================================================================

// Port options.
mod port_config {
    pub const SECTION_NAME: &str = "hostport";
    // Number of tasks the port admits.
    pub const MAX_TASKS: &str = "max_tasks";
    // Kernel time base.
    pub const TICKS_PER_SEC: &str = "ticks_per_sec";
    // Granularity floor of the host timer.
    pub const MIN_TICK_INTERVAL_US: &str = "min_tick_interval_us";
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Port configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Yaml);

//======================================================================================================================
// Associated Functions
//======================================================================================================================

/// Common associated functions for port configuration object.
impl Config {
    /// Reads a configuration file into a [Config] object.
    pub fn new(config_path: &str) -> Result<Self, Fail> {
        let config_s: String = match fs::read_to_string(config_path) {
            Ok(config_s) => config_s,
            Err(e) => {
                let cause: String = format!("cannot read configuration file {:?}: {}", config_path, e);
                error!("new(): {}", cause);
                return Err(Fail::new(e.raw_os_error().unwrap_or(libc::EIO), &cause));
            },
        };
        Self::from_yaml_str(&config_s)
    }

    /// Parses a YAML document into a [Config] object.
    pub fn from_yaml_str(config_s: &str) -> Result<Self, Fail> {
        let config: Vec<Yaml> = match YamlLoader::load_from_str(config_s) {
            Ok(config) => config,
            Err(e) => {
                let cause: String = format!("malformed configuration: {}", e);
                error!("from_yaml_str(): {}", cause);
                return Err(Fail::new(libc::EINVAL, &cause));
            },
        };
        let config_obj: &Yaml = match &config[..] {
            &[ref c] => c,
            _ => return Err(Fail::new(libc::EINVAL, "Wrong number of config objects")),
        };

        Ok(Self(config_obj.clone()))
    }

    fn get_port_config(&self) -> Result<&Yaml, Fail> {
        Self::get_subsection(&self.0, port_config::SECTION_NAME)
    }

    /// Reads the "max tasks" parameter from the environment variable first and then the underlying configuration
    /// file. The value must lie in `1..=limits::MAX_TASKS`.
    pub fn max_tasks(&self) -> Result<usize, Fail> {
        let max_tasks: usize = if let Some(max_tasks) = Self::get_typed_env_option(port_config::MAX_TASKS)? {
            max_tasks
        } else {
            Self::get_int_option(self.get_port_config()?, port_config::MAX_TASKS)?
        };

        if max_tasks == 0 || max_tasks > limits::MAX_TASKS {
            let cause: String = format!(
                "max_tasks must be between 1 and {} (max_tasks={})",
                limits::MAX_TASKS,
                max_tasks
            );
            error!("max_tasks(): {}", cause);
            return Err(Fail::new(libc::ERANGE, &cause));
        }
        Ok(max_tasks)
    }

    /// Reads the "ticks per second" parameter from the environment variable first and then the underlying
    /// configuration file.
    pub fn ticks_per_sec(&self) -> Result<u32, Fail> {
        let ticks_per_sec: u32 = if let Some(ticks) = Self::get_typed_env_option(port_config::TICKS_PER_SEC)? {
            ticks
        } else {
            Self::get_int_option(self.get_port_config()?, port_config::TICKS_PER_SEC)?
        };

        if ticks_per_sec == 0 || u64::from(ticks_per_sec) > limits::MICROS_PER_SEC {
            let cause: String = format!("invalid tick frequency (ticks_per_sec={})", ticks_per_sec);
            error!("ticks_per_sec(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        Ok(ticks_per_sec)
    }

    /// Converts the tick frequency into the interval of the host timer.
    pub fn tick_interval(&self) -> Result<Duration, Fail> {
        let ticks_per_sec: u64 = u64::from(self.ticks_per_sec()?);
        Ok(Duration::from_micros(limits::MICROS_PER_SEC / ticks_per_sec))
    }

    /// Reads the granularity floor of the host timer. Shorter intervals are clamped to it.
    pub fn min_tick_interval(&self) -> Result<Duration, Fail> {
        let micros: u64 = if let Some(micros) = Self::get_typed_env_option(port_config::MIN_TICK_INTERVAL_US)? {
            micros
        } else {
            Self::get_int_option(self.get_port_config()?, port_config::MIN_TICK_INTERVAL_US)?
        };

        if micros == 0 {
            let cause: String = format!("{} must be positive", port_config::MIN_TICK_INTERVAL_US);
            error!("min_tick_interval(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        Ok(Duration::from_micros(micros))
    }

    /// Overrides the tick frequency, keeping every other option. The environment variable still takes precedence.
    pub fn set_ticks_per_sec(&mut self, ticks_per_sec: u32) -> Result<(), Fail> {
        let root: &mut Hash = match &mut self.0 {
            Yaml::Hash(root) => root,
            _ => {
                let cause: String = String::from("configuration is not a mapping");
                error!("set_ticks_per_sec(): {}", cause);
                return Err(Fail::new(libc::EINVAL, &cause));
            },
        };

        let section_name: Yaml = Yaml::String(port_config::SECTION_NAME.to_string());
        if !root.contains_key(&section_name) {
            root.insert(section_name.clone(), Yaml::Hash(Hash::new()));
        }
        match root.get_mut(&section_name) {
            Some(Yaml::Hash(section)) => {
                section.insert(
                    Yaml::String(port_config::TICKS_PER_SEC.to_string()),
                    Yaml::Integer(i64::from(ticks_per_sec)),
                );
                Ok(())
            },
            _ => {
                let cause: String = format!("parameter \"{}\" has unexpected type", port_config::SECTION_NAME);
                error!("set_ticks_per_sec(): {}", cause);
                Err(Fail::new(libc::EINVAL, &cause))
            },
        }
    }

    //======================================================================================================================
    // Static Functions
    //======================================================================================================================

    /// Looks up the section at `index`. The section is returned as a `&Yaml`, which is easier to index than a hash.
    fn get_subsection<'a>(yaml: &'a Yaml, index: &str) -> Result<&'a Yaml, Fail> {
        let section: &'a Yaml = Self::get_option(yaml, index)?;
        match section {
            Yaml::Hash(_) => Ok(section),
            _ => {
                let message: String = format!("parameter \"{}\" has unexpected type", index);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
        }
    }

    /// Looks up the option at `index`.
    fn get_option<'a>(yaml: &'a Yaml, index: &str) -> Result<&'a Yaml, Fail> {
        match yaml.index(index) {
            Yaml::BadValue => {
                let message: String = format!("missing configuration option \"{}\"", index);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
            value => Ok(value),
        }
    }

    /// Looks up the option at `index` and converts it with `receiver`.
    fn get_typed_option<'a, T, Fn>(yaml: &'a Yaml, index: &str, receiver: Fn) -> Result<T, Fail>
    where
        Fn: FnOnce(&'a Yaml) -> Option<T>,
    {
        let option: &'a Yaml = Self::get_option(yaml, index)?;
        match receiver(option) {
            Some(value) => Ok(value),
            None => {
                let message: String = format!("parameter {} has unexpected type", index);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
        }
    }

    /// Reads the upper-case environment variable named after `index`, which overrides the configuration file.
    fn get_typed_env_option<T: FromStr>(index: &str) -> Result<Option<T>, Fail> {
        if let Ok(var) = ::std::env::var(index.to_uppercase()) {
            if let Ok(value) = var.as_str().parse() {
                return Ok(Some(value));
            } else {
                let message: String = format!("parameter {} has unexpected type", index);
                return Err(Fail::new(libc::EINVAL, message.as_str()));
            }
        }
        Ok(None)
    }

    /// Looks up an integer option and checks that it fits in `T`.
    fn get_int_option<T: TryFrom<i64>>(yaml: &Yaml, index: &str) -> Result<T, Fail> {
        let val: i64 = Self::get_typed_option(yaml, index, &Yaml::as_i64)?;
        match T::try_from(val) {
            Ok(val) => Ok(val),
            _ => {
                let message: String = format!("parameter \"{}\" is out of range", index);
                Err(Fail::new(libc::ERANGE, message.as_str()))
            },
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

/// Built-in configuration, used when no configuration file is supplied.
impl Default for Config {
    fn default() -> Self {
        let mut section: Hash = Hash::new();
        section.insert(
            Yaml::String(port_config::MAX_TASKS.to_string()),
            Yaml::Integer(limits::DEFAULT_MAX_TASKS as i64),
        );
        section.insert(
            Yaml::String(port_config::TICKS_PER_SEC.to_string()),
            Yaml::Integer(i64::from(limits::DEFAULT_TICKS_PER_SEC)),
        );
        section.insert(
            Yaml::String(port_config::MIN_TICK_INTERVAL_US.to_string()),
            Yaml::Integer(limits::DEFAULT_MIN_TICK_INTERVAL_US as i64),
        );

        let mut root: Hash = Hash::new();
        root.insert(Yaml::String(port_config::SECTION_NAME.to_string()), Yaml::Hash(section));
        Self(Yaml::Hash(root))
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
