//! Tandem Runtime
//!
//! Binds the bridge engine to the reference script VM: a [`Runtime`] is an
//! [`Environment`] whose embedded state is a fresh [`tandem_vm::Vm`].
//!
//! # Example
//!
//! ```rust,ignore
//! use tandem_runtime::Runtime;
//!
//! let runtime = Runtime::new()?;
//! runtime.set_global("limit", &10.into())?;
//! let results = runtime.run("return limit * 2")?;
//! ```

pub mod logging;

use std::ops::Deref;
use std::path::Path;

use tandem_engine::{BridgeConfig, BridgeResult, Environment};
use tandem_vm::Vm;

pub use logging::init_logging;
pub use tandem_engine;

/// An environment running on the reference VM
pub struct Runtime {
    env: Environment,
}

impl Runtime {
    /// Runtime with the default bridge configuration
    pub fn new() -> BridgeResult<Self> {
        Self::with_config(BridgeConfig::default())
    }

    pub fn with_config(config: BridgeConfig) -> BridgeResult<Self> {
        let env = Environment::new(Box::new(Vm::new()), config)?;
        Ok(Self { env })
    }

    /// Runtime configured from a TOML file
    pub fn from_config_file(path: &Path) -> BridgeResult<Self> {
        Self::with_config(BridgeConfig::from_file(path)?)
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn into_environment(self) -> Environment {
        self.env
    }
}

impl Deref for Runtime {
    type Target = Environment;

    fn deref(&self) -> &Environment {
        &self.env
    }
}
