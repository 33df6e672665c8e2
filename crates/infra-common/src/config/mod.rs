//! Layered configuration loading.
//!
//! Values are merged in this order, later sources overriding earlier ones:
//! the type's `Default`, an optional TOML file, then `<PREFIX>_<FIELD>`
//! environment variables.

use std::path::Path;

use ::config::{Config, Environment, File, FileFormat};
use serde::{de::DeserializeOwned, Serialize};

use crate::errors::types::Result;

/// Load `T` from defaults, an optional TOML file and the environment.
///
/// Only flat configuration structs are supported by the environment layer:
/// `RTCALL_RING_TIMEOUT_MS=5000` maps to the `ring_timeout_ms` field.
pub fn load_layered<T>(path: Option<&Path>, env_prefix: &str) -> Result<T>
where
    T: DeserializeOwned + Serialize + Default,
{
    let mut builder = Config::builder().add_source(Config::try_from(&T::default())?);

    if let Some(path) = path {
        tracing::debug!("Loading configuration file {}", path.display());
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
    }

    let merged = builder
        .add_source(Environment::with_prefix(env_prefix).try_parsing(true))
        .build()?;

    Ok(merged.try_deserialize::<T>()?)
}
