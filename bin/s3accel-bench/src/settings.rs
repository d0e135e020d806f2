//! Layered configuration: defaults, an optional TOML file, then `S3ACCEL_*`
//! environment variables (`S3ACCEL_BLOCK_MANAGER__CAPACITY_BLOCKS=4`).

use std::path::Path;

use config::{ConfigError, Environment, File};
use s3accel_common::Config;

pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path));
    }

    builder
        .add_source(
            Environment::with_prefix("S3ACCEL")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}
