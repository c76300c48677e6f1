//! The `config` module loads runtime settings.
//!
//! Sources, lowest priority first: built-in defaults, an optional
//! `config/default` file (any format the `config` crate understands), then
//! `BROKERLINK_`-prefixed environment variables using `__` to descend into
//! sections, e.g. `BROKERLINK_BROKER__RECONNECT_DELAY_SECS=2`.

mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    BrokerSettings, LoggingSettings, PersistenceSettings, ServerSettings, Settings, StoreBackend,
};

const ENV_PREFIX: &str = "BROKERLINK";

/// Loads the configuration from the default file and environment variables
/// and merges it over the default values.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Same as [`load_config`] but reads the file layer from `path` (extension optional).
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge_with_defaults())
}
