//! Configuration for the wicket bot: schema, file discovery and persistence.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{
        clear_config_dir, config_dir, discover_and_load, find_or_default_config_path, load_config,
        load_config_value, save_config, set_config_dir, update_config,
    },
    schema::{PlugsConfig, ReconnectConfig, WicketConfig},
};
