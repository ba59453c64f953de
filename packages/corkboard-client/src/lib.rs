/// Network side of the corkboard client: the REST store, the push hub
/// transport, and config/logging setup for the binary.
pub mod config;
pub mod http;
pub mod hub;
pub mod logging;

pub use config::{default_config_path, load_effective_config, ConfigError};
pub use http::HttpBoardApi;
pub use hub::SignalRTransport;
