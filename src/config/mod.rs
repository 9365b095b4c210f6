pub mod schema;

pub use schema::{Config, GatewayConfig, HistoryConfig, MediaConfig};
