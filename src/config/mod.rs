pub mod schema;

pub use schema::{BackendMode, Config, GatewayConfig, LlmConfig, RunsConfig, SimulationConfig};
