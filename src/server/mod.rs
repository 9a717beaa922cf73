pub mod bootstrap;
pub mod logging;
pub mod protocol;
pub mod ws;

pub use bootstrap::{run_server, ServerConfig, DEFAULT_HTTP_PORT, DEFAULT_WS_PORT};
pub use protocol::{AckPayload, ClientEnvelope, ServerEnvelope};
pub use ws::WsState;
