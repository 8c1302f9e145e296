pub mod dispatcher;
pub mod forwarder;
pub mod server;

pub use dispatcher::{DispatchFailure, DispatchStage, Dispatcher};
pub use forwarder::{Forwarder, TransportError, Upstream};
pub use server::{build_router, GatewayServer};
