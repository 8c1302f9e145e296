pub mod registry;

pub use registry::{ServiceEntry, ServiceRegistry};
