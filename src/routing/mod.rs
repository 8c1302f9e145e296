pub mod classifier;

pub use classifier::{RouteClassifier, RoutePattern};
