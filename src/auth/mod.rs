pub mod credentials;

pub use credentials::{extract, MissingCredential};
