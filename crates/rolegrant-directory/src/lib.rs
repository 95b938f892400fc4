pub mod client;
pub mod error;
pub mod graph;

pub use client::DirectoryClient;
pub use error::DirectoryError;
pub use graph::{GraphClient, GraphClientConfig};
