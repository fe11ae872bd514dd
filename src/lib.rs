pub mod args;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod log;
pub mod project;
pub mod releases;
pub mod resolver;

#[cfg(test)]
mod test_util;

pub use error::KilnError;
