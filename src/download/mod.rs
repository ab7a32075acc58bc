pub mod chunk_item;
pub mod chunk_manager;
pub mod chunk_range;
pub mod client;
pub mod config;
pub mod downloader;
pub mod error;
pub mod joiner;
pub mod logger;
pub mod persistence;
pub mod util;

#[cfg(test)]
mod mock;
