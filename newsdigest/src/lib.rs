// Library interface for newsdigest modules
// This allows tests and the diagnostic binaries to import modules

pub mod digest;
pub mod error;
pub mod filter;
pub mod ingestion;
pub mod llm;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod processing;
pub mod scheduler;
pub mod server;
pub mod storage;

#[cfg(test)]
mod testing;
