//! Cognitive memory graph command-line tool
//!
//! Every invocation works against a JSON snapshot: load it, run one command,
//! save it again if the command changed anything. Output is JSON on stdout,
//! logs go to stderr.

pub mod args;
pub mod commands;

pub use args::{Cli, Command, EmbeddingChoice, GlobalArgs, StorageBackend};
pub use commands::{build_config, build_engine, build_manager, execute, run};
