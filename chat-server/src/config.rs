//! Process configuration, parsed from the CLI contract in spec §6.

use std::path::PathBuf;

use clap::Parser;

/// `chat-server <address> <port> <doc_root> <threads> <db_path>`
#[derive(Parser, Debug, Clone)]
#[command(name = "chat-server", about = "Chat core: sessions, fan-out, friendships")]
pub struct Config {
    /// Address to bind the front door to (e.g. 127.0.0.1).
    pub address: String,

    /// TCP port to listen on.
    pub port: u16,

    /// Root directory for static asset serving (out of scope for this
    /// core; accepted so the CLI contract matches, mounted as an inert
    /// fallback file service).
    pub doc_root: PathBuf,

    /// Number of worker threads in the executor pool.
    pub threads: usize,

    /// Path to the SQLite database file.
    pub db_path: PathBuf,
}

impl Config {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
