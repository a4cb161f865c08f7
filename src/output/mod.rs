//! Downstream output: subscriber fan-out, payload formatting, console.

pub mod console;
pub mod formatter;
pub mod server;

pub use console::ConsoleReporter;
pub use server::BroadcastServer;
