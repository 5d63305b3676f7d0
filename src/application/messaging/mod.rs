//! Message handling - parsing and command dispatch

pub mod dispatcher;
pub mod parser;

pub use dispatcher::{CommandDispatcher, DispatchOutcome};
pub use parser::{MessageParser, ParsedCommand};
