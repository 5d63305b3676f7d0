//! Domain entities - Core business objects with no external dependencies

pub mod alert;
pub mod arguments;
pub mod command;
pub mod message;
pub mod module;
pub mod permission;
pub mod user;

pub use alert::{Alert, AlertKind};
pub use arguments::Arguments;
pub use command::{Command, CommandContext, CommandHandler, CommandNode, NodeId, NodeKind, RootCommand};
pub use message::{Message, MessageRef};
pub use module::{ModuleDescriptor, ModuleHandle};
pub use permission::{MemberInfo, Override, Subject};
pub use user::User;
