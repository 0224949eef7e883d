pub mod dispatcher;
pub mod envelope;
pub mod protocol;
pub mod tools;

pub use dispatcher::Dispatcher;
pub use tools::{StaticPayloads, ToolRouter};
