mod catalog;
mod dispatch;
mod types;

pub use catalog::get_available_tools;
pub use dispatch::execute_tool;
pub use types::{CallToolRequest, CallToolResponse, ContentBlock, ListToolsResponse, Tool};
