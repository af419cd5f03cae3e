mod agent_loop;
mod base_tools;
mod tool;

pub use agent_loop::{run_agent_loop, AgentOutcome, CtxBuilder};
pub use base_tools::{base_tools, FINISH_TOOL, REPORT_THINKING_TOOL};
pub use tool::{Tool, ToolPool};
