pub mod cli;
pub mod jsonrpc;
pub mod planner;
pub mod profiles;
pub mod supervisor;

pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestBuilder};
pub use planner::{plan_execution, ExecutionPlan, ExecutionSource};
pub use profiles::{get_profile, list_profiles, McpProfile};
pub use supervisor::{McpError, McpProcess, ProcessEvent, ProcessState, ServerMessage};
