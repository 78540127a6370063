// Miller MCP Tools - modularized by concern

// Shared infrastructure used by all tools
pub mod shared;

// Tool modules organized by functionality
pub mod exploration;
pub mod memory;
pub mod navigation;
pub mod search;
pub mod symbols;
pub mod trace_call_path;
pub mod workspace;

// Re-export all tools for external use
pub use exploration::{FastExploreTool, GetArchitectureMapTool, ValidateImportsTool};
pub use memory::{CheckpointTool, PlanTool, RecallTool};
pub use navigation::{FastGotoTool, FastLookupTool, FastRefsTool};
pub use search::FastSearchTool;
pub use shared::{OptimizedResponse, OutputFormat};
pub use symbols::GetSymbolsTool;
pub use trace_call_path::TraceCallPathTool;
pub use workspace::ManageWorkspaceTool;

use rust_mcp_sdk::tool_box;

// Generates the MillerTools enum with all tool variants
tool_box!(MillerTools, [
    ManageWorkspaceTool,
    FastSearchTool,
    FastGotoTool,
    FastRefsTool,
    FastLookupTool,
    GetSymbolsTool,
    TraceCallPathTool,
    GetArchitectureMapTool,
    ValidateImportsTool,
    FastExploreTool,
    CheckpointTool,
    RecallTool,
    PlanTool,
]);
