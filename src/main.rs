// Miller MCP server entry point.
//
// stdout carries JSON-RPC frames exclusively; all diagnostics go to the
// rolling log file under .miller/logs/ (stderr only before logging exists).

use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use miller::handler::MillerServerHandler;
use rust_mcp_sdk::schema::{
    Implementation, InitializeResult, ServerCapabilities, ServerCapabilitiesTools,
    LATEST_PROTOCOL_VERSION,
};
use rust_mcp_sdk::{
    error::SdkResult,
    mcp_server::{server_runtime, ServerRuntime},
    McpServer, StdioTransport, TransportOptions,
};

const AGENT_INSTRUCTIONS: &str = r#"# Miller - Code Intelligence Server

## Quick Start
1. Search code: `fast_search query="your_search"`
2. Navigate: `fast_goto symbol_name="SymbolName"`
3. Find references: `fast_refs symbol_name="SymbolName"`
4. Trace across languages: `trace_call_path symbol_name="SymbolName"`

## Key Tools
- **get_symbols**: file structure without reading full content
- **trace_call_path**: execution flow across language boundaries
- **fast_explore**: dead code, hot spots, architecture
- **manage_workspace**: index health and refresh

The workspace indexes itself in the background after connection; searches
work as soon as indexing completes."#;

/// Determine the workspace root from CLI args, environment, or cwd.
///
/// Priority order:
/// 1. `--workspace <path>` CLI argument
/// 2. `MILLER_WORKSPACE` environment variable
/// 3. Current working directory
///
/// Paths are tilde-expanded and canonicalized so the same logical directory
/// always maps to the same workspace id.
fn get_workspace_root() -> PathBuf {
    let args: Vec<String> = env::args().collect();
    if let Some(pos) = args.iter().position(|a| a == "--workspace") {
        if let Some(path_str) = args.get(pos + 1) {
            let expanded = shellexpand::tilde(path_str).to_string();
            let path = PathBuf::from(expanded);
            if path.exists() {
                let canonical = path.canonicalize().unwrap_or_else(|e| {
                    eprintln!("Warning: could not canonicalize {path:?}: {e}");
                    path.clone()
                });
                return canonical;
            }
            eprintln!("Warning: --workspace path does not exist: {path:?}");
        }
    }

    if let Ok(path_str) = env::var("MILLER_WORKSPACE") {
        let expanded = shellexpand::tilde(&path_str).to_string();
        let path = PathBuf::from(expanded);
        if path.exists() {
            return path.canonicalize().unwrap_or(path);
        }
        eprintln!("Warning: MILLER_WORKSPACE path does not exist: {path_str}");
    }

    let current = env::current_dir().unwrap_or_else(|e| {
        eprintln!("Warning: could not determine current directory: {e}");
        PathBuf::from(".")
    });
    current.canonicalize().unwrap_or(current)
}

#[tokio::main]
async fn main() -> SdkResult<()> {
    // Workspace root must be known before logging so the log file lands in
    // the right .miller directory (MCP hosts start servers from arbitrary
    // working directories).
    let workspace_root = get_workspace_root();
    // Hand the resolved root to the handler's lazy initialization.
    unsafe {
        env::set_var("MILLER_WORKSPACE", &workspace_root);
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("miller=info"))
        .map_err(|e| {
            rust_mcp_sdk::error::McpSdkError::Io(std::io::Error::other(format!(
                "Failed to initialize logging filter: {e}"
            )))
        })?;

    let logs_dir = workspace_root.join(".miller").join("logs");
    fs::create_dir_all(&logs_dir).unwrap_or_else(|e| {
        eprintln!("Failed to create logs directory at {logs_dir:?}: {e}");
    });

    let file_appender = rolling::daily(&logs_dir, "miller.log");
    let (non_blocking_file, _file_guard) = non_blocking(file_appender);

    // stdout is reserved for the protocol; file output only.
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking_file)
                .with_target(true)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    info!("Starting Miller - Code Intelligence Server");
    info!("Workspace root: {:?}", workspace_root);
    debug!("Logging to {:?}", logs_dir.join("miller.log"));

    let server_details = InitializeResult {
        server_info: Implementation {
            name: "Miller".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: Some("Miller - Code Intelligence Server".to_string()),
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools { list_changed: None }),
            ..Default::default()
        },
        meta: None,
        instructions: Some(AGENT_INSTRUCTIONS.to_string()),
        protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
    };

    let transport = StdioTransport::new(TransportOptions::default())?;
    debug!("STDIO transport initialized");

    let handler = MillerServerHandler::new()
        .await
        .map_err(|e| rust_mcp_sdk::error::McpSdkError::Io(std::io::Error::other(e.to_string())))?;

    // The SDK takes the request handler by value; background indexing and
    // shutdown run on a sibling handler sharing the same workspace state.
    let background = Arc::new(MillerServerHandler::with_shared_workspace(
        handler.workspace.clone(),
    ));
    MillerServerHandler::spawn_startup_indexing(background.clone());

    let server: Arc<ServerRuntime> =
        server_runtime::create_server(server_details, transport, handler);

    info!("Miller server created and ready to start");
    if let Err(start_error) = server.start().await {
        error!("Server failed to start: {}", start_error);
        eprintln!(
            "Miller server error: {}",
            start_error
                .rpc_error_message()
                .unwrap_or(&start_error.to_string())
        );
        return Err(start_error);
    }

    info!("Miller server stopped");

    // Checkpoint the WAL and stop the watcher so nothing leaks across
    // sessions.
    background.shutdown().await;
    warn!("Shutdown cleanup complete");

    Ok(())
}
