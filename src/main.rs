//! `promptpos` terminal tool.
//!
//! Commands:
//! - `qr --target <id> [--amount <baht>]` – Print a PromptPay payload
//! - `verify <payload>` – Check a payload's checksum and list its fields
//! - `session import|status|refresh|logout` – Manage the stored member session
//! - `get <path>` – Authenticated GET through the session middleware
//! - `keepalive` – Keep the session refreshed until SIGINT/SIGTERM or a forced logout
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `CONFIG` path of the JSON configuration file
//! - `POS_API_BASE`, `POS_TOKEN_STORE` defaults for the config file fields
//! - `RUST_LOG` log filter, `OTEL_*` variables enable OTLP export (`telemetry` feature)

use std::process;

use promptpos::run::run;

#[tokio::main]
async fn main() {
    let result = run().await;
    if let Err(e) = result {
        eprintln!("{e}");
        process::exit(1)
    }
}
