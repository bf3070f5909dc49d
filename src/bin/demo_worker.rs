// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Demo worker binary for the process-transport specs.
//!
//! Registers a handful of methods and serves frames over stdio until the
//! pool terminates it.

use mill_runtime::{MethodRegistry, RunContext, ServeOptions, WorkerFault};
use serde_json::json;
use std::sync::Arc;

fn die(code: i32) -> Result<serde_json::Value, WorkerFault> {
    std::process::exit(code)
}

fn registry() -> MethodRegistry {
    let mut registry = MethodRegistry::new();

    registry
        .register("add", |params: serde_json::Value, _ctx| async move {
            let a = params[0].as_i64().unwrap_or(0);
            let b = params[1].as_i64().unwrap_or(0);
            Ok(json!(a + b))
        })
        .expect("register add");

    registry
        .register("mul", |params: serde_json::Value, _ctx| async move {
            let a = params[0].as_i64().unwrap_or(0);
            let b = params[1].as_i64().unwrap_or(0);
            Ok(json!(a * b))
        })
        .expect("register mul");

    registry
        .register("sleep_ms", |params: serde_json::Value, ctx: RunContext| async move {
            let ms = params["ms"].as_u64().unwrap_or(100);
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_millis(ms)) => Ok(json!("slept")),
                _ = ctx.cancelled() => Err(WorkerFault::new("Aborted", "cancelled mid-sleep")),
            }
        })
        .expect("register sleep_ms");

    registry
        .register("count_events", |params: serde_json::Value, ctx: RunContext| async move {
            let n = params["n"].as_u64().unwrap_or(3);
            for i in 1..=n {
                ctx.emit(json!({"tick": i}));
            }
            Ok(json!(n))
        })
        .expect("register count_events");

    registry
        .register("print_stderr", |params: serde_json::Value, _ctx| async move {
            let line = params["line"].as_str().unwrap_or("noise").to_string();
            eprintln!("{line}");
            Ok(json!(null))
        })
        .expect("register print_stderr");

    registry
        .register("crash", |params: serde_json::Value, _ctx| async move {
            let code = params["code"].as_i64().unwrap_or(1) as i32;
            eprintln!("crashing with code {code}");
            die(code)
        })
        .expect("register crash");

    registry
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // diagnostics to stderr; stdout carries protocol frames
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) =
        mill_runtime::serve_stdio(Arc::new(registry()), ServeOptions::default()).await
    {
        eprintln!("worker runtime failed: {error}");
        std::process::exit(1);
    }
}
