// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Method registry: the worker's callable surface.

use crate::context::RunContext;
use crate::error::RuntimeError;
use mill_core::WorkerFault;
use mill_wire::{CLEANUP_METHOD, METHODS_METHOD};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future a method resolves with.
pub type MethodFuture =
    Pin<Box<dyn Future<Output = Result<serde_json::Value, WorkerFault>> + Send>>;

trait Method: Send + Sync {
    fn call(&self, params: serde_json::Value, ctx: RunContext) -> MethodFuture;
}

struct FnMethod<F>(F);

impl<F, Fut> Method for FnMethod<F>
where
    F: Fn(serde_json::Value, RunContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, WorkerFault>> + Send + 'static,
{
    fn call(&self, params: serde_json::Value, ctx: RunContext) -> MethodFuture {
        Box::pin((self.0)(params, ctx))
    }
}

/// Name → method map constructed at worker startup.
///
/// Refuses the protocol's reserved names so cleanup and introspection
/// requests can never be shadowed by user code.
#[derive(Default)]
pub struct MethodRegistry {
    methods: HashMap<String, Arc<dyn Method>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async method under `name`.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, method: F) -> Result<(), RuntimeError>
    where
        F: Fn(serde_json::Value, RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, WorkerFault>> + Send + 'static,
    {
        let name = name.into();
        if name == CLEANUP_METHOD || name == METHODS_METHOD {
            return Err(RuntimeError::ReservedMethod { name });
        }
        if self.methods.contains_key(&name) {
            return Err(RuntimeError::DuplicateMethod { name });
        }
        self.methods.insert(name, Arc::new(FnMethod(method)));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Registered method names, sorted for deterministic introspection.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn invoke(
        &self,
        name: &str,
        params: serde_json::Value,
        ctx: RunContext,
    ) -> Option<MethodFuture> {
        self.methods.get(name).map(|m| m.call(params, ctx))
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
