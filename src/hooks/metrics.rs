//! A counting decorator for any [`HookHandler`] (SPEC_FULL §4.3 "Ambient
//! dispatcher concerns"). Metrics *exposition* format is out of scope; this
//! only keeps in-process counters and logs them through `tracing`, the way
//! the reference crate threads its own lifecycle/coordination events
//! through `tracing` rather than a dedicated metrics pipeline.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::{HookEvent, HookHandler, HookResponse, HookType};
use crate::error::HookError;

#[derive(Debug, Default)]
struct Counters {
    invocations: AtomicU64,
    failures: AtomicU64,
}

pub struct MetricsHookHandler<H: HookHandler> {
    inner: H,
    counters: DashMap<HookType, Counters>,
}

impl<H: HookHandler> MetricsHookHandler<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            counters: DashMap::new(),
        }
    }

    pub fn invocation_count(&self, kind: HookType) -> u64 {
        self.counters
            .get(&kind)
            .map(|c| c.invocations.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn failure_count(&self, kind: HookType) -> u64 {
        self.counters
            .get(&kind)
            .map(|c| c.failures.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

#[async_trait]
impl<H: HookHandler> HookHandler for MetricsHookHandler<H> {
    async fn invoke(&self, event: &HookEvent) -> Result<HookResponse, HookError> {
        let entry = self.counters.entry(event.kind).or_default();
        let invocations = entry.invocations.fetch_add(1, Ordering::Relaxed) + 1;
        drop(entry);

        let result = self.inner.invoke(event).await;
        if result.is_err() {
            let entry = self.counters.entry(event.kind).or_default();
            let failures = entry.failures.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(
                hook = event.kind.name(),
                invocations, failures, "hook invocation failed"
            );
        }
        result
    }
}
