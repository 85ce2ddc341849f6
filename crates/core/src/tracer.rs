//! Pluggable span-tree tracing: `Tracer -> Trace -> Span | Generation`.
//!
//! The default implementation is a no-op; a remote exporter is only
//! constructed when both a public and a secret key are configured.

use serde_json::Value;
use std::sync::Arc;

use crate::config::ObservabilityConfig;

#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
  pub input_tokens: u32,
  pub output_tokens: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SpanUpdate {
  pub output: Option<String>,
  pub metadata: Option<Value>,
  pub usage: Option<Usage>,
}

pub trait SpanHandle: Send {
  fn update(&mut self, update: SpanUpdate);
  fn end(&mut self);
}

pub trait TraceHandle: Send {
  fn span(&mut self, name: &str) -> Box<dyn SpanHandle>;
  fn generation(&mut self, name: &str) -> Box<dyn SpanHandle>;
  fn update(&mut self, update: SpanUpdate);
  fn end(&mut self);
}

pub trait Tracer: Send + Sync {
  fn trace(&self, name: &str) -> Box<dyn TraceHandle>;
}

// ---------------------------------------------------------------------------
// No-op implementation
// ---------------------------------------------------------------------------

pub struct NoopTracer;

struct NoopTrace;
struct NoopSpan;

impl SpanHandle for NoopSpan {
  fn update(&mut self, _update: SpanUpdate) {}
  fn end(&mut self) {}
}

impl TraceHandle for NoopTrace {
  fn span(&mut self, _name: &str) -> Box<dyn SpanHandle> {
    Box::new(NoopSpan)
  }
  fn generation(&mut self, _name: &str) -> Box<dyn SpanHandle> {
    Box::new(NoopSpan)
  }
  fn update(&mut self, _update: SpanUpdate) {}
  fn end(&mut self) {}
}

impl Tracer for NoopTracer {
  fn trace(&self, _name: &str) -> Box<dyn TraceHandle> {
    Box::new(NoopTrace)
  }
}

/// The shared no-op tracer. The tracer and its handles are zero-sized, so
/// handing out spans never allocates.
pub fn noop_tracer() -> Arc<dyn Tracer> {
  static SHARED: std::sync::OnceLock<Arc<dyn Tracer>> = std::sync::OnceLock::new();
  SHARED.get_or_init(|| Arc::new(NoopTracer)).clone()
}

// ---------------------------------------------------------------------------
// Exporter-backed implementation
// ---------------------------------------------------------------------------

/// Local stand-in for a remote exporter: records span lifecycles through
/// `tracing` so a subscriber (the actual exporter integration point) can
/// forward them.
pub struct ExporterTracer {
  host: String,
}

struct ExporterTrace {
  name: String,
}

struct ExporterSpan {
  name: String,
  kind: &'static str,
}

impl SpanHandle for ExporterSpan {
  fn update(&mut self, update: SpanUpdate) {
    tracing::debug!(
      target: "ctx::trace",
      span = %self.name,
      kind = self.kind,
      output_len = update.output.as_ref().map(|o| o.len()),
      "span update"
    );
  }

  fn end(&mut self) {
    tracing::debug!(target: "ctx::trace", span = %self.name, kind = self.kind, "span end");
  }
}

impl TraceHandle for ExporterTrace {
  fn span(&mut self, name: &str) -> Box<dyn SpanHandle> {
    Box::new(ExporterSpan {
      name: format!("{}/{}", self.name, name),
      kind: "span",
    })
  }

  fn generation(&mut self, name: &str) -> Box<dyn SpanHandle> {
    Box::new(ExporterSpan {
      name: format!("{}/{}", self.name, name),
      kind: "generation",
    })
  }

  fn update(&mut self, _update: SpanUpdate) {}

  fn end(&mut self) {
    tracing::debug!(target: "ctx::trace", trace = %self.name, "trace end");
  }
}

impl Tracer for ExporterTracer {
  fn trace(&self, name: &str) -> Box<dyn TraceHandle> {
    tracing::debug!(target: "ctx::trace", trace = name, host = %self.host, "trace start");
    Box::new(ExporterTrace { name: name.to_string() })
  }
}

/// Build a tracer from config. The exporter needs both keys; anything less
/// yields the no-op.
pub fn tracer_from_config(config: &ObservabilityConfig) -> Arc<dyn Tracer> {
  if !config.enabled {
    return noop_tracer();
  }
  match (&config.langfuse_public_key, &config.langfuse_secret_key) {
    (Some(public), Some(secret)) if !public.is_empty() && !secret.is_empty() => Arc::new(ExporterTracer {
      host: config
        .langfuse_host
        .clone()
        .unwrap_or_else(|| "https://cloud.langfuse.com".to_string()),
    }),
    _ => {
      tracing::debug!("Observability enabled but keys incomplete; tracing is a no-op");
      noop_tracer()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_noop_tracer_handles() {
    let tracer = noop_tracer();
    let mut trace = tracer.trace("query");
    let mut span = trace.span("dense");
    span.update(SpanUpdate::default());
    span.end();
    trace.end();
  }

  #[test]
  fn test_disabled_config_is_noop() {
    let config = ObservabilityConfig::default();
    let tracer = tracer_from_config(&config);
    tracer.trace("t").end();
  }

  #[test]
  fn test_gating_requires_both_keys() {
    let mut config = ObservabilityConfig {
      enabled: true,
      langfuse_public_key: Some("pk".to_string()),
      ..Default::default()
    };
    // Only public key: still no-op (behaviorally indistinguishable, but must not panic).
    tracer_from_config(&config).trace("t").end();

    config.langfuse_secret_key = Some("sk".to_string());
    let tracer = tracer_from_config(&config);
    let mut trace = tracer.trace("t");
    trace.generation("answer").end();
    trace.end();
  }
}
