//! OTLP exporter, tracing layer, and the span-name sampler.

use opentelemetry::trace::{
    Link, SamplingDecision, SamplingResult, SpanKind, TraceContextExt, TraceId, TraceState, TracerProvider as _,
};
use opentelemetry::{Context, KeyValue, global};
use opentelemetry_otlp::SpanExporter;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{Sampler, SdkTracer, SdkTracerProvider, ShouldSample, SpanLimits};
use tokio::runtime::{EnterGuard, Handle, Runtime};
use tracing_opentelemetry::OpenTelemetryLayer;

use crate::sampling_rate;

#[derive(Debug, thiserror::Error)]
pub enum OtelError {
    #[error("failed to build OTLP exporter: {0}")]
    Exporter(#[from] opentelemetry_otlp::ExporterBuildError),
    #[error("failed to create OTel runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Flushes and shuts the provider down when dropped. Hold it for the life of
/// the process.
pub struct OtelGuard {
    provider: SdkTracerProvider,
    // Field order is drop order: leave the runtime context before the runtime.
    _enter: Option<EnterGuard<'static>>,
    _runtime: Option<&'static Runtime>,
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Err(e) = self.provider.shutdown() {
            eprintln!("OTel shutdown error: {e}");
        }
    }
}

/// Exporter plus, when the caller had no tokio runtime, the one created for it.
struct ExporterSetup {
    exporter: SpanExporter,
    enter: Option<EnterGuard<'static>>,
    runtime: Option<&'static Runtime>,
}

fn build_exporter() -> Result<ExporterSetup, OtelError> {
    if Handle::try_current().is_ok() {
        let exporter = SpanExporter::builder().with_tonic().build()?;
        return Ok(ExporterSetup { exporter, enter: None, runtime: None });
    }

    // `danmaku settings` never starts a runtime; tonic and the batch
    // processor still need one, so it lives until exit.
    let runtime: &'static Runtime = Box::leak(Box::new(Runtime::new()?));
    let enter = runtime.enter();
    let exporter = runtime.block_on(async { SpanExporter::builder().with_tonic().build() })?;
    Ok(ExporterSetup { exporter, enter: Some(enter), runtime: Some(runtime) })
}

/// Tracing layer exporting over OTLP/gRPC, for `tracing_subscriber::registry()`.
pub fn otel_layer<S>(service_name: &str) -> Result<(OpenTelemetryLayer<S, SdkTracer>, OtelGuard), OtelError>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    let ExporterSetup { exporter, enter, runtime } = build_exporter()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(SpanNameSampler)
        .with_resource(Resource::builder().with_service_name(service_name.to_string()).build())
        .with_span_limits(SpanLimits::default())
        .build();
    global::set_tracer_provider(provider.clone());

    let layer = tracing_opentelemetry::layer().with_tracer(provider.tracer("danmaku"));
    Ok((layer, OtelGuard { provider, _enter: enter, _runtime: runtime }))
}

// ============================================================================
// SpanNameSampler
// ============================================================================

/// Keeps sampled traces whole, always keeps errors, and otherwise samples by
/// [`sampling_rate`] of the span name.
#[derive(Debug, Clone)]
struct SpanNameSampler;

fn always(trace_state: TraceState) -> SamplingResult {
    SamplingResult { decision: SamplingDecision::RecordAndSample, attributes: vec![], trace_state }
}

fn is_error(attributes: &[KeyValue]) -> bool {
    attributes.iter().any(|kv| match kv.key.as_str() {
        "otel.status_code" => kv.value.as_str() == "ERROR",
        "error" => kv.value.as_str() == "true",
        _ => false,
    })
}

impl ShouldSample for SpanNameSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        if let Some(parent) = parent_context.map(|cx| cx.span().span_context().clone()) {
            if parent.is_sampled() {
                return always(parent.trace_state().clone());
            }
        }
        if is_error(attributes) {
            return always(TraceState::default());
        }
        Sampler::TraceIdRatioBased(sampling_rate(name)).should_sample(
            parent_context,
            trace_id,
            name,
            span_kind,
            attributes,
            links,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::Value;

    #[test]
    fn test_error_attributes() {
        assert!(is_error(&[KeyValue::new("otel.status_code", "ERROR")]));
        assert!(is_error(&[KeyValue::new("error", Value::from("true"))]));
        assert!(!is_error(&[KeyValue::new("otel.status_code", "OK")]));
        assert!(!is_error(&[]));
    }

    #[test]
    fn test_errors_always_sampled() {
        let result = SpanNameSampler.should_sample(
            None,
            TraceId::from(u128::MAX),
            "feed.poll",
            &SpanKind::Internal,
            &[KeyValue::new("error", "true")],
            &[],
        );
        assert_eq!(result.decision, SamplingDecision::RecordAndSample);
    }

    #[test]
    fn test_session_spans_always_sampled() {
        let result = SpanNameSampler.should_sample(
            None,
            TraceId::from(u128::MAX),
            "session.start",
            &SpanKind::Internal,
            &[],
            &[],
        );
        assert_eq!(result.decision, SamplingDecision::RecordAndSample);
    }
}
