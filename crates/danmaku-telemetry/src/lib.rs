//! OpenTelemetry integration for danmaku.
//!
//! Provides OTel tracing layer setup and a sampler with differentiated rates
//! by span category. Everything except [`otel_enabled`] and
//! [`sampling_rate`] needs the `telemetry` feature.
//!
//! # Activation
//!
//! OTel export activates when standard OTel environment variables are set:
//!
//! ```bash
//! # Minimal — enables OTLP export to localhost:4317
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 danmaku watch <VIDEO_ID>
//!
//! # Full control
//! OTEL_SERVICE_NAME=danmaku \
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://jaeger:4317 \
//! OTEL_TRACES_EXPORTER=otlp \
//! danmaku watch --replay <VIDEO_ID>
//! ```
//!
//! Set `OTEL_SDK_DISABLED=true` to explicitly disable even when the endpoint is set.

#[cfg(feature = "telemetry")]
mod otel;

#[cfg(feature = "telemetry")]
pub use otel::{OtelError, OtelGuard, otel_layer};

/// Check whether OTel export should be enabled.
///
/// Returns `true` when standard OTel env vars indicate export is desired:
/// - `OTEL_SDK_DISABLED` is NOT set to `"true"`
/// - AND at least one of:
///   - `OTEL_EXPORTER_OTLP_ENDPOINT` is set
///   - `OTEL_TRACES_EXPORTER` is set (and not `"none"`)
pub fn otel_enabled() -> bool {
    otel_enabled_with(|key| std::env::var(key).ok())
}

fn otel_enabled_with(var: impl Fn(&str) -> Option<String>) -> bool {
    // Explicit disable takes priority
    if var("OTEL_SDK_DISABLED").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
        return false;
    }

    if var("OTEL_EXPORTER_OTLP_ENDPOINT").is_some() {
        return true;
    }

    // Anything other than "none"
    var("OTEL_TRACES_EXPORTER").is_some_and(|exporter| !exporter.eq_ignore_ascii_case("none"))
}

/// Head sampling rate for a span name.
///
/// | Prefix       | Rate | Rationale                                  |
/// |--------------|------|--------------------------------------------|
/// | `session.*`  | 100% | One per video, highest value               |
/// | `seek.*`     | 100% | Rare, user-driven                          |
/// | `layout.*`   | 10%  | One per placed item                        |
/// | `feed.poll`  |  1%  | Four per second in live mode               |
/// | other        | 10%  | Default for unclassified spans             |
///
/// Errors are always sampled regardless of name.
pub fn sampling_rate(name: &str) -> f64 {
    if name.starts_with("session") || name.starts_with("seek") {
        1.0
    } else if name.starts_with("layout") {
        0.1
    } else if name.starts_with("feed.poll") {
        0.01
    } else {
        0.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_otel_enabled_rules() {
        assert!(!otel_enabled_with(env(&[])));
        assert!(otel_enabled_with(env(&[("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4317")])));
        assert!(otel_enabled_with(env(&[("OTEL_TRACES_EXPORTER", "otlp")])));
        assert!(!otel_enabled_with(env(&[("OTEL_TRACES_EXPORTER", "None")])));
        assert!(!otel_enabled_with(env(&[
            ("OTEL_SDK_DISABLED", "TRUE"),
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4317"),
        ])));
    }

    #[test]
    fn test_sampling_rates() {
        assert_eq!(sampling_rate("session.start"), 1.0);
        assert_eq!(sampling_rate("seek.refetch"), 1.0);
        assert_eq!(sampling_rate("layout.place"), 0.1);
        assert_eq!(sampling_rate("feed.poll"), 0.01);
        assert_eq!(sampling_rate("surface.tick"), 0.1);
    }
}
