use prometheus::{
    core::Collector, Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{Mutex, OnceLock};

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

// Metrics
pub static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
pub static LOGINS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static REVOCATION_MARKERS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static TOKENS_REJECTED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

static INIT_LOCK: Mutex<()> = Mutex::new(());

fn register<C: Collector + Clone + 'static>(registry: &Registry, metric: C) -> prometheus::Result<C> {
    registry.register(Box::new(metric.clone()))?;
    Ok(metric)
}

/// Build and register every collector. Later calls are no-ops.
pub fn init_metrics() -> prometheus::Result<()> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let requests_total = register(
        &registry,
        IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "path", "status"],
        )?,
    )?;
    let request_duration = register(
        &registry,
        HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            ),
            &["method", "path", "status"],
        )?,
    )?;
    let logins = register(
        &registry,
        IntCounterVec::new(
            Opts::new("auth_logins_total", "Login attempts by outcome"),
            &["outcome"],
        )?,
    )?;
    let markers = register(
        &registry,
        IntCounterVec::new(
            Opts::new(
                "auth_revocation_markers_total",
                "Revocation markers written by shape and token type",
            ),
            &["shape", "token_type"],
        )?,
    )?;
    let rejected = register(
        &registry,
        IntCounterVec::new(
            Opts::new("auth_tokens_rejected_total", "Rejected tokens by reason"),
            &["reason"],
        )?,
    )?;

    // Initialize globals
    let _ = REGISTRY.set(registry);
    let _ = HTTP_REQUESTS_TOTAL.set(requests_total);
    let _ = HTTP_REQUEST_DURATION_SECONDS.set(request_duration);
    let _ = LOGINS_TOTAL.set(logins);
    let _ = REVOCATION_MARKERS_TOTAL.set(markers);
    let _ = TOKENS_REJECTED_TOTAL.set(rejected);
    Ok(())
}

pub fn record_login(outcome: &str) {
    if let Some(counter) = LOGINS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn record_markers(shape: &str, token_type: &str, count: usize) {
    if let Some(counter) = REVOCATION_MARKERS_TOTAL.get() {
        counter
            .with_label_values(&[shape, token_type])
            .inc_by(count as u64);
    }
}

pub fn record_rejection(reason: &str) {
    if let Some(counter) = TOKENS_REJECTED_TOTAL.get() {
        counter.with_label_values(&[reason]).inc();
    }
}

pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to convert metrics to UTF-8: {}", e);
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_show_up_in_exposition() -> Result<(), prometheus::Error> {
        init_metrics()?;
        record_login("success");
        record_markers("global", "access", 2);

        let text = get_metrics();
        assert!(text.contains("auth_logins_total"));
        assert!(text.contains("auth_revocation_markers_total"));
        Ok(())
    }
}
