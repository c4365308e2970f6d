//! Prometheus metrics for the render pipeline.

use actix_web::{HttpResponse, Responder};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    pub static ref RENDERS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "invoice_renders_total",
        "Render requests by mode and outcome",
        &["mode", "outcome"]
    )
    .unwrap();
    pub static ref RENDER_DURATION: HistogramVec = register_histogram_vec!(
        "invoice_render_duration_seconds",
        "Time from request to terminal state",
        &["mode"]
    )
    .unwrap();
    pub static ref RENDERS_IN_FLIGHT: IntGauge = register_int_gauge!(
        "invoice_renders_in_flight",
        "Render pipelines currently holding a surface"
    )
    .unwrap();
    pub static ref PREVIEW_CLEANUP_TOTAL: IntCounterVec = register_int_counter_vec!(
        "invoice_preview_cleanup_total",
        "Preview temp file deletions by result",
        &["result"]
    )
    .unwrap();
}

pub fn record_render(mode: &str, outcome: &str, seconds: f64) {
    RENDERS_TOTAL.with_label_values(&[mode, outcome]).inc();
    RENDER_DURATION.with_label_values(&[mode]).observe(seconds);
}

pub fn record_preview_cleanup(deleted: bool) {
    let result = if deleted { "deleted" } else { "failed" };
    PREVIEW_CLEANUP_TOTAL.with_label_values(&[result]).inc();
}

/// GET /metrics
pub async fn metrics_handler() -> impl Responder {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        log::error!("Failed to encode metrics: {}", e);
        return HttpResponse::InternalServerError().finish();
    }
    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
