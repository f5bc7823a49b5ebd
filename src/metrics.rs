//! Prometheus 指标
//!
//! 网关请求计数与耗时，以及注册中心的实例数量、注册与剔除次数。

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder, opts,
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
};
use std::time::Duration;

pub static GATEWAY_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "gateway_requests_total",
            "Total number of requests processed by gateway"
        ),
        &["service", "status"]
    )
    .expect("Failed to register GATEWAY_REQUESTS_TOTAL metric")
});

pub static GATEWAY_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "gateway_request_duration_seconds",
        "Time until the upstream response headers arrived",
        &["service"]
    )
    .expect("Failed to register GATEWAY_REQUEST_DURATION_SECONDS metric")
});

pub static REGISTRY_INSTANCES: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(opts!(
        "registry_instances",
        "Number of service instances currently registered"
    ))
    .expect("Failed to register REGISTRY_INSTANCES metric")
});

pub static REGISTRY_REGISTRATIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "registry_registrations_total",
        "Total number of instance registrations"
    ))
    .expect("Failed to register REGISTRY_REGISTRATIONS_TOTAL metric")
});

pub static REGISTRY_EVICTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "registry_evictions_total",
        "Total number of instances evicted after lease expiry"
    ))
    .expect("Failed to register REGISTRY_EVICTIONS_TOTAL metric")
});

pub fn record_gateway_request(service: &str, status: &str, elapsed: Duration) {
    GATEWAY_REQUESTS_TOTAL
        .with_label_values(&[service, status])
        .inc();
    GATEWAY_REQUEST_DURATION_SECONDS
        .with_label_values(&[service])
        .observe(elapsed.as_secs_f64());
}

/// 注册中心启动时注册其指标，使 /metrics 在首次注册前也能输出
pub fn init_registry_metrics() {
    Lazy::force(&REGISTRY_INSTANCES);
    Lazy::force(&REGISTRY_REGISTRATIONS_TOTAL);
    Lazy::force(&REGISTRY_EVICTIONS_TOTAL);
}

/// 以 Prometheus 文本格式导出所有已注册指标
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gathers_recorded_gateway_requests() {
        record_gateway_request("metrics.TestService", "200", Duration::from_millis(5));
        let text = gather_metrics().unwrap();
        assert!(text.contains("gateway_requests_total"));
        assert!(text.contains("metrics.TestService"));
    }
}
