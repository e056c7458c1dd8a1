use criterion::{Criterion, criterion_group, criterion_main};
use probe::probers::icmp::{EchoPacket, checksum};
use probe::{Config, MetricSink, Module, NoopObserver, ProberKind, execute};
use std::hint::black_box;
use std::time::Duration;

fn config_with(name: &str, kind: ProberKind) -> Config {
    let mut config = Config::default();
    config
        .modules
        .insert(name.to_string(), Module::new(kind, Duration::from_millis(100)));
    config
}

fn tcp_probe_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("tcp_probe");

    // Connection refused measures the failure path end to end.
    let config = config_with("tcp_connect", ProberKind::Tcp);
    group.bench_function("tcp_connection_refused", |b| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        b.iter(|| {
            rt.block_on(async {
                black_box(execute("127.0.0.1:1", "tcp_connect", &config, &NoopObserver).await)
            })
        });
    });

    group.finish();
}

fn http_probe_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("http_probe");

    let config = config_with("http2xx", ProberKind::Http);
    group.bench_function("http_connection_error", |b| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        b.iter(|| {
            rt.block_on(async {
                black_box(execute("http://127.0.0.1:1", "http2xx", &config, &NoopObserver).await)
            })
        });
    });

    group.finish();
}

fn render_benchmark(c: &mut Criterion) {
    let mut sink = MetricSink::new();
    sink.push("probe_http_status_code", 200.0);
    sink.push("probe_http_content_length", 1234.0);
    sink.push("probe_http_redirects", 0.0);
    sink.push("probe_http_actual_content_length", 1234.0);
    sink.push("probe_http_ssl", 1.0);
    sink.push("probe_ssl_earliest_cert_expiry", 1_900_000_000.0);
    sink.push("probe_duration_seconds", 0.042);
    sink.push("probe_success", 1.0);

    c.bench_function("metric_sink_render", |b| b.iter(|| black_box(sink.render())));
}

fn icmp_packet_benchmark(c: &mut Criterion) {
    let request = EchoPacket::request(0x1234, 1);
    c.bench_function("icmp_echo_encode", |b| b.iter(|| black_box(request.to_bytes())));

    let bytes = request.to_bytes();
    c.bench_function("icmp_checksum", |b| b.iter(|| black_box(checksum(&bytes))));
}

criterion_group!(
    benches,
    tcp_probe_benchmark,
    http_probe_benchmark,
    render_benchmark,
    icmp_packet_benchmark,
);

criterion_main!(benches);
