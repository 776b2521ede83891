use std::time::Duration;

use envconfig::Envconfig;
use opentelemetry::{KeyValue, Value};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{BatchConfig, RandomIdGenerator, Sampler, Tracer};
use opentelemetry_sdk::{runtime, Resource};
use tokio::signal;
use tracing::level_filters::LevelFilter;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use feature_definitions::config::Config;
use feature_definitions::server::serve;

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    let received = tokio::select! {
        _ = term.recv() => "SIGTERM",
        _ = interrupt.recv() => "SIGINT",
    };

    tracing::info!(signal = received, "draining payload requests before exit");
}

fn init_tracer(config: &Config, endpoint: &str) -> anyhow::Result<Tracer> {
    let resource = Resource::new(vec![
        KeyValue::new(
            "service.name",
            Value::from(config.otel_service_name.clone()),
        ),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]);
    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_trace_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                    config.otel_sampling_rate,
                ))))
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(resource),
        )
        .with_batch_config(BatchConfig::default())
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .with_timeout(Duration::from_secs(config.otel_export_timeout_secs)),
        )
        .install_batch(runtime::Tokio)?;
    Ok(tracer)
}

/// Console logs filtered by RUST_LOG, plus OTLP export when `OTEL_URL` is set.
/// DEBUG switches to human-readable output that also reports how long each
/// payload compilation span took.
fn init_logging(config: &Config) -> anyhow::Result<()> {
    let console = fmt::layer().with_target(true).with_level(true);
    let console = if *config.debug {
        console
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(true)
            .with_filter(EnvFilter::from_default_env())
            .boxed()
    } else {
        console
            .json()
            .with_current_span(true)
            .with_filter(EnvFilter::from_default_env())
            .boxed()
    };

    let otel = match config.otel_url.as_deref() {
        Some(endpoint) => Some(
            OpenTelemetryLayer::new(init_tracer(config, endpoint)?)
                .with_filter(LevelFilter::from_level(config.otel_log_level)),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(otel)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::init_from_env()?;
    init_logging(&config)?;

    tracing::info!(
        default_environment = %config.default_environment,
        strict_environment_projects = *config.strict_environment_projects,
        webhooks = !config.webhook_url.is_empty(),
        "starting feature definitions service"
    );

    let listener = tokio::net::TcpListener::bind(config.address).await?;
    serve(config, listener, shutdown()).await;
    Ok(())
}
