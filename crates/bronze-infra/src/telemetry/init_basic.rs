use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "warn,bronze_core=info,bronze_db=info,bronze_storage=info,bronze_worker=info,bronze_sftp=info,api_worker=info,sftp_worker=info,sqlx=warn";

/// Initialize tracing for a service.
///
/// `log_format` is `json` for one JSON object per line, anything else for text.
/// Fails if a global subscriber is already installed.
pub fn init_telemetry(
    service_name: &str,
    environment: &str,
    log_format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = log_format.eq_ignore_ascii_case("json");

    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json().with_current_span(true));
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(json_layer)
        .with(text_layer)
        .try_init()?;

    tracing::info!(
        service = service_name,
        environment = environment,
        log_format = if json { "json" } else { "text" },
        "Tracing initialized"
    );
    Ok(())
}

pub async fn shutdown_telemetry() {
    tracing::debug!("Telemetry shutdown");
}
