use clap::Parser;
use stitchgate::cli::{
    Args, build_config, init_logging, load_backend_key, validate_backend_url,
};
use stitchgate::run_server;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(anon_key) = load_backend_key(
        "BACKEND_ANON_KEY",
        args.anon_key_file.as_deref(),
        "anon-key-file",
    ) else {
        std::process::exit(1);
    };

    let Some(service_key) = load_backend_key(
        "BACKEND_SERVICE_KEY",
        args.service_key_file.as_deref(),
        "service-key-file",
    ) else {
        std::process::exit(1);
    };

    let Some(backend_url) = validate_backend_url(&args.backend_url) else {
        std::process::exit(1);
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = listener.local_addr().unwrap_or_else(|e| {
        error!(error = %e, "Failed to get local address");
        std::process::exit(1);
    });

    let config = build_config(
        backend_url,
        anon_key,
        service_key,
        args.origins,
        args.site_url,
    );

    info!(address = %local_addr, "Listening");

    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
