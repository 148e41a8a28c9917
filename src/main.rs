use anyhow::{Context, Result};
use clap::Parser;
use http::{HeaderName, Request, header::HOST, request::Parts};
use std::path::PathBuf;
use tracing::info;
use trusted_proxy::{
    ConnectionInfo, TrustedView, X_FORWARDED_FOR, X_FORWARDED_HOST, X_FORWARDED_PROTO,
    load_config_from,
};

/// Shows how a request would be resolved behind the configured proxies.
#[derive(Parser)]
#[command(name = "trusted-proxy", version)]
struct Args {
    /// Configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Socket peer address, e.g. 10.0.0.1:443.
    #[arg(long)]
    remote: String,

    /// X-Forwarded-For header value; repeat for multiple headers.
    #[arg(long = "forwarded-for")]
    forwarded_for: Vec<String>,

    #[arg(long)]
    forwarded_host: Option<String>,

    #[arg(long)]
    forwarded_proto: Option<String>,

    /// Host header of the incoming request.
    #[arg(long, default_value = "localhost")]
    host: String,

    #[arg(long, default_value = "/")]
    path: String,

    /// Treat the connection as TLS-secured.
    #[arg(long)]
    tls: bool,

    /// Keep only the client in the forwarded X-Forwarded-For, overriding the config.
    #[arg(long)]
    strip_forwarded_ips: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = load_config_from(&args.config)?;
    let policy = config.policy()?;
    info!(
        config_file = %args.config.display(),
        policy = ?policy,
        strip_forwarded_ips = config.forward.strip_forwarded_ips,
        "Configuration loaded"
    );

    let request = build_request(&args)?;
    let view = TrustedView::from_request(&request, &policy)
        .with_context(|| format!("Failed to resolve request from {}", args.remote))?;

    info!(
        remote = %args.remote,
        trusted_remote = %view.trusted_remote_addr(),
        behind_proxy = view.is_behind_proxy(),
        "Request resolved"
    );

    let strip = args.strip_forwarded_ips || config.forward.strip_forwarded_ips;
    print_report(&view, strip);
    Ok(())
}

fn build_request(args: &Args) -> Result<Request<()>> {
    let mut builder = Request::builder()
        .uri(args.path.as_str())
        .header(HOST, args.host.as_str())
        .extension(ConnectionInfo::new(args.remote.as_str(), args.tls));

    for value in &args.forwarded_for {
        builder = builder.header(X_FORWARDED_FOR, value.as_str());
    }
    if let Some(host) = &args.forwarded_host {
        builder = builder.header(X_FORWARDED_HOST, host.as_str());
    }
    if let Some(proto) = &args.forwarded_proto {
        builder = builder.header(X_FORWARDED_PROTO, proto.as_str());
    }

    builder.body(()).context("Invalid request parameters")
}

fn print_report(view: &TrustedView, strip_forwarded_ips: bool) {
    let residual = view
        .residual_chain()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    println!(
        "proxy:          {}",
        view.proxy_addr()
            .map_or_else(|| "(none)".to_string(), |ip| ip.to_string())
    );
    println!("trusted remote: {}", view.trusted_remote_addr());
    println!("residual chain: [{residual}]");
    println!("trusted host:   {}", view.trusted_host());
    println!("trusted proto:  {}", view.trusted_proto());
    println!("trusted url:    {}", view.trusted_uri());

    println!("\ntrusted request headers:");
    print_headers(view.trusted_parts());

    println!("\nforward request headers (strip_forwarded_ips = {strip_forwarded_ips}):");
    print_headers(&view.forward_parts(strip_forwarded_ips));
}

fn print_headers(parts: &Parts) {
    let names: [HeaderName; 4] = [HOST, X_FORWARDED_FOR, X_FORWARDED_HOST, X_FORWARDED_PROTO];
    for name in names {
        let value = parts
            .headers
            .get(&name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("(absent)");
        println!("  {name}: {value}");
    }
}
