use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use aws_operator::aws::sdk::SdkClientFactory;
use aws_operator::config::OperatorConfig;
use aws_operator::{controller, crd::AWSConfig, resources, Error};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the operator
    Run(OperatorConfig),
    /// Show version and build information
    Version,
    /// Show cluster information
    Info(InfoArgs),
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Namespace to list AWSConfigs in
    #[arg(long, env = "OPERATOR_NAMESPACE", default_value = "default")]
    namespace: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("aws-operator v{}", env!("CARGO_PKG_VERSION"));
            println!("Build Date: {}", env!("BUILD_DATE"));
            println!("Git SHA: {}", env!("GIT_SHA"));
            println!("Rust Version: {}", env!("RUST_VERSION"));
            println!("Version bundles: {}", resources::VERSION_BUNDLES.join(", "));
            Ok(())
        }
        Commands::Info(info_args) => Ok(run_info(info_args).await?),
        Commands::Run(config) => Ok(run_operator(config).await?),
    }
}

async fn run_info(args: InfoArgs) -> Result<(), Error> {
    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    let api: kube::Api<AWSConfig> = kube::Api::namespaced(client, &args.namespace);
    let configs = api
        .list(&Default::default())
        .await
        .map_err(Error::KubeError)?;

    println!("Managed tenant clusters: {}", configs.items.len());
    for config in &configs.items {
        println!(
            "  {} (version bundle {})",
            config.cluster_id(),
            config.version_bundle()
        );
    }
    Ok(())
}

fn init_logging(json: bool) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let fmt_layer = if json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    // Only enable OTEL if an endpoint is provided
    let otel_layer = aws_operator::telemetry::init_telemetry(&registry);
    let otel_enabled = otel_layer.is_some();
    registry.with(otel_layer).init();

    if otel_enabled {
        info!("OpenTelemetry tracing initialized");
    } else {
        info!("OpenTelemetry tracing disabled (OTEL_EXPORTER_OTLP_ENDPOINT not set)");
    }
}

async fn run_operator(config: OperatorConfig) -> Result<(), Error> {
    init_logging(config.json_logs);

    info!("Starting aws-operator v{}", env!("CARGO_PKG_VERSION"));

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    info!("Connected to Kubernetes cluster");

    let kube_objects = Arc::new(controller::KubeClientImpl::new(client.clone()));
    let resource_config = config.resource_config(kube_objects.clone(), kube_objects)?;
    let router = resources::new_router(&resource_config)?;
    let clients = Arc::new(SdkClientFactory::from_env().await);

    let holder_identity = std::env::var("HOSTNAME").unwrap_or_else(|_| {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown-host".to_string())
    });

    let is_leader = Arc::new(AtomicBool::new(false));
    let elector = controller::LeaderElector::new(
        client.clone(),
        config.lease_namespace(),
        &holder_identity,
        config.lease(),
    );
    tokio::spawn(elector.run(Arc::clone(&is_leader)));

    #[cfg(feature = "metrics")]
    {
        let addr = config.metrics_addr;
        tokio::spawn(async move {
            if let Err(e) = aws_operator::server::run_server(addr).await {
                tracing::error!("Metrics server error: {:?}", e);
            }
        });
    }

    let state = Arc::new(controller::ControllerState {
        client,
        router,
        clients,
        is_leader,
    });

    let result = controller::run_controller(state).await;

    // Flush any remaining traces
    aws_operator::telemetry::shutdown_telemetry();

    result
}
