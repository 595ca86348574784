use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use snapclass_core::render_results;
use snapclass_demo::acquisition::image_from_file;
use snapclass_demo::cli::{ClassifyArgs, Cli, Commands, StartArgs};
use snapclass_demo::config::DemoConfig;
use snapclass_demo::server::run_server;
use snapclass_demo::state::DemoAppState;
use snapclass_demo::{build_service, default_factory};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start(args) => start(args).await,
        Commands::Classify(args) => classify(args).await,
    }
}

async fn start(args: StartArgs) -> Result<()> {
    init_logging(args.verbose);

    let config = DemoConfig::load(&args.config, &args)?;
    let addr: SocketAddr = format!("{}:{}", args.address, args.port).parse()?;

    let metrics_handle = init_metrics()?;
    let factory = default_factory(&config.classifier)?;
    let state = DemoAppState::new(config, factory, Some(metrics_handle))?;

    println!();
    println!("  SnapClass  -  image classification in the browser");
    println!();
    println!("  Model:     {}", state.classifier.model_id());
    match &state.config.classifier.fallback_model {
        Some(fallback) => println!("  Fallback:  {}", fallback),
        None => println!("  Fallback:  (disabled)"),
    }
    println!();
    println!("  Open http://{} in your browser", addr);
    println!();

    run_server(state, addr).await
}

async fn classify(args: ClassifyArgs) -> Result<()> {
    init_logging(args.verbose);

    let mut config = DemoConfig::load_file(&args.config)?.classifier;
    args.apply_overrides(&mut config);

    let service = build_service(config)?;
    let mut failures = 0usize;

    for path in &args.files {
        let image = match image_from_file(path).await {
            Ok(Some(image)) => image,
            Ok(None) => continue,
            Err(e) => {
                failures += 1;
                eprintln!("{}: {}", path.display(), e);
                continue;
            }
        };

        match service.classify_image(&image).await {
            Ok(predictions) => {
                let model = service.get_model_name();
                if args.json {
                    let line = json!({
                        "file": path.display().to_string(),
                        "model": model,
                        "predictions": predictions,
                    });
                    println!("{}", line);
                } else {
                    println!("{}  ({})", path.display(), model);
                    print!("{}", render_results(&predictions, false));
                    println!();
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("{}: {}", path.display(), e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} files failed", failures, args.files.len());
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("snapclass=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("snapclass=info,tower_http=warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "snapclass_classifications_total",
        "Images classified, by outcome"
    );
    metrics::describe_counter!(
        "snapclass_model_loads_total",
        "Model load attempts, by outcome"
    );
    metrics::describe_histogram!(
        "snapclass_inference_latency_us",
        metrics::Unit::Microseconds,
        "Inference latency in microseconds"
    );

    Ok(handle)
}
