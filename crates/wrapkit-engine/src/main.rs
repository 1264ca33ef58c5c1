//! wrapkit demo
//!
//! Usage: `wrapkit-demo [config.yaml] [function] [json-args]`
//! - Loads and validates the config (strict parsing)
//! - Registers the demo base functions and composes them per config
//! - Invokes one function twice, prints results and metrics

use tracing_subscriber::{fmt, EnvFilter};

use wrapkit_core::call::Args;
use wrapkit_core::error::{Error, Result};
use wrapkit_engine::demo::register_demo_functions;
use wrapkit_engine::{config, registry::Registry};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, disposition = e.disposition().as_str(), "wrapkit-demo failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let mut argv = std::env::args().skip(1);
    let path = argv.next().unwrap_or_else(|| "wrapkit.yaml".into());
    let function = argv.next().unwrap_or_else(|| "fib".into());
    let raw = argv.next().unwrap_or_else(|| "[30]".into());

    let cfg = config::load_from_file(&path)?;

    let registry = Registry::new();
    register_demo_functions(&registry);
    registry.build(&cfg)?;

    let json: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| Error::argument(format!("arguments must be JSON: {e}")))?;
    let args = Args::from_json(json);

    for round in 1..=2 {
        let out = registry.invoke(&function, args.clone()).await?;
        tracing::info!(%function, round, "invoked");
        println!("{}", out.to_json());
    }

    print!("{}", registry.render_metrics());
    Ok(())
}
