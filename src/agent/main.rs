pub mod cloud_metadata;
pub mod config;
pub mod logger;
pub mod sysvars;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::*;

use cloud_metadata::{HttpComputeConnector, HttpMetadataClient, MetadataClient, ProcessEnvironment};
use config::Config;
use logger::Logger;
use sysvars::{GceCollector, HostInfo, VarTable};

#[derive(Parser)]
struct CliArgs {
    #[clap(long = "config", default_value = config::CONFIG_PATH)]
    config: PathBuf,

    /// Print the variables as a JSON object
    #[clap(long = "json")]
    json: bool,

    #[clap(long = "max-nics")]
    max_nics: Option<usize>,
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("err: {err}");
            std::process::exit(1);
        }
    };

    pretty_env_logger::formatted_builder()
        .parse_filters(&config.log_level())
        .init();

    let version = env!("CARGO_PKG_VERSION");
    info!("sysvars v{version}");

    match run(&args, &config).await {
        Ok(vars) => print_vars(&vars, args.json),
        Err(err) => {
            error!("{err:#}");
            std::process::exit(1);
        }
    }
}

async fn run(args: &CliArgs, config: &Config) -> Result<VarTable> {
    let (host, explicit) = config.metadata_host();
    let metadata: Arc<dyn MetadataClient> = if explicit {
        info!("Using metadata server at {host}");
        Arc::new(HttpMetadataClient::with_host_override(
            &host,
            config.metadata_timeout(),
        ))
    } else {
        Arc::new(HttpMetadataClient::new(&host, config.metadata_timeout()))
    };

    let compute = Arc::new(HttpComputeConnector::new(
        &config.compute_endpoint(),
        metadata.clone(),
        config.metadata_timeout(),
    ));

    let collector = GceCollector::new(metadata, compute, Arc::new(ProcessEnvironment::new()))
        .with_max_nics(args.max_nics.unwrap_or_else(|| config.max_nics()));

    let host_info = HostInfo::current(config.hostname());
    sysvars::init(&config.vars(), &host_info, &collector, &Logger::new("sysvars_gce")).await?;

    Ok(sysvars::vars())
}

fn print_vars(vars: &VarTable, json: bool) {
    if json {
        match serde_json::to_string_pretty(vars) {
            Ok(s) => println!("{s}"),
            Err(err) => error!("Failed to serialize variables: {err}"),
        }
        return;
    }

    let mut keys: Vec<&String> = vars.keys().collect();
    keys.sort();
    for k in keys {
        println!("{k}={}", vars[k]);
    }
}
