//! Launch a regression topology by hand
//!
//! Usage: regress_topology --schema schema.sql [--hosts N] [--k-factor K]
//!
//! Starts a clustered (or, with one host, single-server) topology from a
//! schema script, prints each host's addresses and keeps it running until
//! Ctrl-C.
//!
//! Exit codes:
//!   0 - Clean shutdown
//!   2 - Schema failed to load or compile
//!   3 - Topology failed to start or a host died

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use roodb_regress::config::HarnessConfig;
use roodb_regress::logging::DEFAULT_FILTER;
use roodb_regress::topology::{FailureState, LocalCluster, LocalServer, Schema, Topology};
use tracing_subscriber::EnvFilter;

const LIVENESS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Launch a regression topology and keep it running")]
struct Cli {
    /// DDL script, statements separated by ';'
    #[arg(long, env = "REGRESS_SCHEMA")]
    schema: PathBuf,

    #[arg(long, default_value_t = 1)]
    hosts: usize,

    #[arg(long, default_value_t = 2)]
    sites_per_host: usize,

    #[arg(long, default_value_t = 0)]
    k_factor: usize,

    /// Kill one host after startup (needs k-factor > 0)
    #[arg(long)]
    one_failure: bool,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = HarnessConfig::from_env();

    let schema = match Schema::from_file(&cli.schema) {
        Ok(schema) => schema,
        Err(e) => {
            eprintln!("ERROR: Failed to read schema {}: {}", cli.schema.display(), e);
            std::process::exit(2);
        }
    };

    let built = if cli.hosts > 1 {
        let failure = if cli.one_failure {
            FailureState::OneFailure
        } else {
            FailureState::AllRunning
        };
        LocalCluster::new(config, cli.sites_per_host, cli.hosts, cli.k_factor, failure).map(Topology::from)
    } else {
        LocalServer::new(config, cli.sites_per_host).map(Topology::from)
    };
    let mut topology = match built {
        Ok(topology) => topology,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(3);
        }
    };

    if !topology.compile(&schema) {
        eprintln!("ERROR: Schema {} failed to compile", schema.name);
        std::process::exit(2);
    }
    if let Err(e) = topology.start_up(true).await {
        eprintln!("ERROR: {}", e);
        std::process::exit(3);
    }

    println!("{} running", topology.name());
    for host in topology.hosts() {
        println!(
            "  host {}: listener {} admin {} internal {}",
            host.host_id, host.listener, host.admin, host.internal
        );
    }
    println!("Partitions: {}", topology.logical_partition_count());
    println!("Press Ctrl-C to stop");

    let mut liveness = tokio::time::interval(LIVENESS_INTERVAL);
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::warn!(error = %e, "Failed to wait for Ctrl-C");
                }
                break;
            }
            _ = liveness.tick() => {
                if let Err(e) = topology.check_alive() {
                    eprintln!("ERROR: {}", e);
                    let _ = topology.shut_down().await;
                    std::process::exit(3);
                }
            }
        }
    }

    if let Err(e) = topology.shut_down().await {
        eprintln!("ERROR: Shutdown failed: {}", e);
        std::process::exit(3);
    }
}
