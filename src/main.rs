use clap::{Parser, Subcommand};
use nfqfw::api::Services;
use nfqfw::config;
use nfqfw::plugins::{load_definitions, Builder, Registry};
use nfqfw::queue::{NfqProcessor, PacketService, ProcessorConfig};
use nfqfw::telemetry::{init_logging, MetricsRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "nfqfw")]
#[command(about = "A netfilter queue firewall decision daemon")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration file
    Check {
        /// Path to nfqfw.toml
        #[arg(short, long, default_value = "nfqfw.toml")]
        config: PathBuf,
    },
    /// Run the firewall decision daemon
    Run {
        /// Path to nfqfw.toml
        #[arg(short, long, default_value = "nfqfw.toml")]
        config: PathBuf,

        /// Validate and build everything but do not attach to the kernel
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Check { config }) => {
            if let Err(e) = cmd_check(&config) {
                eprintln!("[ERROR] {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run { config, dry_run }) => {
            if let Err(e) = cmd_run(&config, dry_run) {
                eprintln!("[ERROR] {}", e);
                std::process::exit(1);
            }
        }
        None => {
            // Default: run with nfqfw.toml
            if let Err(e) = cmd_run(&PathBuf::from("nfqfw.toml"), false) {
                eprintln!("[ERROR] {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn cmd_check(path: &PathBuf) -> Result<(), String> {
    let cfg = config::load(path).map_err(|e| e.to_string())?;
    let result = config::validate(&cfg);
    result.print_diagnostics();
    if result.has_errors() {
        return Err("configuration is not valid".into());
    }
    println!("configuration seems ok");
    Ok(())
}

fn cmd_run(path: &PathBuf, dry_run: bool) -> Result<(), String> {
    let cfg = config::load(path).map_err(|e| format!("loading {}: {e}", path.display()))?;
    init_logging(Some(&cfg.log));
    info!("nfqfw starting...");

    let result = config::validate(&cfg);
    result.print_diagnostics();
    if result.has_errors() {
        return Err("configuration is not valid".into());
    }

    let policy = cfg.nfqueue.policy_verdict().map_err(|e| e.to_string())?;
    let on_error = cfg.nfqueue.on_error_verdict().map_err(|e| e.to_string())?;

    // Build plugins from declarative definitions. External service
    // handles (reputation lists, resolution caches, event sink) are
    // registered here by embedders; the bare daemon runs with policy
    // verdicts only.
    let mut builder = Builder::new(Registry::with_defaults(), Services::new());
    for net in &cfg.nfqueue.local_nets {
        builder.add_local_net(net).map_err(|e| e.to_string())?;
    }
    let defs = load_definitions(&cfg.nfqueue.plugin_files, &cfg.nfqueue.plugin_dirs)
        .map_err(|e| e.to_string())?;
    for def in &defs {
        if def.disabled {
            debug!(name = %def.name, "plugin definition disabled");
            continue;
        }
        builder.build_plugin(def).map_err(|e| e.to_string())?;
    }

    if dry_run {
        println!("configuration seems ok");
        return Ok(());
    }

    builder.start().map_err(|e| e.to_string())?;

    let metrics = Arc::new(MetricsRegistry::new());
    let processor = Arc::new(NfqProcessor::new(
        ProcessorConfig {
            policy,
            on_error,
            tick: cfg.nfqueue.tick(),
        },
        metrics.clone(),
    ));
    let service = PacketService::new(processor, builder.plugins());
    for qid in cfg.nfqueue.queue_ids() {
        service.register(qid).map_err(|e| e.to_string())?;
    }
    service.start().map_err(|e| e.to_string())?;

    let rt = tokio::runtime::Runtime::new().map_err(|e| format!("creating runtime: {e}"))?;
    rt.block_on(async {
        let _ = tokio::signal::ctrl_c().await;
    });

    info!("shutting down");
    service.shutdown();
    builder.clean_up();
    if let Err(e) = builder.shutdown() {
        warn!("builder shutdown: {e}");
    }

    for qid in metrics.qids() {
        if let Some(stats) = metrics.get(qid) {
            info!(
                qid,
                received = stats.received.get(),
                accepted = stats.accepted.get(),
                dropped = stats.dropped.get(),
                "queue statistics"
            );
        }
    }
    info!("nfqfw finished");
    Ok(())
}
