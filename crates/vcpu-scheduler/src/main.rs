use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use utils::version;
use vcpu_scheduler::config::Cli;
use vcpu_scheduler::config::Commands;
use vcpu_scheduler::config::DaemonArgs;
use vcpu_scheduler::config::PlanArgs;
use vcpu_scheduler::config::SchedulerConfig;
use vcpu_scheduler::hypervisor::Hypervisor;
use vcpu_scheduler::logging;
use vcpu_scheduler::scheduler::compute_schedule;
use vcpu_scheduler::scheduler::McmfScheduler;
use vcpu_scheduler::telemetry::derive_state;
use vcpu_scheduler::telemetry::FileProbe;
use vcpu_scheduler::telemetry::HostProbe;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon(daemon_args) => run_daemon(*daemon_args).await,
        Commands::Plan(plan_args) => run_plan(plan_args),
    }
}

async fn run_daemon(daemon_args: DaemonArgs) -> Result<()> {
    let _guard = logging::init(daemon_args.metrics_file.as_ref())?;

    tracing::info!("Starting vcpu-scheduler daemon {}", &**version::VERSION);

    let scheduler = McmfScheduler::new(SchedulerConfig::from(&daemon_args.costs));
    tracing::info!(config = ?scheduler.config(), "scheduler configured");

    let probe = FileProbe::new(&daemon_args.state_file, daemon_args.pinning_file.clone());
    let mut hypervisor =
        Hypervisor::new(probe, scheduler, Duration::from_secs(daemon_args.interval));

    let cancellation_token = CancellationToken::new();
    let signal_task = {
        let token = cancellation_token.clone();
        let mut signals = ShutdownSignals::install()?;
        tokio::spawn(async move {
            signals.recv().await;
            token.cancel();
        })
    };

    hypervisor.run(cancellation_token).await;
    signal_task.abort();

    tracing::info!("vcpu-scheduler daemon stopped");
    Ok(())
}

fn run_plan(plan_args: PlanArgs) -> Result<()> {
    utils::logging::init();

    let current = FileProbe::new(&plan_args.current, None)
        .query()
        .map_err(|e| anyhow::anyhow!("{e:?}"))
        .context("failed to load current sample")?;
    let previous = plan_args
        .previous
        .as_ref()
        .map(|path| FileProbe::new(path, None).query())
        .transpose()
        .map_err(|e| anyhow::anyhow!("{e:?}"))
        .context("failed to load previous sample")?;

    let snapshot = derive_state(
        &current,
        previous.as_ref(),
        Duration::from_secs(plan_args.interval),
    );
    let config = SchedulerConfig::from(&plan_args.costs);
    let schedule = compute_schedule(&snapshot.state, &config)
        .map_err(|e| anyhow::anyhow!("{e:?}"))
        .context("failed to compute placement")?;

    let plan = serde_json::json!({
        "state": snapshot.state,
        "schedule": schedule,
        "migrations": schedule.migrations(&snapshot.state),
    });
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

/// SIGTERM and SIGINT, or Ctrl+C where Unix signals are unavailable.
struct ShutdownSignals {
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    fn install() -> Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            Ok(Self {
                sigterm: signal(SignalKind::terminate())?,
                sigint: signal(SignalKind::interrupt())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = self.sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                }
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
    }
}
