use anyhow::{Context, Result};
use snapctrl::bin_common::{init_tracing, load_config_from_env, parse_args, ConfigType};
use snapctrl::config::MonitorConfig;
use snapctrl::snaprpc::{ServerState, Supervisor, SupervisorEvent};
use std::thread;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config_type = ConfigType::from_args(&parse_args(), ConfigType::Monitor);
    let config_path = load_config_from_env(config_type);
    let config = MonitorConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    init_tracing(&config.log_level);
    config.log();

    let supervisor = Supervisor::spawn(config.to_supervisor_config()?)?;

    print_banner("snapctrl monitor");

    let events = supervisor.events().clone();
    let logger = thread::Builder::new()
        .name("snapctrl-events".to_string())
        .spawn(move || {
            let mut snapshots = 0u64;
            for event in events.iter() {
                if matches!(event, SupervisorEvent::StateReceived(_)) {
                    snapshots += 1;
                }
                let stopped = event == SupervisorEvent::Stopped;
                log_event(event);
                if stopped {
                    break;
                }
            }
            snapshots
        })?;

    tokio::signal::ctrl_c().await?;
    info!("Ctrl+C received, stopping");

    supervisor.stop();
    let snapshots = tokio::task::spawn_blocking(move || {
        let snapshots = logger.join().unwrap_or_default();
        supervisor.shutdown();
        snapshots
    })
    .await?;

    print_shutdown("snapctrl monitor", &format!("Snapshots received: {}", snapshots));
    Ok(())
}

fn log_event(event: SupervisorEvent) {
    match event {
        SupervisorEvent::Connected => info!("Connected"),
        SupervisorEvent::Disconnected => info!("Disconnected"),
        SupervisorEvent::ConnectionLost => warn!("Connection lost"),
        SupervisorEvent::ConnectionFailed(e) => error!("Connection failed: {}", e),
        SupervisorEvent::Reconnecting { attempt, delay } => {
            info!("Reconnecting in {:?} (attempt {})", delay, attempt)
        }
        SupervisorEvent::Error(e) => warn!("Error: {}", e),
        SupervisorEvent::Notification(n) => info!("Notification {} {}", n.method, n.params),
        SupervisorEvent::StateReceived(state) => log_snapshot(&state),
        SupervisorEvent::TimeStatsReceived(stats) => {
            for (client_id, s) in stats {
                info!(
                    "Time stats {}: median {:.1} ms, p95 {:.1} ms, jitter {:.1} ms ({} samples)",
                    client_id, s.latency_median_ms, s.latency_p95_ms, s.jitter_ms, s.samples
                );
            }
        }
        SupervisorEvent::Stopped => info!("Supervisor stopped"),
    }
}

fn log_snapshot(state: &ServerState) {
    info!(
        "Snapshot from {} (snapserver {}): {} groups, {}/{} clients connected, {} streams",
        state.server.name,
        state.server.version,
        state.group_count(),
        state.connected_client_count(),
        state.client_count(),
        state.source_count()
    );

    for group in &state.groups {
        info!(
            "  [{}] {} on '{}'{}",
            group.id,
            group.name,
            group.stream_id,
            if group.muted { " (muted)" } else { "" }
        );
        for client in group.client_ids.iter().filter_map(|id| state.get_client(id)) {
            info!(
                "    {} volume {}%{}{}",
                client.display_name(),
                client.volume,
                if client.muted { " muted" } else { "" },
                if client.connected { "" } else { " offline" }
            );
        }
    }
}

fn print_banner(name: &str) {
    info!("");
    info!("========================================");
    info!("Starting {}", name);
    info!("Press Ctrl+C to stop");
    info!("========================================");
    info!("");
}

fn print_shutdown(name: &str, stats: &str) {
    info!("");
    info!("========================================");
    info!("{} stopped gracefully", name);
    info!("{}", stats);
    info!("========================================");
}
