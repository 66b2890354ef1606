//! AudioLink node entry point.
//!
//! ```text
//! main()
//!  ├─ load + validate config, init tracing
//!  ├─ event pump thread      OsLink events → EventDispatcher
//!  ├─ transport thread       Bootstrap::run → TransportSession::run
//!  ├─ console task           stdin → AdminConsole
//!  └─ wait for Ctrl-C or a restart request
//! ```
//!
//! A restart request (fatal link loss, failed bootstrap) cancels the shutdown
//! token and the process exits with an error, leaving the restart itself to
//! the service manager.

use std::net::SocketAddrV4;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use audiolink_core::{Role, SessionState, ShutdownToken};
use audiolink_node::application::bootstrap::Bootstrap;
use audiolink_node::application::commands::AdminConsole;
use audiolink_node::application::discovery::{
    DiscoveryBackend, DiscoveryMethod, EndpointDiscovery, NameResolver, ServiceAdvertiser,
    ServiceResolver,
};
use audiolink_node::application::dispatcher::EventDispatcher;
use audiolink_node::application::transport::{self, TransportSession};
use audiolink_node::infrastructure::console;
use audiolink_node::infrastructure::device::ProcessRestart;
use audiolink_node::infrastructure::link::OsLink;
use audiolink_node::infrastructure::mdns::MdnsResolver;
use audiolink_node::infrastructure::socket::UdpSocketFactory;
use audiolink_node::infrastructure::storage::config::{load_config, NodeConfig};

/// One end of an AudioLink wireless audio pair.
///
/// Settings come from the TOML config file; the flags below override the
/// most common ones.
#[derive(Debug, Parser)]
#[command(
    name = "audiolink-node",
    about = "AudioLink node: link bootstrap, peer discovery and UDP transport",
    version
)]
struct Cli {
    /// Configuration file. Defaults to the platform config directory.
    #[arg(short, long, env = "AUDIOLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `node.role` ("host" or "client").
    #[arg(long, env = "AUDIOLINK_ROLE")]
    role: Option<String>,

    /// Overrides `network.target` ("IP:Port").
    #[arg(long)]
    target: Option<String>,
}

impl Cli {
    /// Loads the config file and applies the command-line overrides.
    fn into_config(self) -> anyhow::Result<NodeConfig> {
        let mut config = load_config(self.config.as_deref()).context("loading configuration")?;
        if let Some(role) = self.role {
            config.node.role = role;
        }
        if let Some(target) = self.target {
            config.network.target = Some(target);
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.node.log_level)),
        )
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    let result = runtime.block_on(run(config));
    // The console's stdin read never returns on its own.
    runtime.shutdown_timeout(Duration::from_millis(200));
    result
}

async fn run(config: NodeConfig) -> anyhow::Result<()> {
    let role = config.role()?;
    let port = config.network.port;
    let timings = config.timings();
    info!("AudioLink node starting as {role}");

    let shutdown = ShutdownToken::new();
    let state = Arc::new(SessionState::new(role, port, config.link.dhcp_pool_start));
    let device = Arc::new(ProcessRestart::new(shutdown.clone()));
    let link = Arc::new(
        OsLink::new(role, SocketAddrV4::new(config.link.gateway_address, port))
            .with_station_ssid(config.link.station_ssid.clone()),
    );

    // ── Transport session ────────────────────────────────────────────────────
    let session = Arc::new(TransportSession::new(
        Arc::clone(&state),
        Arc::new(UdpSocketFactory::new(timings.recv_poll)),
        config.bind_addr()?,
        timings.clone(),
    ));
    state
        .target()
        .set_ready_callback(Arc::new(|addr| info!("transport ready, sending to {addr}")));
    session.set_rx_callback(Arc::new(|payload, from| {
        debug!("received {} bytes from {from}", payload.len());
    }));

    // ── Event pump ───────────────────────────────────────────────────────────
    let dispatcher = EventDispatcher::new(
        Arc::clone(&state),
        link.clone(),
        device.clone(),
        session.clone(),
        config.gateway(),
        timings.clone(),
    );
    let (events_tx, events_rx) = mpsc::channel();
    thread::Builder::new()
        .name("audiolink-events".to_string())
        .spawn(move || {
            for event in events_rx {
                dispatcher.dispatch(&event);
            }
        })
        .context("spawning event pump")?;

    // ── Discovery ────────────────────────────────────────────────────────────
    let mdns = match MdnsResolver::new() {
        Ok(resolver) => Some(Arc::new(resolver)),
        Err(e) => {
            warn!("mDNS unavailable: {e}");
            None
        }
    };
    let backend = match (config.discovery_method()?, mdns.clone()) {
        (DiscoveryMethod::Service, Some(r)) => {
            DiscoveryBackend::Service(r as Arc<dyn ServiceResolver>)
        }
        (DiscoveryMethod::Name, Some(r)) => DiscoveryBackend::Name {
            resolver: r as Arc<dyn NameResolver>,
            hostname: config.network.gateway_name.clone(),
        },
        _ => DiscoveryBackend::Disabled,
    };
    let advertiser = match role {
        Role::Host => mdns.clone().map(|r| r as Arc<dyn ServiceAdvertiser>),
        Role::Client => None,
    };
    let bootstrap = Bootstrap::new(
        Arc::clone(&state),
        link.clone(),
        EndpointDiscovery::new(backend, timings.clone(), port),
        advertiser,
        config.bootstrap()?,
        timings,
    );

    // ── Start ────────────────────────────────────────────────────────────────
    link.start(events_tx);
    let transport = transport::spawn(session, bootstrap, device.clone(), shutdown.clone())
        .context("spawning transport thread")?;
    let console_task = tokio::spawn(console::run(Arc::new(AdminConsole::new(
        Arc::clone(&state),
        port,
    ))));

    info!("node running, type `socket help` for commands");
    tokio::select! {
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => error!("could not listen for Ctrl-C: {e}"),
        },
        () = shutdown.cancelled() => {}
    }

    // ── Teardown ─────────────────────────────────────────────────────────────
    shutdown.cancel();
    console_task.abort();
    match tokio::task::spawn_blocking(move || transport.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => error!("transport thread panicked"),
        Err(e) => error!("could not join transport thread: {e}"),
    }
    if let Some(mdns) = mdns {
        mdns.shutdown();
    }

    if let Some(reason) = device.restart_reason() {
        bail!("restart requested: {reason}");
    }
    info!("node stopped");
    Ok(())
}
