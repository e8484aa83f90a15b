//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![warn(rust_2018_idioms)]

mod config;
mod network;

use std::collections::HashMap;
use std::sync::Arc;

use capctl::caps;
use clap::{App, Arg};
use config::{Config, LoggingFileRotation, LoggingFmtStyle};
use nix::unistd::{Uid, User};
use ospf6_mdr::collections::InterfaceId;
use ospf6_mdr::instance::{Daemon, NetTx};
use ospf6_mdr::spf::{Lsdb, NetworkLsaView, RouterLsaView};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::prelude::*;
use tracing_subscriber::Layer;

fn init_tracing(config: &config::Logging) {
    // Enable logging to journald.
    let journald = config.journald.enabled.then(|| {
        tracing_journald::layer().expect("couldn't connect to journald")
    });

    // Enable logging to a file.
    let file = config.file.enabled.then(|| {
        let file_appender = match config.file.rotation {
            LoggingFileRotation::Never => {
                rolling::never(&config.file.dir, &config.file.name)
            }
            LoggingFileRotation::Hourly => {
                rolling::hourly(&config.file.dir, &config.file.name)
            }
            LoggingFileRotation::Daily => {
                rolling::daily(&config.file.dir, &config.file.name)
            }
        };

        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(false)
            .with_thread_ids(config.file.fmt.show_thread_id)
            .with_file(config.file.fmt.show_source)
            .with_line_number(config.file.fmt.show_source)
            .with_ansi(config.file.fmt.colors);
        let layer = match config.file.fmt.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    // Enable logging to stdout.
    let stdout = config.stdout.enabled.then(|| {
        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(config.stdout.fmt.show_thread_id)
            .with_file(config.stdout.fmt.show_source)
            .with_line_number(config.stdout.fmt.show_source)
            .with_ansi(config.stdout.fmt.colors);
        let layer = match config.stdout.fmt.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive("ospf6_mdr=debug".parse().unwrap())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(journald)
        .with(file)
        .with(stdout)
        .init();
}

fn privdrop(user: &str) -> nix::Result<()> {
    // Preserve set of permitted capabilities upon privdrop.
    capctl::prctl::set_securebits(capctl::prctl::Secbits::KEEP_CAPS).unwrap();

    // Drop to unprivileged user and group.
    if let Some(user) = User::from_name(user)? {
        nix::unistd::setgroups(&[user.gid])?;
        nix::unistd::setresgid(user.gid, user.gid, user.gid)?;
        nix::unistd::setresuid(user.uid, user.uid, user.uid)?;
    } else {
        error!(name = %user, "failed to find user");
        std::process::exit(1);
    }

    // Set permitted capabilities; `network::open_socket` re-raises these
    // transiently to open raw sockets and join multicast groups.
    let mut caps = caps::CapState::empty();
    for cap in [
        caps::Cap::NET_ADMIN,
        caps::Cap::NET_BIND_SERVICE,
        caps::Cap::NET_RAW,
    ] {
        caps.permitted.add(cap);
    }
    if let Err(error) = caps.set_current() {
        error!(%error, "failed to set permitted capabilities");
    }

    Ok(())
}

/// Stand-in for the RFC 5340 LSDB, which this crate never implements
/// (spec.md §1): it always reports no LSAs, so SPF runs rely entirely on
/// the MDR neighbor-seed fast path (spec.md §4.E "Seed the queue") rather
/// than a full link-state walk. A real deployment wires `ospf6-mdr` against
/// whatever process owns flooding and LSA aging instead of this stub.
struct NullLsdb;

impl Lsdb for NullLsdb {
    fn router_lsa(&self, _router_id: u32) -> Option<RouterLsaView> {
        None
    }

    fn network_lsa(
        &self,
        _dr_router_id: u32,
        _dr_iface_id: u32,
    ) -> Option<NetworkLsaView> {
        None
    }
}

fn main() {
    // Parse command-line parameters.
    let matches = App::new("ospf6-mdrd")
        .version(clap::crate_version!())
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("file")
                .help("Specify an alternative configuration file."),
        )
        .get_matches();

    // Read configuration file.
    let config_file = matches.value_of("config");
    let config = Config::load(config_file);

    // Check for root privileges.
    if !Uid::effective().is_root() {
        eprintln!("need privileged user");
        std::process::exit(1);
    }

    // Initialize tracing.
    init_tracing(&config.logging);

    let user = config.user.clone();
    let (instance_cfg, iface_cfgs) = config.into_instance_cfg();

    // Drop privileges.
    if let Err(error) = privdrop(&user) {
        error!(%error, "failed to drop root privileges");
        std::process::exit(1);
    }

    // Set panic handler to abort the process if any child task panics.
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));

    info!("starting up");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create async runtime")
        .block_on(async {
            run(instance_cfg, iface_cfgs).await;
        });
}

/// Builds the daemon, opens every configured interface's raw socket
/// up-front and runs the event loop to completion. Sockets are opened
/// eagerly rather than on a later notification since the configuration
/// surface has no live-reconfiguration path (spec.md §3.2): once
/// `add_interface` hands back an `iface_id` there is nothing further to
/// wait on before wiring its socket.
async fn run(
    instance_cfg: ospf6_mdr::config::InstanceCfg,
    iface_cfgs: Vec<(u32, String, ospf6_mdr::config::InterfaceCfg)>,
) {
    let lsdb = Arc::new(NullLsdb);
    let (net_tx_tx, mut net_tx_rx) = mpsc::unbounded_channel::<NetTx>();

    let (mut daemon, net_rxp) = Daemon::new(instance_cfg.clone(), lsdb, net_tx_tx);

    let mut area_ids = HashMap::new();
    for area_cfg in &instance_cfg.areas {
        let area_id = daemon.add_area(area_cfg);
        area_ids.insert(area_cfg.area_id, area_id);
    }

    let mut senders: HashMap<InterfaceId, UnboundedSender<NetTx>> = HashMap::new();
    for (area_number, name, iface_cfg) in iface_cfgs {
        let Some(&area_id) = area_ids.get(&area_number) else {
            warn!(area_id = area_number, %name, "interface references unknown area, skipping");
            continue;
        };

        let iface_id = match daemon.add_interface(area_id, name.clone(), &iface_cfg) {
            Ok(iface_id) => iface_id,
            Err(error) => {
                error.log();
                continue;
            }
        };

        let ifindex = match nix::net::if_::if_nametoindex(name.as_str()) {
            Ok(ifindex) => ifindex,
            Err(error) => {
                warn!(%error, %name, "failed to resolve interface index, skipping");
                continue;
            }
        };

        let socket = match network::open_socket(&name, ifindex) {
            Ok(socket) => socket,
            Err(error) => {
                warn!(%error, %name, "failed to open raw socket, skipping");
                continue;
            }
        };

        let sender = network::spawn(area_id, iface_id, ifindex, socket, net_rxp.clone());
        senders.insert(iface_id, sender);

        // A configured interface whose kernel counterpart already exists
        // is brought up immediately; `Daemon::handle_zebra_msg` brings up
        // any interface reported later by Zebra on its own.
        if let Err(error) = daemon.start_interface(iface_id) {
            error.log();
        }
    }

    tokio::spawn(async move {
        while let Some(msg) = net_tx_rx.recv().await {
            if let Some(sender) = senders.get(&msg.iface_id) {
                let _ = sender.send(msg);
            }
        }
    });

    daemon.run().await;
}
