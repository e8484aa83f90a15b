//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Process-wide configuration, loaded once at startup from a TOML file
//! (spec.md §6, §3.2 "there is no live-reconfiguration RPC layer").
//!
//! The on-disk shape mirrors [`ospf6_mdr::config`] closely, but isn't
//! identical to it: [`ospf6_mdr::config::AreaCfg`]'s log knobs and
//! [`ospf6_mdr::config::InstanceCfg`]'s per-interface table are
//! `#[serde(skip)]` there (an interface's owning area is a topology fact
//! the library leaves to its caller, not something serde can reconstruct
//! on its own), so this module's `[[area]]`/`[[interface]]` tables carry
//! that extra wiring and [`Config::into_instance_cfg`] does the conversion
//! by hand.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use ospf6_mdr::config::{AreaCfg, InstanceCfg, InterfaceCfg};
use ospf6_mdr::linklog::{LinkLogConfig, LinkLogScope, PathLogConfig};
use ospf6_mdr::packet::tlv::TlvInterop;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub user: String,
    pub router_id: Ipv4Addr,
    pub zebra_socket_path: Option<String>,
    pub tlv_interop: TlvInterop,
    pub logging: Logging,
    #[serde(rename = "area")]
    pub areas: Vec<Area>,
    #[serde(rename = "interface")]
    pub interfaces: Vec<Interface>,
}

/// One `[[area]]` table: the area-id plus its optional side-logs (spec.md
/// §4.J). [`LinkLogConfig`]/[`PathLogConfig`] aren't serde types themselves
/// (they carry a parsed [`ipnetwork::IpNetwork`]), so their on-disk shape is
/// spelled out here and converted by hand in [`Config::into_instance_cfg`].
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Area {
    pub area_id: u32,
    pub loglinks: Option<LogLinksCfg>,
    pub logpath: Option<LogPathCfg>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogLinksCfg {
    pub file: PathBuf,
    pub interval: u8,
    #[serde(default)]
    pub scope: LogLinksScope,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLinksScope {
    #[default]
    All,
    Connected,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogPathCfg {
    pub file: PathBuf,
    pub from_router_id: Ipv4Addr,
    pub to_prefix: String,
}

/// One `[[interface]]` table: the interface name, the OSPF area it belongs
/// to, and its knobs. Unset knobs fall back to [`InterfaceCfg::default`],
/// so a table only needs to name what it's overriding.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Interface {
    pub name: String,
    pub area_id: u32,
    #[serde(flatten)]
    pub cfg: InterfaceCfg,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Logging {
    pub journald: LoggingJournald,
    pub file: LoggingFile,
    pub stdout: LoggingStdout,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingJournald {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingFile {
    pub enabled: bool,
    pub dir: String,
    pub name: String,
    pub rotation: LoggingFileRotation,
    #[serde(flatten)]
    pub fmt: LoggingFmt,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingStdout {
    pub enabled: bool,
    #[serde(flatten)]
    pub fmt: LoggingFmt,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingFmt {
    pub style: LoggingFmtStyle,
    pub colors: bool,
    pub show_thread_id: bool,
    pub show_source: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFileRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFmtStyle {
    Compact,
    Full,
    Json,
    Pretty,
}

// ===== impl Config =====

impl Config {
    const DFLT_FILEPATH: &'static str = "/etc/ospf6-mdrd.toml";

    pub(crate) fn load(config_file: Option<&str>) -> Config {
        let config_file = config_file.unwrap_or(Config::DFLT_FILEPATH);

        match std::fs::read_to_string(config_file) {
            Ok(config_str) => toml::from_str(&config_str)
                .expect("Failed to parse configuration file"),
            Err(err) => {
                eprintln!("Failed to load configuration file: {err}");
                eprintln!("Falling back to default configuration...");
                Config::default()
            }
        }
    }

    /// Splits this configuration into the library-facing [`InstanceCfg`]
    /// plus the (area name, interface name, interface config) tuples the
    /// caller needs to drive [`ospf6_mdr::instance::Daemon::add_area`] and
    /// `add_interface` in the right order.
    pub fn into_instance_cfg(self) -> (InstanceCfg, Vec<(u32, String, InterfaceCfg)>) {
        let areas = self
            .areas
            .into_iter()
            .map(|area| AreaCfg {
                area_id: area.area_id,
                loglinks: area.loglinks.map(|cfg| LinkLogConfig {
                    file: cfg.file,
                    interval: cfg.interval,
                    scope: match cfg.scope {
                        LogLinksScope::All => LinkLogScope::All,
                        LogLinksScope::Connected => LinkLogScope::Connected,
                    },
                }),
                logpath: area.logpath.and_then(|cfg| {
                    let to_prefix = cfg.to_prefix.parse().ok()?;
                    Some(PathLogConfig {
                        file: cfg.file,
                        from_router_id: cfg.from_router_id,
                        to_prefix,
                    })
                }),
            })
            .collect();

        let interfaces = self
            .interfaces
            .into_iter()
            .map(|iface| (iface.area_id, iface.name, iface.cfg))
            .collect();

        let instance_cfg = InstanceCfg {
            router_id: self.router_id,
            zebra_socket_path: self.zebra_socket_path,
            tlv_interop: self.tlv_interop,
            areas,
            interfaces: Vec::new(),
        };

        (instance_cfg, interfaces)
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            user: "ospf6-mdr".to_owned(),
            router_id: Ipv4Addr::UNSPECIFIED,
            zebra_socket_path: None,
            tlv_interop: TlvInterop::default(),
            logging: Default::default(),
            areas: Vec::new(),
            interfaces: Vec::new(),
        }
    }
}

// ===== impl LoggingJournald =====

impl Default for LoggingJournald {
    fn default() -> LoggingJournald {
        LoggingJournald { enabled: false }
    }
}

// ===== impl LoggingFile =====

impl Default for LoggingFile {
    fn default() -> LoggingFile {
        LoggingFile {
            enabled: true,
            dir: "/var/log".to_owned(),
            name: "ospf6-mdrd.log".to_owned(),
            rotation: Default::default(),
            fmt: Default::default(),
        }
    }
}

// ===== impl LoggingStdout =====

impl Default for LoggingStdout {
    fn default() -> LoggingStdout {
        LoggingStdout {
            enabled: false,
            fmt: Default::default(),
        }
    }
}

// ===== impl LoggingFmt =====

impl Default for LoggingFmt {
    fn default() -> LoggingFmt {
        LoggingFmt {
            style: LoggingFmtStyle::Full,
            colors: false,
            show_thread_id: false,
            show_source: false,
        }
    }
}
