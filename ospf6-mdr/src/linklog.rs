//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The link-log and path-log auxiliary logs (spec.md §6 "Persisted
//! state"), grounded on the original's `ospf6_sdt.c` /
//! `ospf6_interface_linkstatus.c`: two append-only textual logs, toggled
//! per-area by the `loglinks`/`logpath` configuration knobs.

use std::fmt::Write as _;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use chrono::Utc;
use ipnetwork::IpNetwork;
use tokio::io::AsyncWriteExt;

/// Which adjacency pairs a link-log snapshot covers (spec.md §6 `loglinks
/// ... (all|connected)`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkLogScope {
    /// Every router-to-router adjacency found in the area's router-LSAs.
    All,
    /// Only links currently carrying an installed SPF route.
    Connected,
}

#[derive(Clone, Debug)]
pub struct LinkLogConfig {
    pub file: PathBuf,
    /// Seconds between snapshots, 1-255 (spec.md §6).
    pub interval: u8,
    pub scope: LinkLogScope,
}

#[derive(Clone, Debug)]
pub struct PathLogConfig {
    pub file: PathBuf,
    pub from_router_id: Ipv4Addr,
    pub to_prefix: IpNetwork,
}

/// Renders one link-log snapshot in the documented format: a header line,
/// one `A.B.C.D -> A.B.C.D` line per link, and a trailer.
pub fn render_link_log(links: &[(Ipv4Addr, Ipv4Addr)]) -> String {
    let now = Utc::now();
    let mut out = String::new();
    let _ =
        writeln!(out, "Routing-Links List: {}", now.format("%H:%M:%S%.6f"));
    for (a, b) in links {
        let _ = writeln!(out, "{a} -> {b}");
    }
    out.push_str("End of Routing-Links List.\n");
    out
}

/// Renders one path-log entry: the resolved nexthop-router chain from
/// `from` to `to`, or a "no route" line if SPF found none.
pub fn render_path_log(
    from: Ipv4Addr,
    to: IpNetwork,
    path: Option<&[Ipv4Addr]>,
) -> String {
    let now = Utc::now();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Path Log: {} from {from} to {to}",
        now.format("%H:%M:%S%.6f")
    );
    match path {
        Some(hops) if !hops.is_empty() => {
            let rendered = hops
                .iter()
                .map(Ipv4Addr::to_string)
                .collect::<Vec<_>>()
                .join(" -> ");
            let _ = writeln!(out, "{rendered}");
        }
        _ => {
            out.push_str("no route\n");
        }
    }
    out
}

/// Appends `text` to `path`, creating the file if it doesn't exist yet.
pub async fn append(path: &PathBuf, text: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(text.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use const_addrs::ip4;

    #[test]
    fn link_log_renders_header_links_and_trailer() {
        let links = vec![(ip4!("1.1.1.1"), ip4!("2.2.2.2"))];
        let rendered = render_link_log(&links);
        assert!(rendered.starts_with("Routing-Links List: "));
        assert!(rendered.contains("1.1.1.1 -> 2.2.2.2"));
        assert!(rendered.trim_end().ends_with("End of Routing-Links List."));
    }

    #[test]
    fn path_log_reports_no_route_when_absent() {
        let rendered = render_path_log(
            ip4!("1.1.1.1"),
            "2001:db8::/64".parse().unwrap(),
            None,
        );
        assert!(rendered.contains("no route"));
    }

    #[test]
    fn path_log_renders_hop_chain() {
        let hops = [ip4!("1.1.1.1"), ip4!("3.3.3.3")];
        let rendered = render_path_log(
            ip4!("1.1.1.1"),
            "2001:db8::/64".parse().unwrap(),
            Some(&hops),
        );
        assert!(rendered.contains("1.1.1.1 -> 3.3.3.3"));
    }
}
