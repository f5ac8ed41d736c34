//! resolv.conf output for configured nameservers.

use std::fmt::Write as _;
use std::io;
use std::path::Path;

use netconf::config::DnsConfig;

pub const DEFAULT_PATH: &str = "/etc/resolv.conf";

/// Configured nameservers are written when they override DHCP, or when
/// DHCP supplied none.
pub fn should_write(dns: &DnsConfig, dns_from_dhcp: bool) -> bool {
    !dns.nameservers.is_empty() && (dns.override_dhcp || !dns_from_dhcp)
}

pub fn render(dns: &DnsConfig) -> String {
    let mut out = String::from("# Generated by netconf\n");
    if !dns.search.is_empty() {
        let _ = writeln!(out, "search {}", dns.search.join(" "));
    }
    for ns in &dns.nameservers {
        let _ = writeln!(out, "nameserver {}", ns);
    }
    out
}

pub fn write(path: &Path, dns: &DnsConfig) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, render(dns))
}
