//! End-to-end reconciliation passes against the in-memory host.

use std::sync::Arc;
use std::time::Duration;

use netconf::config::NetworkConfig;
use netconf::dhcp::Lease;
use netconf::system::{Link, LinkKind, LinkProvider};
use netconf::testing::{FakeSystem, Op};
use netconf::util::Cidr;
use netconf::{ApplyOptions, apply_network_configs};

fn config(yaml: &str) -> NetworkConfig {
    NetworkConfig::from_yaml_str(yaml).unwrap()
}

fn cidr(s: &str) -> Cidr {
    s.parse().unwrap()
}

fn host(names: &[&str]) -> Arc<FakeSystem> {
    let sys = FakeSystem::new().with_link(Link::new("lo", 1, LinkKind::Physical));
    for (i, name) in names.iter().enumerate() {
        let mac = [0x52, 0x54, 0, 0, 0, i as u8 + 1];
        sys.add_link(Link::new(*name, i as u32 + 2, LinkKind::Physical).with_mac(mac));
    }
    Arc::new(sys)
}

async fn apply(sys: &Arc<FakeSystem>, cfg: &mut NetworkConfig) -> netconf::ApplyOutcome {
    apply_network_configs(Arc::clone(sys), cfg, &ApplyOptions::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_single_dhcp_link() {
    let sys = host(&["eth0"]);
    let mut cfg = config("interfaces:\n  eth0: {dhcp: true}\n");

    let outcome = apply(&sys, &mut cfg).await;

    assert_eq!(sys.dhcp_runs(), vec![vec!["dhcpcd", "-MA4", "-w", "eth0"]]);
    assert!(outcome.failures.is_empty());
    assert!(!outcome.dns_from_dhcp);
}

#[tokio::test]
async fn test_bond_with_two_slaves() {
    let sys = host(&["eth0", "eth1"]);
    let mut cfg = config(
        r#"
interfaces:
  bond0:
    bond_opts: {mode: active-backup}
  eth0: {bond: bond0}
  eth1: {bond: bond0}
"#,
    );

    apply(&sys, &mut cfg).await;

    let journal = sys.journal();
    let mode = journal
        .iter()
        .position(|op| matches!(op, Op::BondOption(_, k, _) if k == "mode"))
        .unwrap();
    let first_slave = journal
        .iter()
        .position(|op| matches!(op, Op::AddSlave(..)))
        .unwrap();
    assert!(mode < first_slave);

    assert_eq!(sys.bond_slaves("bond0"), vec!["eth0", "eth1"]);
    assert_eq!(sys.bond_option("bond0", "mode").as_deref(), Some("active-backup"));
    assert!(sys.dhcp_runs().is_empty());
}

#[tokio::test]
async fn test_bond_mode_before_other_options_and_slaves() {
    let sys = host(&["eth0"]);
    let mut cfg = config(
        r#"
interfaces:
  bond0:
    bond_opts:
      mode: 802.3ad
      xmit_hash_policy: layer2+3
  eth0: {bond: bond0}
"#,
    );

    apply(&sys, &mut cfg).await;

    let relevant: Vec<_> = sys
        .journal()
        .into_iter()
        .filter(|op| matches!(op, Op::BondOption(..) | Op::AddSlave(..)))
        .collect();
    assert_eq!(
        relevant,
        vec![
            Op::BondOption("bond0".into(), "mode".into(), "802.3ad".into()),
            Op::BondOption("bond0".into(), "xmit_hash_policy".into(), "layer2+3".into()),
            Op::AddSlave("bond0".into(), "eth0".into()),
        ]
    );
}

#[tokio::test]
async fn test_empty_config_defaults() {
    let sys = host(&["eth0", "eth1", "wlan0"]);
    let mut cfg = NetworkConfig::default();

    apply(&sys, &mut cfg).await;

    assert!(cfg.interfaces["eth*"].dhcp);
    assert_eq!(sys.addresses_of("lo"), vec![cidr("127.0.0.1/8"), cidr("::1/128")]);

    let mut runs = sys.dhcp_runs();
    runs.sort();
    assert_eq!(
        runs,
        vec![
            vec!["dhcpcd", "-MA4", "-w", "eth0"],
            vec!["dhcpcd", "-MA4", "-w", "eth1"],
        ]
    );
}

#[tokio::test]
async fn test_mac_match_wins() {
    let sys = host(&["eth0"]);
    let mut cfg = config(
        r#"
interfaces:
  "eth*": {dhcp: true}
  eth0: {address: 10.0.0.5/24}
  wan:
    match: "mac:52:54:00:00:00:01"
    address: 192.168.1.10/24
"#,
    );

    apply(&sys, &mut cfg).await;

    assert_eq!(sys.addresses_of("eth0"), vec![cidr("192.168.1.10/24")]);
    assert!(sys.dhcp_runs().is_empty());
}

#[tokio::test]
async fn test_static_and_dhcp_address_diff() {
    let sys = host(&["eth0", "eth1"]);
    for name in ["eth0", "eth1"] {
        sys.assign(name, cidr("10.0.0.5/24"));
        sys.assign(name, cidr("10.0.0.9/24"));
    }
    let mut cfg = config(
        r#"
interfaces:
  eth0: {address: 10.0.0.5/24}
  eth1: {dhcp: true, address: 10.0.0.7/24}
"#,
    );

    apply(&sys, &mut cfg).await;

    assert_eq!(sys.addresses_of("eth0"), vec![cidr("10.0.0.5/24")]);
    assert_eq!(
        sys.addresses_of("eth1"),
        vec![cidr("10.0.0.5/24"), cidr("10.0.0.9/24")]
    );
    assert!(
        !sys.journal()
            .iter()
            .any(|op| matches!(op, Op::AddAddress(link, _) | Op::DelAddress(link, _) if link == "eth1"))
    );
}

#[tokio::test]
async fn test_second_pass_changes_nothing() {
    let sys = host(&["eth0", "eth1"]);
    let yaml = r#"
interfaces:
  br0:
    bridge: true
    address: 10.1.0.1/16
  eth0:
    address: 10.0.0.5/24
    gateway: 10.0.0.1
    mtu: 9000
    vlans: "100"
  eth1: {bridge: br0}
"#;

    apply(&sys, &mut config(yaml)).await;
    let first = sys.journal();
    assert!(first.contains(&Op::SetMaster("eth1".into(), "br0".into())));
    assert!(first.contains(&Op::SetMtu("eth0".into(), 9000)));

    sys.clear_journal();
    let outcome = apply(&sys, &mut config(yaml)).await;
    assert!(outcome.failures.is_empty());

    let mutations: Vec<_> = sys
        .journal()
        .into_iter()
        .filter(|op| !matches!(op, Op::SetUp(_)))
        .collect();
    assert!(mutations.is_empty(), "unexpected mutations: {:?}", mutations);
    assert_eq!(sys.routes(), vec!["10.0.0.1".parse::<std::net::IpAddr>().unwrap()]);
}

#[tokio::test]
async fn test_dns_from_lease() {
    let sys = host(&["eth0"]);
    sys.set_lease(
        "eth0",
        Lease::parse("ip_address=10.0.0.7\ndomain_name_servers='10.0.0.1'\n"),
    );
    let mut cfg = config("interfaces:\n  eth0: {dhcp: true}\n");

    assert!(apply(&sys, &mut cfg).await.dns_from_dhcp);
}

#[tokio::test]
async fn test_link_listing_failure_is_fatal() {
    let sys = host(&["eth0"]);
    sys.fail_link_listing();
    let mut cfg = config("interfaces:\n  eth0: {dhcp: true}\n");

    let res = apply_network_configs(Arc::clone(&sys), &mut cfg, &ApplyOptions::default()).await;
    assert!(res.is_err());
    assert!(sys.dhcp_runs().is_empty());
}

#[tokio::test]
async fn test_one_link_failure_does_not_stop_others() {
    let sys = host(&["eth0", "eth1"]);
    sys.add_link(Link::new("br0", 50, LinkKind::Vlan));
    let mut cfg = config(
        r#"
interfaces:
  eth0: {bridge: br0}
  eth1: {address: 10.0.0.6/24}
"#,
    );

    let outcome = apply(&sys, &mut cfg).await;

    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].link, "eth0");
    assert_eq!(sys.addresses_of("eth1"), vec![cidr("10.0.0.6/24")]);
}

#[tokio::test(start_paused = true)]
async fn test_dhcp_units_run_concurrently_and_time_out() {
    let sys = host(&["eth0", "eth1", "eth2"]);
    sys.set_dhcp_delay(Duration::from_secs(600));
    let mut cfg = config("dhcp_timeout: 5\ninterfaces:\n  \"eth*\": {dhcp: true}\n");
    let opts = ApplyOptions::for_config(&cfg);

    let start = tokio::time::Instant::now();
    apply_network_configs(Arc::clone(&sys), &mut cfg, &opts)
        .await
        .unwrap();

    assert_eq!(sys.dhcp_runs().len(), 3);
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_dhcp_flags_follow_options() {
    let sys = host(&["eth0"]);
    let mut cfg = config(
        r#"
dns:
  override: true
  nameservers: [1.1.1.1]
interfaces:
  eth0: {dhcp: true, dhcp_args: "dhcpcd -4 -t 30"}
"#,
    );
    let mut opts = ApplyOptions::for_config(&cfg);
    opts.set_hostname = true;

    apply_network_configs(Arc::clone(&sys), &mut cfg, &opts)
        .await
        .unwrap();

    assert_eq!(
        sys.dhcp_runs(),
        vec![vec![
            "dhcpcd",
            "-4",
            "-t",
            "30",
            "-e",
            "force_hostname=true",
            "--nohook",
            "resolv.conf",
            "-w",
            "eth0"
        ]]
    );
}

#[tokio::test]
async fn test_vlan_gets_own_config() {
    let sys = host(&["eth0"]);
    let mut cfg = config(
        r#"
interfaces:
  eth0: {vlans: "10:mgmt"}
  mgmt: {address: 172.16.0.2/24}
"#,
    );

    apply(&sys, &mut cfg).await;

    let mgmt = sys.link_by_name("mgmt").await.unwrap().unwrap();
    assert_eq!(mgmt.kind, LinkKind::Vlan);
    assert!(mgmt.up);
    assert_eq!(sys.addresses_of("mgmt"), vec![cidr("172.16.0.2/24")]);
}
