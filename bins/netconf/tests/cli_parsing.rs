//! CLI argument parsing tests for the netconf command.
//!
//! Nothing here touches netlink: every case either stops at argument
//! parsing or only reads a configuration file.

use assert_cmd::Command;
use predicates::prelude::*;

fn netconf_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_netconf"))
}

mod global_flags {
    use super::*;

    #[test]
    fn test_help() {
        netconf_cmd()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Declarative network configuration"));
    }

    #[test]
    fn test_version() {
        netconf_cmd()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("netconf"));
    }

    #[test]
    fn test_invalid_subcommand() {
        netconf_cmd()
            .arg("invalid_command")
            .assert()
            .failure()
            .stderr(predicate::str::contains("error"));
    }
}

mod apply_command {
    use super::*;

    #[test]
    fn test_apply_help() {
        netconf_cmd()
            .args(["apply", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--set-hostname"))
            .stdout(predicate::str::contains("--no-dns"))
            .stdout(predicate::str::contains("--resolv-conf"));
    }

    #[test]
    fn test_apply_requires_config() {
        netconf_cmd()
            .arg("apply")
            .assert()
            .failure()
            .stderr(predicate::str::contains("--config"));
    }

    #[test]
    fn test_apply_missing_file() {
        netconf_cmd()
            .args(["apply", "--config", "/nonexistent/netconf.yml"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("cannot load /nonexistent/netconf.yml"));
    }
}

mod show_config_command {
    use super::*;

    #[test]
    fn test_show_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.yml");
        std::fs::write(&path, "dns:\n  nameservers: [8.8.8.8]\n").unwrap();

        netconf_cmd()
            .args(["show-config", "--config"])
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("eth*"))
            .stdout(predicate::str::contains("127.0.0.1/8"))
            .stdout(predicate::str::contains("8.8.8.8"));
    }

    #[test]
    fn test_show_config_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.json");
        std::fs::write(&path, r#"{"interfaces": {"eth0": {"bridge": "br0"}}}"#).unwrap();

        netconf_cmd()
            .args(["show-config", "-c"])
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("bridge: br0"))
            .stdout(predicate::str::contains("eth*").not());
    }

    #[test]
    fn test_show_config_rejects_bad_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.yml");
        std::fs::write(&path, "interfaces: [not, a, map]\n").unwrap();

        netconf_cmd()
            .args(["show-config", "--config"])
            .arg(&path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("cannot load"));
    }
}

mod match_command {
    use super::*;

    #[test]
    fn test_match_help() {
        netconf_cmd()
            .args(["match", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Show which interface spec"));
    }
}
