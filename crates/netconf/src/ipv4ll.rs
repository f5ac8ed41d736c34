//! IPv4 link-local (169.254.0.0/16) address selection.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::system::{Link, LinkProvider};
use crate::util::Cidr;

const PREFIX_LEN: u8 = 16;
const MAX_CANDIDATES: usize = 10;

fn seed(link: &Link) -> u64 {
    match link.mac {
        Some(mac) => mac.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)),
        None => u64::from(link.index),
    }
}

/// Candidate addresses in the order they are tried, derived from `seed`.
///
/// Third octets 0 and 255 are reserved and skipped without counting.
fn candidates(seed: u64) -> impl Iterator<Item = Ipv4Addr> {
    let mut rng = StdRng::seed_from_u64(seed);
    std::iter::from_fn(move || {
        loop {
            let r: u32 = rng.r#gen();
            let third = (r & 0xff) as u8;
            if third == 0 || third == 255 {
                continue;
            }
            return Some(Ipv4Addr::new(169, 254, third, (r >> 24) as u8));
        }
    })
    .take(MAX_CANDIDATES)
}

/// Give `link` a link-local address unless it already has one.
///
/// Addresses present on any link of the host count as taken.
pub async fn assign_link_local<S: LinkProvider + ?Sized>(sys: &S, link: &Link) -> Result<()> {
    if sys
        .addresses(link)
        .await?
        .iter()
        .any(Cidr::is_ipv4_link_local)
    {
        debug!(link = %link.name, "link-local address already present");
        return Ok(());
    }

    let mut taken = HashSet::new();
    for other in sys.links().await? {
        match sys.addresses(&other).await {
            Ok(addrs) => taken.extend(
                addrs
                    .into_iter()
                    .filter(Cidr::is_ipv4_link_local)
                    .map(|c| c.addr),
            ),
            Err(e) => warn!(link = %other.name, error = %e, "cannot list addresses"),
        }
    }

    for candidate in candidates(seed(link)) {
        if taken.contains(&IpAddr::V4(candidate)) {
            debug!(link = %link.name, %candidate, "link-local address in use");
            continue;
        }

        let cidr = Cidr::new(IpAddr::V4(candidate), PREFIX_LEN)?;
        info!(link = %link.name, address = %cidr, "assigning link-local address");
        return match sys.add_address(link, cidr).await {
            Err(e) if !e.is_already_exists() => Err(e),
            _ => Ok(()),
        };
    }

    Err(Error::Ipv4llExhausted(link.name.clone()))
}

/// Remove every 169.254.0.0/16 address from `link`.
pub async fn remove_link_local<S: LinkProvider + ?Sized>(sys: &S, link: &Link) -> Result<()> {
    for addr in sys.addresses(link).await? {
        if addr.is_ipv4_link_local() {
            info!(link = %link.name, address = %addr, "removing link-local address");
            sys.del_address(link, addr).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::LinkKind;
    use crate::testing::FakeSystem;

    const MAC: [u8; 6] = [0x52, 0x54, 0, 0x12, 0x34, 0x56];

    fn first_candidates(n: usize) -> Vec<Cidr> {
        candidates(u64::from_be_bytes([0, 0, 0x52, 0x54, 0, 0x12, 0x34, 0x56]))
            .take(n)
            .map(|a| Cidr::new(IpAddr::V4(a), PREFIX_LEN).unwrap())
            .collect()
    }

    fn host() -> (FakeSystem, Link) {
        let link = Link::new("eth0", 2, LinkKind::Physical).with_mac(MAC);
        let sys = FakeSystem::new()
            .with_link(link.clone())
            .with_link(Link::new("eth1", 3, LinkKind::Physical));
        (sys, link)
    }

    #[test]
    fn test_candidates_are_deterministic() {
        let a: Vec<_> = candidates(0x5254_0012_3456).collect();
        let b: Vec<_> = candidates(0x5254_0012_3456).collect();
        assert_eq!(a, b);
        assert_eq!(a.len(), MAX_CANDIDATES);
    }

    #[test]
    fn test_candidates_stay_in_range() {
        for seed in 0..50 {
            for addr in candidates(seed) {
                let [a, b, c, _] = addr.octets();
                assert_eq!((a, b), (169, 254));
                assert!(c != 0 && c != 255);
            }
        }
    }

    #[test]
    fn test_seed_prefers_mac() {
        let link = Link::new("eth0", 2, LinkKind::Physical);
        assert_eq!(seed(&link), 2);
        let link = link.with_mac([0, 0, 0, 0, 1, 2]);
        assert_eq!(seed(&link), 0x0102);
    }

    #[tokio::test]
    async fn test_assign_picks_first_free_candidate() {
        let (sys, link) = host();
        let expected = first_candidates(2);
        sys.assign("eth1", expected[0]);

        assign_link_local(&sys, &link).await.unwrap();

        assert_eq!(sys.addresses_of("eth0"), vec![expected[1]]);
    }

    #[tokio::test]
    async fn test_assign_keeps_existing_address() {
        let (sys, link) = host();
        let existing: Cidr = "169.254.7.7/16".parse().unwrap();
        sys.assign("eth0", existing);

        assign_link_local(&sys, &link).await.unwrap();

        assert_eq!(sys.addresses_of("eth0"), vec![existing]);
    }

    #[tokio::test]
    async fn test_assign_exhausted() {
        let (sys, link) = host();
        for addr in first_candidates(MAX_CANDIDATES) {
            sys.assign("eth1", addr);
        }

        let err = assign_link_local(&sys, &link).await.unwrap_err();
        assert!(matches!(err, Error::Ipv4llExhausted(ref name) if name == "eth0"));
    }

    #[tokio::test]
    async fn test_remove_only_link_local() {
        let (sys, link) = host();
        let routable: Cidr = "10.0.0.5/24".parse().unwrap();
        sys.assign("eth0", routable);
        sys.assign("eth0", "169.254.7.7/16".parse().unwrap());

        remove_link_local(&sys, &link).await.unwrap();

        assert_eq!(sys.addresses_of("eth0"), vec![routable]);
    }
}
