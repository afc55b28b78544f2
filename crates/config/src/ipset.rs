use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;

/// A set of IP addresses and CIDR ranges, backed by binary prefix tries.
///
/// Separate roots cover IPv4 (32-bit) and IPv6 (128-bit) addresses. A
/// membership check walks an address's bits from the top and hits as soon as
/// any inserted prefix terminates on the path, so lookups cost at most the
/// address width regardless of how many ranges are loaded.
#[derive(Debug, Clone, Default)]
pub struct IpSet {
    root_v4: Node,
    root_v6: Node,
    len: usize,
}

#[derive(Debug, Clone, Default)]
struct Node {
    children: [Option<Box<Node>>; 2],
    terminal: bool,
}

impl IpSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of prefixes inserted.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts a CIDR network.
    pub fn insert(&mut self, net: IpNet) {
        let bits = address_bits(net.network());
        let root = match net.network() {
            IpAddr::V4(_) => &mut self.root_v4,
            IpAddr::V6(_) => &mut self.root_v6,
        };

        let mut node = root;
        for &bit in bits.iter().take(net.prefix_len() as usize) {
            node = node.children[bit as usize].get_or_insert_with(Default::default);
        }
        if !node.terminal {
            node.terminal = true;
            self.len += 1;
        }
    }

    /// Inserts a single address as a host-length prefix.
    pub fn insert_ip(&mut self, ip: IpAddr) {
        self.insert(IpNet::from(ip));
    }

    /// Whether `ip` falls inside any inserted address or range.
    pub fn contains(&self, ip: IpAddr) -> bool {
        let bits = address_bits(ip);
        let mut node = match ip {
            IpAddr::V4(_) => &self.root_v4,
            IpAddr::V6(_) => &self.root_v6,
        };

        if node.terminal {
            return true;
        }
        for &bit in &bits {
            match &node.children[bit as usize] {
                Some(child) => {
                    if child.terminal {
                        return true;
                    }
                    node = child;
                }
                None => return false,
            }
        }
        false
    }

    /// Builds a set from textual entries: plain addresses or CIDR ranges.
    /// Malformed entries are skipped, not fatal -- partial protection beats
    /// none.
    pub fn parse<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            if let Ok(net) = IpNet::from_str(entry) {
                set.insert(net);
            } else if let Ok(ip) = IpAddr::from_str(entry) {
                set.insert_ip(ip);
            } else {
                tracing::warn!(entry, "skipping unparsable IP entry");
            }
        }
        set
    }
}

/// An address as its most-significant-first bit string: 32 bits for IPv4,
/// 128 for IPv6.
fn address_bits(addr: IpAddr) -> Vec<u8> {
    let octets: Vec<u8> = match addr {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    };
    let mut bits = Vec::with_capacity(octets.len() * 8);
    for octet in octets {
        for shift in (0..8).rev() {
            bits.push((octet >> shift) & 1);
        }
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn single_address_membership() {
        let set = IpSet::parse(["1.2.3.4"]);
        assert!(set.contains(ip("1.2.3.4")));
        assert!(!set.contains(ip("1.2.3.5")));
    }

    #[test]
    fn cidr_range_membership() {
        let set = IpSet::parse(["10.0.0.0/8"]);
        assert!(set.contains(ip("10.200.3.4")));
        assert!(!set.contains(ip("11.0.0.1")));
    }

    #[test]
    fn ipv6_ranges() {
        let set = IpSet::parse(["2001:db8::/32", "::1"]);
        assert!(set.contains(ip("2001:db8::beef")));
        assert!(set.contains(ip("::1")));
        assert!(!set.contains(ip("2001:db9::1")));
        // Families never cross.
        assert!(!set.contains(ip("1.2.3.4")));
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let set = IpSet::parse(["1.2.3.4", "not-an-ip", "", "10.0.0.0/8"]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(ip("1.2.3.4")));
        assert!(set.contains(ip("10.1.1.1")));
    }

    #[test]
    fn duplicate_inserts_count_once() {
        let mut set = IpSet::new();
        set.insert_ip(ip("1.1.1.1"));
        set.insert_ip(ip("1.1.1.1"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn empty_set_contains_nothing() {
        let set = IpSet::new();
        assert!(set.is_empty());
        assert!(!set.contains(ip("1.1.1.1")));
    }
}
