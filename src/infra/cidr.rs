use crate::error::SynthError;
use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;

/// Parses `a.b.c.d/n`, requiring an explicit prefix and no host bits.
pub fn parse_network(cidr: &str) -> Result<Ipv4Network, SynthError> {
    let invalid = |reason: String| SynthError::InvalidCidr {
        cidr: cidr.to_string(),
        reason,
    };

    if !cidr.contains('/') {
        return Err(invalid("missing prefix length".to_string()));
    }
    let network: Ipv4Network = cidr.trim().parse().map_err(|e| invalid(format!("{}", e)))?;
    if network.ip() != network.network() {
        return Err(invalid(format!(
            "host bits set (network address is {})",
            network.network()
        )));
    }
    Ok(network)
}

/// First and last address of `network` as integers
pub fn bounds(network: &Ipv4Network) -> (u32, u32) {
    (
        u32::from(network.network()),
        u32::from(network.broadcast()),
    )
}

pub fn overlaps(a: &Ipv4Network, b: &Ipv4Network) -> bool {
    let (a_start, a_end) = bounds(a);
    let (b_start, b_end) = bounds(b);
    a_start <= b_end && b_start <= a_end
}

pub fn contains(outer: &Ipv4Network, inner: &Ipv4Network) -> bool {
    let (o_start, o_end) = bounds(outer);
    let (i_start, i_end) = bounds(inner);
    o_start <= i_start && i_end <= o_end
}

/// Hands out consecutive, size-aligned blocks from a parent network
#[derive(Debug)]
pub struct CidrAllocator {
    parent: Ipv4Network,
    next: u64,
    allocated: usize,
}

impl CidrAllocator {
    pub fn new(parent: Ipv4Network) -> Self {
        Self {
            parent,
            next: u64::from(u32::from(parent.network())),
            allocated: 0,
        }
    }

    pub fn allocate(&mut self, mask: u8) -> Result<Ipv4Network, SynthError> {
        if mask < self.parent.prefix() || mask > 32 {
            return Err(SynthError::InvalidCidr {
                cidr: format!("{}/{}", self.parent.network(), mask),
                reason: format!(
                    "subnet mask must be between /{} and /32",
                    self.parent.prefix()
                ),
            });
        }

        let size = 1u64 << (32 - u32::from(mask));
        let start = self.next.div_ceil(size) * size;
        let end = start + size - 1;
        let (_, parent_end) = bounds(&self.parent);

        if end > u64::from(parent_end) {
            return Err(SynthError::CidrExhausted {
                vpc_cidr: self.parent.to_string(),
                mask,
                index: self.allocated,
            });
        }

        // start <= parent_end, so it fits in u32
        let network = Ipv4Network::new(Ipv4Addr::from(start as u32), mask).map_err(|e| {
            SynthError::InvalidCidr {
                cidr: format!("{}/{}", Ipv4Addr::from(start as u32), mask),
                reason: e.to_string(),
            }
        })?;
        self.next = end + 1;
        self.allocated += 1;
        Ok(network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_network() {
        let net = parse_network("10.128.0.0/16").unwrap();
        assert_eq!(net.prefix(), 16);
        assert_eq!(net.network(), Ipv4Addr::new(10, 128, 0, 0));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_network("10.128.0.0").is_err());
        assert!(parse_network("10.128.0.0/33").is_err());
        assert!(parse_network("300.1.1.1/8").is_err());
        assert!(parse_network("not-a-cidr/8").is_err());
    }

    #[test]
    fn test_parse_rejects_host_bits() {
        let err = parse_network("10.128.1.0/16").unwrap_err();
        assert!(err.to_string().contains("host bits"));
    }

    #[test]
    fn test_allocate_consecutive_blocks() {
        let mut alloc = CidrAllocator::new(parse_network("10.128.0.0/16").unwrap());
        let blocks: Vec<String> = (0..6)
            .map(|_| alloc.allocate(24).unwrap().to_string())
            .collect();
        assert_eq!(
            blocks,
            vec![
                "10.128.0.0/24",
                "10.128.1.0/24",
                "10.128.2.0/24",
                "10.128.3.0/24",
                "10.128.4.0/24",
                "10.128.5.0/24",
            ]
        );
    }

    #[test]
    fn test_allocate_aligns_larger_blocks() {
        let mut alloc = CidrAllocator::new(parse_network("10.0.0.0/16").unwrap());
        assert_eq!(alloc.allocate(26).unwrap().to_string(), "10.0.0.0/26");
        assert_eq!(alloc.allocate(24).unwrap().to_string(), "10.0.1.0/24");
    }

    #[test]
    fn test_allocate_exhaustion() {
        let mut alloc = CidrAllocator::new(parse_network("10.0.0.0/23").unwrap());
        alloc.allocate(24).unwrap();
        alloc.allocate(24).unwrap();
        let err = alloc.allocate(24).unwrap_err();
        assert!(matches!(err, SynthError::CidrExhausted { index: 2, .. }));
    }

    #[test]
    fn test_allocate_rejects_mask_wider_than_parent() {
        let mut alloc = CidrAllocator::new(parse_network("10.0.0.0/16").unwrap());
        assert!(alloc.allocate(8).is_err());
    }

    #[test]
    fn test_overlap_and_contains() {
        let vpc = parse_network("10.0.0.0/16").unwrap();
        let a = parse_network("10.0.1.0/24").unwrap();
        let b = parse_network("10.0.1.128/25").unwrap();
        let c = parse_network("10.1.0.0/24").unwrap();
        assert!(overlaps(&a, &b));
        assert!(!overlaps(&a, &c));
        assert!(contains(&vpc, &a));
        assert!(!contains(&vpc, &c));
    }
}
