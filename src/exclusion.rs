//! Address ranges that are never picked as scan targets.
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use cidr_utils::cidr::{IpCidr, Ipv4Cidr};
use cidr_utils::combiner::Ipv4CidrCombiner;
use once_cell::sync::Lazy;

use crate::error::{Result, ScanError};

/// Number of IPv4 addresses.
const ADDRESS_SPACE: u64 = 1 << 32;

/// Private, loopback, shared and documentation space.
const RESERVED_BLOCKS: [&str; 9] = [
    "0.0.0.0/8",       // "this network"
    "10.0.0.0/8",      // private
    "100.64.0.0/10",   // carrier-grade NAT
    "127.0.0.0/8",     // loopback
    "172.16.0.0/12",   // private
    "192.0.2.0/24",    // TEST-NET-1
    "192.88.99.0/24",  // 6to4 relay anycast
    "192.168.0.0/16",  // private
    "198.18.0.0/15",   // benchmarking
];

static RESERVED: Lazy<Vec<Ipv4Cidr>> = Lazy::new(|| {
    RESERVED_BLOCKS
        .iter()
        .map(|block| {
            Ipv4Cidr::from_str(block).expect("reserved block literal is a valid IPv4 CIDR")
        })
        .collect()
});

/// Returns true when `addr` falls in one of the built-in reserved blocks.
pub fn is_reserved(addr: Ipv4Addr) -> bool {
    RESERVED.iter().any(|block| block.contains(&addr))
}

/// The set of blocks an [`AddressGenerator`](crate::generator::AddressGenerator)
/// rejects. Always contains the reserved blocks; more can be added from user input.
#[derive(Debug, Clone)]
pub struct ExclusionTable {
    blocks: Vec<Ipv4Cidr>,
}

impl ExclusionTable {
    /// Only the built-in reserved blocks.
    pub fn reserved() -> Self {
        Self {
            blocks: RESERVED.clone(),
        }
    }

    /// The reserved blocks plus every entry of `extra`. Entries are CIDRs
    /// (`203.0.113.0/24`) or single addresses, which count as a /32.
    ///
    /// ```rust
    /// # use randsweep::exclusion::ExclusionTable;
    /// let table = ExclusionTable::with_extra(["203.0.113.0/24", "8.8.8.8"]).unwrap();
    /// assert!(table.is_excluded("203.0.113.77".parse().unwrap()));
    /// assert!(table.is_excluded("8.8.8.8".parse().unwrap()));
    /// assert!(!table.is_excluded("8.8.4.4".parse().unwrap()));
    /// ```
    ///
    /// Fails when the blocks together, reserved ones included, leave no address
    /// to generate.
    pub fn with_extra<I, S>(extra: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::reserved();
        let mut inputs = Vec::new();
        for entry in extra {
            let entry = entry.as_ref().trim();
            table.blocks.push(parse_block(entry)?);
            inputs.push(entry.to_owned());
        }

        if table.excluded_count() >= ADDRESS_SPACE {
            return Err(ScanError::InvalidExclusion {
                input: inputs.join(","),
                reason: "together the blocks exclude the whole address space".to_owned(),
            });
        }
        Ok(table)
    }

    /// How many distinct addresses the table rejects. Overlapping blocks count
    /// once.
    pub fn excluded_count(&self) -> u64 {
        let mut combiner = Ipv4CidrCombiner::with_capacity(self.blocks.len());
        for block in &self.blocks {
            combiner.push(*block);
        }
        combiner.size()
    }

    /// Whether `addr` must not be probed.
    #[inline]
    pub fn is_excluded(&self, addr: Ipv4Addr) -> bool {
        self.blocks.iter().any(|block| block.contains(&addr))
    }

    /// All blocks, reserved ones first.
    pub fn blocks(&self) -> &[Ipv4Cidr] {
        &self.blocks
    }
}

impl Default for ExclusionTable {
    fn default() -> Self {
        Self::reserved()
    }
}

fn parse_block(input: &str) -> Result<Ipv4Cidr> {
    let input = input.trim();
    let invalid = |reason: String| ScanError::InvalidExclusion {
        input: input.to_owned(),
        reason,
    };

    let block = if input.contains('/') {
        match IpCidr::from_str(input).map_err(|e| invalid(e.to_string()))? {
            IpCidr::V4(block) => block,
            IpCidr::V6(_) => return Err(invalid("IPv6 is not supported".to_owned())),
        }
    } else {
        match IpAddr::from_str(input).map_err(|e| invalid(e.to_string()))? {
            IpAddr::V4(addr) => Ipv4Cidr::new(addr, 32).map_err(|e| invalid(e.to_string()))?,
            IpAddr::V6(_) => return Err(invalid("IPv6 is not supported".to_owned())),
        }
    };

    // A /0 would leave nothing to generate.
    if block.network_length() == 0 {
        return Err(invalid("excludes the whole address space".to_owned()));
    }
    Ok(block)
}
