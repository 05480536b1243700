//! Device naming and zone placement.
//!
//! Every board has a canonical name `np04-wib-NNN`. The hundreds digit picks
//! the physical zone and the low digits pick the slot within it, five slots
//! per zone. Bench boards on the private test subnet have no DNS name; their
//! last address octet is offset by 900 into the bench block.

use serde::{Deserialize, Serialize};

/// Prefix shared by every canonical board name.
pub const NAME_PREFIX: &str = "np04-wib-";

/// Private subnet used by bench boards.
pub const BENCH_SUBNET: &str = "192.168.200.";

/// Offset added to a bench board's last octet to form its canonical number.
pub const BENCH_OFFSET: u32 = 900;

/// Slots per zone block.
pub const UNITS_PER_ZONE: u32 = 5;

/// Canonical numbers of consecutive zone blocks are this far apart.
const BLOCK_STRIDE: u32 = 100;

/// Physical location of a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Coldbox,
    Dsras,
    Msras,
    Usras,
    Dsdas,
    Usdas,
    Msdas,
    /// Bench and virtual boards reached over the test subnet.
    Bench,
}

/// Zone → block index. Blocks 7 and 8 are reserved and map to no zone.
pub const ZONE_BLOCKS: &[(u32, Zone)] = &[
    (0, Zone::Coldbox),
    (1, Zone::Dsras),
    (2, Zone::Msras),
    (3, Zone::Usras),
    (4, Zone::Dsdas),
    (5, Zone::Usdas),
    (6, Zone::Msdas),
    (9, Zone::Bench),
];

impl Zone {
    /// All zones in block order.
    pub fn all() -> impl Iterator<Item = Zone> {
        ZONE_BLOCKS.iter().map(|&(_, zone)| zone)
    }

    /// Block index this zone owns.
    pub fn block(self) -> u32 {
        ZONE_BLOCKS
            .iter()
            .find(|&&(_, zone)| zone == self)
            .map(|&(block, _)| block)
            .unwrap_or_default()
    }

    /// Canonical numbers reserved for this zone.
    pub fn numbers(self) -> impl Iterator<Item = u32> {
        let base = self.block() * BLOCK_STRIDE;
        (1..=UNITS_PER_ZONE).map(move |unit| base + unit)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Coldbox => "coldbox",
            Self::Dsras => "dsras",
            Self::Msras => "msras",
            Self::Usras => "usras",
            Self::Dsdas => "dsdas",
            Self::Usdas => "usdas",
            Self::Msdas => "msdas",
            Self::Bench => "bench",
        }
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved board: canonical name plus zone, if its block is assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Address as configured; this is what the control tool is given.
    pub address: String,
    pub name: String,
    pub zone: Option<Zone>,
}

/// Format a canonical board name from its number.
pub fn canonical_name(number: u32) -> String {
    format!("{NAME_PREFIX}{number:03}")
}

/// Resolve a configured address to its canonical device.
///
/// Bench subnet addresses become `np04-wib-{900 + octet}`; anything else is
/// taken as already canonical. Never fails: names outside the assigned
/// blocks resolve with `zone: None`.
pub fn resolve(raw_address: &str) -> Device {
    let address = raw_address.trim();
    let name = match bench_octet(address) {
        Some(octet) => canonical_name(BENCH_OFFSET + u32::from(octet)),
        None => address.to_string(),
    };
    let zone = zone_of(&name);
    Device {
        address: address.to_string(),
        name,
        zone,
    }
}

/// Zone of a canonical name, or `None` for reserved blocks, out-of-range
/// slots and names that don't follow the scheme.
pub fn zone_of(name: &str) -> Option<Zone> {
    let number: u32 = name.strip_prefix(NAME_PREFIX)?.parse().ok()?;
    let (block, unit) = (number / BLOCK_STRIDE, number % BLOCK_STRIDE);
    if !(1..=UNITS_PER_ZONE).contains(&unit) {
        return None;
    }
    ZONE_BLOCKS
        .iter()
        .find(|&&(b, _)| b == block)
        .map(|&(_, zone)| zone)
}

fn bench_octet(address: &str) -> Option<u8> {
    address
        .strip_prefix(BENCH_SUBNET)?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    // -----------------------------------------------------------------------
    // Bench subnet mapping
    // -----------------------------------------------------------------------

    #[test]
    fn bench_address_maps_to_900_block() {
        let dev = resolve("192.168.200.2");
        assert_eq!(dev.name, "np04-wib-902");
        assert_eq!(dev.zone, Some(Zone::Bench));
    }

    #[test]
    fn bench_address_tolerates_whitespace() {
        let dev = resolve(" 192.168.200.5 ");
        assert_eq!(dev.name, "np04-wib-905");
        assert_eq!(dev.address, "192.168.200.5");
    }

    #[test]
    fn canonical_name_tolerates_whitespace() {
        let dev = resolve(" np04-wib-101\n");
        assert_eq!(dev.name, "np04-wib-101");
        assert_eq!(dev.address, "np04-wib-101");
        assert_eq!(dev.zone, Some(Zone::Dsras));
    }

    #[test]
    fn every_octet_resolves_to_a_unique_name() {
        let names: HashSet<String> = (0..=255u32)
            .map(|n| resolve(&format!("192.168.200.{n}")).name)
            .collect();
        assert_eq!(names.len(), 256);
        for n in 0..=255u32 {
            assert!(names.contains(&canonical_name(900 + n)));
        }
    }

    #[test]
    fn bench_slots_one_to_five_are_in_bench_zone() {
        for n in 1..=5 {
            assert_eq!(resolve(&format!("192.168.200.{n}")).zone, Some(Zone::Bench));
        }
        assert_eq!(resolve("192.168.200.0").zone, None);
        assert_eq!(resolve("192.168.200.6").zone, None);
        assert_eq!(resolve("192.168.200.200").zone, None);
    }

    #[test]
    fn other_subnets_are_not_rewritten() {
        assert_eq!(resolve("192.168.201.2").name, "192.168.201.2");
        assert_eq!(resolve("192.168.200.x").name, "192.168.200.x");
        assert_eq!(resolve("192.168.200.256").name, "192.168.200.256");
    }

    // -----------------------------------------------------------------------
    // Canonical names
    // -----------------------------------------------------------------------

    #[test]
    fn canonical_name_is_zero_padded() {
        assert_eq!(canonical_name(1), "np04-wib-001");
        assert_eq!(canonical_name(105), "np04-wib-105");
        assert_eq!(canonical_name(1155), "np04-wib-1155");
    }

    #[test]
    fn canonical_names_pass_through() {
        let dev = resolve("np04-wib-203");
        assert_eq!(dev.name, "np04-wib-203");
        assert_eq!(dev.zone, Some(Zone::Msras));
    }

    #[test]
    fn every_assigned_slot_resolves_to_its_zone() {
        for (block, zone) in ZONE_BLOCKS {
            for unit in 1..=UNITS_PER_ZONE {
                let name = canonical_name(block * 100 + unit);
                assert_eq!(resolve(&name).zone, Some(*zone), "{name}");
            }
            assert_eq!(zone_of(&canonical_name(block * 100)), None);
            assert_eq!(zone_of(&canonical_name(block * 100 + 6)), None);
        }
    }

    #[test]
    fn reserved_blocks_have_no_zone() {
        for block in [7, 8] {
            for unit in 0..=10 {
                assert_eq!(zone_of(&canonical_name(block * 100 + unit)), None);
            }
        }
    }

    #[test]
    fn foreign_names_have_no_zone() {
        assert_eq!(resolve("a-101").zone, None);
        assert_eq!(zone_of("np04-wib-"), None);
        assert_eq!(zone_of("np04-wib-abc"), None);
    }

    // -----------------------------------------------------------------------
    // Zone table
    // -----------------------------------------------------------------------

    #[test]
    fn zone_numbers_match_blocks() {
        assert_eq!(Zone::Coldbox.numbers().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert_eq!(
            Zone::Bench.numbers().collect::<Vec<_>>(),
            vec![901, 902, 903, 904, 905]
        );
        for zone in Zone::all() {
            for n in zone.numbers() {
                assert_eq!(zone_of(&canonical_name(n)), Some(zone));
            }
        }
    }

    #[test]
    fn zone_display() {
        assert_eq!(Zone::Coldbox.to_string(), "coldbox");
        assert_eq!(Zone::Bench.to_string(), "bench");
        assert_eq!(Zone::all().count(), 8);
    }
}
