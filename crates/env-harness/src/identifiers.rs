//! Collision-resistant identifier generation.
//!
//! A [`Seed`] built from the test name, a nanosecond timestamp and a random
//! nonce is hashed into a 32-bit [`Fingerprint`]. Instance and network names
//! embed the fingerprint; the subnet and port pair are derived from its
//! numeric value within an [`IdentifierBand`].
//!
//! No registry is consulted. Two environments collide only when their
//! fingerprints land on the same slot of the same band, which for the
//! dedicated band is well under 0.1% per pair.

use chrono::Utc;
use ring::digest::{digest, SHA256};
use std::fmt;
use uuid::Uuid;

/// Length of the rendered fingerprint in hex characters.
pub const FINGERPRINT_HEX_LEN: usize = 8;

/// Number of /24 subnets inside one second-octet value.
const SUBNETS_PER_OCTET: u32 = 256;

/// Input to fingerprinting.
///
/// Reusing a seed reproduces the same identifiers; callers that need
/// distinct environments must use [`Seed::for_test`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed(String);

impl Seed {
    /// Seed from a test name, the current time in nanoseconds and a v4 UUID.
    #[must_use]
    pub fn for_test(test_name: &str) -> Self {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let nonce = Uuid::new_v4().simple();
        Self(format!("{test_name}-{nanos}-{nonce}"))
    }

    /// Seed from an explicit string.
    #[must_use]
    pub fn fixed(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// First 32 bits of the SHA-256 digest of a seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u32);

impl Fingerprint {
    #[must_use]
    pub fn from_seed(seed: &Seed) -> Self {
        let hash = digest(&SHA256, seed.as_str().as_bytes());
        let prefix = hash
            .as_ref()
            .first_chunk::<4>()
            .copied()
            .unwrap_or_default();
        Self(u32::from_be_bytes(prefix))
    }

    /// Numeric value used for offset derivation.
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }

    /// Lowercase hex rendering, always [`FINGERPRINT_HEX_LEN`] characters.
    #[must_use]
    pub fn to_hex(self) -> String {
        hex::encode(self.0.to_be_bytes())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A reserved address and port range.
///
/// Subnets are `/24` networks `172.{second}.{third}.0/24` with `second` in
/// `second_octet_start..second_octet_start + second_octet_count`. Ports are
/// allocated in pairs starting at `port_base`.
///
/// Neither band touches `172.17.0.0/16`, the Docker default bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierBand {
    pub second_octet_start: u8,
    pub second_octet_count: u8,
    pub port_base: u16,
    pub port_pairs: u16,
}

impl IdentifierBand {
    /// Band reserved for the long-lived shared environment.
    pub const SHARED: IdentifierBand = IdentifierBand {
        second_octet_start: 30,
        second_octet_count: 2,
        port_base: 30_000,
        port_pairs: 500,
    };

    /// Band reserved for dedicated per-test environments.
    pub const DEDICATED: IdentifierBand = IdentifierBand {
        second_octet_start: 18,
        second_octet_count: 12,
        port_base: 31_000,
        port_pairs: 4_500,
    };

    fn subnet_slots(&self) -> u32 {
        u32::from(self.second_octet_count).max(1) * SUBNETS_PER_OCTET
    }

    fn subnet_for(&self, fingerprint: Fingerprint) -> Subnet {
        let index = fingerprint.value() % self.subnet_slots();
        let second = u32::from(self.second_octet_start) + index / SUBNETS_PER_OCTET;
        let third = index % SUBNETS_PER_OCTET;
        Subnet {
            second: u8::try_from(second).unwrap_or(u8::MAX),
            third: u8::try_from(third).unwrap_or(u8::MAX),
        }
    }

    fn ports_for(&self, fingerprint: Fingerprint) -> PortPair {
        // Divide out the subnet slot so port and subnet use independent bits.
        let slot = (fingerprint.value() / self.subnet_slots()) % u32::from(self.port_pairs.max(1));
        let data = u32::from(self.port_base) + slot * 2;
        let data = u16::try_from(data).unwrap_or(u16::MAX - 1);
        PortPair {
            control: data.saturating_add(1),
            data,
        }
    }

    /// Whether a subnet lies inside this band.
    #[must_use]
    pub fn contains_subnet(&self, subnet: Subnet) -> bool {
        let start = self.second_octet_start;
        subnet.second >= start && u32::from(subnet.second) < u32::from(start) + u32::from(self.second_octet_count)
    }

    /// Whether a port lies inside this band.
    #[must_use]
    pub fn contains_port(&self, port: u16) -> bool {
        let end = u32::from(self.port_base) + u32::from(self.port_pairs) * 2;
        port >= self.port_base && u32::from(port) < end
    }
}

/// A `/24` subnet inside `172.16.0.0/12`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subnet {
    pub second: u8,
    pub third: u8,
}

impl Subnet {
    /// Gateway address conventionally assigned to the network.
    #[must_use]
    pub fn gateway(&self) -> String {
        format!("172.{}.{}.1", self.second, self.third)
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "172.{}.{}.0/24", self.second, self.third)
    }
}

/// Ports exposed by one environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortPair {
    /// HTTP control plane (admin API).
    pub control: u16,
    /// Data plane (DNS).
    pub data: u16,
}

/// Everything derived from one seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifiers {
    pub fingerprint: Fingerprint,
    pub instance_name: String,
    pub network_name: String,
    pub subnet: Subnet,
    pub ports: PortPair,
}

impl Identifiers {
    /// Derive names, subnet and ports for `seed` inside `band`.
    #[must_use]
    pub fn derive(seed: &Seed, prefix: &str, band: &IdentifierBand) -> Self {
        let fingerprint = Fingerprint::from_seed(seed);
        Self {
            fingerprint,
            instance_name: format!("{prefix}-{fingerprint}"),
            network_name: format!("{prefix}-net-{fingerprint}"),
            subnet: band.subnet_for(fingerprint),
            ports: band.ports_for(fingerprint),
        }
    }
}
