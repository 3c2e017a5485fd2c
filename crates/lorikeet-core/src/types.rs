// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LoRaWAN identifiers and key primitives shared across the workspace.
//!
//! All identifiers are stored and displayed big-endian (the order used in
//! configuration files and APIs). Key derivation and address arithmetic use
//! the little-endian helpers where the LoRaWAN wire format requires them.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{Display, EnumString};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::LorikeetError;

/// Implements string-based serde for types with `Display` + `FromStr`.
macro_rules! impl_string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

fn decode_fixed<const N: usize>(s: &str, what: &str) -> Result<[u8; N], LorikeetError> {
    let bytes = hex::decode(s.trim())
        .map_err(|e| LorikeetError::InvalidParameters(format!("invalid {what} `{s}`: {e}")))?;
    bytes.try_into().map_err(|_| {
        LorikeetError::InvalidParameters(format!(
            "invalid {what} `{s}`: expected {N} bytes ({} hex characters)",
            N * 2
        ))
    })
}

/// A 64-bit extended unique identifier (DevEUI or JoinEUI).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Eui64([u8; 8]);

/// Globally unique device identifier.
pub type DevEui = Eui64;

/// Join-server identifier (AppEUI in LoRaWAN 1.0.x).
pub type JoinEui = Eui64;

impl Eui64 {
    pub const fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0
    }

    pub fn to_le_bytes(&self) -> [u8; 8] {
        let mut b = self.0;
        b.reverse();
        b
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 8]
    }
}

impl fmt::Display for Eui64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Eui64 {
    type Err = LorikeetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(decode_fixed(s, "EUI64")?))
    }
}

impl_string_serde!(Eui64);

/// A 32-bit device network address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DevAddr([u8; 4]);

impl DevAddr {
    pub const fn from_be_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub const fn from_u32(value: u32) -> Self {
        Self(value.to_be_bytes())
    }

    pub fn to_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    pub fn to_be_bytes(&self) -> [u8; 4] {
        self.0
    }

    pub fn to_le_bytes(&self) -> [u8; 4] {
        self.to_u32().to_le_bytes()
    }
}

impl fmt::Display for DevAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for DevAddr {
    type Err = LorikeetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(decode_fixed(s, "DevAddr")?))
    }
}

impl_string_serde!(DevAddr);

/// A DevAddr prefix (`AddrPrefix` + `NwkID`) and its length in bits.
///
/// Written as `26000000/7`: the address bits followed by the prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevAddrPrefix {
    prefix: DevAddr,
    size: u8,
}

impl DevAddrPrefix {
    /// Create a prefix. Bits beyond `size` in `prefix` are cleared.
    pub fn new(prefix: DevAddr, size: u8) -> Result<Self, LorikeetError> {
        if size > 32 {
            return Err(LorikeetError::InvalidParameters(format!(
                "DevAddr prefix length must be at most 32, got {size}"
            )));
        }
        let mask = Self::mask_for(size);
        Ok(Self {
            prefix: DevAddr::from_u32(prefix.to_u32() & mask),
            size,
        })
    }

    pub fn prefix(&self) -> DevAddr {
        self.prefix
    }

    pub fn size(&self) -> u8 {
        self.size
    }

    fn mask_for(size: u8) -> u32 {
        if size == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(size))
        }
    }

    /// Bitmask covering the prefix bits.
    pub fn mask(&self) -> u32 {
        Self::mask_for(self.size)
    }

    /// Number of addresses inside the prefix.
    pub fn capacity(&self) -> u64 {
        1u64 << (32 - u32::from(self.size))
    }

    pub fn contains(&self, dev_addr: DevAddr) -> bool {
        dev_addr.to_u32() & self.mask() == self.prefix.to_u32()
    }

    /// Pick a uniformly random address inside the prefix.
    pub fn random_dev_addr<R: RngCore + ?Sized>(&self, rng: &mut R) -> DevAddr {
        let mask = self.mask();
        DevAddr::from_u32((rng.next_u32() & !mask) | self.prefix.to_u32())
    }
}

impl fmt::Display for DevAddrPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.prefix, self.size)
    }
}

impl FromStr for DevAddrPrefix {
    type Err = LorikeetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, size) = s.trim().split_once('/').ok_or_else(|| {
            LorikeetError::InvalidParameters(format!(
                "invalid DevAddr prefix `{s}`: expected `<hex>/<bits>`"
            ))
        })?;
        let size: u8 = size.parse().map_err(|_| {
            LorikeetError::InvalidParameters(format!("invalid DevAddr prefix length in `{s}`"))
        })?;
        Self::new(addr.parse()?, size)
    }
}

impl_string_serde!(DevAddrPrefix);

/// A 24-bit LoRaWAN network identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NetId([u8; 3]);

/// NwkID bit lengths by NetID type (LoRaWAN Backend Interfaces, section 13).
const NWK_ID_BITS: [u8; 8] = [6, 6, 9, 11, 12, 13, 15, 17];

impl NetId {
    pub const fn from_be_bytes(bytes: [u8; 3]) -> Self {
        Self(bytes)
    }

    pub fn to_be_bytes(&self) -> [u8; 3] {
        self.0
    }

    pub fn to_le_bytes(&self) -> [u8; 3] {
        [self.0[2], self.0[1], self.0[0]]
    }

    /// NetID type, encoded in the three most significant bits.
    pub fn net_type(&self) -> u8 {
        self.0[0] >> 5
    }

    /// The NwkID carried in the low bits of the NetID.
    pub fn nwk_id(&self) -> u32 {
        let value = u32::from_be_bytes([0, self.0[0], self.0[1], self.0[2]]) & 0x001F_FFFF;
        let bits = NWK_ID_BITS[self.net_type() as usize];
        value & ((1u32 << bits) - 1)
    }

    /// The DevAddr prefix (`AddrPrefix` followed by NwkID) for this NetID.
    pub fn dev_addr_prefix(&self) -> DevAddrPrefix {
        let net_type = u32::from(self.net_type());
        let nwk_bits = u32::from(NWK_ID_BITS[net_type as usize]);
        let type_bits = net_type + 1;
        // `net_type` ones followed by a single zero.
        let type_prefix = ((1u32 << net_type) - 1) << 1;
        let value =
            (type_prefix << (32 - type_bits)) | (self.nwk_id() << (32 - type_bits - nwk_bits));
        DevAddrPrefix {
            prefix: DevAddr::from_u32(value),
            size: (type_bits + nwk_bits) as u8,
        }
    }
}

impl fmt::Display for NetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for NetId {
    type Err = LorikeetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(decode_fixed(s, "NetID")?))
    }
}

impl_string_serde!(NetId);

/// A 128-bit AES key. The bytes are wiped on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Default, Zeroize, ZeroizeOnDrop)]
pub struct AesKey([u8; 16]);

impl AesKey {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Build a key from a database or API byte slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, LorikeetError> {
        let arr: [u8; 16] = bytes.try_into().map_err(|_| {
            LorikeetError::InvalidKeyMaterial(format!(
                "AES key must be 16 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 16]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AesKey([REDACTED])")
    }
}

impl FromStr for AesKey {
    type Err = LorikeetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed(s, "AES key")
            .map(Self)
            .map_err(|e| LorikeetError::InvalidKeyMaterial(e.to_string()))
    }
}

impl Serialize for AesKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for AesKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// LoRaWAN MAC version negotiated for a session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum MacVersion {
    #[strum(serialize = "1.0.0")]
    #[serde(rename = "1.0.0")]
    LoRaWAN1_0_0,
    #[strum(serialize = "1.0.1")]
    #[serde(rename = "1.0.1")]
    LoRaWAN1_0_1,
    #[strum(serialize = "1.0.2")]
    #[serde(rename = "1.0.2")]
    LoRaWAN1_0_2,
    #[strum(serialize = "1.0.3")]
    #[serde(rename = "1.0.3")]
    LoRaWAN1_0_3,
    #[strum(serialize = "1.0.4")]
    #[serde(rename = "1.0.4")]
    LoRaWAN1_0_4,
    #[strum(serialize = "1.1.0")]
    #[serde(rename = "1.1.0")]
    LoRaWAN1_1_0,
}

impl MacVersion {
    /// True for LoRaWAN 1.1, which splits the network session key and the
    /// downlink frame counter.
    pub fn is_1_1(&self) -> bool {
        matches!(self, MacVersion::LoRaWAN1_1_0)
    }
}

/// How a session was established.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActivationMode {
    /// Over-the-air activation (join exchange).
    Otaa,
    /// Activation by personalization (session provisioned directly).
    Abp,
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn eui64_parses_and_displays_lowercase() {
        let eui: Eui64 = "0011223344556677".parse().unwrap();
        assert_eq!(eui.to_be_bytes(), [0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]);
        assert_eq!(eui.to_le_bytes()[0], 0x77);
        assert_eq!("AABBCCDDEEFF0011".parse::<Eui64>().unwrap().to_string(), "aabbccddeeff0011");
    }

    #[test]
    fn eui64_rejects_wrong_length() {
        let err = "001122".parse::<Eui64>().unwrap_err();
        assert!(err.to_string().contains("8 bytes"));
    }

    #[test]
    fn aes_key_debug_is_redacted() {
        let key: AesKey = "000102030405060708090a0b0c0d0e0f".parse().unwrap();
        assert_eq!(format!("{key:?}"), "AesKey([REDACTED])");
        assert_eq!(key.to_hex(), "000102030405060708090a0b0c0d0e0f");
    }

    #[test]
    fn aes_key_from_slice_rejects_short_input() {
        let err = AesKey::from_slice(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, LorikeetError::InvalidKeyMaterial(_)));
    }

    #[test]
    fn net_id_type_0_prefix() {
        // NetID 000013 (type 0, NwkID 0x13) -> prefix 26000000/7.
        let net_id: NetId = "000013".parse().unwrap();
        assert_eq!(net_id.net_type(), 0);
        assert_eq!(net_id.nwk_id(), 0x13);
        let prefix = net_id.dev_addr_prefix();
        assert_eq!(prefix.to_string(), "26000000/7");
    }

    #[test]
    fn net_id_type_3_prefix() {
        // Type 3: 4-bit `1110` type prefix, 11-bit NwkID.
        let net_id: NetId = "6000ff".parse().unwrap();
        assert_eq!(net_id.net_type(), 3);
        let prefix = net_id.dev_addr_prefix();
        assert_eq!(prefix.size(), 15);
        assert_eq!(prefix.prefix().to_u32() >> 28, 0b1110);
        assert_eq!((prefix.prefix().to_u32() >> 17) & 0x7ff, 0xff);
    }

    #[test]
    fn dev_addr_prefix_parses_and_masks() {
        let prefix: DevAddrPrefix = "260000ff/8".parse().unwrap();
        assert_eq!(prefix.to_string(), "26000000/8");
        assert_eq!(prefix.capacity(), 1 << 24);
        assert!("26000000/33".parse::<DevAddrPrefix>().is_err());
        assert!("26000000".parse::<DevAddrPrefix>().is_err());
    }

    #[test]
    fn mac_version_strings() {
        assert_eq!(MacVersion::LoRaWAN1_0_3.to_string(), "1.0.3");
        assert_eq!("1.1.0".parse::<MacVersion>().unwrap(), MacVersion::LoRaWAN1_1_0);
        assert!(MacVersion::LoRaWAN1_1_0.is_1_1());
        assert!(!MacVersion::LoRaWAN1_0_4.is_1_1());
    }

    proptest! {
        #[test]
        fn random_dev_addr_stays_inside_prefix(addr in any::<u32>(), size in 0u8..=32, seed in any::<u64>()) {
            use rand::SeedableRng;
            let prefix = DevAddrPrefix::new(DevAddr::from_u32(addr), size).unwrap();
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let dev_addr = prefix.random_dev_addr(&mut rng);
            prop_assert!(prefix.contains(dev_addr));
        }

        #[test]
        fn net_id_prefix_contains_its_own_nwk_id(bytes in any::<[u8; 3]>()) {
            let net_id = NetId::from_be_bytes(bytes);
            let prefix = net_id.dev_addr_prefix();
            let nwk_bits = u32::from(NWK_ID_BITS[net_id.net_type() as usize]);
            let shift = 32 - u32::from(prefix.size());
            let embedded = (prefix.prefix().to_u32() >> shift) & ((1 << nwk_bits) - 1);
            prop_assert_eq!(embedded, net_id.nwk_id());
        }
    }
}
