// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LoRaWAN session key derivation.
//!
//! Every session key is a single AES-128 block encryption of
//! `type | JoinNonce | NetID-or-JoinEUI | DevNonce | zero padding` under a
//! root key. Multi-byte fields are little-endian, as on the air interface.
//!
//! | key         | 1.0.x            | 1.1                  |
//! |-------------|------------------|----------------------|
//! | FNwkSIntKey | NwkKey, 0x01     | NwkKey, 0x01         |
//! | SNwkSIntKey | (= FNwkSIntKey)  | NwkKey, 0x03         |
//! | NwkSEncKey  | (= FNwkSIntKey)  | NwkKey, 0x04         |
//! | AppSKey     | NwkKey, 0x02     | AppKey, 0x02         |

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use zeroize::Zeroize;

use lorikeet_core::models::{DeviceKeys, SessionKeys};
use lorikeet_core::{AesKey, JoinEui, LorikeetError, MacVersion, NetId};

/// Largest JoinNonce representable in the 3-byte join-accept field.
pub const MAX_JOIN_NONCE: u32 = 0x00FF_FFFF;

const F_NWK_S_INT_KEY: u8 = 0x01;
const APP_S_KEY: u8 = 0x02;
const S_NWK_S_INT_KEY: u8 = 0x03;
const NWK_S_ENC_KEY: u8 = 0x04;

/// The nonces and identifiers of one join exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinParams {
    pub mac_version: MacVersion,
    pub join_nonce: u32,
    pub dev_nonce: u16,
    /// Used by 1.0.x derivation.
    pub net_id: NetId,
    /// Used by 1.1 derivation.
    pub join_eui: JoinEui,
}

/// Derive the four session keys of an OTAA session.
///
/// Fails with `InvalidKeyMaterial` when a required root key is all-zero
/// (NwkKey always, AppKey for 1.1) and with `InvalidParameters` when the
/// JoinNonce does not fit in 24 bits.
pub fn derive_session_keys(
    keys: &DeviceKeys,
    params: &JoinParams,
) -> Result<SessionKeys, LorikeetError> {
    if params.join_nonce > MAX_JOIN_NONCE {
        return Err(LorikeetError::InvalidParameters(format!(
            "join_nonce {} exceeds 24 bits",
            params.join_nonce
        )));
    }
    if keys.nwk_key.is_zero() {
        return Err(LorikeetError::InvalidKeyMaterial(format!(
            "nwk_key of device {} is not set",
            keys.dev_eui
        )));
    }

    let session = if params.mac_version.is_1_1() {
        if keys.app_key.is_zero() {
            return Err(LorikeetError::InvalidKeyMaterial(format!(
                "app_key of device {} is required for LoRaWAN 1.1",
                keys.dev_eui
            )));
        }
        let join_eui = params.join_eui.to_le_bytes();
        SessionKeys {
            f_nwk_s_int_key: derive(&keys.nwk_key, F_NWK_S_INT_KEY, params, &join_eui),
            s_nwk_s_int_key: derive(&keys.nwk_key, S_NWK_S_INT_KEY, params, &join_eui),
            nwk_s_enc_key: derive(&keys.nwk_key, NWK_S_ENC_KEY, params, &join_eui),
            app_s_key: derive(&keys.app_key, APP_S_KEY, params, &join_eui),
        }
    } else {
        let net_id = params.net_id.to_le_bytes();
        let nwk_s_key = derive(&keys.nwk_key, F_NWK_S_INT_KEY, params, &net_id);
        SessionKeys {
            f_nwk_s_int_key: nwk_s_key.clone(),
            s_nwk_s_int_key: nwk_s_key.clone(),
            nwk_s_enc_key: nwk_s_key,
            app_s_key: derive(&keys.nwk_key, APP_S_KEY, params, &net_id),
        }
    };

    tracing::trace!(
        dev_eui = %keys.dev_eui,
        mac_version = %params.mac_version,
        join_nonce = params.join_nonce,
        dev_nonce = params.dev_nonce,
        "derived session keys"
    );
    Ok(session)
}

fn derive(root: &AesKey, typ: u8, params: &JoinParams, middle: &[u8]) -> AesKey {
    let mut block = [0u8; 16];
    block[0] = typ;
    block[1..4].copy_from_slice(&params.join_nonce.to_le_bytes()[..3]);
    let end = 4 + middle.len();
    block[4..end].copy_from_slice(middle);
    block[end..end + 2].copy_from_slice(&params.dev_nonce.to_le_bytes());

    let key = aes128_encrypt(root, &block);
    block.zeroize();
    key
}

/// Encrypt a single 16-byte block with AES-128.
pub fn aes128_encrypt(key: &AesKey, block: &[u8; 16]) -> AesKey {
    let cipher = Aes128::new(key.as_bytes().into());
    let mut out = *block;
    cipher.encrypt_block((&mut out).into());
    let result = AesKey::from_bytes(out);
    out.zeroize();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorikeet_core::DevEui;
    use proptest::prelude::*;

    fn key(bytes: [u8; 16]) -> AesKey {
        AesKey::from_bytes(bytes)
    }

    fn hex_key(s: &str) -> AesKey {
        s.parse().unwrap()
    }

    fn device_keys() -> DeviceKeys {
        let mut nwk = [0u8; 16];
        let mut app = [0u8; 16];
        for i in 0..16 {
            nwk[i] = i as u8 + 1;
            app[i] = 16 - i as u8;
        }
        DeviceKeys::new(DevEui::from_be_bytes([0, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]), key(nwk), key(app))
    }

    fn params(mac_version: MacVersion) -> JoinParams {
        JoinParams {
            mac_version,
            join_nonce: 0x01_0000,
            dev_nonce: 0x0102,
            net_id: "010203".parse().unwrap(),
            join_eui: "0807060504030201".parse().unwrap(),
        }
    }

    #[test]
    fn aes_block_matches_fips_197_vector() {
        let k = hex_key("000102030405060708090a0b0c0d0e0f");
        let pt: [u8; 16] = hex::decode("00112233445566778899aabbccddeeff")
            .unwrap()
            .try_into()
            .unwrap();
        assert_eq!(aes128_encrypt(&k, &pt).to_hex(), "69c4e0d86a7b0430d8cdb78070b4c55a");
    }

    // Pinned outputs of this implementation; guards against accidental changes
    // to the block layout.
    #[test]
    fn lorawan_1_0_regression_keys() {
        let session = derive_session_keys(&device_keys(), &params(MacVersion::LoRaWAN1_0_3)).unwrap();
        assert_eq!(session.nwk_s_enc_key.to_hex(), "5c7d8a8260cafea7d265760e7947e0ea");
        assert_eq!(session.f_nwk_s_int_key, session.nwk_s_enc_key);
        assert_eq!(session.s_nwk_s_int_key, session.nwk_s_enc_key);
        assert_eq!(session.app_s_key.to_hex(), "e648e1ba130e1fdf5300d21d7b4d6840");
    }

    #[test]
    fn lorawan_1_1_regression_keys() {
        let session = derive_session_keys(&device_keys(), &params(MacVersion::LoRaWAN1_1_0)).unwrap();
        assert_eq!(session.f_nwk_s_int_key.to_hex(), "7364f80d71b27441b1d1c9b0cb225872");
        assert_eq!(session.s_nwk_s_int_key.to_hex(), "c36462489f62108d4c818a4b4274c399");
        assert_eq!(session.nwk_s_enc_key.to_hex(), "c3d6148176007bcf5e101e5ee733dbe7");
        assert_eq!(session.app_s_key.to_hex(), "c54b6e2320572d29c242148f75486efb");
    }

    #[test]
    fn key_blocks_follow_the_join_accept_layout() {
        let keys = device_keys();
        // type | JoinNonce (LE, 3) | NetID or JoinEUI (LE) | DevNonce (LE, 2) | pad
        let block_1_0 = |typ: u8| {
            [typ, 0x00, 0x00, 0x01, 0x03, 0x02, 0x01, 0x02, 0x01, 0, 0, 0, 0, 0, 0, 0]
        };
        let block_1_1 = |typ: u8| {
            [typ, 0x00, 0x00, 0x01, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x02, 0x01, 0, 0]
        };

        let s10 = derive_session_keys(&keys, &params(MacVersion::LoRaWAN1_0_3)).unwrap();
        assert_eq!(s10.nwk_s_enc_key, aes128_encrypt(&keys.nwk_key, &block_1_0(0x01)));
        assert_eq!(s10.app_s_key, aes128_encrypt(&keys.nwk_key, &block_1_0(0x02)));

        let s11 = derive_session_keys(&keys, &params(MacVersion::LoRaWAN1_1_0)).unwrap();
        assert_eq!(s11.f_nwk_s_int_key, aes128_encrypt(&keys.nwk_key, &block_1_1(0x01)));
        assert_eq!(s11.app_s_key, aes128_encrypt(&keys.app_key, &block_1_1(0x02)));
        assert_eq!(s11.s_nwk_s_int_key, aes128_encrypt(&keys.nwk_key, &block_1_1(0x03)));
        assert_eq!(s11.nwk_s_enc_key, aes128_encrypt(&keys.nwk_key, &block_1_1(0x04)));
    }

    #[test]
    fn zero_nwk_key_is_rejected() {
        let mut keys = device_keys();
        keys.nwk_key = AesKey::default();
        let err = derive_session_keys(&keys, &params(MacVersion::LoRaWAN1_0_2)).unwrap_err();
        assert!(matches!(err, LorikeetError::InvalidKeyMaterial(_)));
    }

    #[test]
    fn zero_app_key_only_matters_for_1_1() {
        let mut keys = device_keys();
        keys.app_key = AesKey::default();
        assert!(derive_session_keys(&keys, &params(MacVersion::LoRaWAN1_0_4)).is_ok());
        let err = derive_session_keys(&keys, &params(MacVersion::LoRaWAN1_1_0)).unwrap_err();
        assert!(matches!(err, LorikeetError::InvalidKeyMaterial(_)));
    }

    #[test]
    fn join_nonce_above_24_bits_is_rejected() {
        let mut p = params(MacVersion::LoRaWAN1_1_0);
        p.join_nonce = MAX_JOIN_NONCE + 1;
        let err = derive_session_keys(&device_keys(), &p).unwrap_err();
        assert!(matches!(err, LorikeetError::InvalidParameters(_)));
    }

    proptest! {
        #[test]
        fn different_dev_nonces_give_different_keys(a in any::<u16>(), b in any::<u16>()) {
            prop_assume!(a != b);
            let keys = device_keys();
            let mut pa = params(MacVersion::LoRaWAN1_0_3);
            let mut pb = pa;
            pa.dev_nonce = a;
            pb.dev_nonce = b;
            let ka = derive_session_keys(&keys, &pa).unwrap();
            let kb = derive_session_keys(&keys, &pb).unwrap();
            prop_assert_ne!(ka.app_s_key, kb.app_s_key);
        }
    }
}
