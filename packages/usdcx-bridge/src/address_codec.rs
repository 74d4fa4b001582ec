//! Stacks Address Codec and xReserve Recipient Encoding
//!
//! Stacks addresses are c32check strings: `S`, a version character, then the
//! Crockford base32 encoding of `hash160 || checksum`, where the checksum is the
//! first 4 bytes of `sha256(sha256(version || hash160))`.
//!
//! ## Recipient Format
//!
//! The xReserve contract identifies a remote recipient with 32 bytes:
//! ```text
//! | Reserved (11 bytes, zero) | Version (1 byte) | hash160 (20 bytes) |
//! ```
//!
//! ## Version Bytes
//!
//! - `22` (`P`): mainnet single-sig
//! - `20` (`M`): mainnet multi-sig
//! - `26` (`T`): testnet single-sig
//! - `21` (`N`): testnet multi-sig

use eyre::{eyre, Result};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::BridgeError;
use crate::types::ChainKind;
use crate::validation::validate_source_address;

// ============================================================================
// Constants
// ============================================================================

/// Crockford base32 alphabet used by c32check
const C32_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Mainnet single-sig version (`SP...`)
pub const VERSION_MAINNET_SINGLE_SIG: u8 = 22;

/// Mainnet multi-sig version (`SM...`)
pub const VERSION_MAINNET_MULTI_SIG: u8 = 20;

/// Testnet single-sig version (`ST...`)
pub const VERSION_TESTNET_SINGLE_SIG: u8 = 26;

/// Testnet multi-sig version (`SN...`)
pub const VERSION_TESTNET_MULTI_SIG: u8 = 21;

/// Size of the zero region at the start of an encoded recipient
pub const RESERVED_LEN: usize = 11;

// ============================================================================
// Stacks Address
// ============================================================================

/// A decoded Stacks address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StacksAddress {
    pub version: u8,
    pub hash160: [u8; 20],
}

impl StacksAddress {
    /// Create a new address; versions must fit in one c32 character
    pub fn new(version: u8, hash160: [u8; 20]) -> Result<Self> {
        if version >= 32 {
            return Err(eyre!("Invalid address version: {}", version));
        }
        Ok(Self { version, hash160 })
    }

    /// Parse a c32check address string (e.g. "SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7")
    pub fn from_c32(addr: &str) -> Result<Self> {
        let (version, hash160) = c32_address_decode(addr)?;
        Self::new(version, hash160)
    }

    /// Render as a c32check address string
    pub fn to_c32(&self) -> String {
        c32check_encode(self.version, &self.hash160)
    }

    pub fn is_mainnet(&self) -> bool {
        matches!(
            self.version,
            VERSION_MAINNET_SINGLE_SIG | VERSION_MAINNET_MULTI_SIG
        )
    }
}

impl fmt::Display for StacksAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_c32())
    }
}

// ============================================================================
// Encoded Recipient
// ============================================================================

/// 32-byte recipient value passed to xReserve `depositToRemote`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncodedRecipient(pub [u8; 32]);

impl EncodedRecipient {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to 0x-prefixed hex (64 hex chars)
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse from hex string (with or without 0x prefix)
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let bytes = hex::decode(hex_str)?;
        Self::from_slice(&bytes)
    }

    /// Parse from slice (must be exactly 32 bytes)
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(eyre!(
                "Invalid length: expected 32 bytes, got {}",
                bytes.len()
            ));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for EncodedRecipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<[u8; 32]> for EncodedRecipient {
    fn from(bytes: [u8; 32]) -> Self {
        EncodedRecipient(bytes)
    }
}

/// Encode a Stacks address into the xReserve recipient layout
///
/// Only canonical addresses are accepted so that decoding yields the input back.
pub fn encode_recipient(address: &str) -> Result<EncodedRecipient, BridgeError> {
    let decoded = StacksAddress::from_c32(address).map_err(|e| {
        BridgeError::encoding(format!("Malformed Stacks address {}", address))
            .with_detail(e.to_string())
    })?;

    if decoded.to_c32() != address {
        return Err(BridgeError::encoding(format!(
            "Stacks address {} is not in canonical form",
            address
        )));
    }

    let mut bytes = [0u8; 32];
    bytes[RESERVED_LEN] = decoded.version;
    bytes[RESERVED_LEN + 1..].copy_from_slice(&decoded.hash160);
    Ok(EncodedRecipient(bytes))
}

/// Decode an xReserve recipient back into a Stacks address
pub fn decode_recipient(recipient: &EncodedRecipient) -> Result<String, BridgeError> {
    let bytes = recipient.as_bytes();

    if bytes[..RESERVED_LEN].iter().any(|&b| b != 0) {
        return Err(BridgeError::encoding(
            "Recipient has non-zero reserved bytes",
        ));
    }

    let mut hash160 = [0u8; 20];
    hash160.copy_from_slice(&bytes[RESERVED_LEN + 1..]);

    let address = StacksAddress::new(bytes[RESERVED_LEN], hash160)
        .map_err(|e| BridgeError::encoding(e.to_string()))?;
    Ok(address.to_c32())
}

/// Encode a recipient for the given destination chain
///
/// Stacks recipients use the c32 layout above; Ethereum recipients are the
/// 20-byte address left-padded with 12 zero bytes.
pub fn recipient_for(chain: ChainKind, address: &str) -> Result<EncodedRecipient, BridgeError> {
    match chain {
        ChainKind::Stacks => encode_recipient(address),
        ChainKind::Ethereum => {
            if !validate_source_address(address) {
                return Err(BridgeError::encoding(format!(
                    "Malformed Ethereum address {}",
                    address
                )));
            }
            let raw = hex::decode(&address[2..]).map_err(|e| {
                BridgeError::encoding(format!("Malformed Ethereum address {}", address))
                    .with_detail(e.to_string())
            })?;
            let mut bytes = [0u8; 32];
            bytes[12..].copy_from_slice(&raw);
            Ok(EncodedRecipient(bytes))
        }
    }
}

// ============================================================================
// c32check
// ============================================================================

/// Build a Stacks address string from a version and hash160
pub fn c32_address(version: u8, hash160: &[u8; 20]) -> Result<String> {
    Ok(StacksAddress::new(version, *hash160)?.to_c32())
}

/// Decode a Stacks address string to (version, hash160)
pub fn c32_address_decode(addr: &str) -> Result<(u8, [u8; 20])> {
    if addr.len() <= 5 {
        return Err(eyre!("Address too short: {}", addr));
    }
    let rest = addr
        .strip_prefix('S')
        .ok_or_else(|| eyre!("Address must start with 'S': {}", addr))?;

    let (version, data) = c32check_decode(rest)?;

    if data.len() != 20 {
        return Err(eyre!(
            "Invalid hash160 length: expected 20 bytes, got {}",
            data.len()
        ));
    }

    let mut hash160 = [0u8; 20];
    hash160.copy_from_slice(&data);
    Ok((version, hash160))
}

/// c32check-encode `data` under `version` (without the leading `S`)
fn c32check_encode(version: u8, data: &[u8]) -> String {
    let mut payload = data.to_vec();
    payload.extend_from_slice(&checksum(version, data));

    format!(
        "S{}{}",
        C32_ALPHABET[version as usize] as char,
        c32_encode(&payload)
    )
}

/// Decode a version character followed by c32 data with a 4-byte checksum
fn c32check_decode(input: &str) -> Result<(u8, Vec<u8>)> {
    if !input.is_ascii() {
        return Err(eyre!("Address contains non-ASCII characters"));
    }
    let normalized = c32_normalize(input);

    let version_digit = c32_decode(&normalized[..1])?;
    let version = *version_digit.last().unwrap_or(&0);

    let mut data = c32_decode(&normalized[1..])?;
    if data.len() < 4 {
        return Err(eyre!("Invalid c32check data: missing checksum"));
    }
    let expected = data.split_off(data.len() - 4);

    if checksum(version, &data)[..] != expected[..] {
        return Err(eyre!("Invalid c32check checksum"));
    }

    Ok((version, data))
}

/// First 4 bytes of sha256(sha256(version || data))
fn checksum(version: u8, data: &[u8]) -> [u8; 4] {
    let mut hasher = Sha256::new();
    hasher.update([version]);
    hasher.update(data);
    let digest = Sha256::digest(hasher.finalize());

    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

/// Upper-case and map the Crockford look-alikes (O -> 0, I/L -> 1)
fn c32_normalize(input: &str) -> String {
    input
        .to_ascii_uppercase()
        .chars()
        .map(|c| match c {
            'O' => '0',
            'I' | 'L' => '1',
            other => other,
        })
        .collect()
}

/// Crockford base32 encoding, preserving leading zero bytes as '0' digits
fn c32_encode(input: &[u8]) -> String {
    let mut digits: Vec<u8> = Vec::with_capacity(input.len() * 8 / 5 + 1);
    let mut carry: u16 = 0;
    let mut carry_bits: u16 = 0;

    for &byte in input.iter().rev() {
        carry |= (byte as u16) << carry_bits;
        carry_bits += 8;
        while carry_bits >= 5 {
            digits.push(C32_ALPHABET[(carry & 0x1f) as usize]);
            carry >>= 5;
            carry_bits -= 5;
        }
    }
    if carry_bits > 0 {
        digits.push(C32_ALPHABET[(carry & 0x1f) as usize]);
    }

    // Drop zero digits produced by bit padding, then restore one per leading zero byte
    while digits.last() == Some(&C32_ALPHABET[0]) {
        digits.pop();
    }
    for _ in input.iter().take_while(|&&b| b == 0) {
        digits.push(C32_ALPHABET[0]);
    }

    digits.iter().rev().map(|&d| d as char).collect()
}

/// Inverse of [`c32_encode`] for normalized input
fn c32_decode(input: &str) -> Result<Vec<u8>> {
    let mut values = Vec::with_capacity(input.len());
    for c in input.bytes() {
        let value = C32_ALPHABET
            .iter()
            .position(|&a| a == c)
            .ok_or_else(|| eyre!("Invalid c32 character: {:?}", c as char))?;
        values.push(value as u16);
    }

    let mut bytes: Vec<u8> = Vec::with_capacity(input.len() * 5 / 8 + 1);
    let mut carry: u16 = 0;
    let mut carry_bits: u16 = 0;

    for &value in values.iter().rev() {
        carry |= value << carry_bits;
        carry_bits += 5;
        if carry_bits >= 8 {
            bytes.push((carry & 0xff) as u8);
            carry >>= 8;
            carry_bits -= 8;
        }
    }
    if carry_bits > 0 {
        bytes.push(carry as u8);
    }

    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    for _ in values.iter().take_while(|&&v| v == 0) {
        bytes.push(0);
    }

    bytes.reverse();
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const HASH: &str = "a46ff88886c2ef9762d970b4d2c63678835bd39d";
    const MAINNET: &str = "SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7";
    const TESTNET: &str = "ST2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKQYAC0RQ";

    fn hash160() -> [u8; 20] {
        let mut out = [0u8; 20];
        out.copy_from_slice(&hex::decode(HASH).unwrap());
        out
    }

    #[test]
    fn test_c32_address_known_vectors() {
        assert_eq!(
            c32_address(VERSION_MAINNET_SINGLE_SIG, &hash160()).unwrap(),
            MAINNET
        );
        assert_eq!(
            c32_address(VERSION_TESTNET_SINGLE_SIG, &hash160()).unwrap(),
            TESTNET
        );
        assert_eq!(
            c32_address(VERSION_MAINNET_MULTI_SIG, &hash160()).unwrap(),
            "SM2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKQVX8X0G"
        );
    }

    #[test]
    fn test_c32_address_decode() {
        let (version, hash) = c32_address_decode(MAINNET).unwrap();
        assert_eq!(version, VERSION_MAINNET_SINGLE_SIG);
        assert_eq!(hash, hash160());

        let parsed = StacksAddress::from_c32(TESTNET).unwrap();
        assert_eq!(parsed.version, VERSION_TESTNET_SINGLE_SIG);
        assert!(!parsed.is_mainnet());
        assert_eq!(parsed.to_string(), TESTNET);
    }

    #[test]
    fn test_leading_zero_bytes() {
        let zero = c32_address(VERSION_MAINNET_SINGLE_SIG, &[0u8; 20]).unwrap();
        assert_eq!(zero, "SP000000000000000000002Q6VF78");
        let (_, hash) = c32_address_decode(&zero).unwrap();
        assert_eq!(hash, [0u8; 20]);

        let mut partial = [0u8; 20];
        partial[2..].copy_from_slice(&hash160()[..18]);
        let addr = c32_address(VERSION_TESTNET_SINGLE_SIG, &partial).unwrap();
        assert_eq!(addr, "ST00193FZ248DGQFJXHDJW5MTB33CY43BDP3K2KY");
        assert_eq!(c32_address_decode(&addr).unwrap().1, partial);
    }

    #[test]
    fn test_checksum_mismatch_rejected() {
        // Last character altered
        assert!(c32_address_decode("SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ8").is_err());
        // Not a Stacks address at all
        assert!(c32_address_decode("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").is_err());
        // 'U' is outside the c32 alphabet
        assert!(c32_address_decode("SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJU").is_err());
    }

    #[test]
    fn test_encode_recipient_layout() {
        let recipient = encode_recipient(MAINNET).unwrap();
        let bytes = recipient.as_bytes();

        assert_eq!(&bytes[..11], &[0u8; 11]);
        assert_eq!(bytes[11], VERSION_MAINNET_SINGLE_SIG);
        assert_eq!(&bytes[12..], &hash160());
        assert_eq!(
            recipient.to_hex(),
            format!("0x{}16{}", "00".repeat(11), HASH)
        );
    }

    #[test]
    fn test_recipient_roundtrip() {
        for addr in [
            MAINNET,
            TESTNET,
            "SM2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKQVX8X0G",
            "SP000000000000000000002Q6VF78",
            "ST001ZW8H1P2XYBP5PBGPK9CCDKRGDDX77JFY6HJ",
        ] {
            let encoded = encode_recipient(addr).unwrap();
            assert_eq!(decode_recipient(&encoded).unwrap(), addr);
        }
    }

    #[test]
    fn test_encode_rejects_malformed() {
        for addr in [
            "",
            "SP",
            "XP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7",
            "SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ8",
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
        ] {
            let err = encode_recipient(addr).unwrap_err();
            assert_eq!(err.kind, ErrorKind::EncodingError, "address {:?}", addr);
        }
    }

    #[test]
    fn test_encode_rejects_non_canonical() {
        let lower = MAINNET.to_lowercase();
        let err = encode_recipient(&lower).unwrap_err();
        assert_eq!(err.kind, ErrorKind::EncodingError);
        assert!(err.message.contains("canonical"));
    }

    #[test]
    fn test_decode_rejects_reserved_bytes() {
        let mut bytes = *encode_recipient(MAINNET).unwrap().as_bytes();
        bytes[0] = 1;
        let err = decode_recipient(&EncodedRecipient(bytes)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::EncodingError);

        let mut bytes = *encode_recipient(MAINNET).unwrap().as_bytes();
        bytes[10] = 0xff;
        assert!(decode_recipient(&EncodedRecipient(bytes)).is_err());
    }

    #[test]
    fn test_decode_rejects_oversized_version() {
        let mut bytes = [0u8; 32];
        bytes[11] = 32;
        assert!(decode_recipient(&EncodedRecipient(bytes)).is_err());
    }

    #[test]
    fn test_recipient_for_ethereum() {
        let recipient = recipient_for(
            ChainKind::Ethereum,
            "0xdead000000000000000000000000000000000001",
        )
        .unwrap();
        assert_eq!(&recipient.as_bytes()[..12], &[0u8; 12]);
        assert_eq!(recipient.as_bytes()[12], 0xde);
        assert_eq!(recipient.as_bytes()[31], 0x01);

        assert!(recipient_for(ChainKind::Ethereum, MAINNET).is_err());
    }

    #[test]
    fn test_encoded_recipient_hex_roundtrip() {
        let recipient = encode_recipient(TESTNET).unwrap();
        let parsed = EncodedRecipient::from_hex(&recipient.to_hex()).unwrap();
        assert_eq!(parsed, recipient);
        assert!(EncodedRecipient::from_hex("0x1234").is_err());
    }
}
