//! ABI calldata encoding for the two bridge calls.
//!
//! Hand-encoded: 4-byte selector plus 32-byte words, covering only the
//! argument shapes of `depositForBurn` and `receiveMessage`.

use sha3::{Digest, Keccak256};

use blobpay_types::{bytes_to_hex, hex_to_bytes, Hex, RelayError, Result};

/// First four bytes of the Keccak-256 of the function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

fn word_from_u128(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn word_from_address(address: &str) -> Result<[u8; 32]> {
    let bytes = hex_to_bytes(address)?;
    if bytes.len() != 20 {
        return Err(RelayError::InvalidInput(format!(
            "address must be 20 bytes, got {}",
            bytes.len()
        )));
    }
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&bytes);
    Ok(word)
}

/// Left-pad an address (up to 32 bytes) into a bytes32 mint recipient.
/// Destination-chain addresses may already be full 32-byte values.
pub fn address_to_bytes32(address: &str) -> Result<[u8; 32]> {
    let bytes = hex_to_bytes(address)?;
    if bytes.is_empty() || bytes.len() > 32 {
        return Err(RelayError::InvalidInput(format!(
            "recipient must be 1..=32 bytes, got {}",
            bytes.len()
        )));
    }
    let mut word = [0u8; 32];
    word[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(word)
}

fn padded_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + bytes.len().div_ceil(32) * 32);
    out.extend_from_slice(&word_from_u128(bytes.len() as u128));
    out.extend_from_slice(bytes);
    let remainder = bytes.len() % 32;
    if remainder != 0 {
        out.extend(std::iter::repeat(0u8).take(32 - remainder));
    }
    out
}

/// `depositForBurn(uint256 amount, uint32 destinationDomain,
/// bytes32 mintRecipient, address burnToken)`
pub fn deposit_for_burn(
    amount_base_units: u128,
    destination_domain: u32,
    mint_recipient: &[u8; 32],
    burn_token: &str,
) -> Result<Hex> {
    let mut data = Vec::with_capacity(4 + 32 * 4);
    data.extend_from_slice(&selector(
        "depositForBurn(uint256,uint32,bytes32,address)",
    ));
    data.extend_from_slice(&word_from_u128(amount_base_units));
    data.extend_from_slice(&word_from_u128(destination_domain as u128));
    data.extend_from_slice(mint_recipient);
    data.extend_from_slice(&word_from_address(burn_token)?);
    Ok(bytes_to_hex(&data))
}

/// `receiveMessage(bytes message, bytes attestation)`: two dynamic
/// arguments: head offsets, then length-prefixed padded tails.
pub fn receive_message(message: &[u8], attestation: &[u8]) -> Hex {
    let message_tail = padded_bytes(message);
    let attestation_tail = padded_bytes(attestation);

    let mut data = Vec::with_capacity(4 + 64 + message_tail.len() + attestation_tail.len());
    data.extend_from_slice(&selector("receiveMessage(bytes,bytes)"));
    data.extend_from_slice(&word_from_u128(64));
    data.extend_from_slice(&word_from_u128(64 + message_tail.len() as u128));
    data.extend_from_slice(&message_tail);
    data.extend_from_slice(&attestation_tail);
    bytes_to_hex(&data)
}

/// Decode a single ABI-encoded `bytes` argument (offset word, length
/// word, payload), as emitted in the `MessageSent(bytes)` event data.
pub fn decode_single_bytes(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 64 {
        return Err(RelayError::Other(format!(
            "encoded bytes argument too short: {} bytes",
            data.len()
        )));
    }
    let mut len_bytes = [0u8; 16];
    len_bytes.copy_from_slice(&data[48..64]);
    let length = u128::from_be_bytes(len_bytes) as usize;
    if data.len() < 64 + length {
        return Err(RelayError::Other(format!(
            "encoded bytes argument truncated: expected {} payload bytes",
            length
        )));
    }
    Ok(data[64..64 + length].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_known_value() {
        // keccak256("transfer(address,uint256)")[..4] == a9059cbb
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn test_deposit_for_burn_layout() {
        let recipient = address_to_bytes32("0x0102").unwrap();
        let data = deposit_for_burn(
            430_080_000,
            8,
            &recipient,
            "0xaf88d065e77c8cC2239327C5EDb3A432268e5831",
        )
        .unwrap();
        let raw = hex::decode(data.trim_start_matches("0x")).unwrap();
        // selector + four static words
        assert_eq!(raw.len(), 4 + 32 * 4);
        // amount word, big-endian right-aligned
        assert_eq!(
            u128::from_be_bytes(raw[4 + 16..4 + 32].try_into().unwrap()),
            430_080_000
        );
        // domain word
        assert_eq!(raw[4 + 63], 8);
        // recipient word left-padded
        assert_eq!(&raw[4 + 64..4 + 96], &recipient);
    }

    #[test]
    fn test_word_from_address_rejects_wrong_length() {
        assert!(word_from_address("0x0102").is_err());
        assert!(word_from_address("0xaf88d065e77c8cC2239327C5EDb3A432268e5831").is_ok());
    }

    #[test]
    fn test_receive_message_roundtrips_through_decode() {
        let message = vec![0xaau8; 45];
        let attestation = vec![0xbbu8; 65];
        let data = receive_message(&message, &attestation);
        let raw = hex::decode(data.trim_start_matches("0x")).unwrap();

        // everything after the selector is 32-byte aligned
        assert_eq!(raw.len() % 32, 4);

        // the message tail starts right after the selector and two offset
        // words and decodes back to the original payload
        let message_region = &raw[4 + 32..];
        let decoded = decode_single_bytes(message_region).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_decode_single_bytes_rejects_truncation() {
        assert!(decode_single_bytes(&[0u8; 10]).is_err());
        let mut data = padded_bytes(&[1, 2, 3]);
        let mut full = word_from_u128(32).to_vec();
        full.append(&mut data);
        assert_eq!(decode_single_bytes(&full).unwrap(), vec![1, 2, 3]);
        assert!(decode_single_bytes(&full[..66]).is_err());
    }
}
