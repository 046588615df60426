//! ============================================================================
//! Contract ABI - Selectors, call encoding and return decoding
//! ============================================================================
//! Only the static types the subscription contract uses: uint256, address,
//! bool and uint64, each occupying one 32-byte word.
//! ============================================================================

use anyhow::{anyhow, Result};
use sha3::{Digest, Keccak256};

use crate::types::{Account, TokenId};

/// ABI word size in bytes
pub const WORD: usize = 32;

pub const SIG_NEXT_TOKEN_ID: &str = "nextTokenId()";
pub const SIG_OWNER_OF: &str = "ownerOf(uint256)";
pub const SIG_IS_VALID: &str = "isValid(uint256)";
pub const SIG_USER_OF: &str = "userOf(uint256)";
pub const SIG_USER_EXPIRES: &str = "userExpires(uint256)";
pub const SIG_SET_USER: &str = "setUser(uint256,address,uint64)";

/// Custom error OpenZeppelin 5.x reverts with for an unminted token
pub const ERR_NONEXISTENT_TOKEN: &str = "ERC721NonexistentToken(uint256)";

/// First 4 bytes of Keccak-256 of the function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

pub fn uint_word(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

pub fn address_word(account: &Account) -> Result<[u8; WORD]> {
    let hex_part = account
        .as_str()
        .strip_prefix("0x")
        .ok_or_else(|| anyhow!("Address missing 0x prefix: {}", account))?;
    let bytes = hex::decode(hex_part).map_err(|e| anyhow!("Invalid address {}: {}", account, e))?;
    if bytes.len() != 20 {
        return Err(anyhow!("Address must be 20 bytes: {}", account));
    }
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(&bytes);
    Ok(word)
}

/// `0x`-prefixed calldata for `signature` applied to `words`
pub fn encode_call(signature: &str, words: &[[u8; WORD]]) -> String {
    let mut data = Vec::with_capacity(4 + words.len() * WORD);
    data.extend_from_slice(&selector(signature));
    for word in words {
        data.extend_from_slice(word);
    }
    format!("0x{}", hex::encode(data))
}

pub fn encode_token_call(signature: &str, token_id: TokenId) -> String {
    encode_call(signature, &[uint_word(token_id)])
}

pub fn encode_set_user(token_id: TokenId, delegate: &Account, expires_at: i64) -> Result<String> {
    let expires = u64::try_from(expires_at)
        .map_err(|_| anyhow!("Expiry must be non-negative, got {}", expires_at))?;
    Ok(encode_call(
        SIG_SET_USER,
        &[uint_word(token_id), address_word(delegate)?, uint_word(expires)],
    ))
}

/// Decode the first return word from `eth_call` hex output
pub fn first_word(result: &str) -> Result<[u8; WORD]> {
    let hex_part = result.strip_prefix("0x").unwrap_or(result);
    let bytes = hex::decode(hex_part).map_err(|e| anyhow!("Invalid hex return data: {}", e))?;
    if bytes.len() < WORD {
        return Err(anyhow!(
            "Return data too short: {} bytes (expected at least {})",
            bytes.len(),
            WORD
        ));
    }
    let mut word = [0u8; WORD];
    word.copy_from_slice(&bytes[..WORD]);
    Ok(word)
}

pub fn decode_u64(result: &str) -> Result<u64> {
    let word = first_word(result)?;
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(anyhow!("Return value overflows u64"));
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&word[WORD - 8..]);
    Ok(u64::from_be_bytes(tail))
}

pub fn decode_i64(result: &str) -> Result<i64> {
    let value = decode_u64(result)?;
    i64::try_from(value).map_err(|_| anyhow!("Return value overflows i64: {}", value))
}

pub fn decode_bool(result: &str) -> Result<bool> {
    let word = first_word(result)?;
    if word[..WORD - 1].iter().any(|b| *b != 0) || word[WORD - 1] > 1 {
        return Err(anyhow!("Invalid bool return word"));
    }
    Ok(word[WORD - 1] == 1)
}

/// Decode an address word, keeping the node's lowercase spelling
pub fn decode_address(result: &str) -> Result<Account> {
    let word = first_word(result)?;
    if word[..12].iter().any(|b| *b != 0) {
        return Err(anyhow!("Dirty high bytes in address word"));
    }
    Ok(Account::new(format!("0x{}", hex::encode(&word[12..]))))
}
