use ethers::types::{Address, H256, U256};
use std::str::FromStr;

// uint256 -> texto decimal para columnas NUMERIC(78,0); nunca se estrecha a i64/f64
pub fn u256_to_numeric_text(value: U256) -> String {
    value.to_string()
}

pub fn numeric_text_to_u256(s: &str) -> Result<U256, ConversionError> {
    U256::from_dec_str(s.trim()).map_err(|e| ConversionError::InvalidNumeric(e.to_string()))
}

// Para addresses
pub fn address_to_string(addr: Address) -> String {
    format!("{:?}", addr).to_lowercase()
}

pub fn string_to_address(s: &str) -> Result<Address, ConversionError> {
    Address::from_str(s.trim()).map_err(|e| ConversionError::InvalidAddress(e.to_string()))
}

pub fn hash_to_string(hash: H256) -> String {
    format!("{:?}", hash)
}

// Block numbers and log indexes go into BIGINT columns
pub fn u64_to_bigint(value: u64) -> Result<i64, ConversionError> {
    i64::try_from(value).map_err(|_| ConversionError::Overflow)
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Invalid numeric: {0}")]
    InvalidNumeric(String),
    #[error("Overflow in conversion")]
    Overflow,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u256_max_survives_numeric_text() {
        let text = u256_to_numeric_text(U256::MAX);
        assert_eq!(text.len(), 78);
        assert_eq!(numeric_text_to_u256(&text).unwrap(), U256::MAX);
    }

    #[test]
    fn test_address_round_trip_is_lowercase() {
        let addr = string_to_address("0xdBFC942264f5CebF8C59f4065af2EFfB92D12475").unwrap();
        assert_eq!(
            address_to_string(addr),
            "0xdbfc942264f5cebf8c59f4065af2effb92d12475"
        );
        assert!(string_to_address("0x1234").is_err());
    }

    #[test]
    fn test_bigint_overflow() {
        assert_eq!(u64_to_bigint(8_585_483).unwrap(), 8_585_483);
        assert!(matches!(u64_to_bigint(u64::MAX), Err(ConversionError::Overflow)));
    }
}
