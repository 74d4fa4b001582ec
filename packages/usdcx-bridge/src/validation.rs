//! Input validation
//!
//! Pure, deterministic checks that run before any ledger interaction.

use crate::error::BridgeError;
use crate::types::{BridgeRequest, ChainKind};

/// Length of a `0x`-prefixed Ethereum address
const ETH_ADDRESS_LEN: usize = 42;

/// Length of a standard single-sig Stacks address
const STACKS_ADDRESS_LEN: usize = 41;

/// Validate an Ethereum address: `0x` followed by 40 hex characters
pub fn validate_source_address(address: &str) -> bool {
    address.len() == ETH_ADDRESS_LEN
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Validate a Stacks address: `SP` or `ST` followed by 39 upper-case alphanumerics
pub fn validate_destination_address(address: &str) -> bool {
    address.len() == STACKS_ADDRESS_LEN
        && (address.starts_with("SP") || address.starts_with("ST"))
        && address[2..]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
}

/// Validate an address against the grammar of the given chain
pub fn validate_address(chain: ChainKind, address: &str) -> bool {
    match chain {
        ChainKind::Ethereum => validate_source_address(address),
        ChainKind::Stacks => validate_destination_address(address),
    }
}

/// Validate that an amount is positive and finite
pub fn validate_amount(amount: f64) -> Result<(), BridgeError> {
    if !amount.is_finite() {
        return Err(BridgeError::invalid_request(
            "Amount must be a finite number",
        ));
    }
    if amount <= 0.0 {
        return Err(BridgeError::invalid_request("Amount must be greater than 0"));
    }
    Ok(())
}

/// Validate that a fee ceiling is finite and not negative
pub fn validate_max_fee(max_fee: f64) -> Result<(), BridgeError> {
    if !max_fee.is_finite() || max_fee < 0.0 {
        return Err(BridgeError::invalid_request(
            "Max fee must be a non-negative finite number",
        ));
    }
    Ok(())
}

/// Run every request check, returning the first failure
pub fn validate_request(request: &BridgeRequest) -> Result<(), BridgeError> {
    if request.source_chain == request.destination_chain {
        return Err(BridgeError::invalid_request("Cannot bridge to same chain"));
    }

    validate_amount(request.amount)?;
    validate_max_fee(request.max_fee)?;

    if !validate_address(request.source_chain, &request.source_address) {
        return Err(BridgeError::invalid_request(format!(
            "Invalid {} source address: {}",
            request.source_chain, request.source_address
        )));
    }

    if !validate_address(request.destination_chain, &request.destination_address) {
        return Err(BridgeError::invalid_request(format!(
            "Invalid {} destination address: {}",
            request.destination_chain, request.destination_address
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const ETH: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
    const STX: &str = "SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7";

    #[test]
    fn test_eth_addresses() {
        assert!(validate_source_address(ETH));
        assert!(validate_source_address(
            "0x0000000000000000000000000000000000000000"
        ));
        assert!(!validate_source_address(
            "f39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        ));
        assert!(!validate_source_address(
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb9226"
        ));
        assert!(!validate_source_address(
            "0xg39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        ));
        assert!(!validate_source_address(STX));
    }

    #[test]
    fn test_stacks_addresses() {
        assert!(validate_destination_address(STX));
        assert!(validate_destination_address(
            "ST2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKQYAC0RQ"
        ));
        assert!(!validate_destination_address(
            "SM2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKQVX8X0G"
        ));
        assert!(!validate_destination_address(
            "sp2j6zy48gv1ez5v2v5rb9mp66sw86pykknrv9ej7"
        ));
        assert!(!validate_destination_address("SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ"));
        assert!(!validate_destination_address(ETH));
    }

    #[test]
    fn test_amounts() {
        assert!(validate_amount(10.0).is_ok());
        assert!(validate_amount(0.000001).is_ok());
        assert_eq!(validate_amount(0.0).unwrap_err().kind, ErrorKind::InvalidRequest);
        assert!(validate_amount(-5.0).is_err());
        assert!(validate_amount(f64::NAN).is_err());
        assert!(validate_amount(f64::INFINITY).is_err());

        assert!(validate_max_fee(0.0).is_ok());
        assert!(validate_max_fee(-0.1).is_err());
        assert!(validate_max_fee(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_request() {
        let request = BridgeRequest::ethereum_to_stacks(10.0, ETH, STX);
        assert!(validate_request(&request).is_ok());

        let mut same_chain = request.clone();
        same_chain.destination_chain = ChainKind::Ethereum;
        let err = validate_request(&same_chain).unwrap_err();
        assert_eq!(err.message, "Cannot bridge to same chain");

        let swapped = BridgeRequest::ethereum_to_stacks(10.0, STX, ETH);
        assert!(validate_request(&swapped).is_err());
    }
}
