//! Conversion between human-readable decimal amounts and the fixed-point
//! integers the escrow contract stores.
//!
//! All arithmetic goes through `rust_decimal`; binary floating point never
//! touches an amount or a price.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// Fixed scale of on-chain prices, independent of the traded token.
pub const PRICE_DECIMALS: u32 = 18;

/// Largest scale a `Decimal` represents exactly.
pub const MAX_DECIMALS: u32 = 28;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AmountError {
	#[error("Invalid decimal value '{0}'")]
	Parse(String),
	#[error("Negative value {0}")]
	Negative(String),
	#[error("{value} has more fractional digits than the {decimals} supported")]
	PrecisionLoss { value: String, decimals: u32 },
	#[error("Unsupported decimal count {0}")]
	UnsupportedDecimals(u32),
	#[error("Value {0} is outside the representable range")]
	Overflow(String),
}

/// Parses a human-readable decimal string.
pub fn parse_decimal(value: &str) -> Result<Decimal, AmountError> {
	Decimal::from_str(value.trim())
		.map(|d| d.normalize())
		.map_err(|_| AmountError::Parse(value.to_string()))
}

/// Converts a decimal to the contract's integer representation at `decimals`.
///
/// Values carrying more fractional digits than `decimals` are rejected rather
/// than rounded, so the integer and the decimal stay mutually derivable.
pub fn to_contract_value(value: &Decimal, decimals: u32) -> Result<U256, AmountError> {
	if decimals > MAX_DECIMALS {
		return Err(AmountError::UnsupportedDecimals(decimals));
	}
	if *value < Decimal::ZERO {
		return Err(AmountError::Negative(value.to_string()));
	}

	let normalized = value.normalize();
	if normalized.scale() > decimals {
		return Err(AmountError::PrecisionLoss {
			value: value.to_string(),
			decimals,
		});
	}

	let mantissa = u128::try_from(normalized.mantissa())
		.map_err(|_| AmountError::Negative(value.to_string()))?;
	let factor = U256::from(10u8).pow(U256::from(decimals - normalized.scale()));
	Ok(U256::from(mantissa) * factor)
}

/// Converts a contract integer back into a normalized decimal.
pub fn from_contract_value(value: U256, decimals: u32) -> Result<Decimal, AmountError> {
	if decimals > MAX_DECIMALS {
		return Err(AmountError::UnsupportedDecimals(decimals));
	}

	let raw = u128::try_from(value).map_err(|_| AmountError::Overflow(value.to_string()))?;
	let raw = i128::try_from(raw).map_err(|_| AmountError::Overflow(value.to_string()))?;
	Decimal::try_from_i128_with_scale(raw, decimals)
		.map(|d| d.normalize())
		.map_err(|_| AmountError::Overflow(value.to_string()))
}

/// Converts a price to its fixed on-chain scale.
pub fn price_to_contract_value(price: &Decimal) -> Result<U256, AmountError> {
	to_contract_value(price, PRICE_DECIMALS)
}
