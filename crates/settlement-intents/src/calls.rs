//! Calldata for the escrow and token calls the engine makes, and decoders
//! for their return data.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::{SolCall, SolValue};

use crate::contracts::{self, IERC20, IP2PEscrow};
use crate::CodecError;

pub fn escrow_balance(user: Address, token: Address) -> Bytes {
	IP2PEscrow::balancesCall { user, token }.abi_encode().into()
}

pub fn deposit(token: Address, amount: U256) -> Bytes {
	IP2PEscrow::depositCall { token, amount }.abi_encode().into()
}

pub fn create_order(
	bid: contracts::Bid,
	maker_sig: Bytes,
	intent: contracts::OrderIntent,
	taker_sig: Bytes,
) -> Bytes {
	IP2PEscrow::createOrderCall {
		bid,
		makerSig: maker_sig,
		intent,
		takerSig: taker_sig,
	}
	.abi_encode()
	.into()
}

pub fn release(order_id: B256) -> Bytes {
	IP2PEscrow::releaseCall { orderId: order_id }
		.abi_encode()
		.into()
}

pub fn token_balance(owner: Address) -> Bytes {
	IERC20::balanceOfCall { owner }.abi_encode().into()
}

pub fn allowance(owner: Address, spender: Address) -> Bytes {
	IERC20::allowanceCall { owner, spender }.abi_encode().into()
}

pub fn approve(spender: Address, amount: U256) -> Bytes {
	IERC20::approveCall { spender, amount }.abi_encode().into()
}

/// Decodes a single `uint256` return value.
pub fn decode_uint(data: &[u8]) -> Result<U256, CodecError> {
	U256::abi_decode(data).map_err(|e| CodecError::Decode(e.to_string()))
}

/// Decodes a single `bytes32` return value.
pub fn decode_bytes32(data: &[u8]) -> Result<B256, CodecError> {
	B256::abi_decode(data).map_err(|e| CodecError::Decode(e.to_string()))
}
