//! Canonical encoding, hashing, signing and recovery for bids and intents.
//!
//! The type string that seeds each struct hash is generated from the same
//! field list the encoder walks, so the two cannot drift apart.

use alloy::primitives::{keccak256, Address, Bytes, Signature, B256, U256};
use rust_decimal::Decimal;
use settlement_account::AccountService;
use settlement_types::{
	price_to_contract_value, to_contract_value, BidTerms, OrderIntentTerms, MAX_DECIMALS,
};

use crate::{contracts, CodecError, SigningDomain};

/// Field list of `Bid`, in contract order.
pub const BID_FIELDS: &[(&str, &str)] = &[
	("address", "maker"),
	("address", "baseAsset"),
	("address", "quoteAsset"),
	("uint256", "price"),
	("uint256", "minAmount"),
	("uint256", "maxAmount"),
	("uint8", "kycLevel"),
	("uint256", "expiresAt"),
	("uint256", "nonce"),
	("uint8", "bidType"),
	("uint256", "paymentWindow"),
];

/// Field list of `OrderIntent`, in contract order.
pub const ORDER_INTENT_FIELDS: &[(&str, &str)] = &[
	("bytes32", "bidHash"),
	("address", "taker"),
	("uint256", "amount"),
	("uint16", "maxSlippageBps"),
	("uint256", "expiresAt"),
	("uint256", "nonce"),
];

/// `Name(type field,...)` as EIP-712 defines it.
pub fn encode_type(name: &str, fields: &[(&str, &str)]) -> String {
	let members: Vec<String> = fields
		.iter()
		.map(|(ty, field)| format!("{} {}", ty, field))
		.collect();
	format!("{}({})", name, members.join(","))
}

pub fn type_hash(name: &str, fields: &[(&str, &str)]) -> B256 {
	keccak256(encode_type(name, fields).as_bytes())
}

/// Word-aligned encoder for the static field types the escrow uses.
struct WordEncoder {
	buf: Vec<u8>,
}

impl WordEncoder {
	fn new(type_hash: B256) -> Self {
		let mut buf = Vec::with_capacity(32 * 12);
		buf.extend_from_slice(type_hash.as_slice());
		Self { buf }
	}

	fn b256(mut self, v: &B256) -> Self {
		self.buf.extend_from_slice(v.as_slice());
		self
	}

	fn address(mut self, addr: &Address) -> Self {
		let mut word = [0u8; 32];
		word[12..].copy_from_slice(addr.as_slice());
		self.buf.extend_from_slice(&word);
		self
	}

	fn uint(mut self, v: U256) -> Self {
		self.buf.extend_from_slice(&v.to_be_bytes::<32>());
		self
	}

	fn finish(self) -> Vec<u8> {
		self.buf
	}
}

fn decimals(base_decimals: u8) -> Result<u32, CodecError> {
	let decimals = base_decimals as u32;
	if decimals > MAX_DECIMALS {
		return Err(CodecError::InvalidField {
			field: "decimals",
			message: format!("{} exceeds {}", decimals, MAX_DECIMALS),
		});
	}
	Ok(decimals)
}

fn positive_amount(
	field: &'static str,
	value: &Decimal,
	decimals: u32,
) -> Result<U256, CodecError> {
	if *value <= Decimal::ZERO {
		return Err(CodecError::InvalidField {
			field,
			message: format!("{} must be greater than zero", value),
		});
	}
	Ok(to_contract_value(value, decimals)?)
}

/// Contract struct for `terms`, with amounts at `base_decimals` and the price
/// at its fixed scale. Fails on any value the contract would reject as
/// malformed.
pub fn bid_struct(terms: &BidTerms, base_decimals: u8) -> Result<contracts::Bid, CodecError> {
	terms.check()?;
	let decimals = decimals(base_decimals)?;

	Ok(contracts::Bid {
		maker: terms.maker,
		baseAsset: terms.base_asset,
		quoteAsset: terms.quote_asset,
		price: price_to_contract_value(&terms.price)?,
		minAmount: positive_amount("minAmount", &terms.min_amount, decimals)?,
		maxAmount: positive_amount("maxAmount", &terms.max_amount, decimals)?,
		kycLevel: terms.kyc_level,
		expiresAt: U256::from(terms.expires_at),
		nonce: U256::from(terms.nonce),
		bidType: terms.bid_type.ordinal(),
		paymentWindow: U256::from(terms.payment_window),
	})
}

/// Contract struct for `terms`, with the amount at `base_decimals`. Fails
/// when the intent names no bid or taker, or when the slippage exceeds
/// 100%.
pub fn intent_struct(
	terms: &OrderIntentTerms,
	base_decimals: u8,
) -> Result<contracts::OrderIntent, CodecError> {
	if terms.bid_hash == B256::ZERO {
		return Err(CodecError::InvalidField {
			field: "bidHash",
			message: "must reference a bid".to_string(),
		});
	}
	if terms.taker == Address::ZERO {
		return Err(CodecError::InvalidField {
			field: "taker",
			message: "must not be the zero address".to_string(),
		});
	}
	if terms.max_slippage_bps > 10_000 {
		return Err(CodecError::InvalidField {
			field: "maxSlippageBps",
			message: format!("{} exceeds 10000", terms.max_slippage_bps),
		});
	}
	let decimals = decimals(base_decimals)?;

	Ok(contracts::OrderIntent {
		bidHash: terms.bid_hash,
		taker: terms.taker,
		amount: positive_amount("amount", &terms.amount, decimals)?,
		maxSlippageBps: terms.max_slippage_bps,
		expiresAt: U256::from(terms.expires_at),
		nonce: U256::from(terms.nonce),
	})
}

/// `typeHash ‖ maker ‖ baseAsset ‖ quoteAsset ‖ price ‖ minAmount ‖
/// maxAmount ‖ kycLevel ‖ expiresAt ‖ nonce ‖ bidType ‖ paymentWindow`.
pub fn encode_bid(terms: &BidTerms, base_decimals: u8) -> Result<Vec<u8>, CodecError> {
	let bid = bid_struct(terms, base_decimals)?;
	Ok(WordEncoder::new(type_hash("Bid", BID_FIELDS))
		.address(&bid.maker)
		.address(&bid.baseAsset)
		.address(&bid.quoteAsset)
		.uint(bid.price)
		.uint(bid.minAmount)
		.uint(bid.maxAmount)
		.uint(U256::from(bid.kycLevel))
		.uint(bid.expiresAt)
		.uint(bid.nonce)
		.uint(U256::from(bid.bidType))
		.uint(bid.paymentWindow)
		.finish())
}

/// `typeHash ‖ bidHash ‖ taker ‖ amount ‖ maxSlippageBps ‖ expiresAt ‖
/// nonce`.
pub fn encode_intent(terms: &OrderIntentTerms, base_decimals: u8) -> Result<Vec<u8>, CodecError> {
	let intent = intent_struct(terms, base_decimals)?;
	Ok(WordEncoder::new(type_hash("OrderIntent", ORDER_INTENT_FIELDS))
		.b256(&intent.bidHash)
		.address(&intent.taker)
		.uint(intent.amount)
		.uint(U256::from(intent.maxSlippageBps))
		.uint(intent.expiresAt)
		.uint(intent.nonce)
		.finish())
}

/// The contract's struct hash over an encoding produced above.
pub fn hash_bid(encoded: &[u8]) -> B256 {
	keccak256(encoded)
}

/// Struct hash of an [`encode_intent`] output; the escrow's `intentHash`.
pub fn hash_intent(encoded: &[u8]) -> B256 {
	keccak256(encoded)
}

/// `bidHash` of `terms`: the natural key of a bid.
pub fn bid_hash(terms: &BidTerms, base_decimals: u8) -> Result<B256, CodecError> {
	Ok(hash_bid(&encode_bid(terms, base_decimals)?))
}

pub fn intent_hash(terms: &OrderIntentTerms, base_decimals: u8) -> Result<B256, CodecError> {
	Ok(hash_intent(&encode_intent(terms, base_decimals)?))
}

fn signature_bytes(signature: &Signature) -> Bytes {
	Bytes::copy_from_slice(&signature.as_bytes())
}

fn recover(domain: &SigningDomain, struct_hash: B256, signature: &[u8]) -> Result<Address, CodecError> {
	let signature =
		Signature::from_raw(signature).map_err(|e| CodecError::Signature(e.to_string()))?;
	signature
		.recover_address_from_prehash(&domain.digest(struct_hash))
		.map_err(|e| CodecError::Signature(e.to_string()))
}

/// Validates `terms`, then asks `account` to sign them. Nothing is sent to
/// the signer when validation fails.
pub async fn sign_bid(
	terms: &BidTerms,
	base_decimals: u8,
	domain: &SigningDomain,
	account: &AccountService,
) -> Result<Bytes, CodecError> {
	let struct_hash = bid_hash(terms, base_decimals)?;
	let signature = account
		.sign_typed_data(&domain.eip712(), "Bid", struct_hash)
		.await?;
	Ok(signature_bytes(&signature))
}

/// Recovers the address that signed `terms`.
pub fn verify_bid(
	terms: &BidTerms,
	base_decimals: u8,
	domain: &SigningDomain,
	signature: &[u8],
) -> Result<Address, CodecError> {
	recover(domain, bid_hash(terms, base_decimals)?, signature)
}

pub async fn sign_intent(
	terms: &OrderIntentTerms,
	base_decimals: u8,
	domain: &SigningDomain,
	account: &AccountService,
) -> Result<Bytes, CodecError> {
	let struct_hash = intent_hash(terms, base_decimals)?;
	let signature = account
		.sign_typed_data(&domain.eip712(), "OrderIntent", struct_hash)
		.await?;
	Ok(signature_bytes(&signature))
}

pub fn verify_intent(
	terms: &OrderIntentTerms,
	base_decimals: u8,
	domain: &SigningDomain,
	signature: &[u8],
) -> Result<Address, CodecError> {
	recover(domain, intent_hash(terms, base_decimals)?, signature)
}
