//! Bid model: a maker's signed standing offer.

use alloy::primitives::{Address, Bytes, B256};
use chrono::{Datelike, FixedOffset, TimeZone, Timelike, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Timestamp;

/// Side the maker takes. The ordinal is part of the escrow contract's ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidType {
	/// Maker offers crypto and receives fiat.
	Sell,
	/// Maker offers fiat and receives crypto.
	Buy,
}

impl BidType {
	/// 0 = sell, 1 = buy.
	pub fn ordinal(self) -> u8 {
		match self {
			BidType::Sell => 0,
			BidType::Buy => 1,
		}
	}

	pub fn from_ordinal(value: u8) -> Option<Self> {
		match value {
			0 => Some(BidType::Sell),
			1 => Some(BidType::Buy),
			_ => None,
		}
	}
}

/// Stored status. Expiry is never stored; see [`Bid::availability`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
	Active,
	Cancelled,
	Completed,
}

/// Status as observed at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidAvailability {
	Active,
	Expired,
	Cancelled,
	Completed,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidTerms {
	#[error("{0} must not be the zero address")]
	ZeroAddress(&'static str),
	#[error("{0} must be greater than zero")]
	NotPositive(&'static str),
	#[error("minAmount {min} exceeds maxAmount {max}")]
	AmountRange { min: Decimal, max: Decimal },
	#[error("A country-restricted bid needs at least one allowed country")]
	NoCountries,
	#[error("A private bid needs an access token")]
	MissingAccessToken,
	#[error("{0}")]
	PaymentLinkage(String),
	#[error("Available hours are malformed: {0}")]
	Schedule(String),
	#[error("paymentWindow {window}s exceeds the {max}s limit")]
	PaymentWindowTooLong { window: u64, max: u64 },
}

/// The fields a maker signs, in contract order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidTerms {
	pub maker: Address,
	pub base_asset: Address,
	/// Usually the zero address, standing for fiat.
	pub quote_asset: Address,
	/// Quote units per base unit.
	pub price: Decimal,
	pub min_amount: Decimal,
	pub max_amount: Decimal,
	pub kyc_level: u8,
	pub expires_at: Timestamp,
	pub nonce: u64,
	pub bid_type: BidType,
	/// Seconds the buyer has to send fiat once an order opens.
	pub payment_window: u64,
}

/// Longest payment window a bid may offer: one week.
pub const MAX_PAYMENT_WINDOW: u64 = 7 * 24 * 60 * 60;

impl BidTerms {
	/// Structural checks that must pass before anyone is asked to sign.
	pub fn check(&self) -> Result<(), InvalidTerms> {
		if self.maker == Address::ZERO {
			return Err(InvalidTerms::ZeroAddress("maker"));
		}
		if self.base_asset == Address::ZERO {
			return Err(InvalidTerms::ZeroAddress("baseAsset"));
		}
		if self.price <= Decimal::ZERO {
			return Err(InvalidTerms::NotPositive("price"));
		}
		if self.min_amount <= Decimal::ZERO {
			return Err(InvalidTerms::NotPositive("minAmount"));
		}
		if self.max_amount <= Decimal::ZERO {
			return Err(InvalidTerms::NotPositive("maxAmount"));
		}
		if self.min_amount > self.max_amount {
			return Err(InvalidTerms::AmountRange {
				min: self.min_amount,
				max: self.max_amount,
			});
		}
		if self.payment_window == 0 {
			return Err(InvalidTerms::NotPositive("paymentWindow"));
		}
		if self.payment_window > MAX_PAYMENT_WINDOW {
			return Err(InvalidTerms::PaymentWindowTooLong {
				window: self.payment_window,
				max: MAX_PAYMENT_WINDOW,
			});
		}
		Ok(())
	}
}

/// A saved payment account offered on a sell bid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedPaymentAccount {
	pub account_id: String,
	#[serde(default)]
	pub custom_instructions: Option<String>,
}

/// How a bid exposes payment: account references for sells, method type
/// codes for buys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentLinkage {
	Accounts { accounts: Vec<LinkedPaymentAccount> },
	MethodTypes { method_types: Vec<String> },
}

impl PaymentLinkage {
	pub fn check(&self, bid_type: BidType) -> Result<(), InvalidTerms> {
		match (bid_type, self) {
			(BidType::Sell, PaymentLinkage::Accounts { accounts }) if !accounts.is_empty() => Ok(()),
			(BidType::Sell, _) => Err(InvalidTerms::PaymentLinkage(
				"A sell bid must link at least one saved payment account".to_string(),
			)),
			(BidType::Buy, PaymentLinkage::MethodTypes { method_types })
				if !method_types.is_empty() =>
			{
				Ok(())
			}
			(BidType::Buy, _) => Err(InvalidTerms::PaymentLinkage(
				"A buy bid must list at least one accepted payment method type".to_string(),
			)),
		}
	}

	pub fn linked_account(&self, account_id: &str) -> Option<&LinkedPaymentAccount> {
		match self {
			PaymentLinkage::Accounts { accounts } => {
				accounts.iter().find(|a| a.account_id == account_id)
			}
			PaymentLinkage::MethodTypes { .. } => None,
		}
	}

	pub fn accepts_method(&self, method_type: &str) -> bool {
		match self {
			PaymentLinkage::MethodTypes { method_types } => {
				method_types.iter().any(|m| m.eq_ignore_ascii_case(method_type))
			}
			PaymentLinkage::Accounts { .. } => false,
		}
	}
}

/// Weekly window during which the maker accepts new orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableHours {
	pub days: Vec<Weekday>,
	/// Minutes after local midnight.
	pub start_minute: u16,
	pub end_minute: u16,
	#[serde(default)]
	pub utc_offset_minutes: i32,
}

impl AvailableHours {
	fn check(&self) -> Result<(), InvalidTerms> {
		if self.days.is_empty() {
			return Err(InvalidTerms::Schedule("no days selected".to_string()));
		}
		if self.start_minute >= 1440 || self.end_minute > 1440 {
			return Err(InvalidTerms::Schedule("minutes must fall within a day".to_string()));
		}
		if FixedOffset::east_opt(self.utc_offset_minutes * 60).is_none() {
			return Err(InvalidTerms::Schedule("offset out of range".to_string()));
		}
		Ok(())
	}

	/// Whether `now` falls inside the window. A window whose end precedes its
	/// start runs past midnight and belongs to the day it starts on.
	pub fn is_open(&self, now: Timestamp) -> bool {
		let Some(offset) = FixedOffset::east_opt(self.utc_offset_minutes * 60) else {
			return false;
		};
		let Some(utc) = Utc.timestamp_opt(now as i64, 0).single() else {
			return false;
		};
		let local = utc.with_timezone(&offset);
		let minute = (local.hour() * 60 + local.minute()) as u16;
		let today = local.weekday();

		if self.start_minute <= self.end_minute {
			self.days.contains(&today) && minute >= self.start_minute && minute < self.end_minute
		} else if minute >= self.start_minute {
			self.days.contains(&today)
		} else {
			minute < self.end_minute && self.days.contains(&today.pred())
		}
	}
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Ineligible {
	#[error("Bid is not offered in country {0}")]
	Country(String),
	#[error("Bid is restricted to specific countries and no country was supplied")]
	CountryUnknown,
	#[error("Private bid requires a valid access token")]
	AccessToken,
	#[error("Bid is outside its available hours")]
	OutsideHours,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidVisibility {
	pub is_global: bool,
	#[serde(default)]
	pub countries: Vec<String>,
	pub is_public: bool,
	#[serde(default)]
	pub access_token: Option<String>,
	#[serde(default)]
	pub available_hours: Option<AvailableHours>,
}

impl Default for BidVisibility {
	fn default() -> Self {
		Self {
			is_global: true,
			countries: Vec::new(),
			is_public: true,
			access_token: None,
			available_hours: None,
		}
	}
}

impl BidVisibility {
	pub fn check(&self) -> Result<(), InvalidTerms> {
		if !self.is_global && self.countries.is_empty() {
			return Err(InvalidTerms::NoCountries);
		}
		if !self.is_public && self.access_token.as_deref().map_or(true, str::is_empty) {
			return Err(InvalidTerms::MissingAccessToken);
		}
		if let Some(hours) = &self.available_hours {
			hours.check()?;
		}
		Ok(())
	}

	/// Checks a prospective taker against the bid's eligibility rules.
	pub fn admits(
		&self,
		country: Option<&str>,
		access_token: Option<&str>,
		now: Timestamp,
	) -> Result<(), Ineligible> {
		if !self.is_global {
			let country = country.ok_or(Ineligible::CountryUnknown)?;
			if !self.countries.iter().any(|c| c.eq_ignore_ascii_case(country)) {
				return Err(Ineligible::Country(country.to_string()));
			}
		}
		if !self.is_public && self.access_token.as_deref() != access_token {
			return Err(Ineligible::AccessToken);
		}
		if let Some(hours) = &self.available_hours {
			if !hours.is_open(now) {
				return Err(Ineligible::OutsideHours);
			}
		}
		Ok(())
	}
}

/// A published bid as persisted off-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
	pub bid_hash: B256,
	pub chain_id: u64,
	/// Shared by the per-chain bids of one logical offer.
	#[serde(default)]
	pub bid_group_id: Option<String>,
	pub terms: BidTerms,
	pub base_decimals: u8,
	pub fiat_currency: String,
	#[serde(default)]
	pub fee_bps: u16,
	pub signature: Bytes,
	pub payment: PaymentLinkage,
	#[serde(default)]
	pub visibility: BidVisibility,
	pub status: BidStatus,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

impl Bid {
	pub fn availability(&self, now: Timestamp) -> BidAvailability {
		match self.status {
			BidStatus::Cancelled => BidAvailability::Cancelled,
			BidStatus::Completed => BidAvailability::Completed,
			BidStatus::Active if self.terms.expires_at <= now => BidAvailability::Expired,
			BidStatus::Active => BidAvailability::Active,
		}
	}
}
