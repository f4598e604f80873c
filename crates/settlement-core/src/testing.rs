//! Shared fixtures: a manual clock, fixed keys and an in-memory escrow chain
//! that executes the escrow and token calls the engine makes.

use alloy::consensus::{TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{address, keccak256, Address, Bytes, Signature, TxKind, B256, U256};
use alloy::sol_types::{Eip712Domain, SolError, SolInterface, SolStruct, SolValue};
use async_trait::async_trait;
use rust_decimal::Decimal;
use settlement_account::implementations::local::{create_account, LocalWallet};
use settlement_account::AccountService;
use settlement_config::{ApiConfig, ChainConfig, Config, EngineConfig, ImplementationConfig, TokenConfig};
use settlement_delivery::{DeliveryError, DeliveryInterface};
use settlement_intents::contracts::{IP2PEscrow, IERC20};
use settlement_intents::events::encode_log;
use settlement_storage::implementations::memory;
use settlement_types::{
	Bid, BidStatus, BidTerms, BidType, BidVisibility, LinkedPaymentAccount, Log, Order,
	OrderStatus, PaymentLinkage, Timestamp, Transaction, TransactionReceipt,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::engine::PublishBidRequest;
use crate::payment_accounts::NewPaymentAccount;
use crate::registry::ChainContext;
use crate::{Actor, Clock, SettlementBuilder, SettlementEngine};

pub const CHAIN_ID: u64 = 137;
pub const NOW: Timestamp = 1_700_000_000;
pub const TOKEN: Address = address!("2222222222222222222222222222222222222222");
pub const ESCROW: Address = address!("3333333333333333333333333333333333333333");

pub const MAKER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const TAKER_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
pub const OTHER_TAKER_KEY: &str =
	"0x5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";

const DEFAULT_KYC: u8 = 3;

pub struct ManualClock(AtomicU64);

impl ManualClock {
	pub fn new(now: Timestamp) -> Self {
		Self(AtomicU64::new(now))
	}

	pub fn set(&self, now: Timestamp) {
		self.0.store(now, Ordering::SeqCst);
	}

	pub fn advance(&self, seconds: u64) {
		self.0.fetch_add(seconds, Ordering::SeqCst);
	}
}

impl Clock for ManualClock {
	fn now(&self) -> Timestamp {
		self.0.load(Ordering::SeqCst)
	}
}

pub async fn actor(key: &str) -> Actor {
	let wallet = LocalWallet::new(key).unwrap();
	Actor::from_account(Arc::new(AccountService::new(Box::new(wallet))))
		.await
		.unwrap()
}

pub fn chain_config() -> ChainConfig {
	ChainConfig {
		name: "polygon".to_string(),
		rpc_url: "http://localhost:8545".to_string(),
		escrow_address: ESCROW,
		confirmations: 1,
		poll_interval_seconds: 1,
		start_block: 0,
		domain_name: "P2PEscrow".to_string(),
		domain_version: "1".to_string(),
		tokens: vec![TokenConfig {
			symbol: "USDT".to_string(),
			address: TOKEN,
			decimals: 6,
		}],
	}
}

pub fn chain_context() -> ChainContext {
	ChainContext::from_config(CHAIN_ID, &chain_config())
}

pub fn test_config() -> Config {
	let mut account = toml::Table::new();
	account.insert("private_key".into(), toml::Value::String(MAKER_KEY.to_string()));
	Config {
		engine: EngineConfig {
			confirmation_timeout_seconds: 1,
			signature_timeout_seconds: 5,
			..EngineConfig::default()
		},
		storage: ImplementationConfig {
			implementation: "memory".to_string(),
			config: toml::Value::Table(toml::Table::new()),
		},
		account: ImplementationConfig {
			implementation: "local".to_string(),
			config: toml::Value::Table(account),
		},
		api: ApiConfig::default(),
		chains: HashMap::from([(CHAIN_ID, chain_config())]),
	}
}

/// An engine on memory storage talking to `chain`.
pub fn engine(chain: &FakeEscrowChain, clock: Arc<ManualClock>) -> SettlementEngine {
	let chain = chain.clone();
	SettlementBuilder::new(test_config())
		.with_storage_factory("memory", memory::create_storage)
		.with_account_factory("local", create_account)
		.with_delivery_factory(move |_| Ok(Box::new(chain.clone()) as Box<dyn DeliveryInterface>))
		.with_clock(clock)
		.build()
		.unwrap()
}

pub fn bid_terms(maker: Address) -> BidTerms {
	BidTerms {
		maker,
		base_asset: TOKEN,
		quote_asset: Address::ZERO,
		price: Decimal::new(102, 2),
		min_amount: Decimal::new(100, 0),
		max_amount: Decimal::new(1000, 0),
		kyc_level: 1,
		expires_at: NOW + 86_400,
		nonce: 7,
		bid_type: BidType::Sell,
		payment_window: 1800,
	}
}

/// A sell bid offering one freshly saved SEPA account of the maker.
pub async fn bid_request(engine: &SettlementEngine, maker: &Actor) -> PublishBidRequest {
	let account = engine
		.payment_accounts()
		.save(
			maker.address,
			NewPaymentAccount {
				method_type: "SEPA".to_string(),
				details: "DE89 3704 0044 0532 0130 00".to_string(),
				label: "Main".to_string(),
				is_default: true,
				is_verified: true,
			},
		)
		.await
		.unwrap();
	PublishBidRequest {
		chain_id: CHAIN_ID,
		bid_group_id: None,
		terms: bid_terms(maker.address),
		fiat_currency: "usd".to_string(),
		fee_bps: 0,
		payment: PaymentLinkage::Accounts {
			accounts: vec![LinkedPaymentAccount {
				account_id: account.id,
				custom_instructions: Some("Quote the reference".to_string()),
			}],
		},
		visibility: BidVisibility::default(),
		signature: None,
	}
}

pub fn sample_bid() -> Bid {
	let terms = bid_terms(Address::repeat_byte(0x11));
	Bid {
		bid_hash: settlement_intents::bid_hash(&terms, 6).unwrap(),
		chain_id: CHAIN_ID,
		bid_group_id: None,
		terms,
		base_decimals: 6,
		fiat_currency: "USD".to_string(),
		fee_bps: 0,
		signature: Bytes::new(),
		payment: PaymentLinkage::Accounts { accounts: vec![] },
		visibility: BidVisibility::default(),
		status: BidStatus::Active,
		created_at: 1_000,
		updated_at: 1_000,
	}
}

pub fn sample_order() -> Order {
	Order {
		order_id: B256::repeat_byte(9),
		bid_hash: Some(B256::repeat_byte(2)),
		chain_id: CHAIN_ID,
		maker: Address::repeat_byte(0x11),
		taker: Address::repeat_byte(0x44),
		bid_type: BidType::Sell,
		base_asset: TOKEN,
		base_decimals: 6,
		from_amount: Decimal::new(500, 0),
		price: Decimal::new(102, 2),
		fee_bps: 0,
		fiat_currency: "USD".to_string(),
		status: OrderStatus::Locked,
		payment_snapshot: None,
		opened_at: 1_000,
		payment_deadline: 2_800,
		confirm_deadline: None,
		payment_sent_at: None,
		cancel_requested_at: None,
		completed_at: None,
		cancelled_at: None,
		disputed_at: None,
		creation_tx: Some(B256::repeat_byte(5)),
		release_tx: None,
		recovered: false,
		updated_at: 1_000,
	}
}

pub fn units(amount: u64) -> U256 {
	U256::from(amount) * U256::from(1_000_000u64)
}

#[derive(Debug, Clone)]
struct EscrowOrder {
	seller: Address,
	buyer: Address,
	token: Address,
	amount: U256,
	open: bool,
}

#[derive(Debug, Clone)]
struct ChainState {
	block: u64,
	sent: usize,
	nonces: HashMap<Address, u64>,
	tokens: HashMap<(Address, Address), U256>,
	allowances: HashMap<(Address, Address, Address), U256>,
	escrow_balances: HashMap<(Address, Address), U256>,
	kyc: HashMap<Address, u8>,
	filled: HashMap<B256, U256>,
	used_nonces: HashSet<(Address, U256)>,
	orders: HashMap<B256, EscrowOrder>,
	logs: Vec<Log>,
	receipts: HashMap<B256, TransactionReceipt>,
	receipts_visible: bool,
	omit_receipt_logs: bool,
	block_times: HashMap<u64, Timestamp>,
}

struct Execution {
	output: Bytes,
	logs: Vec<Log>,
}

fn revert<E: SolError>(error: E) -> Bytes {
	Bytes::from(error.abi_encode())
}

fn recover(signature: &[u8], digest: B256) -> Option<Address> {
	Signature::from_raw(signature)
		.ok()?
		.recover_address_from_prehash(&digest)
		.ok()
}

struct Env<'a> {
	now: Timestamp,
	escrow: Address,
	domain: &'a Eip712Domain,
}

impl ChainState {
	fn execute(&mut self, env: &Env<'_>, from: Address, to: Address, data: &[u8]) -> Result<Execution, Bytes> {
		if to == env.escrow {
			let call = IP2PEscrow::IP2PEscrowCalls::abi_decode(data).map_err(|_| Bytes::new())?;
			self.execute_escrow(env, from, call)
		} else {
			let call = IERC20::IERC20Calls::abi_decode(data).map_err(|_| Bytes::new())?;
			self.execute_token(env, from, to, call)
		}
	}

	fn execute_token(
		&mut self,
		env: &Env<'_>,
		from: Address,
		token: Address,
		call: IERC20::IERC20Calls,
	) -> Result<Execution, Bytes> {
		let output = match call {
			IERC20::IERC20Calls::balanceOf(c) => self.token_balance(token, c.owner).abi_encode(),
			IERC20::IERC20Calls::allowance(c) => self
				.allowances
				.get(&(token, c.owner, c.spender))
				.copied()
				.unwrap_or_default()
				.abi_encode(),
			IERC20::IERC20Calls::approve(c) => {
				if c.spender != env.escrow {
					return Err(Bytes::new());
				}
				self.allowances.insert((token, from, c.spender), c.amount);
				true.abi_encode()
			}
		};
		Ok(Execution {
			output: Bytes::from(output),
			logs: vec![],
		})
	}

	fn execute_escrow(
		&mut self,
		env: &Env<'_>,
		from: Address,
		call: IP2PEscrow::IP2PEscrowCalls,
	) -> Result<Execution, Bytes> {
		use IP2PEscrow::IP2PEscrowCalls;

		match call {
			IP2PEscrowCalls::balances(c) => Ok(Execution {
				output: Bytes::from(self.escrow_balance(c.user, c.token).abi_encode()),
				logs: vec![],
			}),
			IP2PEscrowCalls::deposit(c) => {
				let allowance = self
					.allowances
					.get(&(c.token, from, env.escrow))
					.copied()
					.unwrap_or_default();
				let wallet = self.token_balance(c.token, from);
				if allowance < c.amount || wallet < c.amount {
					return Err(Bytes::new());
				}
				self.allowances
					.insert((c.token, from, env.escrow), allowance - c.amount);
				self.tokens.insert((c.token, from), wallet - c.amount);
				*self.escrow_balances.entry((from, c.token)).or_default() += c.amount;
				Ok(Execution {
					output: Bytes::new(),
					logs: vec![encode_log(
						&IP2PEscrow::Deposited {
							user: from,
							token: c.token,
							amount: c.amount,
						},
						env.escrow,
					)],
				})
			}
			IP2PEscrowCalls::createOrder(c) => self.create_order(env, c),
			IP2PEscrowCalls::release(c) => {
				let order = match self.orders.get_mut(&c.orderId) {
					Some(order) if order.open => order,
					_ => return Err(revert(IP2PEscrow::OrderNotReleasable { orderId: c.orderId })),
				};
				if order.seller != from {
					return Err(revert(IP2PEscrow::NotSeller {}));
				}
				order.open = false;
				let (buyer, token, amount) = (order.buyer, order.token, order.amount);
				*self.tokens.entry((token, buyer)).or_default() += amount;
				Ok(Execution {
					output: Bytes::new(),
					logs: vec![encode_log(
						&IP2PEscrow::OrderReleased {
							orderId: c.orderId,
							buyer,
							amount,
						},
						env.escrow,
					)],
				})
			}
		}
	}

	fn create_order(
		&mut self,
		env: &Env<'_>,
		c: IP2PEscrow::createOrderCall,
	) -> Result<Execution, Bytes> {
		let (bid, intent) = (c.bid, c.intent);
		let now = U256::from(env.now);
		if bid.expiresAt <= now || intent.expiresAt <= now {
			return Err(revert(IP2PEscrow::BidExpired {}));
		}
		let bid_digest = bid.eip712_signing_hash(env.domain);
		let intent_digest = intent.eip712_signing_hash(env.domain);
		if recover(&c.makerSig, bid_digest) != Some(bid.maker)
			|| recover(&c.takerSig, intent_digest) != Some(intent.taker)
			|| intent.bidHash != bid.eip712_hash_struct()
		{
			return Err(revert(IP2PEscrow::InvalidSignature {}));
		}
		let kyc = self.kyc.get(&intent.taker).copied().unwrap_or(DEFAULT_KYC);
		if bid.kycLevel > kyc {
			return Err(revert(IP2PEscrow::InsufficientKyc {
				required: bid.kycLevel,
				actual: kyc,
			}));
		}
		if self.used_nonces.contains(&(intent.taker, intent.nonce)) {
			return Err(revert(IP2PEscrow::NonceUsed { nonce: intent.nonce }));
		}
		if intent.amount < bid.minAmount || intent.amount > bid.maxAmount {
			return Err(revert(IP2PEscrow::AmountOutOfRange {
				amount: intent.amount,
				minAmount: bid.minAmount,
				maxAmount: bid.maxAmount,
			}));
		}
		let filled = self.filled.get(&intent.bidHash).copied().unwrap_or_default();
		let available = bid.maxAmount.saturating_sub(filled);
		if intent.amount > available {
			return Err(revert(IP2PEscrow::InsufficientAvailable {
				requested: intent.amount,
				available,
			}));
		}
		let (seller, buyer) = if bid.bidType == BidType::Sell.ordinal() {
			(bid.maker, intent.taker)
		} else {
			(intent.taker, bid.maker)
		};
		let locked = self.escrow_balance(seller, bid.baseAsset);
		if locked < intent.amount {
			return Err(revert(IP2PEscrow::InsufficientBalance {
				required: intent.amount,
				available: locked,
			}));
		}

		self.escrow_balances
			.insert((seller, bid.baseAsset), locked - intent.amount);
		self.filled.insert(intent.bidHash, filled + intent.amount);
		self.used_nonces.insert((intent.taker, intent.nonce));

		let mut preimage = Vec::with_capacity(84);
		preimage.extend_from_slice(intent.bidHash.as_slice());
		preimage.extend_from_slice(intent.taker.as_slice());
		preimage.extend_from_slice(&intent.nonce.to_be_bytes::<32>());
		let order_id = keccak256(&preimage);
		self.orders.insert(
			order_id,
			EscrowOrder {
				seller,
				buyer,
				token: bid.baseAsset,
				amount: intent.amount,
				open: true,
			},
		);

		Ok(Execution {
			output: Bytes::from(order_id.abi_encode()),
			logs: vec![encode_log(
				&IP2PEscrow::OrderCreated {
					orderId: order_id,
					bidHash: intent.bidHash,
					maker: bid.maker,
					taker: intent.taker,
					amount: intent.amount,
				},
				env.escrow,
			)],
		})
	}

	fn token_balance(&self, token: Address, owner: Address) -> U256 {
		self.tokens.get(&(token, owner)).copied().unwrap_or_default()
	}

	fn escrow_balance(&self, user: Address, token: Address) -> U256 {
		self.escrow_balances
			.get(&(user, token))
			.copied()
			.unwrap_or_default()
	}

	/// Mines a block holding one log that did not come from a transaction
	/// the engine sent.
	fn mine_external(&mut self, mut log: Log, now: Timestamp) -> B256 {
		self.mine_block(now);
		let tx_hash = keccak256(format!("external-{}", self.block));
		log.block_number = Some(self.block);
		log.transaction_hash = Some(tx_hash);
		self.logs.push(log.clone());
		self.receipts.insert(
			tx_hash,
			TransactionReceipt {
				hash: tx_hash,
				block_number: self.block,
				success: true,
				logs: vec![log],
			},
		);
		tx_hash
	}

	fn mine_block(&mut self, now: Timestamp) -> u64 {
		self.block += 1;
		self.block_times.insert(self.block, now);
		self.block
	}
}

/// One chain with the escrow at [`ESCROW`], shared by every clone.
#[derive(Clone)]
pub struct FakeEscrowChain {
	state: Arc<Mutex<ChainState>>,
	clock: Arc<ManualClock>,
	domain: Eip712Domain,
}

impl FakeEscrowChain {
	pub fn new(clock: Arc<ManualClock>) -> Self {
		Self {
			state: Arc::new(Mutex::new(ChainState {
				block: 100,
				sent: 0,
				nonces: HashMap::new(),
				tokens: HashMap::new(),
				allowances: HashMap::new(),
				escrow_balances: HashMap::new(),
				kyc: HashMap::new(),
				filled: HashMap::new(),
				used_nonces: HashSet::new(),
				orders: HashMap::new(),
				logs: Vec::new(),
				receipts: HashMap::new(),
				receipts_visible: true,
				omit_receipt_logs: false,
				block_times: HashMap::from([(100, clock.now())]),
			})),
			clock,
			domain: chain_context().domain.eip712(),
		}
	}

	fn lock(&self) -> MutexGuard<'_, ChainState> {
		self.state.lock().unwrap()
	}

	fn env(&self) -> Env<'_> {
		Env {
			now: self.clock.now(),
			escrow: ESCROW,
			domain: &self.domain,
		}
	}

	fn simulate(&self, tx: &Transaction) -> Result<Execution, DeliveryError> {
		let mut scratch = self.lock().clone();
		scratch
			.execute(&self.env(), tx.from, tx.to, &tx.data)
			.map_err(|data| DeliveryError::Reverted {
				data,
				message: "execution reverted".to_string(),
			})
	}

	pub fn mint(&self, token: Address, owner: Address, amount: U256) {
		*self.lock().tokens.entry((token, owner)).or_default() += amount;
	}

	pub fn set_escrow_balance(&self, user: Address, token: Address, amount: U256) {
		self.lock().escrow_balances.insert((user, token), amount);
	}

	pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: U256) {
		self.lock().allowances.insert((token, owner, spender), amount);
	}

	pub fn set_kyc(&self, user: Address, level: u8) {
		self.lock().kyc.insert(user, level);
	}

	pub fn escrow_balance(&self, user: Address, token: Address) -> U256 {
		self.lock().escrow_balance(user, token)
	}

	pub fn token_balance(&self, token: Address, owner: Address) -> U256 {
		self.lock().token_balance(token, owner)
	}

	/// Raw transactions accepted, reverted ones included.
	pub fn sent_transactions(&self) -> usize {
		self.lock().sent
	}

	pub fn block_number(&self) -> u64 {
		self.lock().block
	}

	/// Makes every receipt lookup come back empty, as for a transaction the
	/// node has not indexed yet.
	pub fn hide_receipts(&self) {
		self.lock().receipts_visible = false;
	}

	pub fn reveal_receipts(&self) {
		self.lock().receipts_visible = true;
	}

	/// Receipts of later transactions carry no logs.
	pub fn omit_receipt_logs(&self) {
		self.lock().omit_receipt_logs = true;
	}

	/// Cancels an open order outside the engine, refunding the seller.
	pub fn external_cancel(&self, order_id: B256) -> B256 {
		let now = self.clock.now();
		let mut state = self.lock();
		let order = state.orders.get_mut(&order_id).unwrap();
		assert!(order.open);
		order.open = false;
		let (seller, token, amount) = (order.seller, order.token, order.amount);
		*state.escrow_balances.entry((seller, token)).or_default() += amount;
		state.mine_external(
			encode_log(
				&IP2PEscrow::OrderCancelled {
					orderId: order_id,
					seller,
					amount,
				},
				ESCROW,
			),
			now,
		)
	}

	/// Releases an open order to its buyer once its timer ran out.
	pub fn external_auto_release(&self, order_id: B256) -> B256 {
		let now = self.clock.now();
		let mut state = self.lock();
		let order = state.orders.get_mut(&order_id).unwrap();
		assert!(order.open);
		order.open = false;
		let (buyer, token, amount) = (order.buyer, order.token, order.amount);
		*state.tokens.entry((token, buyer)).or_default() += amount;
		state.mine_external(
			encode_log(
				&IP2PEscrow::OrderAutoReleased {
					orderId: order_id,
					buyer,
					amount,
				},
				ESCROW,
			),
			now,
		)
	}

	pub fn external_dispute(&self, order_id: B256, opened_by: Address) -> B256 {
		let now = self.clock.now();
		self.lock().mine_external(
			encode_log(
				&IP2PEscrow::OrderDisputed {
					orderId: order_id,
					openedBy: opened_by,
				},
				ESCROW,
			),
			now,
		)
	}

	/// Advances the head without adding transactions.
	pub fn mine_empty(&self, blocks: u64) {
		let now = self.clock.now();
		let mut state = self.lock();
		for _ in 0..blocks {
			state.mine_block(now);
		}
	}
}

#[async_trait]
impl DeliveryInterface for FakeEscrowChain {
	fn chain_id(&self) -> u64 {
		CHAIN_ID
	}

	async fn call(&self, tx: &Transaction) -> Result<Bytes, DeliveryError> {
		Ok(self.simulate(tx)?.output)
	}

	async fn prepare(&self, tx: &Transaction) -> Result<TxEip1559, DeliveryError> {
		self.simulate(tx)?;
		let nonce = self.lock().nonces.get(&tx.from).copied().unwrap_or_default();
		Ok(TxEip1559 {
			chain_id: CHAIN_ID,
			nonce,
			gas_limit: 500_000,
			max_fee_per_gas: 30_000_000_000,
			max_priority_fee_per_gas: 1_000_000_000,
			to: TxKind::Call(tx.to),
			value: tx.value,
			access_list: Default::default(),
			input: tx.data.clone(),
		})
	}

	async fn send_raw(&self, raw: Bytes) -> Result<B256, DeliveryError> {
		let envelope = TxEnvelope::decode_2718(&mut raw.as_ref())
			.map_err(|e| DeliveryError::Network(e.to_string()))?;
		let TxEnvelope::Eip1559(signed) = envelope else {
			return Err(DeliveryError::Network("unsupported transaction type".to_string()));
		};
		let from = signed
			.signature()
			.recover_address_from_prehash(&signed.signature_hash())
			.map_err(|e| DeliveryError::Network(e.to_string()))?;
		let TxKind::Call(to) = signed.tx().to else {
			return Err(DeliveryError::Network("contract creation".to_string()));
		};
		let data = signed.tx().input.clone();
		let tx_hash = *signed.hash();
		let env = self.env();

		let mut state = self.lock();
		state.sent += 1;
		*state.nonces.entry(from).or_default() += 1;
		let block = state.mine_block(env.now);

		let mut scratch = state.clone();
		let receipt = match scratch.execute(&env, from, to, &data) {
			Ok(execution) => {
				let logs: Vec<Log> = execution
					.logs
					.into_iter()
					.map(|mut log| {
						log.block_number = Some(block);
						log.transaction_hash = Some(tx_hash);
						log
					})
					.collect();
				*state = scratch;
				state.logs.extend(logs.iter().cloned());
				TransactionReceipt {
					hash: tx_hash,
					block_number: block,
					success: true,
					logs: if state.omit_receipt_logs { vec![] } else { logs },
				}
			}
			Err(_) => TransactionReceipt {
				hash: tx_hash,
				block_number: block,
				success: false,
				logs: vec![],
			},
		};
		state.receipts.insert(tx_hash, receipt);
		Ok(tx_hash)
	}

	async fn get_receipt(&self, hash: &B256) -> Result<Option<TransactionReceipt>, DeliveryError> {
		let state = self.lock();
		if !state.receipts_visible {
			return Ok(None);
		}
		Ok(state.receipts.get(hash).cloned())
	}

	async fn get_block_number(&self) -> Result<u64, DeliveryError> {
		Ok(self.lock().block)
	}

	async fn get_block_timestamp(&self, number: u64) -> Result<Option<u64>, DeliveryError> {
		Ok(self.lock().block_times.get(&number).copied())
	}

	async fn get_logs(
		&self,
		address: Address,
		from_block: u64,
		to_block: u64,
	) -> Result<Vec<Log>, DeliveryError> {
		Ok(self
			.lock()
			.logs
			.iter()
			.filter(|log| {
				log.address == address
					&& log
						.block_number
						.is_some_and(|block| block >= from_block && block <= to_block)
			})
			.cloned()
			.collect())
	}
}
