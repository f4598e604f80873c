//! Escrow contract ABI.
//!
//! The `Bid` and `OrderIntent` layouts are the versioned schema both parties
//! sign; their EIP-712 type strings are pinned in `codec` tests.

use alloy::sol;

sol! {
	#[derive(Debug, PartialEq, Eq)]
	struct Bid {
		address maker;
		address baseAsset;
		address quoteAsset;
		uint256 price;
		uint256 minAmount;
		uint256 maxAmount;
		uint8 kycLevel;
		uint256 expiresAt;
		uint256 nonce;
		uint8 bidType;
		uint256 paymentWindow;
	}

	#[derive(Debug, PartialEq, Eq)]
	struct OrderIntent {
		bytes32 bidHash;
		address taker;
		uint256 amount;
		uint16 maxSlippageBps;
		uint256 expiresAt;
		uint256 nonce;
	}

	#[derive(Debug, PartialEq, Eq)]
	interface IP2PEscrow {
		function balances(address user, address token) external view returns (uint256);
		function deposit(address token, uint256 amount) external;
		function createOrder(Bid bid, bytes makerSig, OrderIntent intent, bytes takerSig) external returns (bytes32 orderId);
		function release(bytes32 orderId) external;

		event OrderCreated(bytes32 indexed orderId, bytes32 indexed bidHash, address indexed maker, address taker, uint256 amount);
		event OrderReleased(bytes32 indexed orderId, address indexed buyer, uint256 amount);
		event OrderAutoReleased(bytes32 indexed orderId, address indexed buyer, uint256 amount);
		event OrderCancelled(bytes32 indexed orderId, address indexed seller, uint256 amount);
		event OrderDisputed(bytes32 indexed orderId, address indexed openedBy);
		event Deposited(address indexed user, address indexed token, uint256 amount);

		error BidExpired();
		error InsufficientKyc(uint8 required, uint8 actual);
		error InvalidSignature();
		error AmountOutOfRange(uint256 amount, uint256 minAmount, uint256 maxAmount);
		error NonceUsed(uint256 nonce);
		error InsufficientAvailable(uint256 requested, uint256 available);
		error InsufficientBalance(uint256 required, uint256 available);
		error OrderNotReleasable(bytes32 orderId);
		error NotSeller();
	}

	#[derive(Debug, PartialEq, Eq)]
	interface IERC20 {
		function balanceOf(address owner) external view returns (uint256);
		function allowance(address owner, address spender) external view returns (uint256);
		function approve(address spender, uint256 amount) external returns (bool);
	}
}
