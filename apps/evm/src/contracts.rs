//! Whitelisted ERC-20 contracts and known function signatures.

use hex_literal::hex;

use crate::parsing::abi::AbiType;

/// One whitelisted token contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenInfo {
    pub address: [u8; 20],
    pub symbol: &'static str,
    pub decimals: u8,
}

/// Mainnet ERC-20 whitelist.
pub const TOKEN_WHITELIST: &[TokenInfo] = &[
    TokenInfo {
        address: hex!("dac17f958d2ee523a2206206994597c13d831ec7"),
        symbol: "USDT",
        decimals: 6,
    },
    TokenInfo {
        address: hex!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"),
        symbol: "USDC",
        decimals: 6,
    },
    TokenInfo {
        address: hex!("6b175474e89094c44da98b954eedeac495271d0f"),
        symbol: "DAI",
        decimals: 18,
    },
    TokenInfo {
        address: hex!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"),
        symbol: "WETH",
        decimals: 18,
    },
];

pub fn whitelisted_token(address: &[u8; 20]) -> Option<&'static TokenInfo> {
    TOKEN_WHITELIST.iter().find(|t| &t.address == address)
}

/// `transfer(address,uint256)`
pub const SEL_TRANSFER: [u8; 4] = hex!("a9059cbb");
/// `swap(address,(address,address,address,address,uint256,uint256,uint256),bytes,bytes)`
pub const SEL_SWAP: [u8; 4] = hex!("7c025200");
/// `uniswapV3Swap(uint256,uint256,uint256[])`
pub const SEL_UNISWAP_V3_SWAP: [u8; 4] = hex!("e449022e");
/// `safeTransferFrom(address,address,uint256)`
pub const SEL_SAFE_TRANSFER_FROM: [u8; 4] = hex!("42842e0e");
/// `deposit()`
pub const SEL_DEPOSIT: [u8; 4] = hex!("d0e30db0");

/// A function the device can render argument-by-argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownFunction {
    pub selector: [u8; 4],
    pub name: &'static str,
    /// Tuple arguments flattened into their slot order.
    pub arguments: &'static [AbiType],
}

pub const KNOWN_FUNCTIONS: &[KnownFunction] = &[
    KnownFunction {
        selector: SEL_TRANSFER,
        name: "transfer",
        arguments: &[AbiType::Address, AbiType::Uint256],
    },
    KnownFunction {
        selector: SEL_SWAP,
        name: "swap",
        arguments: &[
            AbiType::Address,
            AbiType::Address,
            AbiType::Address,
            AbiType::Address,
            AbiType::Address,
            AbiType::Uint256,
            AbiType::Uint256,
            AbiType::Uint256,
            AbiType::Bytes,
            AbiType::Bytes,
        ],
    },
    KnownFunction {
        selector: SEL_UNISWAP_V3_SWAP,
        name: "uniswapV3Swap",
        arguments: &[AbiType::Uint256, AbiType::Uint256, AbiType::Uint256Array],
    },
    KnownFunction {
        selector: SEL_SAFE_TRANSFER_FROM,
        name: "safeTransferFrom",
        arguments: &[AbiType::Address, AbiType::Address, AbiType::Uint256],
    },
    KnownFunction {
        selector: SEL_DEPOSIT,
        name: "deposit",
        arguments: &[],
    },
];

pub fn known_function(selector: &[u8; 4]) -> Option<&'static KnownFunction> {
    KNOWN_FUNCTIONS.iter().find(|f| &f.selector == selector)
}
