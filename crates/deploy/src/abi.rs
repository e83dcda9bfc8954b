//! Typed contract calls and constructor arguments of the iStax contracts.
//!
//! Call encoding comes from `sol!` bindings; constructor arguments are encoded as a
//! parameter sequence and appended to the creation bytecode.

use std::fmt;

use alloy_core::primitives::{Address, Bytes, U256};
use alloy_core::sol_types::{SolCall, SolValue};

use crate::config::IssuerSchedule;

alloy_core::sol! {
    /// Mint pool tokens to `to`.
    function mint(address to, uint256 amount) external;

    /// Register `token` at the issuer with reward weight `allocPoint`.
    function add(uint256 allocPoint, address token, bool withUpdate) external;

    /// Stake the market's token balance into the issuer.
    function depositToChef(uint256 amount) external;
}

/// Arguments passed to a contract constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstructorArgs {
    /// The contract takes no arguments.
    Empty,
    /// `(rewardToken, beneficiary, rewardPerBlock, startBlock, bonusEndBlock, endBlock, allocationCount)`
    Issuer {
        reward_token: Address,
        beneficiary: Address,
        schedule: IssuerSchedule,
    },
    /// `(name, symbol, initialSupply)`, shared by staking and insurance tokens.
    PoolToken {
        name: String,
        symbol: String,
        initial_supply: U256,
    },
    /// `(issuer, referenceToken, rewardToken, poolToken, coverageStart, coverageEnd, poolIndex)`
    Market {
        issuer: Address,
        reference_token: Address,
        reward_token: Address,
        pool_token: Address,
        coverage_start: u64,
        coverage_end: u64,
        pool_index: usize,
    },
}

impl ConstructorArgs {
    /// ABI-encode the arguments as a parameter sequence.
    pub fn abi_encode(&self) -> Vec<u8> {
        match self {
            ConstructorArgs::Empty => Vec::new(),
            ConstructorArgs::Issuer {
                reward_token,
                beneficiary,
                schedule,
            } => (
                *reward_token,
                *beneficiary,
                U256::from(schedule.reward_per_block),
                U256::from(schedule.start_block),
                U256::from(schedule.bonus_end_block),
                U256::from(schedule.end_block),
                U256::from(schedule.allocation_count),
            )
                .abi_encode_params(),
            ConstructorArgs::PoolToken {
                name,
                symbol,
                initial_supply,
            } => (name.clone(), symbol.clone(), *initial_supply).abi_encode_params(),
            ConstructorArgs::Market {
                issuer,
                reference_token,
                reward_token,
                pool_token,
                coverage_start,
                coverage_end,
                pool_index,
            } => (
                *issuer,
                *reference_token,
                *reward_token,
                *pool_token,
                U256::from(*coverage_start),
                U256::from(*coverage_end),
                U256::from(*pool_index),
            )
                .abi_encode_params(),
        }
    }
}

impl fmt::Display for ConstructorArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructorArgs::Empty => write!(f, "()"),
            ConstructorArgs::Issuer {
                reward_token,
                beneficiary,
                schedule,
            } => write!(
                f,
                "({}, {}, {}, {}, {}, {}, {})",
                reward_token,
                beneficiary,
                schedule.reward_per_block,
                schedule.start_block,
                schedule.bonus_end_block,
                schedule.end_block,
                schedule.allocation_count
            ),
            ConstructorArgs::PoolToken {
                name,
                symbol,
                initial_supply,
            } => write!(f, "({:?}, {:?}, {})", name, symbol, initial_supply),
            ConstructorArgs::Market {
                issuer,
                reference_token,
                reward_token,
                pool_token,
                coverage_start,
                coverage_end,
                pool_index,
            } => write!(
                f,
                "({}, {}, {}, {}, {}, {}, {})",
                issuer, reference_token, reward_token, pool_token, coverage_start, coverage_end, pool_index
            ),
        }
    }
}

/// Creation data for a contract: bytecode followed by the encoded constructor arguments.
pub fn deploy_data(bytecode: &Bytes, args: &ConstructorArgs) -> Bytes {
    let mut data = bytecode.to_vec();
    data.extend_from_slice(&args.abi_encode());
    Bytes::from(data)
}

/// A call to one of the functions the deployment invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractCall {
    /// `mint(address,uint256)` on a pool token.
    Mint { to: Address, amount: U256 },
    /// `add(uint256,address,bool)` on the issuer.
    AddPool {
        weight: u64,
        token: Address,
        with_update: bool,
    },
    /// `depositToChef(uint256)` on a market.
    DepositToChef { amount: U256 },
}

impl ContractCall {
    pub fn mint(to: Address, amount: U256) -> Self {
        ContractCall::Mint { to, amount }
    }

    /// Register a pool token at the issuer with a weight.
    pub fn add_pool(weight: u64, token: Address, with_update: bool) -> Self {
        ContractCall::AddPool {
            weight,
            token,
            with_update,
        }
    }

    /// Stake the seed balance of a market into the issuer.
    pub fn deposit_to_chef(amount: U256) -> Self {
        ContractCall::DepositToChef { amount }
    }

    /// Canonical signature, e.g. `mint(address,uint256)`.
    pub fn signature(&self) -> &'static str {
        match self {
            ContractCall::Mint { .. } => mintCall::SIGNATURE,
            ContractCall::AddPool { .. } => addCall::SIGNATURE,
            ContractCall::DepositToChef { .. } => depositToChefCall::SIGNATURE,
        }
    }

    /// Selector followed by the encoded arguments.
    pub fn calldata(&self) -> Bytes {
        let data = match *self {
            ContractCall::Mint { to, amount } => mintCall { to, amount }.abi_encode(),
            ContractCall::AddPool {
                weight,
                token,
                with_update,
            } => addCall {
                allocPoint: U256::from(weight),
                token,
                withUpdate: with_update,
            }
            .abi_encode(),
            ContractCall::DepositToChef { amount } => depositToChefCall { amount }.abi_encode(),
        };
        Bytes::from(data)
    }
}

impl fmt::Display for ContractCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractCall::Mint { to, amount } => write!(f, "mint({}, {})", to, amount),
            ContractCall::AddPool {
                weight,
                token,
                with_update,
            } => write!(f, "add({}, {}, {})", weight, token, with_update),
            ContractCall::DepositToChef { amount } => write!(f, "depositToChef({})", amount),
        }
    }
}
