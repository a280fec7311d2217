use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Chains the price providers are asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Base,
    Arbitrum,
    Optimism,
    Polygon,
    Bsc,
    Avalanche,
    Solana,
    Blast,
}

impl Chain {
    /// Parse from string, accepting the aliases the providers use.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ethereum" | "eth" | "mainnet" | "eth-mainnet" => Some(Self::Ethereum),
            "base" => Some(Self::Base),
            "arbitrum" | "arb" | "arbitrum-one" => Some(Self::Arbitrum),
            "optimism" | "op" | "optimistic-ethereum" => Some(Self::Optimism),
            "polygon" | "matic" | "polygon-pos" => Some(Self::Polygon),
            "bsc" | "bnb" | "binance-smart-chain" => Some(Self::Bsc),
            "avalanche" | "avax" => Some(Self::Avalanche),
            "solana" | "sol" => Some(Self::Solana),
            "blast" => Some(Self::Blast),
            _ => None,
        }
    }

    /// Canonical lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ethereum => "ethereum",
            Self::Base => "base",
            Self::Arbitrum => "arbitrum",
            Self::Optimism => "optimism",
            Self::Polygon => "polygon",
            Self::Bsc => "bsc",
            Self::Avalanche => "avalanche",
            Self::Solana => "solana",
            Self::Blast => "blast",
        }
    }

    /// Chain prefix used in DefiLlama coin keys.
    pub fn defillama_slug(&self) -> &'static str {
        match self {
            Self::Ethereum => "ethereum",
            Self::Base => "base",
            Self::Arbitrum => "arbitrum",
            Self::Optimism => "optimism",
            Self::Polygon => "polygon",
            Self::Bsc => "bsc",
            Self::Avalanche => "avax",
            Self::Solana => "solana",
            Self::Blast => "blast",
        }
    }

    /// `chainId` field in DexScreener pair payloads.
    pub fn dexscreener_id(&self) -> &'static str {
        match self {
            Self::Ethereum => "ethereum",
            Self::Base => "base",
            Self::Arbitrum => "arbitrum",
            Self::Optimism => "optimism",
            Self::Polygon => "polygon",
            Self::Bsc => "bsc",
            Self::Avalanche => "avalanche",
            Self::Solana => "solana",
            Self::Blast => "blast",
        }
    }

    /// CoinGecko asset platform id (used by the NFT endpoints).
    pub fn coingecko_platform(&self) -> &'static str {
        match self {
            Self::Ethereum => "ethereum",
            Self::Base => "base",
            Self::Arbitrum => "arbitrum-one",
            Self::Optimism => "optimistic-ethereum",
            Self::Polygon => "polygon-pos",
            Self::Bsc => "binance-smart-chain",
            Self::Avalanche => "avalanche",
            Self::Solana => "solana",
            Self::Blast => "blast",
        }
    }

    /// Reservoir API host for this chain, if Reservoir indexes it.
    pub fn reservoir_host(&self) -> Option<&'static str> {
        match self {
            Self::Ethereum => Some("https://api.reservoir.tools"),
            Self::Base => Some("https://api-base.reservoir.tools"),
            Self::Arbitrum => Some("https://api-arbitrum.reservoir.tools"),
            Self::Optimism => Some("https://api-optimism.reservoir.tools"),
            Self::Polygon => Some("https://api-polygon.reservoir.tools"),
            Self::Bsc => Some("https://api-bsc.reservoir.tools"),
            Self::Avalanche => Some("https://api-avalanche.reservoir.tools"),
            Self::Blast => Some("https://api-blast.reservoir.tools"),
            Self::Solana => None,
        }
    }

    /// OpenSea chain identifier.
    pub fn opensea_slug(&self) -> &'static str {
        match self {
            Self::Ethereum => "ethereum",
            Self::Base => "base",
            Self::Arbitrum => "arbitrum",
            Self::Optimism => "optimism",
            Self::Polygon => "matic",
            Self::Bsc => "bsc",
            Self::Avalanche => "avalanche",
            Self::Solana => "solana",
            Self::Blast => "blast",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of asset a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Contract,
    Coin,
    NftCollection,
}

/// Reference to a priced asset.
///
/// Addresses and ids keep the caller's spelling (some chains are case
/// sensitive on the wire) but compare and hash ASCII case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetReference {
    Contract { chain: Chain, address: String },
    Coin { provider_id: String },
    NftCollection { chain: Chain, address: String },
}

impl AssetReference {
    pub fn contract(chain: Chain, address: impl Into<String>) -> Self {
        Self::Contract {
            chain,
            address: address.into().trim().to_string(),
        }
    }

    pub fn coin(provider_id: impl Into<String>) -> Self {
        Self::Coin {
            provider_id: provider_id.into().trim().to_string(),
        }
    }

    pub fn nft(chain: Chain, address: impl Into<String>) -> Self {
        Self::NftCollection {
            chain,
            address: address.into().trim().to_string(),
        }
    }

    /// Parse `token:<chain>:<address>`, `coin:<id>` or `nft:<chain>:<address>`.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().splitn(3, ':').collect();
        let invalid = || AppError::InvalidInput(format!("unrecognised asset reference: {}", s));

        match parts.as_slice() {
            ["coin", id] if !id.is_empty() => Ok(Self::coin(*id)),
            [kind @ ("token" | "contract" | "nft"), chain, address] if !address.is_empty() => {
                let chain = Chain::from_str(chain)
                    .ok_or_else(|| AppError::InvalidInput(format!("unknown chain: {}", chain)))?;
                if *kind == "nft" {
                    Ok(Self::nft(chain, *address))
                } else {
                    Ok(Self::contract(chain, *address))
                }
            }
            _ => Err(invalid()),
        }
    }

    pub fn kind(&self) -> AssetKind {
        match self {
            Self::Contract { .. } => AssetKind::Contract,
            Self::Coin { .. } => AssetKind::Coin,
            Self::NftCollection { .. } => AssetKind::NftCollection,
        }
    }

    pub fn chain(&self) -> Option<Chain> {
        match self {
            Self::Contract { chain, .. } | Self::NftCollection { chain, .. } => Some(*chain),
            Self::Coin { .. } => None,
        }
    }

    /// Normalized identity used in cache keys.
    pub fn cache_id(&self) -> String {
        match self {
            Self::Contract { chain, address } => {
                format!("contract:{}:{}", chain, address.to_ascii_lowercase())
            }
            Self::Coin { provider_id } => format!("coin:{}", provider_id.to_ascii_lowercase()),
            Self::NftCollection { chain, address } => {
                format!("nft:{}:{}", chain, address.to_ascii_lowercase())
            }
        }
    }

    /// Same asset with its address or id lower-cased. Equal references
    /// display identically once normalized.
    pub fn normalized(&self) -> Self {
        match self {
            Self::Contract { chain, address } => {
                Self::contract(*chain, address.to_ascii_lowercase())
            }
            Self::Coin { provider_id } => Self::coin(provider_id.to_ascii_lowercase()),
            Self::NftCollection { chain, address } => {
                Self::nft(*chain, address.to_ascii_lowercase())
            }
        }
    }
}

impl PartialEq for AssetReference {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Contract { chain: a, address: x },
                Self::Contract { chain: b, address: y },
            )
            | (
                Self::NftCollection { chain: a, address: x },
                Self::NftCollection { chain: b, address: y },
            ) => a == b && x.eq_ignore_ascii_case(y),
            (Self::Coin { provider_id: x }, Self::Coin { provider_id: y }) => {
                x.eq_ignore_ascii_case(y)
            }
            _ => false,
        }
    }
}

impl Eq for AssetReference {}

impl Hash for AssetReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cache_id().hash(state);
    }
}

impl fmt::Display for AssetReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contract { chain, address } => write!(f, "token:{}:{}", chain, address),
            Self::Coin { provider_id } => write!(f, "coin:{}", provider_id),
            Self::NftCollection { chain, address } => write!(f, "nft:{}:{}", chain, address),
        }
    }
}
