use crate::sources::{fetch_json, http_client, parse_number, PriceAdapter, SourceResult};
use crate::types::{is_valid_price, AssetReference, Chain, PriceSource};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct DexTokensResponse {
    #[serde(default)]
    pairs: Option<Vec<DexPair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexPair {
    chain_id: String,
    base_token: DexToken,
    price_usd: Option<serde_json::Value>,
    liquidity: Option<DexLiquidity>,
}

#[derive(Debug, Deserialize)]
struct DexToken {
    address: String,
}

#[derive(Debug, Deserialize)]
struct DexLiquidity {
    usd: Option<f64>,
}

/// DexScreener client: current USD price of long-tail contract tokens,
/// taken from the most liquid trading pair.
#[derive(Clone)]
pub struct DexScreenerClient {
    client: Client,
    base_url: String,
}

impl DexScreenerClient {
    /// Create a new DexScreener client.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

/// Price of the deepest pair quoting `address` as base token on `chain`.
fn best_pair_price(pairs: &[DexPair], chain: Chain, address: &str) -> Option<f64> {
    pairs
        .iter()
        .filter(|p| p.chain_id.eq_ignore_ascii_case(chain.dexscreener_id()))
        .filter(|p| p.base_token.address.eq_ignore_ascii_case(address))
        .filter_map(|p| {
            let price = p.price_usd.as_ref().and_then(parse_number)?;
            let liquidity = p.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
            is_valid_price(price).then_some((liquidity, price))
        })
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, price)| price)
}

#[async_trait]
impl PriceAdapter for DexScreenerClient {
    fn source(&self) -> PriceSource {
        PriceSource::DexScreener
    }

    async fn current_price(&self, asset: &AssetReference) -> SourceResult<Option<f64>> {
        let AssetReference::Contract { chain, address } = asset else {
            return Ok(None);
        };

        let url = format!("{}/latest/dex/tokens/{}", self.base_url, address);
        let Some(response) = fetch_json::<DexTokensResponse>(self.client.get(&url)).await? else {
            return Ok(None);
        };

        let pairs = response.pairs.unwrap_or_default();
        let price = best_pair_price(&pairs, *chain, address);
        debug!(
            "DexScreener {} on {}: {} pairs, best price {:?}",
            address,
            chain,
            pairs.len(),
            price
        );
        Ok(price)
    }
}
