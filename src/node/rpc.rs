//! HTTP client for a monerod-style daemon RPC.
//!
//! Uses the daemon's JSON-RPC endpoint (`/json_rpc`) for `get_block_count`,
//! `get_block`, `get_output_histogram` and `get_fee_estimate`, and the plain
//! JSON endpoints for transactions, the pool, outputs and submission.

use super::{NodeError, NodeInterface, NodeResult, TransactionSubmitter, TxLookup};
use crate::codec::TransactionDecoder;
use crate::types::{
    Block, Commitment, Hash, MempoolEntry, OutputInfo, OutsForAmount, PublicKey, RandomOutput,
};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// JSON-RPC error code for a height above the chain top.
const RPC_ERROR_TOO_BIG_HEIGHT: i64 = -2;

/// Block fetches kept in flight by [`RpcNodeClient::blocks_in_range`].
const BLOCK_FETCH_CONCURRENCY: usize = 8;

/// Configuration for [`RpcNodeClient`].
#[derive(Debug, Clone)]
pub struct RpcNodeConfig {
    /// Daemon base URL, e.g. `http://127.0.0.1:18081`.
    pub daemon_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for RpcNodeConfig {
    fn default() -> Self {
        Self {
            daemon_url: "http://127.0.0.1:18081".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Node interface backed by daemon RPC calls.
pub struct RpcNodeClient {
    http: reqwest::Client,
    base_url: String,
    decoder: Arc<dyn TransactionDecoder>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcEnvelope<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct BlockCountResult {
    count: u64,
    status: String,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    hash: String,
    height: u64,
    timestamp: u64,
}

#[derive(Debug, Deserialize)]
struct BlockResult {
    block_header: BlockHeader,
    miner_tx_hash: String,
    #[serde(default)]
    tx_hashes: Vec<String>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct FeeEstimateResult {
    fee: u64,
    status: String,
}

#[derive(Debug, Deserialize)]
struct HistogramEntry {
    amount: u64,
    unlocked_instances: u64,
}

#[derive(Debug, Deserialize)]
struct OutputHistogramResult {
    #[serde(default)]
    histogram: Vec<HistogramEntry>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct TxEntry {
    tx_hash: String,
    as_hex: String,
    #[serde(default)]
    in_pool: bool,
    #[serde(default)]
    output_indices: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct GetTransactionsResponse {
    #[serde(default)]
    txs: Vec<TxEntry>,
    #[serde(default)]
    missed_tx: Vec<String>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct PoolEntry {
    tx_blob: String,
}

#[derive(Debug, Deserialize)]
struct GetPoolResponse {
    #[serde(default)]
    transactions: Vec<PoolEntry>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct OutEntry {
    key: String,
    mask: String,
    unlocked: bool,
    height: u64,
    txid: String,
}

#[derive(Debug, Deserialize)]
struct GetOutsResponse {
    #[serde(default)]
    outs: Vec<OutEntry>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct SendRawTxResponse {
    status: String,
    #[serde(default)]
    reason: String,
}

impl RpcNodeClient {
    /// Create a client for the daemon at `config.daemon_url`.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: &RpcNodeConfig, decoder: Arc<dyn TransactionDecoder>) -> NodeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NodeError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.daemon_url.trim_end_matches('/').to_string(),
            decoder,
        })
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> NodeResult<T> {
        let url = format!("{}/{path}", self.base_url);
        debug!("POST {url}");

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| NodeError::Transport(format!("{path}: {e}")))?;

        response
            .json::<T>()
            .await
            .map_err(|e| NodeError::Parse(format!("{path}: {e}")))
    }

    async fn json_rpc<T: DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> NodeResult<T> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": "0",
            "method": method,
            "params": params,
        });

        let envelope: JsonRpcEnvelope<T> = self.post("json_rpc", body).await?;

        if let Some(err) = envelope.error {
            return Err(if err.code == RPC_ERROR_TOO_BIG_HEIGHT {
                NodeError::NotFound(format!("{method}: {}", err.message))
            } else {
                NodeError::Transport(format!("{method}: {} ({})", err.message, err.code))
            });
        }

        envelope
            .result
            .ok_or_else(|| NodeError::Parse(format!("{method}: response has no result")))
    }

    async fn get_transactions(&self, hashes: &[Hash]) -> NodeResult<GetTransactionsResponse> {
        let txs_hashes: Vec<String> = hashes.iter().map(Hash::to_hex).collect();
        let response: GetTransactionsResponse = self
            .post(
                "get_transactions",
                json!({ "txs_hashes": txs_hashes, "decode_as_json": false }),
            )
            .await?;
        check_status("get_transactions", &response.status)?;
        Ok(response)
    }
}

/// `get_transactions` also answers from the pool; only mined entries count.
fn first_confirmed(txs: Vec<TxEntry>) -> Option<TxEntry> {
    txs.into_iter().find(|entry| !entry.in_pool)
}

/// Run `fetch` for every height with a bounded number in flight, keeping
/// height order and stopping at the first failure.
async fn fetch_buffered<T, F, Fut>(heights: RangeInclusive<u64>, fetch: F) -> NodeResult<Vec<T>>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = NodeResult<T>>,
{
    futures::stream::iter(heights.map(fetch))
        .buffered(BLOCK_FETCH_CONCURRENCY)
        .try_collect()
        .await
}

/// Distinct random indices below each amount's unlocked output count.
fn draw_indices(amounts: &[u64], unlocked: &[u64], outs_count: u64) -> Vec<(u64, Vec<u64>)> {
    let mut rng = rand::thread_rng();
    amounts
        .iter()
        .zip(unlocked)
        .map(|(&amount, &available)| {
            let available = usize::try_from(available).unwrap_or(usize::MAX);
            let count = usize::try_from(outs_count).unwrap_or(usize::MAX).min(available);
            let mut indices: Vec<u64> = rand::seq::index::sample(&mut rng, available, count)
                .into_iter()
                .map(|i| i as u64)
                .collect();
            indices.sort_unstable();
            (amount, indices)
        })
        .collect()
}

fn check_status(call: &str, status: &str) -> NodeResult<()> {
    if status == "OK" {
        Ok(())
    } else {
        Err(NodeError::Transport(format!("{call}: daemon status {status}")))
    }
}

fn parse_hex<T: FromStr>(what: &str, s: &str) -> NodeResult<T> {
    s.parse()
        .map_err(|_| NodeError::Parse(format!("invalid {what}: {s}")))
}

fn decode_hex_blob(s: &str) -> NodeResult<Vec<u8>> {
    hex::decode(s).map_err(|e| NodeError::Parse(format!("invalid hex blob: {e}")))
}

#[async_trait]
impl NodeInterface for RpcNodeClient {
    async fn current_height(&self) -> NodeResult<u64> {
        let result: BlockCountResult = self.json_rpc("get_block_count", json!({})).await?;
        check_status("get_block_count", &result.status)?;
        Ok(result.count)
    }

    async fn block_at_height(&self, height: u64) -> NodeResult<Block> {
        let result: BlockResult = self
            .json_rpc("get_block", json!({ "height": height }))
            .await?;
        check_status("get_block", &result.status)?;

        let miner_tx_hash: Hash = parse_hex("miner tx hash", &result.miner_tx_hash)?;
        let tx_hashes = result
            .tx_hashes
            .iter()
            .map(|h| parse_hex("tx hash", h))
            .collect::<NodeResult<Vec<Hash>>>()?;

        let lookup = self.transactions_by_hash(&[miner_tx_hash]).await?;
        let Some((_, miner_tx)) = lookup.found.into_iter().next() else {
            return Err(NodeError::NotFound(format!(
                "miner tx {miner_tx_hash} of block {height}"
            )));
        };

        Ok(Block {
            height: result.block_header.height,
            hash: parse_hex("block hash", &result.block_header.hash)?,
            timestamp: result.block_header.timestamp,
            miner_tx,
            miner_tx_hash,
            tx_hashes,
        })
    }

    async fn blocks_in_range(&self, start: u64, end: u64) -> NodeResult<Vec<Block>> {
        if start > end {
            return Ok(Vec::new());
        }
        fetch_buffered(start..=end, |h| self.block_at_height(h)).await
    }

    async fn transactions_by_hash(&self, hashes: &[Hash]) -> NodeResult<TxLookup> {
        if hashes.is_empty() {
            return Ok(TxLookup::default());
        }

        let response = self.get_transactions(hashes).await?;

        let mut lookup = TxLookup::default();
        for entry in response.txs {
            let requested: Hash = parse_hex("tx hash", &entry.tx_hash)?;
            let blob = decode_hex_blob(&entry.as_hex)?;
            let (_, tx) = self
                .decoder
                .decode(&blob)
                .map_err(|e| NodeError::Parse(format!("tx {requested}: {e}")))?;
            lookup.found.push((requested, tx));
        }
        for missed in &response.missed_tx {
            lookup.missed.push(parse_hex("missed tx hash", missed)?);
        }

        Ok(lookup)
    }

    async fn tx_exists(&self, hash: &Hash) -> NodeResult<bool> {
        let response = self.get_transactions(std::slice::from_ref(hash)).await?;
        Ok(first_confirmed(response.txs).is_some())
    }

    async fn tx_amount_output_indices(&self, hash: &Hash) -> NodeResult<Vec<u64>> {
        let response = self.get_transactions(std::slice::from_ref(hash)).await?;
        first_confirmed(response.txs)
            .map(|entry| entry.output_indices)
            .ok_or_else(|| NodeError::NotFound(format!("confirmed tx {hash}")))
    }

    async fn output_tx_and_index(&self, amount: u64, global_index: u64) -> NodeResult<(Hash, u64)> {
        let outs = self
            .outputs_by_amount_and_index(&[(amount, global_index)])
            .await?;
        let Some(out) = outs.first() else {
            return Err(NodeError::NotFound(format!(
                "output {global_index} of amount {amount}"
            )));
        };

        let indices = self.tx_amount_output_indices(&out.tx_hash).await?;
        let local = indices
            .iter()
            .position(|&i| i == global_index)
            .ok_or_else(|| {
                NodeError::NotFound(format!(
                    "output {global_index} not among outputs of tx {}",
                    out.tx_hash
                ))
            })?;

        Ok((out.tx_hash, local as u64))
    }

    async fn outputs_by_amount_and_index(&self, requests: &[(u64, u64)]) -> NodeResult<Vec<OutputInfo>> {
        let outputs: Vec<_> = requests
            .iter()
            .map(|(amount, index)| json!({ "amount": amount, "index": index }))
            .collect();

        let response: GetOutsResponse = self
            .post("get_outs", json!({ "outputs": outputs, "get_txid": true }))
            .await?;
        check_status("get_outs", &response.status)?;

        if response.outs.len() != requests.len() {
            return Err(NodeError::NotFound(format!(
                "requested {} outputs, daemon returned {}",
                requests.len(),
                response.outs.len()
            )));
        }

        response
            .outs
            .iter()
            .map(|out| {
                Ok(OutputInfo {
                    key: parse_hex::<PublicKey>("output key", &out.key)?,
                    mask: parse_hex::<Commitment>("output mask", &out.mask)?,
                    unlocked: out.unlocked,
                    height: out.height,
                    tx_hash: parse_hex("output txid", &out.txid)?,
                })
            })
            .collect()
    }

    async fn random_outputs_for_amounts(&self, amounts: &[u64], outs_count: u64) -> NodeResult<Vec<OutsForAmount>> {
        if amounts.is_empty() {
            return Ok(Vec::new());
        }

        let result: OutputHistogramResult = self
            .json_rpc(
                "get_output_histogram",
                json!({ "amounts": amounts, "unlocked": true, "min_count": 0, "max_count": 0 }),
            )
            .await?;
        check_status("get_output_histogram", &result.status)?;

        let unlocked: Vec<u64> = amounts
            .iter()
            .map(|amount| {
                result
                    .histogram
                    .iter()
                    .find(|entry| entry.amount == *amount)
                    .map_or(0, |entry| entry.unlocked_instances)
            })
            .collect();
        let draws = draw_indices(amounts, &unlocked, outs_count);

        let requests: Vec<(u64, u64)> = draws
            .iter()
            .flat_map(|(amount, indices)| indices.iter().map(move |&index| (*amount, index)))
            .collect();
        let infos = if requests.is_empty() {
            Vec::new()
        } else {
            self.outputs_by_amount_and_index(&requests).await?
        };
        let mut infos = infos.into_iter();

        Ok(draws
            .into_iter()
            .map(|(amount, indices)| OutsForAmount {
                amount,
                outs: indices
                    .into_iter()
                    .zip(infos.by_ref())
                    .map(|(global_index, info)| RandomOutput {
                        global_index,
                        key: info.key,
                    })
                    .collect(),
            })
            .collect())
    }

    async fn mempool_entries(&self) -> NodeResult<Vec<MempoolEntry>> {
        let response: GetPoolResponse = self.post("get_transaction_pool", json!({})).await?;
        check_status("get_transaction_pool", &response.status)?;

        response
            .transactions
            .iter()
            .map(|entry| {
                Ok(MempoolEntry {
                    blob: decode_hex_blob(&entry.tx_blob)?.into(),
                })
            })
            .collect()
    }

    async fn fee_estimate(&self, grace_blocks: u64) -> NodeResult<u64> {
        let result: FeeEstimateResult = self
            .json_rpc("get_fee_estimate", json!({ "grace_blocks": grace_blocks }))
            .await?;
        check_status("get_fee_estimate", &result.status)?;
        Ok(result.fee)
    }
}

#[async_trait]
impl TransactionSubmitter for RpcNodeClient {
    async fn submit_transaction(&self, blob: &[u8], do_not_relay: bool) -> NodeResult<()> {
        let response: SendRawTxResponse = self
            .post(
                "send_raw_transaction",
                json!({ "tx_as_hex": hex::encode(blob), "do_not_relay": do_not_relay }),
            )
            .await?;

        if response.status != "OK" {
            warn!(
                "Daemon rejected transaction: {} ({})",
                response.status, response.reason
            );
            return Err(NodeError::Transport(if response.reason.is_empty() {
                response.status
            } else {
                response.reason
            }));
        }

        Ok(())
    }
}
