//! # Log Source
//!
//! Acquires raw contract logs in two modes:
//!
//! - **Historical**: one bounded query over a closed block range (`eth_getLogs`), issued
//!   in ascending chunks and returned in node order.
//! - **Live**: an unbounded push subscription (`eth_subscribe("logs")`) over WebSocket,
//!   paired with an error channel that reports subscription-level failures.
//!
//! No decoding happens here. Failures are surfaced as [`IngestError::SourceUnavailable`];
//! whether to reconnect or terminate is the orchestrator's call.

use crate::error::IngestError;
use crate::types::{BlockRange, RawLog};
use async_trait::async_trait;
use ethers::prelude::{Http, Middleware, Provider, Ws};
use ethers::types::{Address, Filter, Log, H256};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

/// Address + primary-topic filter, always scoped to one contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub topics: Vec<H256>,
}

impl LogFilter {
    pub fn new(address: Address, topics: Vec<H256>) -> Self {
        Self { address, topics }
    }

    fn to_filter(&self) -> Filter {
        Filter::new()
            .address(self.address)
            .topic0(self.topics.clone())
    }

    fn to_range_filter(&self, range: BlockRange) -> Filter {
        self.to_filter().from_block(range.from).to_block(range.to)
    }
}

/// Live feed: ordered logs plus an asynchronous error channel.
///
/// The feed is not restartable. Once an error is delivered, or either channel closes,
/// the subscription is gone.
#[derive(Debug)]
pub struct LiveSubscription {
    pub logs: mpsc::Receiver<RawLog>,
    pub errors: mpsc::Receiver<IngestError>,
}

impl LiveSubscription {
    /// Channel pair for feeding a subscription by hand (scripted sources, replay)
    pub fn channel(
        capacity: usize,
    ) -> (
        mpsc::Sender<RawLog>,
        mpsc::Sender<IngestError>,
        LiveSubscription,
    ) {
        let (log_tx, logs) = mpsc::channel(capacity.max(1));
        let (err_tx, errors) = mpsc::channel(1);
        (log_tx, err_tx, LiveSubscription { logs, errors })
    }
}

/// Log acquisition boundary. Implementations do not decode.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Current chain head, used to close an open-ended backfill range
    async fn latest_block(&self) -> Result<u64, IngestError>;

    /// All matching logs in the closed range, in ascending block order
    async fn fetch_historical(
        &self,
        filter: &LogFilter,
        range: BlockRange,
    ) -> Result<Vec<RawLog>, IngestError>;

    /// Open a push subscription for new matching logs
    async fn subscribe_live(&self, filter: &LogFilter) -> Result<LiveSubscription, IngestError>;
}

/// ethers-rs backed source: HTTP for history, WebSocket for the live feed
pub struct EthersLogSource {
    http: Provider<Http>,
    ws_url: String,
    chunk_size: u64,
    channel_capacity: usize,
    request_timeout: Duration,
}

impl EthersLogSource {
    pub fn new(
        http_url: &str,
        ws_url: &str,
        chunk_size: u64,
        channel_capacity: usize,
        request_timeout: Duration,
    ) -> Result<Self, IngestError> {
        let http = Provider::<Http>::try_from(http_url).map_err(|e| {
            IngestError::Config(format!("invalid rpc.http_url {}: {}", http_url, e))
        })?;

        Ok(Self {
            http,
            ws_url: ws_url.to_string(),
            chunk_size: chunk_size.max(1),
            channel_capacity,
            request_timeout,
        })
    }

    async fn forward_live_logs(
        ws_url: String,
        filter: Filter,
        ready: oneshot::Sender<Result<(), IngestError>>,
        log_tx: mpsc::Sender<RawLog>,
        err_tx: mpsc::Sender<IngestError>,
    ) {
        let provider = match Provider::<Ws>::connect(&ws_url).await {
            Ok(provider) => provider,
            Err(e) => {
                let _ = ready.send(Err(IngestError::SourceUnavailable(format!(
                    "websocket connect to {} failed: {}",
                    ws_url, e
                ))));
                return;
            }
        };

        let mut stream = match provider.subscribe_logs(&filter).await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = ready.send(Err(IngestError::SourceUnavailable(format!(
                    "log subscription rejected: {}",
                    e
                ))));
                return;
            }
        };

        info!("✅ [LogSource] Subscribed to contract logs over {}", ws_url);
        if ready.send(Ok(())).is_err() {
            return;
        }

        while let Some(log) = stream.next().await {
            let Some(raw) = convert_log(log) else {
                continue;
            };
            debug!(
                "📡 [LogSource] Live log at block {} (tx {:?})",
                raw.block_number, raw.transaction_hash
            );
            if log_tx.send(raw).await.is_err() {
                debug!("[LogSource] Live consumer dropped, closing subscription");
                return;
            }
        }

        error!("❌ [LogSource] Live log subscription ended");
        let _ = err_tx
            .send(IngestError::SourceUnavailable(
                "live log subscription ended".to_string(),
            ))
            .await;
    }
}

#[async_trait]
impl LogSource for EthersLogSource {
    async fn latest_block(&self) -> Result<u64, IngestError> {
        match timeout(self.request_timeout, self.http.get_block_number()).await {
            Ok(Ok(number)) => Ok(number.as_u64()),
            Ok(Err(e)) => Err(IngestError::SourceUnavailable(format!(
                "eth_blockNumber failed: {}",
                e
            ))),
            Err(_) => Err(IngestError::SourceUnavailable(format!(
                "eth_blockNumber timed out after {:?}",
                self.request_timeout
            ))),
        }
    }

    async fn fetch_historical(
        &self,
        filter: &LogFilter,
        range: BlockRange,
    ) -> Result<Vec<RawLog>, IngestError> {
        let chunks = range.chunks(self.chunk_size);
        let mut logs = Vec::new();

        for chunk in &chunks {
            let range_filter = filter.to_range_filter(*chunk);
            let query = self.http.get_logs(&range_filter);
            let fetched = match timeout(self.request_timeout, query).await {
                Ok(Ok(fetched)) => fetched,
                Ok(Err(e)) => {
                    return Err(IngestError::SourceUnavailable(format!(
                        "eth_getLogs for blocks {} failed: {}",
                        chunk, e
                    )))
                }
                Err(_) => {
                    return Err(IngestError::SourceUnavailable(format!(
                        "eth_getLogs for blocks {} timed out after {:?}",
                        chunk, self.request_timeout
                    )))
                }
            };
            debug!(
                "📊 [LogSource] Fetched {} logs for blocks {}",
                fetched.len(),
                chunk
            );
            logs.extend(fetched.into_iter().filter_map(convert_log));
        }

        info!(
            "📊 [LogSource] Fetched {} historical logs for blocks {} in {} RPC calls",
            logs.len(),
            range,
            chunks.len()
        );
        Ok(logs)
    }

    async fn subscribe_live(&self, filter: &LogFilter) -> Result<LiveSubscription, IngestError> {
        let (log_tx, err_tx, subscription) = LiveSubscription::channel(self.channel_capacity);
        let (ready_tx, ready_rx) = oneshot::channel();

        tokio::spawn(Self::forward_live_logs(
            self.ws_url.clone(),
            filter.to_filter(),
            ready_tx,
            log_tx,
            err_tx,
        ));

        match ready_rx.await {
            Ok(Ok(())) => Ok(subscription),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(IngestError::SourceUnavailable(
                "live subscription task exited before subscribing".to_string(),
            )),
        }
    }
}

/// Logs without chain position (pending, or stripped by the node) cannot be keyed and are dropped
fn convert_log(log: Log) -> Option<RawLog> {
    match RawLog::try_from(log) {
        Ok(raw) => Some(raw),
        Err(e) => {
            warn!("⚠️ [LogSource] Dropping log: {}", e);
            None
        }
    }
}
