//! # Ingestion Orchestrator
//!
//! Drives one contract's event ingestion through
//! `Bootstrapping -> Backfilling -> Live -> Terminated`.
//!
//! ## Phases
//!
//! - **Bootstrapping**: connect the node and the database, prepare the schema, build the
//!   topic filter from the contract schema, open the live subscription.
//! - **Backfilling** (optional): one historical query over the configured range. Every
//!   returned log goes through [`Pipeline::process`]. Decode failures are skipped.
//! - **Live**: push each subscribed log through the same [`Pipeline::process`] while
//!   watching the subscription's error channel.
//! - **Terminated**: any source failure, subscription drop or storage failure ends
//!   ingestion. [`Orchestrator::run`] hands the triggering error back to the caller.
//!
//! The subscription is opened before the chain head is read for an open-ended backfill.
//! Logs mined while the backfill runs wait in the subscription buffer, so there is no gap
//! between the two phases. Logs seen by both phases converge to one row under the
//! event-identity key scheme.
//!
//! Records are processed one at a time in delivery order. All historical records are
//! written before the first live record is processed. When the subscription fails, logs
//! it already delivered are stored before ingestion terminates.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lot_event_indexer::{orchestrator::Orchestrator, settings::Settings};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let settings = Settings::new()?;
//! let mut orchestrator = Orchestrator::bootstrap(&settings).await?;
//! orchestrator.run().await?;
//! # Ok(())
//! # }
//! ```

use crate::{
    contracts::ContractSchema,
    database,
    error::{IngestError, StorageError},
    event_classifier::EventClassifier,
    event_decoder::EventDecoder,
    event_store::{EventStore, PgEventStore},
    log_source::{EthersLogSource, LiveSubscription, LogFilter, LogSource},
    pipeline::{Pipeline, PipelineStats},
    settings::Settings,
    types::BlockRange,
};
use ethers::types::Address;
use log::{error, info, warn};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionState {
    Bootstrapping,
    Backfilling,
    Live,
    Terminated,
}

impl fmt::Display for IngestionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestionState::Bootstrapping => "Bootstrapping",
            IngestionState::Backfilling => "Backfilling",
            IngestionState::Live => "Live",
            IngestionState::Terminated => "Terminated",
        };
        f.write_str(name)
    }
}

/// Historical range to ingest before going live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillPlan {
    pub from_block: u64,
    /// `None`: the chain head when Backfilling starts
    pub to_block: Option<u64>,
}

pub struct Orchestrator {
    source: Arc<dyn LogSource>,
    pipeline: Pipeline,
    filter: LogFilter,
    backfill: Option<BackfillPlan>,
    state: IngestionState,
    backfill_stats: Option<PipelineStats>,
}

impl Orchestrator {
    /// The log filter covers `contract` and every topic the pipeline's classifier knows
    pub fn new(source: Arc<dyn LogSource>, pipeline: Pipeline, contract: Address) -> Self {
        let filter = LogFilter::new(contract, pipeline.classifier().topic_filter());
        Self {
            source,
            pipeline,
            filter,
            backfill: None,
            state: IngestionState::Bootstrapping,
            backfill_stats: None,
        }
    }

    pub fn with_backfill(mut self, plan: BackfillPlan) -> Self {
        self.backfill = Some(plan);
        self
    }

    /// Bootstrapping: wire the production collaborators from settings
    pub async fn bootstrap(settings: &Settings) -> Result<Self, IngestError> {
        settings.validate()?;
        let contract = settings.contract_address()?;

        info!("🚀 [Orchestrator] Bootstrapping indexer for contract {:?}", contract);

        let schema = ContractSchema::lot_game()?;
        let classifier = EventClassifier::new(&schema)?;
        let decoder = EventDecoder::new(&schema, settings.storage.key_scheme)?;
        info!(
            "🔍 [Orchestrator] Contract schema loaded, {} topics registered (key scheme {:?})",
            classifier.topic_filter().len(),
            decoder.key_scheme()
        );

        let pool = database::connect(&settings.database)
            .await
            .map_err(|e| StorageError::Unavailable(format!("{:#}", e)))?;
        let store: Arc<dyn EventStore> = Arc::new(PgEventStore::new(pool));

        let source = EthersLogSource::new(
            &settings.rpc.http_url,
            &settings.rpc.ws_url,
            settings.backfill.chunk_size,
            settings.live.channel_capacity,
            settings.request_timeout(),
        )?;
        let head = source.latest_block().await?;
        info!("✅ [Orchestrator] Node reachable, chain head {}", head);

        let mut orchestrator = Self::new(
            Arc::new(source),
            Pipeline::new(classifier, decoder, store),
            contract,
        );
        if settings.backfill.enabled {
            orchestrator = orchestrator.with_backfill(BackfillPlan {
                from_block: settings.backfill.from_block,
                to_block: settings.backfill.to_block,
            });
        } else {
            info!("[Orchestrator] Backfill disabled, going straight to live");
        }
        Ok(orchestrator)
    }

    pub fn state(&self) -> IngestionState {
        self.state
    }

    /// Counters of the phase in progress
    pub fn stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    /// Counters of the finished backfill, if one ran
    pub fn backfill_stats(&self) -> Option<PipelineStats> {
        self.backfill_stats
    }

    fn transition(&mut self, next: IngestionState) {
        info!("🔄 [Orchestrator] {} -> {}", self.state, next);
        self.state = next;
    }

    /// Run backfill (if planned), then live ingestion, until a fatal error.
    ///
    /// The live feed has no end, so this only returns once ingestion is `Terminated`,
    /// carrying the error that caused it.
    pub async fn run(&mut self) -> Result<(), IngestError> {
        let result = self.ingest().await;
        if let Err(e) = &result {
            error!("❌ [Orchestrator] Fatal: {}", e);
        }
        self.transition(IngestionState::Terminated);
        result
    }

    async fn ingest(&mut self) -> Result<(), IngestError> {
        // Subscribe first: logs mined during the backfill buffer in the subscription
        let subscription = self.source.subscribe_live(&self.filter).await?;

        if let Some(plan) = self.backfill {
            self.transition(IngestionState::Backfilling);
            self.backfill(plan).await?;
        }

        self.transition(IngestionState::Live);
        self.run_live(subscription).await
    }

    async fn backfill(&mut self, plan: BackfillPlan) -> Result<(), IngestError> {
        let to_block = match plan.to_block {
            Some(to) => to,
            None => {
                let head = self.source.latest_block().await?;
                info!("[Orchestrator] Open-ended backfill resolved to chain head {}", head);
                head
            }
        };

        let Some(range) = BlockRange::new(plan.from_block, to_block) else {
            warn!(
                "⚠️ [Orchestrator] Backfill start {} is past end {}, nothing to backfill",
                plan.from_block, to_block
            );
            return Ok(());
        };

        info!("📦 [Orchestrator] Backfilling blocks {}", range);
        let logs = self.source.fetch_historical(&self.filter, range).await?;

        for raw in logs {
            self.pipeline.process(raw).await?;
        }

        let stats = self.pipeline.take_stats();
        info!("✅ [Orchestrator] Backfill of {} complete: {}", range, stats);
        self.backfill_stats = Some(stats);
        Ok(())
    }

    async fn run_live(&mut self, mut subscription: LiveSubscription) -> Result<(), IngestError> {
        info!("📡 [Orchestrator] Live ingestion started");
        loop {
            tokio::select! {
                biased;

                Some(err) = subscription.errors.recv() => {
                    self.drain_delivered(&mut subscription).await?;
                    return Err(err);
                }
                next = subscription.logs.recv() => match next {
                    Some(raw) => {
                        self.pipeline.process(raw).await?;
                    }
                    None => {
                        return Err(IngestError::SourceUnavailable(
                            "live log stream closed".to_string(),
                        ));
                    }
                },
            }
        }
    }

    /// Store logs the subscription delivered before it failed
    async fn drain_delivered(
        &mut self,
        subscription: &mut LiveSubscription,
    ) -> Result<(), IngestError> {
        let mut drained = 0usize;
        while let Ok(raw) = subscription.logs.try_recv() {
            self.pipeline.process(raw).await?;
            drained += 1;
        }
        if drained > 0 {
            info!(
                "[Orchestrator] Stored {} buffered live logs before terminating",
                drained
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_decoder::KeyScheme;
    use crate::event_store::MemoryEventStore;
    use crate::types::RawLog;
    use async_trait::async_trait;

    struct HeadOnlySource {
        head: u64,
    }

    #[async_trait]
    impl LogSource for HeadOnlySource {
        async fn latest_block(&self) -> Result<u64, IngestError> {
            Ok(self.head)
        }

        async fn fetch_historical(
            &self,
            _filter: &LogFilter,
            range: BlockRange,
        ) -> Result<Vec<RawLog>, IngestError> {
            assert_eq!(range.to, self.head);
            Ok(vec![])
        }

        async fn subscribe_live(
            &self,
            _filter: &LogFilter,
        ) -> Result<LiveSubscription, IngestError> {
            // Senders dropped: the feed is closed from the start
            let (_, _, subscription) = LiveSubscription::channel(1);
            Ok(subscription)
        }
    }

    /// Websocket endpoint refuses the subscription; history must never be queried
    struct NoWebsocketSource;

    #[async_trait]
    impl LogSource for NoWebsocketSource {
        async fn latest_block(&self) -> Result<u64, IngestError> {
            Ok(100)
        }

        async fn fetch_historical(
            &self,
            _filter: &LogFilter,
            _range: BlockRange,
        ) -> Result<Vec<RawLog>, IngestError> {
            panic!("backfill ran without a live subscription");
        }

        async fn subscribe_live(
            &self,
            _filter: &LogFilter,
        ) -> Result<LiveSubscription, IngestError> {
            Err(IngestError::SourceUnavailable("websocket refused".to_string()))
        }
    }

    fn orchestrator(source: Arc<dyn LogSource>) -> Orchestrator {
        let schema = ContractSchema::lot_game().unwrap();
        let pipeline = Pipeline::new(
            EventClassifier::new(&schema).unwrap(),
            EventDecoder::new(&schema, KeyScheme::EventIdentity).unwrap(),
            Arc::new(MemoryEventStore::new()),
        );
        Orchestrator::new(source, pipeline, Address::repeat_byte(0xdb))
    }

    #[test]
    fn test_starts_bootstrapping_with_contract_filter() {
        let orchestrator = orchestrator(Arc::new(HeadOnlySource { head: 0 }));
        assert_eq!(orchestrator.state(), IngestionState::Bootstrapping);
        assert_eq!(orchestrator.filter.address, Address::repeat_byte(0xdb));
        assert_eq!(orchestrator.filter.topics.len(), 3);
    }

    #[tokio::test]
    async fn test_open_ended_backfill_uses_chain_head() {
        let mut orchestrator = orchestrator(Arc::new(HeadOnlySource { head: 900 }))
            .with_backfill(BackfillPlan {
                from_block: 800,
                to_block: None,
            });

        let result = orchestrator.run().await;

        assert!(matches!(result, Err(IngestError::SourceUnavailable(_))));
        assert_eq!(orchestrator.state(), IngestionState::Terminated);
        assert_eq!(orchestrator.backfill_stats(), Some(PipelineStats::default()));
    }

    #[tokio::test]
    async fn test_start_past_head_skips_backfill() {
        let mut orchestrator = orchestrator(Arc::new(HeadOnlySource { head: 10 }))
            .with_backfill(BackfillPlan {
                from_block: 50,
                to_block: None,
            });

        let _ = orchestrator.run().await;
        assert_eq!(orchestrator.backfill_stats(), None);
        assert_eq!(orchestrator.state(), IngestionState::Terminated);
    }

    #[tokio::test]
    async fn test_subscription_failure_stops_before_backfill() {
        let mut orchestrator = orchestrator(Arc::new(NoWebsocketSource)).with_backfill(
            BackfillPlan {
                from_block: 0,
                to_block: Some(100),
            },
        );

        let result = orchestrator.run().await;

        assert!(matches!(result, Err(IngestError::SourceUnavailable(_))));
        assert_eq!(orchestrator.backfill_stats(), None);
        assert_eq!(orchestrator.state(), IngestionState::Terminated);
    }
}
