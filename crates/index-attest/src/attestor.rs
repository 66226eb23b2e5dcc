//! The Attestor: drives the checksum pipeline.
//!
//! Each step plans the chunk following the last published one, waits until
//! the source index has finalized it, hashes an isolated copy and publishes
//! the result. The repository is only written after a digest succeeds, so a
//! failed chunk leaves it unchanged.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use index_attest_core::{ChecksumRecord, Epoch, EpochRange, Gap};
use index_attest_store::{
    ChecksumRepository, ChecksumRepositoryExt, ChunkDigest, Checksummer, PublishOutcome,
    SourceIndex, SqliteChecksumRepo,
};

use crate::config::AttestConfig;
use crate::error::Result;

/// Pipeline tuning.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Epochs the source head must be past `stop` before a chunk is hashed.
    pub finality_margin: u64,
    /// Run the startup gap scans.
    pub check_for_gaps: bool,
    /// Wait between attempts while the next chunk is not ready.
    pub poll_interval: Duration,
    /// Whether the repository held data before this process opened it.
    pub repo_existed: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            finality_margin: 0,
            check_for_gaps: false,
            poll_interval: Duration::from_secs(30),
            repo_existed: false,
        }
    }
}

/// Why the next chunk cannot be hashed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotReady {
    /// The source index has no messages at all.
    EmptySource,
    /// The ingestor has not moved far enough past the chunk.
    SourceBehind { head: Epoch, needed: Epoch },
    /// Epochs inside the chunk are missing from the source.
    SourceGaps(Vec<Gap>),
}

/// Result of one pipeline step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    Published {
        record: ChecksumRecord,
        outcome: PublishOutcome,
        message_count: u64,
    },
    NotReady {
        range: EpochRange,
        reason: NotReady,
    },
}

/// Gaps found in both stores over the same span.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GapReport {
    /// The scanned span, `None` when the repository was empty.
    pub span: Option<EpochRange>,
    /// Unpublished chunks.
    pub repo: Vec<Gap>,
    /// Epochs missing from the source index.
    pub source: Vec<Gap>,
}

impl GapReport {
    pub fn is_clean(&self) -> bool {
        self.repo.is_empty() && self.source.is_empty()
    }
}

/// Drives chunk planning, hashing and publishing against one repository.
pub struct Attestor<R: ChecksumRepository> {
    source: SourceIndex,
    checksummer: Checksummer,
    repo: Arc<R>,
    settings: PipelineSettings,
}

impl Attestor<SqliteChecksumRepo> {
    /// Open the source index and the SQLite repository named in `config`.
    ///
    /// A missing or malformed source index is fatal. The repository is
    /// created if it does not exist yet.
    pub fn open(config: &AttestConfig) -> Result<Self> {
        config.validate()?;
        let source = SourceIndex::open(config.source_path()?)?;
        let repo = SqliteChecksumRepo::open(config.repo_path()?, config.checksum.chunk_size)?;

        let settings = PipelineSettings {
            finality_margin: config.checksum.finality_margin,
            check_for_gaps: config.checksum.check_for_gaps,
            poll_interval: config.poll_interval(),
            repo_existed: repo.existed(),
        };
        Ok(Self::new(source, repo, settings))
    }
}

impl<R: ChecksumRepository> Attestor<R> {
    pub fn new(source: SourceIndex, repo: R, settings: PipelineSettings) -> Self {
        let checksummer = Checksummer::new(source.path());
        Self {
            source,
            checksummer,
            repo: Arc::new(repo),
            settings,
        }
    }

    /// Use `checksummer` for hashing instead of the default one.
    pub fn with_checksummer(mut self, checksummer: Checksummer) -> Self {
        self.checksummer = checksummer;
        self
    }

    pub fn repo(&self) -> &Arc<R> {
        &self.repo
    }

    pub fn source(&self) -> &SourceIndex {
        &self.source
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Planning
    // ─────────────────────────────────────────────────────────────────────────

    /// First epoch not yet covered by a published chunk.
    pub async fn next_chunk_start(&self) -> Result<Epoch> {
        Ok(self.repo.next_start().await?)
    }

    pub async fn plan_next_chunk(&self) -> Result<EpochRange> {
        Ok(self.repo.plan_next_chunk().await?)
    }

    /// `None` when `range` is finalized in the source index.
    pub async fn readiness(&self, range: EpochRange) -> Result<Option<NotReady>> {
        let Some(head) = self.source.head().await? else {
            return Ok(Some(NotReady::EmptySource));
        };

        let needed = range
            .stop()
            .saturating_add(self.settings.finality_margin)
            .saturating_add(1);
        if head < needed {
            return Ok(Some(NotReady::SourceBehind { head, needed }));
        }

        let gaps = self.source.find_gaps(range).await?;
        if !gaps.is_empty() {
            return Ok(Some(NotReady::SourceGaps(gaps)));
        }
        Ok(None)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Hashing and publishing
    // ─────────────────────────────────────────────────────────────────────────

    /// Plan, check, hash and publish the next chunk.
    pub async fn process_next_chunk(&self) -> Result<ChunkOutcome> {
        let range = self.plan_next_chunk().await?;

        if let Some(reason) = self.readiness(range).await? {
            tracing::debug!(start = range.start(), stop = range.stop(), ?reason, "chunk not ready");
            return Ok(ChunkOutcome::NotReady { range, reason });
        }

        let digest = self.checksummer.checksum(range).await?;
        let record = ChecksumRecord::new(range, digest.hash);
        let outcome = self.repo.publish(&record).await?;

        tracing::info!(
            start = range.start(),
            stop = range.stop(),
            messages = digest.message_count,
            hash = %digest.hash,
            "published chunk checksum"
        );
        Ok(ChunkOutcome::Published {
            record,
            outcome,
            message_count: digest.message_count,
        })
    }

    /// Hash an arbitrary range without publishing it.
    pub async fn checksum_range(&self, range: EpochRange) -> Result<ChunkDigest> {
        Ok(self.checksummer.checksum(range).await?)
    }

    /// Recompute `range` and publish the result, replacing any existing record.
    pub async fn republish(&self, range: EpochRange) -> Result<(ChecksumRecord, PublishOutcome)> {
        if let Some(reason) = self.readiness(range).await? {
            tracing::warn!(
                start = range.start(),
                stop = range.stop(),
                ?reason,
                "republishing a range the source has not finalized"
            );
        }

        let digest = self.checksummer.checksum(range).await?;
        let record = ChecksumRecord::new(range, digest.hash);
        let outcome = self.repo.publish(&record).await?;
        tracing::info!(
            start = range.start(),
            stop = range.stop(),
            hash = %digest.hash,
            ?outcome,
            "republished chunk checksum"
        );
        Ok((record, outcome))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Gap checks
    // ─────────────────────────────────────────────────────────────────────────

    /// Scan both stores over `[0, last published stop]`.
    pub async fn scan_gaps(&self) -> Result<GapReport> {
        let Some(last) = self.repo.last_published_stop().await? else {
            return Ok(GapReport::default());
        };
        let span = EpochRange::new(0, last)?;

        let report = GapReport {
            span: Some(span),
            repo: self.repo.find_gaps(span).await?,
            source: self.source.find_gaps(span).await?,
        };

        for gap in &report.repo {
            tracing::warn!(start = gap.start, stop = gap.stop, "unpublished chunks in repository");
        }
        for gap in &report.source {
            tracing::warn!(start = gap.start, stop = gap.stop, "epochs missing from source index");
        }
        if report.is_clean() {
            tracing::info!(start = span.start(), stop = span.stop(), "no gaps found");
        }
        Ok(report)
    }

    /// The startup check: runs only when enabled and the repository pre-existed.
    pub async fn startup_gap_check(&self) -> Result<Option<GapReport>> {
        if !self.settings.check_for_gaps || !self.settings.repo_existed {
            return Ok(None);
        }
        self.scan_gaps().await.map(Some)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Service loop
    // ─────────────────────────────────────────────────────────────────────────

    /// Process chunks until `shutdown` becomes true or its sender is dropped.
    ///
    /// Waits `poll_interval` whenever the next chunk is not ready. An error
    /// from a chunk ends the loop and is returned.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        tracing::info!(
            chunk_size = self.repo.chunk_size(),
            finality_margin = self.settings.finality_margin,
            "checksum pipeline started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.process_next_chunk().await {
                Ok(ChunkOutcome::Published { .. }) => {}
                Ok(ChunkOutcome::NotReady { .. }) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.settings.poll_interval) => {}
                        _ = stopped(&mut shutdown) => break,
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "checksum pipeline stopped");
                    return Err(e);
                }
            }
        }

        tracing::info!("checksum pipeline shut down");
        Ok(())
    }
}

/// Resolves once shutdown is requested or the sender is gone.
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
