use std::path::PathBuf;
use std::sync::Arc;
use std::time;

use futures::TryStreamExt;
use tracing::{error, info};

use crate::config::Config;
use crate::engine::Aggregator;
use crate::error::{Phase, PipelineError, ProviderError, SinkError};
use crate::fetcher::MessageFetcher;
use crate::groupme::GroupMeClient;
use crate::report;
use crate::sink::{GoogleSheets, MessageLog, SpreadsheetSink};

/// Per-run parameters that don't belong to any single client.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub group_id: String,
    pub csv_path: PathBuf,
    /// Pause after every processed page, before the next page is requested.
    pub throttle: time::Duration,
    pub top_messages: usize,
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub pages: u32,
    pub messages: usize,
    pub senders: usize,
    /// Rows written to the worksheet, separator and headers included.
    pub report_rows: usize,
}

/// One full job: fetch everything, log it, aggregate it, publish the report.
pub struct Pipeline {
    fetcher: MessageFetcher,
    sink: Arc<dyn SpreadsheetSink>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        fetcher: MessageFetcher,
        sink: Arc<dyn SpreadsheetSink>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            fetcher,
            sink,
            settings,
        }
    }

    /// Wire up the GroupMe and Google Sheets clients described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let provider = GroupMeClient::new(
            &config.groupme_api_url,
            config.groupme_token.as_str(),
            config.page_size,
            config.request_timeout.0,
        )
        .map_err(|error| match error {
            ProviderError::InvalidToken => {
                PipelineError::ConfigError(envconfig::Error::ParseError { name: "TOKEN" })
            }
            source => PipelineError::FetchFailed {
                phase: Phase::Roster,
                attempts: 0,
                source,
            },
        })?;

        let sink = GoogleSheets::new(
            &config.sheets_api_url,
            config.spreadsheet_id.as_str(),
            config.worksheet.as_str(),
            config.sheets_access_token.as_str(),
            config.request_timeout.0,
        )
        .map_err(|error| match error {
            SinkError::InvalidToken => PipelineError::ConfigError(envconfig::Error::ParseError {
                name: "SHEETS_ACCESS_TOKEN",
            }),
            error => PipelineError::SinkWriteError(error),
        })?;

        Ok(Self::new(
            MessageFetcher::new(Arc::new(provider), config.retry_policy()),
            Arc::new(sink),
            PipelineSettings {
                group_id: config.group_id.as_str().to_owned(),
                csv_path: config.csv_path.clone(),
                throttle: config.throttle.0,
                top_messages: config.top_messages,
            },
        ))
    }

    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let start = time::Instant::now();

        let result = self.execute().await;

        let outcome = match &result {
            Ok(summary) => {
                info!(
                    group_id = %self.settings.group_id,
                    pages = summary.pages,
                    messages = summary.messages,
                    senders = summary.senders,
                    "leaderboard published"
                );
                "success"
            }
            Err(error) => {
                error!(
                    group_id = %self.settings.group_id,
                    kind = error.kind(),
                    phase = error.phase().map(tracing::field::display),
                    attempts = error.attempts(),
                    status = error.status().map(|status| status.as_u16()),
                    "leaderboard run failed: {}",
                    error
                );
                error.kind()
            }
        };

        metrics::counter!("leaderboard_runs_total", "outcome" => outcome).increment(1);
        metrics::histogram!("leaderboard_run_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        result
    }

    async fn execute(&self) -> Result<RunSummary, PipelineError> {
        let group_id = self.settings.group_id.as_str();

        // Truncated before any request, so a failed run never leaves the previous run's rows.
        let mut log = MessageLog::create(&self.settings.csv_path)?;

        let roster = self.fetcher.fetch_roster(group_id).await?;

        let mut aggregator = Aggregator::new(self.settings.top_messages);
        let mut pages = Box::pin(self.fetcher.fetch_all(group_id));
        let mut page_count = 0;

        while let Some(page) = pages.try_next().await? {
            let ingested = page.len();
            for message in page {
                log.append(&message)?;
                aggregator.ingest(message);
            }
            // Whatever was fetched before a later failure stays on disk.
            log.flush()?;

            page_count += 1;
            metrics::counter!("leaderboard_messages_ingested_total").increment(ingested as u64);

            tokio::time::sleep(self.settings.throttle).await;
        }

        let aggregation = aggregator.finish();
        info!(
            group_id,
            pages = page_count,
            messages = aggregation.total_messages,
            csv_path = %self.settings.csv_path.display(),
            "history fetched"
        );

        let table = report::build(&roster, &aggregation.leaderboard, &aggregation.top_messages);

        self.sink.clear().await?;
        self.sink.update(&table).await?;

        Ok(RunSummary {
            pages: page_count,
            messages: aggregation.total_messages,
            senders: aggregation.leaderboard.len(),
            report_rows: table.rows.len(),
        })
    }
}
