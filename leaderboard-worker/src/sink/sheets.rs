use std::time;

use async_trait::async_trait;
use reqwest::header;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::error::SinkError;
use crate::report::ReportTable;

/// A worksheet that the report is published to. `clear` always comes before `update`.
#[async_trait]
pub trait SpreadsheetSink: Send + Sync {
    /// Remove every value from the worksheet.
    async fn clear(&self) -> Result<(), SinkError>;

    /// Write `table` starting at cell A1.
    async fn update(&self, table: &ReportTable) -> Result<(), SinkError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRange<'a> {
    range: &'a str,
    major_dimension: &'static str,
    values: &'a ReportTable,
}

/// `SpreadsheetSink` backed by the Google Sheets v4 values API.
pub struct GoogleSheets {
    base_url: Url,
    spreadsheet_id: String,
    worksheet: String,
    /// Carries the bearer token as a default header.
    client: reqwest::Client,
}

impl GoogleSheets {
    pub fn new(
        base_url: &str,
        spreadsheet_id: &str,
        worksheet: &str,
        access_token: &str,
        request_timeout: time::Duration,
    ) -> Result<Self, SinkError> {
        let base_url = Url::parse(base_url)?;

        let mut authorization = header::HeaderValue::from_str(&format!("Bearer {}", access_token))
            .map_err(|_| SinkError::InvalidToken)?;
        authorization.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, authorization);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent("leaderboard-worker")
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            base_url,
            spreadsheet_id: spreadsheet_id.to_owned(),
            worksheet: worksheet.to_owned(),
            client,
        })
    }

    /// Build `{base}/spreadsheets/{id}/values/{last_segment}`, percent-encoding each segment.
    fn values_url(&self, last_segment: &str) -> Result<Url, SinkError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(["spreadsheets", &self.spreadsheet_id, "values", last_segment]);
        Ok(url)
    }

    fn range(&self) -> String {
        format!("{}!A1", self.worksheet)
    }

    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<(), SinkError> {
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::UnexpectedStatus {
                operation,
                status,
                body,
            });
        }

        debug!(operation, %status, worksheet = %self.worksheet, "spreadsheet request succeeded");
        Ok(())
    }
}

#[async_trait]
impl SpreadsheetSink for GoogleSheets {
    async fn clear(&self) -> Result<(), SinkError> {
        let url = self.values_url(&format!("{}:clear", self.worksheet))?;

        self.send("clear", self.client.post(url).json(&serde_json::json!({})))
            .await
    }

    async fn update(&self, table: &ReportTable) -> Result<(), SinkError> {
        let range = self.range();
        let url = self.values_url(&range)?;
        let body = ValueRange {
            range: &range,
            major_dimension: "ROWS",
            values: table,
        };

        let request = self
            .client
            .put(url)
            .query(&[("valueInputOption", "RAW")])
            .json(&body);

        self.send("update", request).await
    }
}
