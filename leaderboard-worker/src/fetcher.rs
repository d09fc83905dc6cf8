use std::sync::Arc;

use futures::stream::{self, Stream};
use leaderboard_common::retry::RetryPolicy;
use tracing::{debug, info};

use crate::error::{Phase, PipelineError, ProviderError};
use crate::groupme::MessageProvider;
use crate::models::{Message, Roster};

/// Where the next page request starts.
#[derive(Debug, Default)]
struct PageCursor {
    /// Pages fetched so far.
    page: u32,
    /// Id of the oldest message seen so far; `None` before the first page.
    before_id: Option<String>,
}

/// Pulls a group's roster and complete message history, retrying rate-limited requests.
pub struct MessageFetcher {
    provider: Arc<dyn MessageProvider>,
    retry_policy: RetryPolicy,
}

impl MessageFetcher {
    pub fn new(provider: Arc<dyn MessageProvider>, retry_policy: RetryPolicy) -> Self {
        Self {
            provider,
            retry_policy,
        }
    }

    pub async fn fetch_roster(&self, group_id: &str) -> Result<Roster, PipelineError> {
        let provider = &self.provider;

        let members = self
            .retry_policy
            .retry(
                "list_group_members",
                || provider.list_group_members(group_id),
                ProviderError::is_rate_limited,
            )
            .await
            .map_err(|error| PipelineError::from_retry(Phase::Roster, error))?;

        info!(group_id, members = members.len(), "fetched roster");

        Ok(Roster::new(members))
    }

    /// Lazily page through the group's whole history, in the order the provider returns it.
    ///
    /// The stream is one-shot: it ends after the provider reports no more messages, or right after
    /// yielding the first error. Requests are only sent while the stream is polled, so pacing
    /// between pages is up to the consumer.
    pub fn fetch_all(
        &self,
        group_id: &str,
    ) -> impl Stream<Item = Result<Vec<Message>, PipelineError>> {
        let provider = self.provider.clone();
        let retry_policy = self.retry_policy;
        let group_id: Arc<str> = Arc::from(group_id);

        stream::try_unfold(PageCursor::default(), move |cursor| {
            next_page(provider.clone(), retry_policy, group_id.clone(), cursor)
        })
    }
}

async fn next_page(
    provider: Arc<dyn MessageProvider>,
    retry_policy: RetryPolicy,
    group_id: Arc<str>,
    cursor: PageCursor,
) -> Result<Option<(Vec<Message>, PageCursor)>, PipelineError> {
    let page = cursor.page + 1;
    let provider = &*provider;
    let group_id = &*group_id;
    let before_id = cursor.before_id.as_deref();

    let fetched = retry_policy
        .retry(
            "fetch_page",
            || fetch_messages(provider, group_id, before_id),
            ProviderError::is_rate_limited,
        )
        .await
        .map_err(|error| PipelineError::from_retry(Phase::Messages { page }, error))?;

    let Some(messages) = fetched else {
        debug!(group_id, page, "message history exhausted");
        return Ok(None);
    };

    metrics::counter!("leaderboard_pages_fetched_total").increment(1);
    debug!(group_id, page, messages = messages.len(), "fetched page");

    let next_before_id = messages.last().map(|message| message.id.clone());
    Ok(Some((
        messages,
        PageCursor {
            page,
            before_id: next_before_id,
        },
    )))
}

/// One page request, normalized. A malformed message fails the page like a bad response would.
async fn fetch_messages(
    provider: &dyn MessageProvider,
    group_id: &str,
    before_id: Option<&str>,
) -> Result<Option<Vec<Message>>, ProviderError> {
    let Some(raw_messages) = provider.fetch_page(group_id, before_id).await? else {
        return Ok(None);
    };

    raw_messages
        .into_iter()
        .map(Message::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}
