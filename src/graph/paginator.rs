//! Next-link pagination
//!
//! Pages are fetched strictly one after another: the link to page N+1 is
//! only known once page N has been interpreted. Next-links are replayed
//! verbatim, with no query options and no caller headers added.
//!
//! Items are not deduplicated across pages. If the collection changes on
//! the server between two fetches, rows can show up twice or not at all.

use super::client::GraphClient;
use super::request::RequestSpec;
use super::response::{self, CallKind, CollectionPage, Output, ResponseEnvelope, VALUE};
use crate::error::{GraphError, Result};
use futures::stream::{self, Stream};
use serde_json::Value;

/// GET a next-link and read the answer as a page
pub async fn fetch_page(client: &GraphClient, next_link: &str) -> Result<CollectionPage> {
    let spec = RequestSpec::get(next_link);
    match client.invoke(&spec, CallKind::NextPage).await? {
        Output::Envelope(envelope) => response::into_page(envelope),
        Output::Items(items) => Ok(CollectionPage {
            items,
            count: None,
            next_link: None,
        }),
    }
}

/// Cursor over the pages that follow an already fetched page.
///
/// Dropping it is all the cleanup there is; no connection is held between
/// fetches.
pub struct Paginator<'a> {
    client: &'a GraphClient,
    next_link: Option<String>,
    pages_fetched: usize,
}

impl<'a> Paginator<'a> {
    pub fn after(client: &'a GraphClient, page: &CollectionPage) -> Self {
        Self::from_link(client, page.next_link.clone())
    }

    pub fn from_link(client: &'a GraphClient, next_link: Option<String>) -> Self {
        Self {
            client,
            next_link,
            pages_fetched: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.next_link.is_none()
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Fetch the next page, or `None` once the sequence has ended.
    ///
    /// A failed fetch leaves the cursor where it was, so the same page can
    /// be requested again.
    pub async fn next(&mut self) -> Result<Option<CollectionPage>> {
        let Some(link) = self.next_link.take() else {
            return Ok(None);
        };

        match fetch_page(self.client, &link).await {
            Ok(page) => {
                self.pages_fetched += 1;
                tracing::debug!(
                    "Fetched page {} ({} items, more: {})",
                    self.pages_fetched,
                    page.items.len(),
                    !page.is_terminal()
                );
                self.next_link = page.next_link.clone();
                Ok(Some(page))
            }
            Err(e) => {
                self.next_link = Some(link);
                Err(e)
            }
        }
    }

    /// The remaining pages as a stream
    pub fn into_stream(self) -> impl Stream<Item = Result<CollectionPage>> + 'a {
        stream::try_unfold(self, |mut pager| async move {
            let page = pager.next().await?;
            Ok::<_, GraphError>(page.map(|page| (page, pager)))
        })
    }
}

/// All items of `first` and every page after it, in fetch order
pub async fn collect_all(client: &GraphClient, first: CollectionPage) -> Result<Vec<Value>> {
    let mut pager = Paginator::after(client, &first);
    let mut all_items = first.items;

    while let Some(page) = pager.next().await? {
        all_items.extend(page.items);
    }

    tracing::debug!(
        "Collected {} items over {} pages",
        all_items.len(),
        pager.pages_fetched() + 1
    );
    Ok(all_items)
}

/// Rows out of whatever shape a collection call produced
pub(crate) async fn collect_output(client: &GraphClient, output: Output) -> Result<Vec<Value>> {
    match output {
        Output::Items(items) => Ok(items),
        Output::Envelope(ResponseEnvelope::CollectionPage(page)) => collect_all(client, page).await,
        Output::Envelope(ResponseEnvelope::SingleResource(mut map)) => match map.remove(VALUE) {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(GraphError::malformed("response is not a collection")),
        },
        Output::Envelope(ResponseEnvelope::RawScalar(Value::Array(items))) => Ok(items),
        Output::Envelope(ResponseEnvelope::RawScalar(Value::Null)) => Ok(Vec::new()),
        Output::Envelope(ResponseEnvelope::RawScalar(_)) => {
            Err(GraphError::malformed("response is not a collection"))
        }
    }
}
