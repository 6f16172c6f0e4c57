//! `links.next` traversal.

use std::{collections::HashSet, future::Future};

use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::{
    client::Client,
    envelope::ListResponse,
    error::{AscError, Result},
    query::{ListQuery, QuerySupport, validate_next_url},
};

/// Follows `links.next` from `first` until it runs out or `page_cap` pages
/// (counting `first`) have been read. Every cursor is checked against
/// `allowed_hosts` before `fetch_next` sees it. `data` and `included` are
/// concatenated in fetch order; `links` and `meta` come from the last page.
pub async fn paginate_all<A, F, Fut>(
    first: ListResponse<A>,
    page_cap: Option<usize>,
    allowed_hosts: &[String],
    mut fetch_next: F,
) -> Result<ListResponse<A>>
where
    F: FnMut(Url) -> Fut,
    Fut: Future<Output = Result<ListResponse<A>>>,
{
    let mut aggregated = first;
    let mut pages = 1usize;
    let mut seen: HashSet<String> = HashSet::new();

    while let Some(next) = aggregated.next_url().map(str::to_string) {
        if page_cap.is_some_and(|cap| pages >= cap) {
            debug!(pages, "page cap reached");
            break;
        }
        if !seen.insert(next.clone()) {
            return Err(AscError::RepeatedPaginationUrl(next));
        }
        let url = validate_next_url(&next, allowed_hosts)?;
        let page = fetch_next(url).await?;
        pages += 1;

        aggregated.data.extend(page.data);
        if let Some(included) = page.included {
            aggregated
                .included
                .get_or_insert_with(Vec::new)
                .extend(included);
        }
        aggregated.links = page.links;
        if page.meta.is_some() {
            aggregated.meta = page.meta;
        }
    }

    Ok(aggregated)
}

impl Client {
    /// Fetches `path` with `query` and follows every page after it.
    pub async fn paginate<A: DeserializeOwned>(
        &self,
        path: &str,
        query: &ListQuery,
        support: QuerySupport,
        page_cap: Option<usize>,
    ) -> Result<ListResponse<A>> {
        let first = self.list_page(path, query, support).await?;
        self.paginate_from(first, page_cap).await
    }

    /// Continues from a page the caller already holds.
    pub async fn paginate_from<A: DeserializeOwned>(
        &self,
        first: ListResponse<A>,
        page_cap: Option<usize>,
    ) -> Result<ListResponse<A>> {
        let allowed = self.config().allowed_next_hosts.clone();
        paginate_all(first, page_cap, &allowed, |url| async move {
            self.get_json::<ListResponse<A>>(url.as_str()).await
        })
        .await
    }
}
