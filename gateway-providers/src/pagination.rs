//! Pagination contract shared by every paginated adapter (spec §4.8).

use gateway_core::GatewayResult;
use gateway_http::{HttpCaller, HttpRequest, Method, ProviderSpec};
use std::time::Duration;

/// What a page's envelope tells the paginator about continuing.
pub struct PageInfo {
    pub total_pages: Option<u32>,
    pub next_is_null: bool,
    pub has_more: Option<bool>,
}

impl PageInfo {
    fn stop(&self, page_num: u32, max_pages: Option<u32>) -> bool {
        max_pages.is_some_and(|m| page_num >= m)
            || self.total_pages.is_some_and(|tp| tp <= page_num)
            || self.next_is_null
            || self.has_more == Some(false)
    }
}

/// Fetches pages one at a time, stopping as soon as `max_pages` is reached
/// or the envelope says there is nothing more; a small inter-page delay
/// avoids bursting the upstream (spec §4.8 pagination contract).
pub async fn get_pages<F>(
    caller: &HttpCaller,
    spec: &ProviderSpec,
    endpoint: &str,
    base_query: &[(String, String)],
    max_pages: Option<u32>,
    per_page: u32,
    mut page_info: F,
) -> GatewayResult<Vec<serde_json::Value>>
where
    F: FnMut(&serde_json::Value) -> PageInfo,
{
    let mut pages = Vec::new();
    let mut page_num = 1u32;

    loop {
        let mut query: Vec<(String, String)> = base_query.to_vec();
        query.push(("page".to_string(), page_num.to_string()));
        query.push(("per_page".to_string(), per_page.to_string()));
        let query_refs: Vec<(&str, &str)> = query.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

        let body: serde_json::Value = caller
            .call_json(
                spec,
                HttpRequest {
                    method: Method::Get,
                    path: endpoint,
                    query: &query_refs,
                    json_body: None,
                    document: false,
                },
            )
            .await?;

        let info = page_info(&body);
        let stop = info.stop(page_num, max_pages);
        pages.push(body);
        if stop {
            break;
        }
        page_num += 1;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    Ok(pages)
}
