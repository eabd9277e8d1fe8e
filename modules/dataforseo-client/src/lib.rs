pub mod error;
pub mod types;

pub use error::{DataForSeoError, Result};
pub use types::{
    KeywordInfo, Locale, RankedKeywordItem, RankedKeywordsTask, SerpItem, SerpTask, STATUS_OK,
};

use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use types::{ApiResponse, RankedKeywordsPage, SerpResultPage};

const BASE_URL: &str = "https://api.dataforseo.com/v3";

const SERP_ORGANIC_PATH: &str = "serp/google/organic/live/advanced";
const RANKED_KEYWORDS_PATH: &str = "dataforseo_labs/google/ranked_keywords/live";

pub struct DataForSeoClient {
    client: reqwest::Client,
    base_url: String,
    login: String,
    password: String,
}

impl DataForSeoClient {
    pub fn new(login: &str, password: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
            login: login.to_string(),
            password: password.to_string(),
        })
    }

    /// Point the client at a different host (sandbox API, local stub).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    /// Live organic SERP for a keyword, every item type included, in rank order.
    pub async fn serp_organic(
        &self,
        keyword: &str,
        locale: &Locale,
        depth: u32,
    ) -> Result<Vec<SerpItem>> {
        tracing::debug!(keyword, depth, "Requesting live SERP");

        let task = SerpTask::new(keyword, locale, depth);
        let page: Option<SerpResultPage> = self.post_task(SERP_ORGANIC_PATH, &task).await?;
        let items = page.and_then(|p| p.items).unwrap_or_default();

        tracing::debug!(keyword, count = items.len(), "SERP items received");
        Ok(items)
    }

    /// Keywords the target URL ranks for, as reported by DataForSEO Labs.
    /// No position filtering happens here.
    pub async fn ranked_keywords(
        &self,
        target: &str,
        locale: &Locale,
        limit: u32,
    ) -> Result<Vec<RankedKeywordItem>> {
        tracing::debug!(url = target, limit, "Requesting ranked keywords");

        let task = RankedKeywordsTask::new(target, locale, limit);
        let page: Option<RankedKeywordsPage> =
            self.post_task(RANKED_KEYWORDS_PATH, &task).await?;
        let items = page.and_then(|p| p.items).unwrap_or_default();

        tracing::debug!(url = target, count = items.len(), "Ranked keyword items received");
        Ok(items)
    }

    /// POST a single task and unwrap the `tasks[0].result[0]` envelope.
    /// Returns `Ok(None)` when the task succeeded but carried no result.
    async fn post_task<B, T>(&self, path: &str, task: &B) -> Result<Option<T>>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.login, Some(&self.password))
            .json(&[task])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DataForSeoError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.bytes().await?;
        let api_resp: ApiResponse<T> = serde_json::from_slice(&body)?;
        unwrap_first_result(api_resp)
    }
}

fn unwrap_first_result<T>(api_resp: ApiResponse<T>) -> Result<Option<T>> {
    if api_resp.status_code != STATUS_OK {
        return Err(DataForSeoError::Status {
            code: api_resp.status_code,
            message: api_resp
                .status_message
                .unwrap_or_else(|| "Unknown error".to_string()),
        });
    }

    let Some(task) = api_resp.tasks.and_then(|t| t.into_iter().next()) else {
        return Ok(None);
    };

    if task.status_code != STATUS_OK {
        return Err(DataForSeoError::Status {
            code: task.status_code,
            message: task
                .status_message
                .unwrap_or_else(|| "Unknown error".to_string()),
        });
    }

    Ok(task
        .result
        .and_then(|results| results.into_iter().next())
        .flatten())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(value: serde_json::Value) -> ApiResponse<SerpResultPage> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn envelope_error_becomes_status_error() {
        let resp = parse(serde_json::json!({
            "status_code": 40100,
            "status_message": "You are not authorized",
            "tasks": null
        }));
        match unwrap_first_result(resp) {
            Err(DataForSeoError::Status { code, message }) => {
                assert_eq!(code, 40100);
                assert_eq!(message, "You are not authorized");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[test]
    fn task_error_becomes_status_error() {
        let resp = parse(serde_json::json!({
            "status_code": 20000,
            "tasks": [{ "status_code": 40501, "status_message": "Invalid Field" }]
        }));
        assert!(matches!(
            unwrap_first_result(resp),
            Err(DataForSeoError::Status { code: 40501, .. })
        ));
    }

    #[test]
    fn first_result_is_returned() {
        let resp = parse(serde_json::json!({
            "status_code": 20000,
            "tasks": [{
                "status_code": 20000,
                "result": [{
                    "items": [
                        { "type": "paid", "url": "https://ad.example" },
                        { "type": "organic", "rank_group": 1, "url": "https://a.example/" }
                    ]
                }]
            }]
        }));
        let page = unwrap_first_result(resp).unwrap().unwrap();
        let items = page.items.unwrap();
        assert_eq!(items.len(), 2);
        assert!(!items[0].is_organic());
        assert!(items[1].is_organic());
    }

    #[test]
    fn empty_task_list_is_no_data() {
        let resp = parse(serde_json::json!({ "status_code": 20000, "tasks": [] }));
        assert!(unwrap_first_result(resp).unwrap().is_none());
    }
}
