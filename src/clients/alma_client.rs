/// Alma electronic resources API 客户端
///
/// 封装所有与 e-collections / portfolios 端点相关的调用逻辑
use crate::clients::PortfolioApi;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{Portfolio, Scope};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

/// 列表接口固定分页大小
pub const PAGE_SIZE: usize = 100;

/// Alma API 客户端
pub struct AlmaClient {
    http: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct CollectionOverview {
    portfolios: Option<CountValue>,
}

#[derive(Debug, Deserialize)]
struct CountValue {
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PortfolioPage {
    #[serde(default)]
    portfolio: Option<Vec<Portfolio>>,
}

impl AlmaClient {
    /// 创建新的 Alma 客户端
    pub fn new(config: &Config) -> AppResult<Self> {
        Self::with_base_url(&config.api_base_url, &config.api_key)
    }

    pub fn with_base_url(base_url: &str, api_key: &str) -> AppResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::api_request_failed(base_url, e))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// collection 路径（不含 apikey，便于写日志）
    fn collection_path(scope: &Scope) -> String {
        format!("/e-collections/{}", scope.collection_id)
    }

    fn portfolios_path(scope: &Scope) -> String {
        format!(
            "/e-collections/{}/e-services/{}/portfolios",
            scope.collection_id, scope.service_id
        )
    }

    fn portfolio_path(scope: &Scope, id: &str) -> String {
        format!("{}/{}", Self::portfolios_path(scope), id)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// 发送请求并检查状态码
    async fn send(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> AppResult<reqwest::Response> {
        let response = request
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::api_bad_status(endpoint, status.as_u16()));
        }

        debug!("{} -> {}", endpoint, status);
        Ok(response)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        endpoint: &str,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let body = response
            .text()
            .await
            .map_err(|e| AppError::api_request_failed(endpoint, e))?;
        serde_json::from_str(&body)
            .map_err(|e| AppError::api_invalid_payload(endpoint, e.to_string()))
    }
}

#[async_trait]
impl PortfolioApi for AlmaClient {
    async fn portfolio_count(&self, scope: &Scope) -> AppResult<u64> {
        let endpoint = Self::collection_path(scope);
        let response = self
            .send(&endpoint, self.http.get(self.url(&endpoint)))
            .await?;
        let overview: CollectionOverview = Self::read_json(&endpoint, response).await?;

        overview
            .portfolios
            .and_then(|p| p.value.as_u64())
            .ok_or_else(|| AppError::api_invalid_payload(&endpoint, "portfolios.value 不是整数"))
    }

    async fn list_portfolios(
        &self,
        scope: &Scope,
        offset: usize,
        limit: usize,
    ) -> AppResult<Vec<Portfolio>> {
        let endpoint = format!("{}?offset={}", Self::portfolios_path(scope), offset);
        let request = self
            .http
            .get(self.url(&Self::portfolios_path(scope)))
            .query(&[("limit", limit), ("offset", offset)]);
        let response = self.send(&endpoint, request).await?;
        let page: PortfolioPage = Self::read_json(&endpoint, response).await?;

        Ok(page.portfolio.unwrap_or_default())
    }

    async fn get_portfolio(&self, scope: &Scope, id: &str) -> AppResult<Portfolio> {
        let endpoint = Self::portfolio_path(scope, id);
        let response = self
            .send(&endpoint, self.http.get(self.url(&endpoint)))
            .await?;
        Self::read_json(&endpoint, response).await
    }

    async fn update_portfolio(&self, scope: &Scope, portfolio: &Portfolio) -> AppResult<()> {
        let endpoint = Self::portfolio_path(scope, &portfolio.id);
        let request = self.http.put(self.url(&endpoint)).json(portfolio);
        self.send(&endpoint, request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_do_not_leak_api_key() {
        let scope = Scope::new("61", "62");
        let client = AlmaClient::with_base_url("https://example.org/almaws/v1/electronic/", "SECRET").unwrap();

        let path = AlmaClient::portfolio_path(&scope, "53");
        assert_eq!(path, "/e-collections/61/e-services/62/portfolios/53");
        assert!(!path.contains("SECRET"));
        assert_eq!(
            client.url(&AlmaClient::collection_path(&scope)),
            "https://example.org/almaws/v1/electronic/e-collections/61"
        );
    }

    #[test]
    fn test_overview_count_parsing() {
        let overview: CollectionOverview =
            serde_json::from_str(r#"{"portfolios":{"value":250,"link":"x"}}"#).unwrap();
        assert_eq!(overview.portfolios.and_then(|p| p.value.as_u64()), Some(250));

        let overview: CollectionOverview =
            serde_json::from_str(r#"{"portfolios":{"value":"many"}}"#).unwrap();
        assert_eq!(overview.portfolios.and_then(|p| p.value.as_u64()), None);
    }

    #[test]
    fn test_empty_page_has_no_portfolio_key() {
        let page: PortfolioPage = serde_json::from_str(r#"{"total_record_count":0}"#).unwrap();
        assert!(page.portfolio.unwrap_or_default().is_empty());
    }
}
