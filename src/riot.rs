use crate::error::{EtlError, EtlResult};
use crate::models::RiotId;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const TOKEN_HEADER: &str = "X-Riot-Token";

fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

/// Source of match data for the extractor (and of live key lookups for the loader).
#[async_trait]
pub trait MatchSource: Send + Sync {
    /// Resolve a display id to the provider's opaque player key.
    async fn account_puuid(&self, riot_id: &RiotId) -> EtlResult<String>;

    /// Most recent match ids for a player, newest first.
    async fn recent_match_ids(&self, puuid: &str, count: u32) -> EtlResult<Vec<String>>;

    /// Full match document, returned verbatim.
    async fn match_detail(&self, match_id: &str) -> EtlResult<Value>;
}

/// Riot Games HTTP API client.
///
/// Endpoints used:
/// - GET /riot/account/v1/accounts/by-riot-id/{gameName}/{tagLine}
/// - GET /lol/match/v5/matches/by-puuid/{puuid}/ids?count=N
/// - GET /lol/match/v5/matches/{matchId}
///
/// Every call is sequential; any status other than 200 aborts with `EtlError::Upstream`.
#[derive(Debug, Clone)]
pub struct RiotClient {
    base_url: String,
    api_key: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct AccountDto {
    puuid: String,
}

impl RiotClient {
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout_secs: u64) -> EtlResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("rift-etl/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| EtlError::config(format!("build riot http client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http,
        })
    }

    /// Regional routing host, e.g. `asia` -> `https://asia.api.riotgames.com`.
    pub fn regional_base_url(region: &str) -> String {
        format!("https://{}.api.riotgames.com", region.trim().to_ascii_lowercase())
    }

    pub(crate) fn account_url(&self, riot_id: &RiotId) -> String {
        format!(
            "{}/riot/account/v1/accounts/by-riot-id/{}/{}",
            self.base_url,
            urlencoding::encode(&riot_id.game_name),
            urlencoding::encode(&riot_id.tag_line)
        )
    }

    pub(crate) fn match_ids_url(&self, puuid: &str, count: u32) -> String {
        format!(
            "{}/lol/match/v5/matches/by-puuid/{}/ids?count={}",
            self.base_url,
            urlencoding::encode(puuid),
            count
        )
    }

    pub(crate) fn match_url(&self, match_id: &str) -> String {
        format!(
            "{}/lol/match/v5/matches/{}",
            self.base_url,
            urlencoding::encode(match_id)
        )
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        url: &str,
    ) -> EtlResult<T> {
        debug!(endpoint, url, "riot api request");
        let resp = self
            .http
            .get(url)
            .header(TOKEN_HEADER, &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| EtlError::UpstreamTransport(format!("{endpoint}: {e}")))?;
        let status = resp.status();
        if status != StatusCode::OK {
            let body = truncate_for_log(resp.text().await.unwrap_or_default(), 500);
            return Err(EtlError::Upstream {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<T>()
            .await
            .map_err(|e| EtlError::UpstreamTransport(format!("{endpoint}: decode body: {e}")))
    }
}

#[async_trait]
impl MatchSource for RiotClient {
    async fn account_puuid(&self, riot_id: &RiotId) -> EtlResult<String> {
        let url = self.account_url(riot_id);
        let account: AccountDto = self.get_json("account-by-riot-id", &url).await?;
        Ok(account.puuid)
    }

    async fn recent_match_ids(&self, puuid: &str, count: u32) -> EtlResult<Vec<String>> {
        let url = self.match_ids_url(puuid, count);
        self.get_json("match-ids-by-puuid", &url).await
    }

    async fn match_detail(&self, match_id: &str) -> EtlResult<Value> {
        let url = self.match_url(match_id);
        self.get_json("match-detail", &url).await
    }
}
