//! Cloudflare API client
//!
//! Zones, DNS records and origin rules go through the v4 HTTP API with
//! Bearer token authentication. R2 buckets are handled by wrangler.

use crate::error::{CloudflareError, Result};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Phase of the zone entrypoint ruleset holding host header overrides
pub const ORIGIN_PHASE: &str = "http_request_origin";

/// Fully qualified name of `name` inside `zone`
pub fn fqdn(name: &str, zone: &str) -> String {
    let name = name.trim_end_matches('.');
    if name.is_empty() || name == "@" || name == zone {
        zone.to_string()
    } else if name.ends_with(&format!(".{}", zone)) {
        name.to_string()
    } else {
        format!("{}.{}", name, zone)
    }
}

/// DNS record as sent to and returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsRecordInfo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub content: String,
    /// 1 means automatic
    pub ttl: u32,
    #[serde(default)]
    pub proxied: bool,
}

/// Rule of a zone ruleset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleInfo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub expression: String,
    pub action: String,
    #[serde(default)]
    pub action_parameters: Value,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl RuleInfo {
    /// Origin rule rewriting the Host header of requests for `hostname`
    pub fn host_header_override(description: &str, hostname: &str, host_header: &str) -> Self {
        Self {
            id: String::new(),
            description: description.to_string(),
            expression: format!("(http.host eq \"{}\")", hostname),
            action: "route".to_string(),
            action_parameters: json!({"host_header": host_header}),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RulesetInfo {
    pub id: String,
    #[serde(default)]
    pub rules: Vec<RuleInfo>,
}

/// Cloudflare API client bound to one token
#[derive(Clone)]
pub struct CloudflareApi {
    client: reqwest::Client,
    api_token: String,
    base_url: String,
}

impl CloudflareApi {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_token: api_token.into(),
            base_url: CLOUDFLARE_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Option<T>> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("Cloudflare API: {} {}", method, url);

        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(&self.api_token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let api_response: ApiResponse<T> = response.json().await?;
        if !api_response.success {
            let error_msg = api_response
                .errors
                .first()
                .map(|e| format!("{} (code {})", e.message, e.code))
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(CloudflareError::ApiError(error_msg));
        }
        Ok(api_response.result)
    }

    async fn require<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T> {
        self.request(method, path, body)
            .await?
            .ok_or_else(|| CloudflareError::ApiError(format!("empty response for {}", path)))
    }

    /// Verify the token and return its status
    pub async fn verify_token(&self) -> Result<String> {
        let result: Value = self
            .require(Method::GET, "/user/tokens/verify", None)
            .await?;
        Ok(result
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }

    // ========== Zones ==========

    pub async fn zone_id(&self, zone_name: &str) -> Result<String> {
        let zones: Vec<Zone> = self
            .require(Method::GET, &format!("/zones?name={}", zone_name), None)
            .await?;
        zones
            .into_iter()
            .next()
            .map(|z| z.id)
            .ok_or_else(|| CloudflareError::ZoneNotFound(zone_name.to_string()))
    }

    // ========== DNS Records ==========

    pub async fn find_record(
        &self,
        zone_id: &str,
        name: &str,
        record_type: &str,
    ) -> Result<Option<DnsRecordInfo>> {
        let path = format!(
            "/zones/{}/dns_records?type={}&name={}",
            zone_id, record_type, name
        );
        let records: Vec<DnsRecordInfo> = self.require(Method::GET, &path, None).await?;
        Ok(records.into_iter().next())
    }

    pub async fn get_record(&self, zone_id: &str, record_id: &str) -> Result<Option<DnsRecordInfo>> {
        self.request(
            Method::GET,
            &format!("/zones/{}/dns_records/{}", zone_id, record_id),
            None,
        )
        .await
    }

    pub async fn create_record(&self, zone_id: &str, record: &DnsRecordInfo) -> Result<DnsRecordInfo> {
        self.require(
            Method::POST,
            &format!("/zones/{}/dns_records", zone_id),
            Some(serde_json::to_value(record)?),
        )
        .await
    }

    pub async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &DnsRecordInfo,
    ) -> Result<DnsRecordInfo> {
        self.require(
            Method::PUT,
            &format!("/zones/{}/dns_records/{}", zone_id, record_id),
            Some(serde_json::to_value(record)?),
        )
        .await
    }

    pub async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()> {
        let _: Option<Value> = self
            .request(
                Method::DELETE,
                &format!("/zones/{}/dns_records/{}", zone_id, record_id),
                None,
            )
            .await?;
        Ok(())
    }

    /// Create the record, or update the existing record of the same name and type
    pub async fn ensure_record(&self, zone_id: &str, record: &DnsRecordInfo) -> Result<DnsRecordInfo> {
        if let Some(existing) = self
            .find_record(zone_id, &record.name, &record.record_type)
            .await?
        {
            if existing.content == record.content
                && existing.proxied == record.proxied
                && existing.ttl == record.ttl
            {
                tracing::debug!("DNS record already up to date: {}", existing.name);
                return Ok(existing);
            }
            tracing::info!(
                "Updating DNS record {} from {} to {}",
                existing.name,
                existing.content,
                record.content
            );
            return self.update_record(zone_id, &existing.id, record).await;
        }
        tracing::info!("Creating DNS record: {} -> {}", record.name, record.content);
        self.create_record(zone_id, record).await
    }

    // ========== Rulesets ==========

    pub async fn entrypoint_ruleset(&self, zone_id: &str, phase: &str) -> Result<Option<RulesetInfo>> {
        self.request(
            Method::GET,
            &format!("/zones/{}/rulesets/phases/{}/entrypoint", zone_id, phase),
            None,
        )
        .await
    }

    /// Add a rule to the phase entrypoint, creating the entrypoint when missing.
    /// Returns the ruleset id and the rule.
    pub async fn add_rule(&self, zone_id: &str, phase: &str, rule: &RuleInfo) -> Result<(String, RuleInfo)> {
        let ruleset = match self.entrypoint_ruleset(zone_id, phase).await? {
            Some(ruleset) => {
                self.require::<RulesetInfo>(
                    Method::POST,
                    &format!("/zones/{}/rulesets/{}/rules", zone_id, ruleset.id),
                    Some(serde_json::to_value(rule)?),
                )
                .await?
            }
            None => {
                self.require::<RulesetInfo>(
                    Method::PUT,
                    &format!("/zones/{}/rulesets/phases/{}/entrypoint", zone_id, phase),
                    Some(json!({"rules": [rule]})),
                )
                .await?
            }
        };
        let created = ruleset
            .rules
            .iter()
            .rev()
            .find(|r| r.description == rule.description && r.expression == rule.expression)
            .cloned()
            .ok_or_else(|| {
                CloudflareError::ApiError(format!("rule {} missing from ruleset", rule.description))
            })?;
        Ok((ruleset.id, created))
    }

    pub async fn update_rule(
        &self,
        zone_id: &str,
        ruleset_id: &str,
        rule_id: &str,
        rule: &RuleInfo,
    ) -> Result<()> {
        let _: RulesetInfo = self
            .require(
                Method::PATCH,
                &format!("/zones/{}/rulesets/{}/rules/{}", zone_id, ruleset_id, rule_id),
                Some(serde_json::to_value(rule)?),
            )
            .await?;
        Ok(())
    }

    pub async fn delete_rule(&self, zone_id: &str, ruleset_id: &str, rule_id: &str) -> Result<()> {
        let _: Option<Value> = self
            .request(
                Method::DELETE,
                &format!("/zones/{}/rulesets/{}/rules/{}", zone_id, ruleset_id, rule_id),
                None,
            )
            .await?;
        Ok(())
    }
}

// ============ API Types ============

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ApiResponse<T> {
    success: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    errors: Vec<ApiErrorInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorInfo {
    code: i32,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fqdn() {
        assert_eq!(fqdn("@", "example.com"), "example.com");
        assert_eq!(fqdn("www", "example.com"), "www.example.com");
        assert_eq!(fqdn("app.example.com", "example.com"), "app.example.com");
        assert_eq!(fqdn("app.example.com.", "example.com"), "app.example.com");
    }

    #[test]
    fn test_host_header_override_rule() {
        let rule = RuleInfo::host_header_override("web-app", "app.example.com", "web-app.run.app");
        assert_eq!(rule.expression, "(http.host eq \"app.example.com\")");
        assert_eq!(rule.action, "route");
        assert_eq!(rule.action_parameters["host_header"], "web-app.run.app");
        let body = serde_json::to_value(&rule).unwrap();
        assert!(body.get("id").is_none());
    }

    #[test]
    fn test_api_response_failure() {
        let response: ApiResponse<Value> = serde_json::from_str(
            r#"{"success": false, "result": null, "errors": [{"code": 9109, "message": "Invalid access token"}]}"#,
        )
        .unwrap();
        assert!(!response.success);
        assert!(response.result.is_none());
        assert_eq!(response.errors[0].code, 9109);
    }
}
