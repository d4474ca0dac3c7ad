//! Cloud credentials carried by polymorphic config payloads

use serde::{Deserialize, Serialize};

pub const PROVIDER_GCP: &str = "gcp";
pub const PROVIDER_AWS: &str = "aws";
pub const PROVIDER_YANDEX: &str = "yandex";
pub const PROVIDER_CLOUDFLARE: &str = "cloudflare";
pub const PROVIDER_MONGODB: &str = "mongodb";

/// GCP service account credentials
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcpCredentials {
    pub project_id: String,
    /// Service account key JSON
    #[serde(default)]
    pub credentials: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsCredentials {
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_access_key: String,
    #[serde(default = "default_aws_region")]
    pub region: String,
}

fn default_aws_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YandexCredentials {
    pub cloud_id: String,
    pub folder_id: String,
    /// Authorized key JSON of a service account
    #[serde(default)]
    pub service_account_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudflareCredentials {
    #[serde(default)]
    pub api_token: String,
    #[serde(default)]
    pub account_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongodbCredentials {
    pub org_id: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub private_key: String,
}

/// Authentication capability of a config payload.
///
/// Every config variant that talks to a cloud exposes one of these through
/// `auth()`; the provider type selects the provider-construction function in
/// the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum Auth {
    Gcp(GcpCredentials),
    Aws(AwsCredentials),
    Yandex(YandexCredentials),
    Cloudflare(CloudflareCredentials),
    Mongodb(MongodbCredentials),
}

impl Auth {
    pub fn provider_type(&self) -> &'static str {
        match self {
            Auth::Gcp(_) => PROVIDER_GCP,
            Auth::Aws(_) => PROVIDER_AWS,
            Auth::Yandex(_) => PROVIDER_YANDEX,
            Auth::Cloudflare(_) => PROVIDER_CLOUDFLARE,
            Auth::Mongodb(_) => PROVIDER_MONGODB,
        }
    }

    /// Raw credential material; empty when nothing was configured
    pub fn credentials_value(&self) -> String {
        match self {
            Auth::Gcp(c) => c.credentials.clone(),
            Auth::Aws(c) => {
                if c.access_key.is_empty() || c.secret_access_key.is_empty() {
                    String::new()
                } else {
                    format!("{}:{}", c.access_key, c.secret_access_key)
                }
            }
            Auth::Yandex(c) => c.service_account_key.clone(),
            Auth::Cloudflare(c) => c.api_token.clone(),
            Auth::Mongodb(c) => {
                if c.public_key.is_empty() || c.private_key.is_empty() {
                    String::new()
                } else {
                    format!("{}:{}", c.public_key, c.private_key)
                }
            }
        }
    }

    pub fn project_id(&self) -> Option<&str> {
        match self {
            Auth::Gcp(c) => Some(&c.project_id),
            Auth::Aws(c) => Some(&c.account),
            Auth::Yandex(c) => Some(&c.folder_id),
            Auth::Cloudflare(c) => Some(&c.account_id),
            Auth::Mongodb(c) => Some(&c.org_id),
        }
    }
}
