//! HMAC-signed, time-boxed capabilities
//!
//! [`UrlSigner`] issues download URLs for stored artifacts; [`TokenIssuer`]
//! issues the short-lived token a rasterizer needs to read exactly one page.

use crate::types::*;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &[u8]) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(secret)
        .map_err(|_| CompileError::Config("failed to initialize hmac".to_string()))
}

fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> i64 {
    now.timestamp().saturating_add(ttl.as_secs() as i64)
}

/// Issues and checks signed artifact URLs of the form
/// `<base>/objects/<key>?expires=<unix>&sig=<mac>`
#[derive(Clone)]
pub struct UrlSigner {
    base_url: String,
    secret: Vec<u8>,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(base_url: impl Into<String>, secret: impl AsRef<[u8]>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret: secret.as_ref().to_vec(),
        }
    }

    fn sign(&self, key: &str, expires: i64) -> Result<HmacSha256> {
        let mut mac = mac_for(&self.secret)?;
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    /// Signed URL valid for `ttl` from now
    pub fn signed_url(&self, key: &str, ttl: Duration) -> Result<String> {
        self.signed_url_at(key, ttl, Utc::now())
    }

    pub fn signed_url_at(&self, key: &str, ttl: Duration, now: DateTime<Utc>) -> Result<String> {
        let expires = expiry_after(now, ttl);
        let sig = URL_SAFE_NO_PAD.encode(self.sign(key, expires)?.finalize().into_bytes());
        Ok(format!(
            "{}/objects/{}?expires={expires}&sig={sig}",
            self.base_url, key
        ))
    }

    /// Check a URL issued by this signer. Returns the object key when the
    /// signature matches and the URL has not expired.
    pub fn verify_url(&self, url: &str, now: DateTime<Utc>) -> Option<String> {
        let rest = url.strip_prefix(&self.base_url)?.strip_prefix("/objects/")?;
        let (key, query) = rest.split_once('?')?;

        let mut expires = None;
        let mut sig = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("expires", value)) => expires = value.parse::<i64>().ok(),
                Some(("sig", value)) => sig = Some(value),
                _ => {}
            }
        }
        let (expires, sig) = (expires?, sig?);

        if expires <= now.timestamp() {
            return None;
        }
        let sig = URL_SAFE_NO_PAD.decode(sig).ok()?;
        self.sign(key, expires).ok()?.verify_slice(&sig).ok()?;
        Some(key.to_string())
    }
}

/// Capability handed to the rasterizer for exactly one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityToken {
    pub page_id: PageId,
    pub collection_id: CollectionId,
    /// Unix seconds
    pub expires_at: i64,
    pub signature: String,
}

#[derive(Clone)]
pub struct TokenIssuer {
    secret: Vec<u8>,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: impl AsRef<[u8]>, ttl: Duration) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            ttl,
        }
    }

    fn mac(
        &self,
        page_id: &PageId,
        collection_id: &CollectionId,
        expires_at: i64,
    ) -> Result<HmacSha256> {
        let mut mac = mac_for(&self.secret)?;
        mac.update(b"page-render\n");
        mac.update(collection_id.as_str().as_bytes());
        mac.update(b"\n");
        mac.update(page_id.as_str().as_bytes());
        mac.update(b"\n");
        mac.update(expires_at.to_string().as_bytes());
        Ok(mac)
    }

    pub fn issue(
        &self,
        page_id: &PageId,
        collection_id: &CollectionId,
    ) -> Result<CapabilityToken> {
        self.issue_at(page_id, collection_id, Utc::now())
    }

    pub fn issue_at(
        &self,
        page_id: &PageId,
        collection_id: &CollectionId,
        now: DateTime<Utc>,
    ) -> Result<CapabilityToken> {
        let expires_at = expiry_after(now, self.ttl);
        let mac = self.mac(page_id, collection_id, expires_at)?;
        Ok(CapabilityToken {
            page_id: page_id.clone(),
            collection_id: collection_id.clone(),
            expires_at,
            signature: URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()),
        })
    }

    /// True if the token was issued by this issuer for `page_id` and is
    /// still live
    pub fn verify(&self, token: &CapabilityToken, page_id: &PageId, now: DateTime<Utc>) -> bool {
        if &token.page_id != page_id || token.expires_at <= now.timestamp() {
            return false;
        }
        let Ok(sig) = URL_SAFE_NO_PAD.decode(&token.signature) else {
            return false;
        };
        match self.mac(&token.page_id, &token.collection_id, token.expires_at) {
            Ok(mac) => mac.verify_slice(&sig).is_ok(),
            Err(_) => false,
        }
    }
}
