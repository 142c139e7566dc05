//! Request signing.
//!
//! Management requests carry `Authorization: QBox <access>:<sign>` where the
//! signature covers the request path, query and (form) body. Uploads carry an
//! upload token signing a JSON put policy instead.

use crate::error::{ErrorKind, Result};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use exn::ResultExt;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

#[derive(Serialize)]
struct PutPolicy {
    scope: String,
    deadline: i64,
}

/// Encode `<bucket>:<key>` the way management endpoints expect it in the
/// request path.
pub(crate) fn encoded_entry(bucket: &str, key: &str) -> String {
    URL_SAFE.encode(format!("{bucket}:{key}"))
}

/// Signs requests with an access/secret key pair.
#[derive(Clone)]
pub(crate) struct Signer {
    access_key: String,
    secret_key: String,
}
impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").field("access_key", &self.access_key).finish_non_exhaustive()
    }
}
impl Signer {
    pub(crate) fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// URL-safe base64 of the HMAC-SHA1 of `data`.
    pub(crate) fn sign(&self, data: &[u8]) -> String {
        // HMAC accepts keys of any length, this can't fail.
        let mut mac = <HmacSha1 as Mac>::new_from_slice(self.secret_key.as_bytes()).expect("HMAC key of any length");
        mac.update(data);
        URL_SAFE.encode(mac.finalize().into_bytes())
    }

    /// Access token for a management request. `path_and_query` is everything
    /// after the host; `body` is only signed for form-encoded requests.
    pub(crate) fn management_token(&self, path_and_query: &str, body: Option<&[u8]>) -> String {
        let mut data = Vec::with_capacity(path_and_query.len() + 1);
        data.extend_from_slice(path_and_query.as_bytes());
        data.push(b'\n');
        if let Some(body) = body {
            data.extend_from_slice(body);
        }
        format!("{}:{}", self.access_key, self.sign(&data))
    }

    /// Upload token scoped to a single key, so uploads may overwrite it.
    pub(crate) fn upload_token(&self, bucket: &str, key: &str, deadline: i64) -> Result<String> {
        let policy = PutPolicy {
            scope: format!("{bucket}:{key}"),
            deadline,
        };
        let policy = serde_json::to_vec(&policy).or_raise(|| ErrorKind::BackendError("unencodable put policy".into()))?;
        let encoded = URL_SAFE.encode(policy);
        Ok(format!("{}:{}:{}", self.access_key, self.sign(encoded.as_bytes()), encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> Signer {
        Signer::new("ak", "sk")
    }

    #[test]
    fn test_sign() {
        assert_eq!(signer().sign(b"hello"), "NDN8cM0rwosxhHJ6QAcI7ialr0g=");
    }

    #[test]
    fn test_encoded_entry() {
        assert_eq!(encoded_entry("notes", "a.md"), "bm90ZXM6YS5tZA==");
        assert_eq!(encoded_entry("notes", "dir/my note.md"), "bm90ZXM6ZGlyL215IG5vdGUubWQ=");
    }

    #[test]
    fn test_management_token() {
        assert_eq!(signer().management_token("/stat/bm90ZXM6YS5tZA==", None), "ak:PqmWn14GauqSNoiwjrZKmG_xN9U=");
        assert_eq!(signer().management_token("/v6/domain/list?tbl=notes", None), "ak:6qL_VwyY1s8NbnbMpkay7tG4Cgo=");
    }

    #[test]
    fn test_upload_token() {
        let token = signer().upload_token("notes", "a.md", 1_700_000_000).unwrap();
        assert_eq!(
            token,
            "ak:5x_XiLz5loCKh720YLSSzFv-nUc=:eyJzY29wZSI6Im5vdGVzOmEubWQiLCJkZWFkbGluZSI6MTcwMDAwMDAwMH0="
        );
    }

    #[test]
    fn test_debug_hides_secret() {
        let debug = format!("{:?}", signer());
        assert!(debug.contains("ak"));
        assert!(!debug.contains("sk"));
    }
}
