//! Small stand-alone helpers with no natural home in a single layer.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Signs an AWS SigV4 request, returning the `Authorization` header value.
///
/// `headers` must already be the full set of headers that will be sent,
/// lower-cased and sorted by name (including `host` and `x-amz-date`), and
/// `service`/`region` identify the signing scope (e.g. `"ecr"` for both the
/// `api.ecr.*` control plane and the registry data plane).
#[allow(clippy::too_many_arguments)]
pub fn sign_aws_v4(
    method: &str,
    path: &str,
    access_key_id: &str,
    secret_access_key: &str,
    region: &str,
    service: &str,
    date_stamp: &str,
    amz_date: &str,
    headers: &[(String, String)],
    body: &str,
) -> String {
    let algorithm = "AWS4-HMAC-SHA256";

    let signed_headers = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let canonical_headers = headers
        .iter()
        .map(|(k, v)| format!("{k}:{v}\n"))
        .collect::<String>();

    let payload_hash = hex::encode(Sha256::digest(body.as_bytes()));
    let canonical_request =
        format!("{method}\n{path}\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}");

    let credential_scope = format!("{date_stamp}/{region}/{service}/aws4_request");
    let request_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    let string_to_sign = format!("{algorithm}\n{amz_date}\n{credential_scope}\n{request_hash}");

    let k_date = hmac_sha256(format!("AWS4{secret_access_key}").as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    let k_signing = hmac_sha256(&k_service, b"aws4_request");
    let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()));

    format!(
        "{algorithm} Credential={access_key_id}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}"
    )
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_for_fixed_inputs() {
        let headers = vec![
            ("host".to_string(), "api.ecr.us-west-2.amazonaws.com".to_string()),
            ("x-amz-date".to_string(), "20240101T000000Z".to_string()),
        ];
        let a = sign_aws_v4(
            "POST", "/", "AKIAEXAMPLE", "secret", "us-west-2", "ecr", "20240101", "20240101T000000Z", &headers, "{}",
        );
        let b = sign_aws_v4(
            "POST", "/", "AKIAEXAMPLE", "secret", "us-west-2", "ecr", "20240101", "20240101T000000Z", &headers, "{}",
        );
        assert_eq!(a, b);
        assert!(a.starts_with("AWS4-HMAC-SHA256 Credential=AKIAEXAMPLE/"));
    }
}
