use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Checks an `X-Hub-Signature-256` header (`sha256=<hex>`) against the raw
/// request body. The digest must be computed over the bytes as received.
pub fn verify_hub_signature(signature_header: &str, body: &[u8], app_secret: &str) -> bool {
    let Some(signature_hex) = signature_header.trim().strip_prefix("sha256=") else {
        tracing::warn!("webhook signature header without sha256= prefix");
        return false;
    };
    let Ok(expected) = hex::decode(signature_hex) else {
        tracing::warn!("webhook signature is not valid hex");
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let computed = mac.finalize().into_bytes();
    computed.ct_eq(&expected[..]).into()
}

pub fn sign_body(body: &[u8], app_secret: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Constant-time equality for shared secrets such as the webhook verify token.
pub fn secrets_match(provided: &str, expected: &str) -> bool {
    ConstantTimeEq::ct_eq(provided.as_bytes(), expected.as_bytes()).into()
}
