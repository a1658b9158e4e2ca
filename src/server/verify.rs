use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;

/// Asana's handshake header; its value is echoed back once.
pub(super) const HOOK_SECRET_HEADER: &str = "x-hook-secret";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn configured(secret: Option<&str>) -> Option<&str> {
    secret.map(str::trim).filter(|value| !value.is_empty())
}

fn check_sha256(secret: &str, body: &[u8], signature: &str) -> Result<(), &'static str> {
    let expected = hex::decode(signature).map_err(|_| "invalid_signature")?;
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| "bad_secret")?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| "invalid_signature")
}

/// `X-Hook-Signature`: hex HMAC-SHA256 of the body. Skipped when no secret is configured.
pub(super) fn verify_asana(
    secret: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), &'static str> {
    let Some(secret) = configured(secret) else {
        return Ok(());
    };
    let signature = header(headers, "x-hook-signature").ok_or("missing_signature")?;
    check_sha256(secret, body, signature)
}

/// `X-Hub-Signature: sha1=<hex>` on inbox webhook notifications.
pub(super) fn verify_intercom_webhook(
    secret: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), &'static str> {
    let Some(secret) = configured(secret) else {
        return Ok(());
    };
    let signature = header(headers, "x-hub-signature").ok_or("missing_signature")?;
    let hex_digest = signature.strip_prefix("sha1=").unwrap_or(signature);
    let expected = hex::decode(hex_digest).map_err(|_| "invalid_signature")?;

    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes()).map_err(|_| "bad_secret")?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| "invalid_signature")
}

/// `X-Body-Signature`: hex HMAC-SHA256 of card requests.
pub(super) fn verify_intercom_canvas(
    secret: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), &'static str> {
    let Some(secret) = configured(secret) else {
        return Ok(());
    };
    let signature = header(headers, "x-body-signature").ok_or("missing_signature")?;
    check_sha256(secret, body, signature)
}

#[cfg(test)]
pub(super) fn sign_sha256(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
pub(super) fn sign_sha1(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha1={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(name: &'static str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn no_secret_means_no_check() {
        assert!(verify_asana(None, &HeaderMap::new(), b"{}").is_ok());
        assert!(verify_intercom_webhook(Some("  "), &HeaderMap::new(), b"{}").is_ok());
    }

    #[test]
    fn asana_signature_is_checked() {
        let body = br#"{"events":[]}"#;
        let good = headers("x-hook-signature", &sign_sha256("s3cret", body));
        assert!(verify_asana(Some("s3cret"), &good, body).is_ok());

        let bad = headers("x-hook-signature", &sign_sha256("other", body));
        assert_eq!(verify_asana(Some("s3cret"), &bad, body), Err("invalid_signature"));
        assert_eq!(
            verify_asana(Some("s3cret"), &HeaderMap::new(), body),
            Err("missing_signature")
        );
        let garbage = headers("x-hook-signature", "not-hex");
        assert_eq!(verify_asana(Some("s3cret"), &garbage, body), Err("invalid_signature"));
    }

    #[test]
    fn intercom_webhook_uses_sha1_with_prefix() {
        let body = br#"{"topic":"ping"}"#;
        let good = headers("x-hub-signature", &sign_sha1("client", body));
        assert!(verify_intercom_webhook(Some("client"), &good, body).is_ok());

        let tampered = b"{\"topic\":\"pong\"}";
        assert_eq!(
            verify_intercom_webhook(Some("client"), &good, tampered),
            Err("invalid_signature")
        );
    }

    #[test]
    fn intercom_canvas_uses_sha256() {
        let body = br#"{"component_id":"refresh"}"#;
        let good = headers("x-body-signature", &sign_sha256("client", body));
        assert!(verify_intercom_canvas(Some("client"), &good, body).is_ok());
        assert!(verify_intercom_canvas(Some("client"), &good, b"{}").is_err());
    }
}
