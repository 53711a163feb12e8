//! SAML Response verification seam.
//!
//! XML signature checking belongs to the deployment's SAML library; the
//! default [`SamaelVerifier`] parses the response with `samael` and enforces
//! the structural rules: success status, expected issuer, validity window and
//! a subject NameID.

use base64ct::{Base64, Encoding};
use chrono::{DateTime, Duration, Utc};
use samael::schema::Response;
use thiserror::Error;

const STATUS_SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";

#[derive(Debug, Error)]
pub enum AssertionError {
    /// Not a SAML response at all.
    #[error("malformed SAML response: {0}")]
    Malformed(String),
    /// A well formed response that must not open a session.
    #[error("assertion rejected: {0}")]
    Rejected(String),
}

/// Identity extracted from an accepted assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedAssertion {
    pub assertion_id: String,
    pub issuer: String,
    pub name_id: String,
    pub name_id_format: Option<String>,
    pub not_on_or_after: Option<DateTime<Utc>>,
}

pub trait AssertionVerifier: Send + Sync {
    /// Verify the base64 `SAMLResponse` issued by `expected_issuer`.
    ///
    /// # Errors
    /// [`AssertionError::Malformed`] for undecodable input,
    /// [`AssertionError::Rejected`] for responses that fail a check.
    fn verify(
        &self,
        saml_response: &str,
        expected_issuer: &str,
    ) -> Result<VerifiedAssertion, AssertionError>;
}

/// Upper bound for the configurable clock skew.
pub const MAX_CLOCK_SKEW_SECONDS: i64 = 3600;

#[derive(Debug, Clone)]
pub struct SamaelVerifier {
    clock_skew: Duration,
}

impl SamaelVerifier {
    /// Skew is clamped to `0..=MAX_CLOCK_SKEW_SECONDS`.
    #[must_use]
    pub fn new(clock_skew_seconds: i64) -> Self {
        Self {
            clock_skew: Duration::seconds(clock_skew_seconds.clamp(0, MAX_CLOCK_SKEW_SECONDS)),
        }
    }

    fn verify_at(
        &self,
        saml_response: &str,
        expected_issuer: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedAssertion, AssertionError> {
        // IdPs commonly wrap the base64 payload
        let compact: String = saml_response
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let document = Base64::decode_vec(&compact)
            .map_err(|_| AssertionError::Malformed("SAMLResponse is not base64".to_string()))?;
        let xml = String::from_utf8(document)
            .map_err(|_| AssertionError::Malformed("SAMLResponse is not UTF-8".to_string()))?;

        let response: Response = xml
            .parse::<Response>()
            .map_err(|err| AssertionError::Malformed(err.to_string()))?;

        if let Some(status) = &response.status {
            let code = status.status_code.value.as_deref();
            if code != Some(STATUS_SUCCESS) {
                let message = status
                    .status_message
                    .as_ref()
                    .and_then(|message| message.value.clone())
                    .unwrap_or_else(|| code.unwrap_or("missing status code").to_string());
                return Err(AssertionError::Rejected(format!("IdP status: {message}")));
            }
        }

        let assertion = response.assertion.as_ref().ok_or_else(|| {
            AssertionError::Malformed("response contains no plaintext assertion".to_string())
        })?;

        let issuer = assertion.issuer.value.clone().unwrap_or_default();
        if issuer.trim() != expected_issuer.trim() {
            return Err(AssertionError::Rejected(format!(
                "unexpected issuer {issuer:?}"
            )));
        }

        let mut not_on_or_after = None;
        if let Some(conditions) = &assertion.conditions {
            if let Some(not_before) = conditions.not_before {
                if now < not_before - self.clock_skew {
                    return Err(AssertionError::Rejected(
                        "assertion not yet valid".to_string(),
                    ));
                }
            }
            if let Some(expiry) = conditions.not_on_or_after {
                if now >= expiry + self.clock_skew {
                    return Err(AssertionError::Rejected("assertion expired".to_string()));
                }
                not_on_or_after = Some(expiry);
            }
        }

        let name_id = assertion
            .subject
            .as_ref()
            .and_then(|subject| subject.name_id.as_ref())
            .filter(|name_id| !name_id.value.trim().is_empty())
            .ok_or_else(|| AssertionError::Rejected("assertion has no subject NameID".to_string()))?;

        Ok(VerifiedAssertion {
            assertion_id: assertion.id.clone(),
            issuer,
            name_id: name_id.value.trim().to_string(),
            name_id_format: name_id.format.clone(),
            not_on_or_after,
        })
    }
}

impl AssertionVerifier for SamaelVerifier {
    fn verify(
        &self,
        saml_response: &str,
        expected_issuer: &str,
    ) -> Result<VerifiedAssertion, AssertionError> {
        self.verify_at(saml_response, expected_issuer, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const IDP: &str = "https://idp.example.com/metadata";

    struct Doc<'a> {
        status: &'a str,
        issuer: &'a str,
        name_id: &'a str,
        not_before: &'a str,
        not_on_or_after: &'a str,
    }

    impl Default for Doc<'_> {
        fn default() -> Self {
            Self {
                status: STATUS_SUCCESS,
                issuer: IDP,
                name_id: "alice@example.com",
                not_before: "2026-03-01T10:00:00Z",
                not_on_or_after: "2026-03-01T10:05:00Z",
            }
        }
    }

    fn response(doc: &Doc<'_>) -> String {
        let xml = format!(
            r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_resp1" Version="2.0" IssueInstant="2026-03-01T10:00:00Z" Destination="https://sp.example.com/auth_saml/signin"><saml:Issuer>{issuer}</saml:Issuer><samlp:Status><samlp:StatusCode Value="{status}"/></samlp:Status><saml:Assertion ID="_assert1" Version="2.0" IssueInstant="2026-03-01T10:00:00Z"><saml:Issuer>{issuer}</saml:Issuer><saml:Subject><saml:NameID Format="urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress">{name_id}</saml:NameID></saml:Subject><saml:Conditions NotBefore="{not_before}" NotOnOrAfter="{not_on_or_after}"></saml:Conditions></saml:Assertion></samlp:Response>"#,
            issuer = doc.issuer,
            status = doc.status,
            name_id = doc.name_id,
            not_before = doc.not_before,
            not_on_or_after = doc.not_on_or_after,
        );
        Base64::encode_string(xml.as_bytes())
    }

    fn at(minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, minute, second)
            .single()
            .unwrap_or_else(Utc::now)
    }

    #[test]
    fn clock_skew_is_clamped() {
        assert_eq!(SamaelVerifier::new(-5).clock_skew, Duration::zero());
        assert_eq!(
            SamaelVerifier::new(MAX_CLOCK_SKEW_SECONDS * 10).clock_skew,
            Duration::seconds(MAX_CLOCK_SKEW_SECONDS)
        );
    }

    #[test]
    fn accepts_valid_assertion() -> Result<(), AssertionError> {
        let verifier = SamaelVerifier::new(0);
        let verified = verifier.verify_at(&response(&Doc::default()), IDP, at(1, 0))?;
        assert_eq!(verified.assertion_id, "_assert1");
        assert_eq!(verified.name_id, "alice@example.com");
        assert_eq!(verified.issuer, IDP);
        assert_eq!(
            verified.name_id_format.as_deref(),
            Some("urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress")
        );
        Ok(())
    }

    #[test]
    fn tolerates_wrapped_base64() -> Result<(), AssertionError> {
        let encoded = response(&Doc::default());
        let wrapped: String = encoded
            .as_bytes()
            .chunks(64)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect::<Vec<_>>()
            .join("\r\n");
        SamaelVerifier::new(0).verify_at(&wrapped, IDP, at(1, 0))?;
        Ok(())
    }

    #[test]
    fn rejects_failed_status() {
        let doc = Doc {
            status: "urn:oasis:names:tc:SAML:2.0:status:Requester",
            ..Doc::default()
        };
        assert!(matches!(
            SamaelVerifier::new(0).verify_at(&response(&doc), IDP, at(1, 0)),
            Err(AssertionError::Rejected(_))
        ));
    }

    #[test]
    fn rejects_foreign_issuer() {
        let doc = Doc {
            issuer: "https://evil.example.com",
            ..Doc::default()
        };
        assert!(matches!(
            SamaelVerifier::new(0).verify_at(&response(&doc), IDP, at(1, 0)),
            Err(AssertionError::Rejected(_))
        ));
    }

    #[test]
    fn enforces_validity_window_with_skew() {
        let encoded = response(&Doc::default());
        let strict = SamaelVerifier::new(0);
        assert!(matches!(
            strict.verify_at(&encoded, IDP, at(5, 0)),
            Err(AssertionError::Rejected(_))
        ));
        assert!(matches!(
            strict.verify_at(
                &encoded,
                IDP,
                Utc.with_ymd_and_hms(2026, 3, 1, 9, 59, 0)
                    .single()
                    .unwrap_or_else(Utc::now)
            ),
            Err(AssertionError::Rejected(_))
        ));

        let lenient = SamaelVerifier::new(180);
        assert!(lenient.verify_at(&encoded, IDP, at(6, 0)).is_ok());
    }

    #[test]
    fn rejects_blank_subject() {
        let doc = Doc {
            name_id: " ",
            ..Doc::default()
        };
        assert!(
            SamaelVerifier::new(0)
                .verify_at(&response(&doc), IDP, at(1, 0))
                .is_err()
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let verifier = SamaelVerifier::new(0);
        assert!(matches!(
            verifier.verify("not base64!", IDP),
            Err(AssertionError::Malformed(_))
        ));
        let not_xml = Base64::encode_string(b"hello");
        assert!(matches!(
            verifier.verify(&not_xml, IDP),
            Err(AssertionError::Malformed(_))
        ));
    }
}
