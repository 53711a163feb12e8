//! SAML AuthnRequest for the HTTP-Redirect binding.

use anyhow::{Context, Result};
use base64ct::{Base64, Encoding};
use chrono::Utc;
use flate2::{Compression, write::DeflateEncoder};
use std::io::Write;
use ulid::Ulid;
use url::Url;

use crate::saml::RelayState;

pub const NAME_ID_FORMAT_UNSPECIFIED: &str =
    "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified";

/// Where and as whom the request is sent.
#[derive(Debug, Clone)]
pub struct IdpEndpoint {
    pub sso_url: String,
    pub sp_entity_id: String,
    pub acs_url: String,
    pub name_id_format: Option<String>,
}

/// Build the IdP redirect URL carrying the deflated request and the relay state.
///
/// # Errors
/// Fails when the SSO URL is not absolute or the relay state cannot be encoded.
pub fn redirect_url(endpoint: &IdpEndpoint, state: &RelayState) -> Result<String> {
    let mut url = Url::parse(&endpoint.sso_url)
        .with_context(|| format!("invalid IdP SSO URL: {}", endpoint.sso_url))?;

    let xml = authn_request_xml(endpoint, &format!("_{}", Ulid::new()));
    let saml_request = deflate_and_encode(&xml)?;
    let relay_state = state.encode().context("failed to encode relay state")?;

    url.query_pairs_mut()
        .append_pair("SAMLRequest", &saml_request)
        .append_pair("RelayState", &relay_state);

    Ok(url.into())
}

fn authn_request_xml(endpoint: &IdpEndpoint, request_id: &str) -> String {
    let issue_instant = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    let name_id_format = endpoint
        .name_id_format
        .as_deref()
        .unwrap_or(NAME_ID_FORMAT_UNSPECIFIED);

    format!(
        r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="{id}" Version="2.0" IssueInstant="{issue_instant}" Destination="{destination}" ProtocolBinding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" AssertionConsumerServiceURL="{acs}"><saml:Issuer>{issuer}</saml:Issuer><samlp:NameIDPolicy Format="{format}" AllowCreate="true"/></samlp:AuthnRequest>"#,
        id = request_id,
        destination = escape(&endpoint.sso_url),
        acs = escape(&endpoint.acs_url),
        issuer = escape(&endpoint.sp_entity_id),
        format = escape(name_id_format),
    )
}

fn deflate_and_encode(xml: &str) -> Result<String> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(xml.as_bytes())
        .context("failed to deflate AuthnRequest")?;
    let compressed = encoder.finish().context("failed to deflate AuthnRequest")?;
    Ok(Base64::encode_string(&compressed))
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saml::ProviderId;
    use flate2::read::DeflateDecoder;
    use std::io::Read;

    fn endpoint() -> IdpEndpoint {
        IdpEndpoint {
            sso_url: "https://idp.example.com/sso?tenant=a".to_string(),
            sp_entity_id: "https://sp.example.com/metadata".to_string(),
            acs_url: "https://sp.example.com/auth_saml/signin".to_string(),
            name_id_format: None,
        }
    }

    fn param(url: &Url, name: &str) -> Option<String> {
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    #[test]
    fn redirect_url_carries_request_and_state() -> Result<()> {
        let state = RelayState::new("acme", ProviderId(4)).with_action(12);
        let url = Url::parse(&redirect_url(&endpoint(), &state)?)?;

        assert_eq!(url.host_str(), Some("idp.example.com"));
        assert_eq!(param(&url, "tenant").as_deref(), Some("a"));

        let relay_state = param(&url, "RelayState").context("missing RelayState")?;
        assert_eq!(RelayState::decode(&relay_state)?, state);

        let saml_request = param(&url, "SAMLRequest").context("missing SAMLRequest")?;
        let compressed = Base64::decode_vec(&saml_request)
            .map_err(|err| anyhow::anyhow!("bad base64: {err}"))?;
        let mut xml = String::new();
        DeflateDecoder::new(compressed.as_slice()).read_to_string(&mut xml)?;

        assert!(xml.starts_with("<samlp:AuthnRequest"));
        assert!(xml.contains("<saml:Issuer>https://sp.example.com/metadata</saml:Issuer>"));
        assert!(xml.contains(r#"AssertionConsumerServiceURL="https://sp.example.com/auth_saml/signin""#));
        assert!(xml.contains(NAME_ID_FORMAT_UNSPECIFIED));
        Ok(())
    }

    #[test]
    fn attribute_values_are_escaped() {
        let mut endpoint = endpoint();
        endpoint.sp_entity_id = "urn:a&b<c>".to_string();
        let xml = authn_request_xml(&endpoint, "_id");
        assert!(xml.contains("<saml:Issuer>urn:a&amp;b&lt;c&gt;</saml:Issuer>"));
        assert!(xml.contains("Destination=\"https://idp.example.com/sso?tenant=a\""));
    }

    #[test]
    fn relative_sso_url_is_rejected() {
        let mut endpoint = endpoint();
        endpoint.sso_url = "/sso".to_string();
        assert!(redirect_url(&endpoint, &RelayState::new("acme", ProviderId(1))).is_err());
    }
}
