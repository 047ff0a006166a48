//! Request signing: canonical field ordering, SHA-1 sign, MD5 checkcode.
//!
//! Every request is signed over the union of its inner payload fields and
//! five outer identity fields. Keys are sorted lexicographically, joined as
//! `k=v&…` with raw values (no URL encoding), and suffixed with
//! `&key=<signKey>` before hashing.

use std::collections::BTreeMap;

use crate::digest::{md5_hex_upper, sha1_hex_upper};

/// The five outer fields that join the inner payload in the sign string.
#[derive(Debug, Clone)]
pub struct SignIdentity<'a> {
    pub country_code: &'a str,
    pub identifier: &'a str,
    pub imei_md5: &'a str,
    pub language: &'a str,
    pub req_timestamp: &'a str,
}

/// Build the canonical sign input for an inner field map and identity.
#[must_use]
pub fn sign_input(inner: &BTreeMap<String, String>, identity: &SignIdentity<'_>, sign_key: &str) -> String {
    let mut fields: BTreeMap<&str, &str> =
        inner.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    fields.insert("countryCode", identity.country_code);
    fields.insert("identifier", identity.identifier);
    fields.insert("imeiMD5", identity.imei_md5);
    fields.insert("language", identity.language);
    fields.insert("reqTimestamp", identity.req_timestamp);

    let mut out = String::new();
    for (k, v) in &fields {
        if !out.is_empty() {
            out.push('&');
        }
        out.push_str(k);
        out.push('=');
        out.push_str(v);
    }
    out.push_str("&key=");
    out.push_str(sign_key);
    out
}

/// Compute the `sign` field: uppercase SHA-1 over the canonical input.
#[must_use]
pub fn sign(inner: &BTreeMap<String, String>, identity: &SignIdentity<'_>, sign_key: &str) -> String {
    sha1_hex_upper(&sign_input(inner, identity, sign_key))
}

/// Compute the `checkcode` field: uppercase MD5 over the fixed concatenation
/// of identifier, imeiMD5, reqTimestamp, serviceTime, and the sign key.
#[must_use]
pub fn checkcode(
    identifier: &str,
    imei_md5: &str,
    req_timestamp: &str,
    service_time: &str,
    sign_key: &str,
) -> String {
    let mut input =
        String::with_capacity(identifier.len() + imei_md5.len() + req_timestamp.len() + service_time.len() + sign_key.len());
    input.push_str(identifier);
    input.push_str(imei_md5);
    input.push_str(req_timestamp);
    input.push_str(service_time);
    input.push_str(sign_key);
    md5_hex_upper(&input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (BTreeMap<String, String>, String) {
        let inner = BTreeMap::from([
            ("vin".to_string(), "V1".to_string()),
            ("timeStamp".to_string(), "1770817900000".to_string()),
        ]);
        (inner, md5_hex_upper("S"))
    }

    const IDENTITY: SignIdentity<'static> = SignIdentity {
        country_code: "NL",
        identifier: "1434",
        imei_md5: "00000000000000000000000000000000",
        language: "en",
        req_timestamp: "1770817900000",
    };

    #[test]
    fn sign_input_is_sorted_and_suffixed() {
        let (inner, key) = fixture();
        let input = sign_input(&inner, &IDENTITY, &key);
        assert_eq!(
            input,
            "countryCode=NL&identifier=1434&imeiMD5=00000000000000000000000000000000\
             &language=en&reqTimestamp=1770817900000&timeStamp=1770817900000&vin=V1\
             &key=5DBC98DCC983A70728BD082D1A47546E"
        );
    }

    #[test]
    fn sign_matches_reference_vector() {
        let (inner, key) = fixture();
        assert_eq!(
            sign(&inner, &IDENTITY, &key),
            "B11F861F7ABFBEB4B60AF3D8BF4A693D00FEF7E4"
        );
    }

    #[test]
    fn sign_is_deterministic_uppercase_40_hex() {
        let (inner, key) = fixture();
        let a = sign(&inner, &IDENTITY, &key);
        let b = sign(&inner, &IDENTITY, &key);
        assert_eq!(a, b);
        assert_eq!(a.len(), 40);
        assert!(a.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn outer_identity_overrides_inner_duplicate() {
        // An inner field colliding with an outer identity key must not
        // produce two entries; the outer value wins.
        let (mut inner, key) = fixture();
        inner.insert("identifier".into(), "spoofed".into());
        let input = sign_input(&inner, &IDENTITY, &key);
        assert!(input.contains("identifier=1434"));
        assert!(!input.contains("spoofed"));
    }

    #[test]
    fn checkcode_matches_reference_vector() {
        let key = md5_hex_upper("S");
        assert_eq!(
            checkcode(
                "1434",
                "00000000000000000000000000000000",
                "1770817900000",
                "1770817900001",
                &key,
            ),
            "C0BAE028A717F3E9FC796926510F3EE8"
        );
    }
}
