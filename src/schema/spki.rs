//! Minimal DER helpers for `SubjectPublicKeyInfo` documents.
//!
//! TUF metadata carries RSA and ECDSA public keys as PEM-encoded
//! `SubjectPublicKeyInfo` documents, while `ring` wants the raw key material
//! inside the document's BIT STRING (an `RSAPublicKey` or an uncompressed EC
//! point). These helpers unwrap and rebuild that envelope; they are not a
//! general-purpose ASN.1 implementation.

use crate::schema::error::{self, Result};
use snafu::{ensure, OptionExt, ResultExt};

const TAG_SEQUENCE: u8 = 0x30;
const TAG_OID: u8 = 0x06;
const TAG_NULL: u8 = 0x05;
const TAG_BIT_STRING: u8 = 0x03;

/// OID 1.2.840.113549.1.1.1 (rsaEncryption).
pub(crate) const OID_RSA_ENCRYPTION: &[u8] =
    &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01];
/// OID 1.2.840.10045.2.1 (id-ecPublicKey).
pub(crate) const OID_EC_PUBLIC_KEY: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01];
/// OID 1.2.840.10045.3.1.7 (secp256r1).
pub(crate) const OID_NISTP256: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07];

/// The algorithm parameters expected alongside an algorithm OID.
pub(crate) enum Params {
    /// An ASN.1 NULL (RSA).
    Null,
    /// A named curve OID (ECDSA).
    Oid(&'static [u8]),
}

/// A cursor over a DER-encoded byte string.
struct Der<'a> {
    input: &'a [u8],
}

impl<'a> Der<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input }
    }

    fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    /// Reads one tag-length-value element, returning the tag and contents.
    fn tlv(&mut self) -> Result<(u8, &'a [u8])> {
        let (&tag, rest) = self
            .input
            .split_first()
            .context(error::SpkiDecodeSnafu { reason: "truncated element" })?;
        let (&first, rest) = rest
            .split_first()
            .context(error::SpkiDecodeSnafu { reason: "truncated length" })?;
        let (length, rest) = if first & 0x80 == 0 {
            (usize::from(first), rest)
        } else {
            let count = usize::from(first & 0x7f);
            ensure!(
                count > 0 && count <= std::mem::size_of::<usize>() && count <= rest.len(),
                error::SpkiDecodeSnafu { reason: "invalid long-form length" }
            );
            let mut length = 0usize;
            for &byte in &rest[..count] {
                length = (length << 8) | usize::from(byte);
            }
            (length, &rest[count..])
        };
        ensure!(
            length <= rest.len(),
            error::SpkiDecodeSnafu { reason: "length exceeds input" }
        );
        let (contents, rest) = rest.split_at(length);
        self.input = rest;
        Ok((tag, contents))
    }

    fn expect(&mut self, expected: u8, reason: &'static str) -> Result<&'a [u8]> {
        let (tag, contents) = self.tlv()?;
        ensure!(tag == expected, error::SpkiDecodeSnafu { reason });
        Ok(contents)
    }
}

/// Extracts the subject public key bytes from a PEM `SubjectPublicKeyInfo`
/// document, checking the algorithm OID and its parameters.
pub(crate) fn decode(pem_document: &str, oid: &[u8], params: &Params) -> Result<Vec<u8>> {
    let pem = pem::parse(pem_document).context(error::PemParseSnafu)?;
    ensure!(
        pem.tag == "PUBLIC KEY",
        error::SpkiDecodeSnafu { reason: "not a PUBLIC KEY document" }
    );

    let mut outer = Der::new(&pem.contents);
    let spki = outer.expect(TAG_SEQUENCE, "expected SubjectPublicKeyInfo sequence")?;
    ensure!(
        outer.is_empty(),
        error::SpkiDecodeSnafu { reason: "trailing data after SubjectPublicKeyInfo" }
    );

    let mut spki = Der::new(spki);
    let algorithm = spki.expect(TAG_SEQUENCE, "expected AlgorithmIdentifier sequence")?;
    let mut algorithm = Der::new(algorithm);
    let found_oid = algorithm.expect(TAG_OID, "expected algorithm OID")?;
    ensure!(
        found_oid == oid,
        error::SpkiDecodeSnafu { reason: "unexpected algorithm OID" }
    );
    match params {
        Params::Null => {
            algorithm.expect(TAG_NULL, "expected NULL algorithm parameters")?;
        }
        Params::Oid(expected) => {
            let found = algorithm.expect(TAG_OID, "expected parameter OID")?;
            ensure!(
                found == *expected,
                error::SpkiDecodeSnafu { reason: "unexpected parameter OID" }
            );
        }
    }

    let bit_string = spki.expect(TAG_BIT_STRING, "expected subjectPublicKey bit string")?;
    let (&unused, key) = bit_string
        .split_first()
        .context(error::SpkiDecodeSnafu { reason: "empty bit string" })?;
    ensure!(
        unused == 0,
        error::SpkiDecodeSnafu { reason: "bit string has unused bits" }
    );
    Ok(key.to_vec())
}

/// Wraps raw subject public key bytes in a PEM `SubjectPublicKeyInfo`
/// document for the given algorithm.
pub(crate) fn encode(oid: &[u8], params: &Params, key: &[u8]) -> String {
    let mut algorithm = tlv(TAG_OID, oid);
    match params {
        Params::Null => algorithm.extend(tlv(TAG_NULL, &[])),
        Params::Oid(param_oid) => algorithm.extend(tlv(TAG_OID, param_oid)),
    }

    let mut bit_string = vec![0u8];
    bit_string.extend_from_slice(key);

    let mut spki = tlv(TAG_SEQUENCE, &algorithm);
    spki.extend(tlv(TAG_BIT_STRING, &bit_string));
    let document = tlv(TAG_SEQUENCE, &spki);

    pem::encode_config(
        &pem::Pem {
            tag: "PUBLIC KEY".to_owned(),
            contents: document,
        },
        pem::EncodeConfig {
            line_ending: pem::LineEnding::LF,
        },
    )
}

fn tlv(tag: u8, contents: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let length = contents.len();
    if length < 0x80 {
        out.push(length as u8);
    } else {
        let bytes = length.to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(contents);
    out
}

#[cfg(test)]
mod tests {
    use super::{decode, encode, Params, OID_EC_PUBLIC_KEY, OID_NISTP256};

    #[test]
    fn ec_round_trip() {
        // An uncompressed P-256 point is 65 bytes; the exact contents do not
        // matter for envelope handling.
        let mut point = vec![0x04u8];
        point.extend((0..64).map(|i| i as u8));

        let pem = encode(OID_EC_PUBLIC_KEY, &Params::Oid(OID_NISTP256), &point);
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));

        let decoded = decode(&pem, OID_EC_PUBLIC_KEY, &Params::Oid(OID_NISTP256)).unwrap();
        assert_eq!(decoded, point);
    }

    #[test]
    fn wrong_oid_rejected() {
        let point = vec![0x04u8; 65];
        let pem = encode(OID_EC_PUBLIC_KEY, &Params::Oid(OID_NISTP256), &point);
        assert!(decode(&pem, super::OID_RSA_ENCRYPTION, &Params::Null).is_err());
    }

    #[test]
    fn long_form_lengths() {
        // More than 127 content bytes forces a long-form length encoding.
        let key = vec![0xabu8; 300];
        let pem = encode(super::OID_RSA_ENCRYPTION, &Params::Null, &key);
        let decoded = decode(&pem, super::OID_RSA_ENCRYPTION, &Params::Null).unwrap();
        assert_eq!(decoded, key);
    }
}
