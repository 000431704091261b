//! Raw subject-public-key extraction from a DER `SubjectPublicKeyInfo`.
//!
//! OCSP requests identify the issuing CA by `issuerKeyHash`: a hash over the
//! issuer's raw subject public key *bit string contents*, not over the whole
//! `SubjectPublicKeyInfo` (RFC 6960 4.1.1). Getting at those bytes needs a
//! short DER walk: descend into the outer SEQUENCE, skip the
//! `AlgorithmIdentifier` SEQUENCE, descend into the BIT STRING, and skip the
//! single zero "unused bits" octet.
//!
//! ```text
//! SubjectPublicKeyInfo ::= SEQUENCE {
//!     algorithm           AlgorithmIdentifier,
//!     subjectPublicKey    BIT STRING
//! }
//! ```

const TAG_CONSTRUCTED_SEQUENCE: u8 = 0x30;
const TAG_BIT_STRING: u8 = 0x03;
const LONG_FORM_MASK: u8 = 0x80;
const BIT_STRING_NO_UNUSED_BITS: u8 = 0x00;

/// Structural faults in a `SubjectPublicKeyInfo` encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SpkiError {
    #[error("SubjectPublicKeyInfo is truncated at offset {0}")]
    Truncated(usize),
    #[error("offset {0} is not an ASN.1 constructed SEQUENCE")]
    ExpectedSequence(usize),
    #[error("offset {0} is not an ASN.1 BIT STRING")]
    ExpectedBitString(usize),
    #[error("offset {0} is not a zero unused-bits octet")]
    ExpectedZeroUnusedBits(usize),
}

fn byte_at(der: &[u8], offset: usize) -> Result<u8, SpkiError> {
    der.get(offset).copied().ok_or(SpkiError::Truncated(offset))
}

/// Reads the length octets at `offset`, returning the content length and the
/// offset just past the length octets.
fn read_length(der: &[u8], offset: usize) -> Result<(usize, usize), SpkiError> {
    let first = byte_at(der, offset)?;
    if first & LONG_FORM_MASK == 0 {
        return Ok((first as usize, offset + 1));
    }

    let len_octets = (first & !LONG_FORM_MASK) as usize;
    if len_octets == 0 || len_octets > std::mem::size_of::<usize>() {
        return Err(SpkiError::Truncated(offset));
    }

    let mut length = 0usize;
    for idx in 0..len_octets {
        length = (length << 8) | byte_at(der, offset + 1 + idx)? as usize;
    }
    Ok((length, offset + 1 + len_octets))
}

/// Skips the identifier and length octets of the element at `offset`.
fn skip_header(der: &[u8], offset: usize) -> Result<usize, SpkiError> {
    let (_, after_length) = read_length(der, offset + 1)?;
    Ok(after_length)
}

/// Skips a whole element at `offset`: identifier, length, and contents.
fn skip_element(der: &[u8], offset: usize) -> Result<usize, SpkiError> {
    let (content_len, after_length) = read_length(der, offset + 1)?;
    let end = after_length.checked_add(content_len).ok_or(SpkiError::Truncated(offset))?;
    if end > der.len() {
        return Err(SpkiError::Truncated(offset));
    }
    Ok(end)
}

/// Extracts the raw subject public key bits from a DER-encoded
/// `SubjectPublicKeyInfo`.
///
/// For RSA keys the result is the DER `RSAPublicKey` structure; for EC keys
/// it is the uncompressed curve point. Either way it is exactly the byte
/// string RFC 6960 hashes into `issuerKeyHash`.
pub fn extract_subject_public_key(spki: &[u8]) -> Result<&[u8], SpkiError> {
    let mut offset = 0usize;

    if byte_at(spki, offset)? != TAG_CONSTRUCTED_SEQUENCE {
        return Err(SpkiError::ExpectedSequence(offset));
    }
    offset = skip_header(spki, offset)?;

    if byte_at(spki, offset)? != TAG_CONSTRUCTED_SEQUENCE {
        return Err(SpkiError::ExpectedSequence(offset));
    }
    offset = skip_element(spki, offset)?;

    if byte_at(spki, offset)? != TAG_BIT_STRING {
        return Err(SpkiError::ExpectedBitString(offset));
    }
    offset = skip_header(spki, offset)?;

    if byte_at(spki, offset)? != BIT_STRING_NO_UNUSED_BITS {
        return Err(SpkiError::ExpectedZeroUnusedBits(offset));
    }
    offset += 1;

    Ok(&spki[offset..])
}
