//! Decoding of captured NTLMv1 challenge-responses.
//!
//! An NTLMv1 response consists of three DES encryptions of the same 8-byte challenge, keyed with
//! consecutive 7-byte segments of the user's NT hash (the last segment padded with zeroes).
//! Recovering the DES keys therefore recovers the NT hash. This crate takes a capture in the
//! colon-delimited format written by Responder and similar tools, splits it into its fields and
//! works out which challenge has to be paired with each ciphertext block.
//!
//! Sample usage:
//! ```
//! let capture = "DC02$::corp:B32BDFA30A59A78100000000000000000000000000000000:77E69027CB4083C3823D4E3C0856589BA7720D304B324906:1122334455667788";
//! let parsed: ntlmv1_challenge::ParsedChallenge = capture.parse()
//!     .expect("failed to parse capture");
//!
//! // the LM response ends in zeroes, so the client mixed in its own challenge
//! assert!(parsed.ess_negotiated());
//! assert_eq!(parsed.effective_challenge(), "32823dcd780fa5fa");
//!
//! for ciphertext in &parsed.ciphertexts()[0..2] {
//!     println!("{}:{}", ciphertext, parsed.effective_challenge());
//! }
//! ```


pub mod deskey;
pub mod report;


use std::fmt;
use std::str::FromStr;

use digest::Digest;
use log::{debug, trace, warn};
use md5::Md5;


/// The separator between the fields of a capture.
const FIELD_SEPARATOR: char = ':';

/// The number of fields in a capture.
const FIELD_COUNT: usize = 6;

/// The length of an NTLMv1 LM or NT response in hex characters (24 bytes).
pub const RESPONSE_HEX_LEN: usize = 48;

/// The length of a challenge in hex characters (8 bytes).
pub const CHALLENGE_HEX_LEN: usize = 16;

/// The tail of an LM response field if the client used extended session security.
///
/// With ESS, the LM response field carries the 8-byte client challenge followed by 16 zero bytes.
/// Only the last 14 of those bytes are checked.
const ESS_LM_SUFFIX: &str = "0000000000000000000000000000";

/// The server challenge to request when recapturing without ESS, matching common rainbow tables.
const RAINBOW_TABLE_CHALLENGE: &str = "1122334455667788";


/// A field of a capture string.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum CaptureField {
    Username,
    Reserved,
    Domain,
    LmResponse,
    NtResponse,
    ServerChallenge,
}
impl CaptureField {
    /// The zero-based position of this field within the capture string.
    pub fn index(&self) -> usize {
        match self {
            Self::Username => 0,
            Self::Reserved => 1,
            Self::Domain => 2,
            Self::LmResponse => 3,
            Self::NtResponse => 4,
            Self::ServerChallenge => 5,
        }
    }
}
impl fmt::Display for CaptureField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Username => "username",
            Self::Reserved => "reserved field",
            Self::Domain => "domain",
            Self::LmResponse => "LM response",
            Self::NtResponse => "NT response",
            Self::ServerChallenge => "server challenge",
        };
        write!(f, "{}", name)
    }
}


/// An error that may occur while parsing a captured challenge-response.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum CaptureError {
    /// The capture does not consist of the expected number of colon-separated fields.
    MalformedInput { expected_fields: usize, obtained_fields: usize },

    /// A hexadecimal field is shorter or longer than expected.
    UnexpectedLength { field: CaptureField, expected: usize, obtained: usize },

    /// A hexadecimal field contains a character that is not a hex digit.
    InvalidHexEncoding { field: CaptureField, character: char, index: usize },
}
impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedInput { expected_fields, obtained_fields }
                => write!(
                    f,
                    "malformed capture (expected {} colon-separated fields, obtained {}); input should look like USERNAME::DOMAIN:LM_RESPONSE:NT_RESPONSE:SERVER_CHALLENGE",
                    expected_fields, obtained_fields,
                ),
            Self::UnexpectedLength { field: CaptureField::NtResponse, expected, obtained }
                => write!(f, "NT response has {} hex characters instead of {}; is this really an NTLMv1 capture?", obtained, expected),
            Self::UnexpectedLength { field, expected, obtained }
                => write!(f, "{} has {} hex characters instead of {}", field, obtained, expected),
            Self::InvalidHexEncoding { field, character, index }
                => write!(f, "{} is not valid hex ({:?} at position {})", field, character, index),
        }
    }
}
impl std::error::Error for CaptureError {
}


/// A decoded NTLMv1 capture along with the challenge its ciphertexts were encrypted with.
///
/// Values are only obtained through [`ParsedChallenge::parse`] (or the equivalent `FromStr` and
/// `TryFrom` implementations), so every instance upholds the field length invariants.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ParsedChallenge {
    username: String,
    domain: String,
    lm_challenge_response: String,
    nt_challenge_response: String,
    server_challenge: String,
    ess_negotiated: bool,
    effective_challenge: String,
}
impl ParsedChallenge {
    /// Parses a capture of the form `USERNAME::DOMAIN:LM_RESPONSE:NT_RESPONSE:SERVER_CHALLENGE`.
    ///
    /// The second field is historically the client's hostname and is ignored, but must be present.
    /// Field values are kept verbatim; in particular, the case of hex digits is preserved.
    pub fn parse(raw: &str) -> Result<Self, CaptureError> {
        let segments: Vec<&str> = raw.split(FIELD_SEPARATOR).collect();
        if segments.len() != FIELD_COUNT {
            return Err(CaptureError::MalformedInput { expected_fields: FIELD_COUNT, obtained_fields: segments.len() });
        }

        let field = |f: CaptureField| segments[f.index()];

        // the NT response length is what tells NTLMv1 apart from NTLMv2, so check it first
        check_length(CaptureField::NtResponse, field(CaptureField::NtResponse), RESPONSE_HEX_LEN)?;
        check_length(CaptureField::LmResponse, field(CaptureField::LmResponse), RESPONSE_HEX_LEN)?;
        check_length(CaptureField::ServerChallenge, field(CaptureField::ServerChallenge), CHALLENGE_HEX_LEN)?;

        decode_hex::<24>(CaptureField::LmResponse, field(CaptureField::LmResponse))?;
        decode_hex::<24>(CaptureField::NtResponse, field(CaptureField::NtResponse))?;
        decode_hex::<8>(CaptureField::ServerChallenge, field(CaptureField::ServerChallenge))?;

        let username = field(CaptureField::Username).to_owned();
        let domain = field(CaptureField::Domain).to_owned();
        let lm_challenge_response = field(CaptureField::LmResponse).to_owned();
        let nt_challenge_response = field(CaptureField::NtResponse).to_owned();
        let server_challenge = field(CaptureField::ServerChallenge).to_owned();
        trace!("parsed capture for {:?} in domain {:?}", username, domain);

        let ess_negotiated = is_ess_response(&lm_challenge_response);
        let effective_challenge = if ess_negotiated {
            warn!(
                "extended session security (ESS) was negotiated during NTLMv1 authentication; if cracking with rainbow tables, recapture using --disable-ess and a server challenge of {}",
                RAINBOW_TABLE_CHALLENGE,
            );
            derive_ess_challenge(&server_challenge, &lm_challenge_response)?
        } else {
            server_challenge.clone()
        };

        Ok(Self {
            username,
            domain,
            lm_challenge_response,
            nt_challenge_response,
            server_challenge,
            ess_negotiated,
            effective_challenge,
        })
    }

    /// The name of the authenticating account.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The domain of the authenticating account. Empty for local accounts.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The LM response as 48 hex characters.
    pub fn lm_challenge_response(&self) -> &str {
        &self.lm_challenge_response
    }

    /// The NT response as 48 hex characters.
    pub fn nt_challenge_response(&self) -> &str {
        &self.nt_challenge_response
    }

    /// The challenge sent by the server as 16 hex characters.
    pub fn server_challenge(&self) -> &str {
        &self.server_challenge
    }

    /// Whether the client used extended session security (NTLM2 session response).
    pub fn ess_negotiated(&self) -> bool {
        self.ess_negotiated
    }

    /// The challenge that was actually DES-encrypted, as 16 hex characters.
    ///
    /// Equals the server challenge unless ESS was negotiated.
    pub fn effective_challenge(&self) -> &str {
        &self.effective_challenge
    }

    /// The challenge contributed by the client, if ESS was negotiated.
    pub fn client_challenge(&self) -> Option<&str> {
        if self.ess_negotiated {
            Some(&self.lm_challenge_response[0..CHALLENGE_HEX_LEN])
        } else {
            None
        }
    }

    /// The three 8-byte ciphertext blocks of the NT response, as 16 hex characters each.
    ///
    /// The first two are encrypted with the first and second 7-byte segment of the NT hash; the
    /// third with the last two bytes of the NT hash padded with zeroes.
    pub fn ciphertexts(&self) -> [&str; 3] {
        let nt = self.nt_challenge_response.as_str();
        [
            &nt[0..CHALLENGE_HEX_LEN],
            &nt[CHALLENGE_HEX_LEN..2*CHALLENGE_HEX_LEN],
            &nt[2*CHALLENGE_HEX_LEN..3*CHALLENGE_HEX_LEN],
        ]
    }
}
impl FromStr for ParsedChallenge {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
impl TryFrom<&str> for ParsedChallenge {
    type Error = CaptureError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}


/// Parses a capture string. Shorthand for [`ParsedChallenge::parse`].
pub fn parse(raw: &str) -> Result<ParsedChallenge, CaptureError> {
    ParsedChallenge::parse(raw)
}


/// Returns whether an LM response field indicates that extended session security was negotiated.
///
/// This is the case if the last 28 hex characters (14 bytes) are zero.
pub fn is_ess_response(lm_challenge_response: &str) -> bool {
    lm_challenge_response.ends_with(ESS_LM_SUFFIX)
}


/// Calculates the challenge that an ESS client actually encrypts.
///
/// Both challenges are concatenated (server first), hashed using MD5 and the first 8 bytes of the
/// digest are kept.
pub fn ess_challenge(server_challenge: [u8; 8], client_challenge: [u8; 8]) -> [u8; 8] {
    let mut md5 = <Md5 as Digest>::new();
    md5.update(server_challenge);
    md5.update(client_challenge);
    let digest = md5.finalize();

    let mut challenge = [0u8; 8];
    challenge.copy_from_slice(&digest.as_slice()[0..8]);
    challenge
}


/// Derives the effective challenge from a server challenge and an ESS LM response, both in hex.
///
/// The client challenge is the first 8 bytes of the LM response. The result is 16 lowercase hex
/// characters.
pub fn derive_ess_challenge(server_challenge: &str, lm_challenge_response: &str) -> Result<String, CaptureError> {
    check_length(CaptureField::ServerChallenge, server_challenge, CHALLENGE_HEX_LEN)?;
    check_length(CaptureField::LmResponse, lm_challenge_response, RESPONSE_HEX_LEN)?;

    let server_bytes: [u8; 8] = decode_hex(CaptureField::ServerChallenge, server_challenge)?;
    let lm_bytes: [u8; 24] = decode_hex(CaptureField::LmResponse, lm_challenge_response)?;

    let mut client_bytes = [0u8; 8];
    client_bytes.copy_from_slice(&lm_bytes[0..8]);

    let challenge = hex::encode(ess_challenge(server_bytes, client_bytes));
    debug!("ESS challenge from server challenge {} and client challenge {}: {}", server_challenge, hex::encode(client_bytes), challenge);
    Ok(challenge)
}


fn check_length(field: CaptureField, value: &str, expected: usize) -> Result<(), CaptureError> {
    if value.len() != expected {
        return Err(CaptureError::UnexpectedLength { field, expected, obtained: value.len() });
    }
    Ok(())
}

/// Decodes a hex field into exactly `N` bytes.
fn decode_hex<const N: usize>(field: CaptureField, value: &str) -> Result<[u8; N], CaptureError> {
    let mut buf = [0u8; N];
    hex::decode_to_slice(value, &mut buf)
        .map_err(|e| match e {
            hex::FromHexError::InvalidHexCharacter { c, index }
                => CaptureError::InvalidHexEncoding { field, character: c, index },
            _ => CaptureError::UnexpectedLength { field, expected: 2 * N, obtained: value.len() },
        })?;
    Ok(buf)
}
