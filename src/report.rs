//! Rendering of a parsed capture into instructions for recovering the NT hash.
//!
//! The instructions name external tools (hashcat and the hashcat-utils helpers); nothing in this
//! crate runs them.


use std::fmt::Write;

use bitflags::bitflags;
use serde::Serialize;

use crate::ParsedChallenge;


/// The hashcat invocation that brute-forces the DES keys of the first two ciphertexts.
pub const HASHCAT_COMMAND: &str = "./hashcat -m 14000 -a 3 -1 charsets/DES_full.charset --hex-charset hashfile.txt ?1?1?1?1?1?1?1?1";

/// The hashcat-utils script turning a recovered DES key into 7 bytes of the NT hash.
pub const DESKEY_TO_NTLM: &str = "./deskey_to_ntlm.pl";

/// The hashcat-utils binary recovering the last 2 bytes of the NT hash from the third ciphertext.
pub const CT3_TO_NTLM: &str = "./ct3_to_ntlm.bin";


bitflags! {
    /// Options controlling which parts of the report are emitted.
    #[derive(Clone, Copy, Debug, Hash, Eq, Ord, PartialEq, PartialOrd)]
    pub struct ReportFlags: u8 {
        /// Include the step recovering the last two bytes of the NT hash from the third ciphertext.
        const CT3_STEP = 0x01;

        /// Precede the report with the decoded capture fields.
        const DETAILS = 0x02;
    }
}
impl Default for ReportFlags {
    fn default() -> Self {
        Self::CT3_STEP
    }
}


/// The lines to feed into hashcat mode 14000, one per DES key to recover.
pub fn hashcat_lines(parsed: &ParsedChallenge) -> [String; 2] {
    let [ct1, ct2, _] = parsed.ciphertexts();
    [
        format!("{}:{}", ct1, parsed.effective_challenge()),
        format!("{}:{}", ct2, parsed.effective_challenge()),
    ]
}

/// The command recovering the last two bytes of the NT hash.
pub fn ct3_command(parsed: &ParsedChallenge) -> String {
    format!("{} {} {}", CT3_TO_NTLM, parsed.ciphertexts()[2], parsed.effective_challenge())
}


/// Renders the human-readable report.
pub fn render_text(parsed: &ParsedChallenge, flags: ReportFlags) -> String {
    let mut out = String::new();
    // writing into a String cannot fail
    let _ = write_text(&mut out, parsed, flags);
    out
}

fn write_text(out: &mut String, parsed: &ParsedChallenge, flags: ReportFlags) -> std::fmt::Result {
    if flags.contains(ReportFlags::DETAILS) {
        writeln!(out, "Username: {}", parsed.username())?;
        writeln!(out, "Domain: {}", parsed.domain())?;
        writeln!(out, "Server Challenge: {}", parsed.server_challenge())?;
        match parsed.client_challenge() {
            Some(client) => {
                writeln!(out, "ESS: negotiated")?;
                writeln!(out, "Client Challenge: {}", client)?;
            },
            None => {
                writeln!(out, "ESS: not negotiated")?;
            },
        }
        writeln!(out, "Effective Challenge: {}", parsed.effective_challenge())?;
        writeln!(out)?;
    }

    let ciphertexts = parsed.ciphertexts();
    for (i, ct) in ciphertexts.iter().enumerate() {
        writeln!(out, "Cipher Text {}: {}", i + 1, ct)?;
    }

    writeln!(out)?;
    writeln!(out, "1. Save the following lines in a file:")?;
    for line in hashcat_lines(parsed) {
        writeln!(out, "{}", line)?;
    }

    writeln!(out)?;
    writeln!(out, "2. Recover the DES keys using hashcat:")?;
    writeln!(out, "{}", HASHCAT_COMMAND)?;

    writeln!(out)?;
    writeln!(out, "3. Use the recovered DES keys to calculate the original NT hash segments using the hashcat utils tool:")?;
    writeln!(out, "{} <des_key_1>", DESKEY_TO_NTLM)?;
    writeln!(out, "{} <des_key_2>", DESKEY_TO_NTLM)?;

    writeln!(out)?;
    if flags.contains(ReportFlags::CT3_STEP) {
        writeln!(out, "4. Recover the final four characters of the NT hash using hashcat utils tool:")?;
        writeln!(out, "{}", ct3_command(parsed))?;
        writeln!(out)?;
        writeln!(out, "5. Concatenate the three parts of the NT hash together.")?;
    } else {
        writeln!(out, "4. Concatenate the two parts of the NT hash together; the final four characters are still missing.")?;
    }
    Ok(())
}


/// The machine-readable form of the report.
#[derive(Clone, Debug, Serialize)]
pub struct JsonReport<'a> {
    pub username: &'a str,
    pub domain: &'a str,
    pub lm_challenge_response: &'a str,
    pub nt_challenge_response: &'a str,
    pub server_challenge: &'a str,
    pub ess_negotiated: bool,
    pub client_challenge: Option<&'a str>,
    pub effective_challenge: &'a str,
    pub ciphertexts: [&'a str; 3],
    pub hashcat_lines: [String; 2],
    pub hashcat_command: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ct3_command: Option<String>,
}
impl<'a> JsonReport<'a> {
    pub fn new(parsed: &'a ParsedChallenge, flags: ReportFlags) -> Self {
        let ct3_command = if flags.contains(ReportFlags::CT3_STEP) {
            Some(ct3_command(parsed))
        } else {
            None
        };

        Self {
            username: parsed.username(),
            domain: parsed.domain(),
            lm_challenge_response: parsed.lm_challenge_response(),
            nt_challenge_response: parsed.nt_challenge_response(),
            server_challenge: parsed.server_challenge(),
            ess_negotiated: parsed.ess_negotiated(),
            client_challenge: parsed.client_challenge(),
            effective_challenge: parsed.effective_challenge(),
            ciphertexts: parsed.ciphertexts(),
            hashcat_lines: hashcat_lines(parsed),
            hashcat_command: HASHCAT_COMMAND,
            ct3_command,
        }
    }
}

/// Renders the report as a single-line JSON document.
pub fn render_json(parsed: &ParsedChallenge, flags: ReportFlags) -> Result<String, serde_json::Error> {
    serde_json::to_string(&JsonReport::new(parsed, flags))
}


#[cfg(test)]
mod tests {
    use super::*;

    const ESS_CAPTURE: &str = "DC02$::corp:B32BDFA30A59A78100000000000000000000000000000000:77E69027CB4083C3823D4E3C0856589BA7720D304B324906:1122334455667788";
    const PLAIN_CAPTURE: &str = "alice::CONTOSO:95ACA8C7248774CB427E1AE5B8D5CE6830A49B5BB858D384:0C4E0EEF0F9DDCB4C2A74D0B0C5B54E95EF9D6C7D7BF4F3A:1122334455667788";

    #[test]
    fn pairs_ciphertexts_with_effective_challenge() {
        let parsed = ParsedChallenge::parse(ESS_CAPTURE).unwrap();
        assert_eq!(
            hashcat_lines(&parsed),
            ["77E69027CB4083C3:32823dcd780fa5fa".to_owned(), "823D4E3C0856589B:32823dcd780fa5fa".to_owned()],
        );
        assert_eq!(ct3_command(&parsed), "./ct3_to_ntlm.bin A7720D304B324906 32823dcd780fa5fa");
    }

    #[test]
    fn renders_default_text_report() {
        let parsed = ParsedChallenge::parse(PLAIN_CAPTURE).unwrap();
        let text = render_text(&parsed, ReportFlags::default());
        let expected = "\
Cipher Text 1: 0C4E0EEF0F9DDCB4
Cipher Text 2: C2A74D0B0C5B54E9
Cipher Text 3: 5EF9D6C7D7BF4F3A

1. Save the following lines in a file:
0C4E0EEF0F9DDCB4:1122334455667788
C2A74D0B0C5B54E9:1122334455667788

2. Recover the DES keys using hashcat:
./hashcat -m 14000 -a 3 -1 charsets/DES_full.charset --hex-charset hashfile.txt ?1?1?1?1?1?1?1?1

3. Use the recovered DES keys to calculate the original NT hash segments using the hashcat utils tool:
./deskey_to_ntlm.pl <des_key_1>
./deskey_to_ntlm.pl <des_key_2>

4. Recover the final four characters of the NT hash using hashcat utils tool:
./ct3_to_ntlm.bin 5EF9D6C7D7BF4F3A 1122334455667788

5. Concatenate the three parts of the NT hash together.
";
        assert_eq!(text, expected);
    }

    #[test]
    fn omits_ct3_step_on_request() {
        let parsed = ParsedChallenge::parse(PLAIN_CAPTURE).unwrap();
        let text = render_text(&parsed, ReportFlags::empty());
        assert!(!text.contains(CT3_TO_NTLM));
        assert!(text.ends_with("4. Concatenate the two parts of the NT hash together; the final four characters are still missing.\n"));
    }

    #[test]
    fn details_show_ess_derivation() {
        let parsed = ParsedChallenge::parse(ESS_CAPTURE).unwrap();
        let text = render_text(&parsed, ReportFlags::DETAILS | ReportFlags::CT3_STEP);
        assert!(text.starts_with("Username: DC02$\nDomain: corp\nServer Challenge: 1122334455667788\nESS: negotiated\nClient Challenge: B32BDFA30A59A781\nEffective Challenge: 32823dcd780fa5fa\n\n"));
        assert!(text.contains("5. Concatenate"));
    }

    #[test]
    fn renders_json_report() {
        let parsed = ParsedChallenge::parse(ESS_CAPTURE).unwrap();
        let json: serde_json::Value = serde_json::from_str(&render_json(&parsed, ReportFlags::default()).unwrap()).unwrap();
        assert_eq!(json["username"], "DC02$");
        assert_eq!(json["ess_negotiated"], true);
        assert_eq!(json["client_challenge"], "B32BDFA30A59A781");
        assert_eq!(json["effective_challenge"], "32823dcd780fa5fa");
        assert_eq!(json["ciphertexts"][2], "A7720D304B324906");
        assert_eq!(json["hashcat_lines"][0], "77E69027CB4083C3:32823dcd780fa5fa");
        assert_eq!(json["ct3_command"], "./ct3_to_ntlm.bin A7720D304B324906 32823dcd780fa5fa");

        let without_ct3: serde_json::Value = serde_json::from_str(&render_json(&parsed, ReportFlags::empty()).unwrap()).unwrap();
        assert!(without_ct3.get("ct3_command").is_none());
    }

    #[test]
    fn json_client_challenge_is_null_without_ess() {
        let parsed = ParsedChallenge::parse(PLAIN_CAPTURE).unwrap();
        let json: serde_json::Value = serde_json::from_str(&render_json(&parsed, ReportFlags::default()).unwrap()).unwrap();
        assert_eq!(json["ess_negotiated"], false);
        assert!(json["client_challenge"].is_null());
        assert_eq!(json["effective_challenge"], "1122334455667788");
    }
}
