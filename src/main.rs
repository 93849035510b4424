//! Command-line entry point.
//!
//! Reads a Responder-style NTLMv1 capture and prints the steps for recovering the NT hash:
//!
//! $ ntlmv1-challenge --ntlmv1 'DC02$::corp:B32BDFA30A59A78100000000000000000000000000000000:77E69027CB4083C3823D4E3C0856589BA7720D304B324906:1122334455667788'
//!
//! Once hashcat has recovered both DES keys, the NT hash can be put together:
//!
//! $ ntlmv1-challenge assemble --key1 8923bcfdae753e62 --key2 16d640d6dcc1c26e --tail 586c

use std::fmt;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use log::{error, info};

use ntlmv1_challenge::deskey::{self, KeyError};
use ntlmv1_challenge::report::{self, ReportFlags};
use ntlmv1_challenge::{CaptureError, ParsedChallenge};


#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Decode an NTLMv1 capture into inputs for DES key recovery.
#[derive(Debug, Parser)]
#[command(version, about, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    decode: DecodeArgs,

    /// Increase log verbosity (repeatable). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Debug, Args)]
struct DecodeArgs {
    /// NTLMv1 capture in Responder format; read from stdin if absent.
    #[arg(long, env = "NTLMV1_CAPTURE")]
    ntlmv1: Option<String>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Leave out the step recovering the last four hex characters from the third ciphertext.
    #[arg(long)]
    no_ct3: bool,

    /// Print the decoded fields before the instructions.
    #[arg(long)]
    details: bool,
}
impl DecodeArgs {
    fn report_flags(&self) -> ReportFlags {
        let mut flags = ReportFlags::empty();
        flags.set(ReportFlags::CT3_STEP, !self.no_ct3);
        flags.set(ReportFlags::DETAILS, self.details);
        flags
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Assemble the NT hash from the recovered DES keys and the final two bytes.
    Assemble {
        /// DES key recovered for the first ciphertext (16 hex characters).
        #[arg(long)]
        key1: String,

        /// DES key recovered for the second ciphertext (16 hex characters).
        #[arg(long)]
        key2: String,

        /// Last four hex characters of the NT hash, as printed by ct3_to_ntlm.
        #[arg(long)]
        tail: Option<String>,
    },
}


#[derive(Debug)]
enum CliError {
    Capture(CaptureError),
    Key(KeyError),
    Io(io::Error),
    Json(serde_json::Error),
    MissingInput,
}
impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capture(e) => write!(f, "invalid capture: {}", e),
            Self::Key(e) => write!(f, "invalid key material: {}", e),
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Json(e) => write!(f, "failed to encode JSON: {}", e),
            Self::MissingInput => write!(f, "no capture given (use --ntlmv1, NTLMV1_CAPTURE or stdin)"),
        }
    }
}
impl std::error::Error for CliError {
}
impl From<CaptureError> for CliError {
    fn from(e: CaptureError) -> Self { Self::Capture(e) }
}
impl From<KeyError> for CliError {
    fn from(e: KeyError) -> Self { Self::Key(e) }
}
impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}
impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self { Self::Json(e) }
}


fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Returns the first non-blank line of `reader` with surrounding whitespace removed.
fn read_capture<R: BufRead>(reader: R) -> Result<String, CliError> {
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_owned());
        }
    }
    Err(CliError::MissingInput)
}

fn decode(args: DecodeArgs) -> Result<String, CliError> {
    let capture = match &args.ntlmv1 {
        Some(c) => c.clone(),
        None => {
            info!("no capture on the command line, reading stdin");
            read_capture(io::stdin().lock())?
        },
    };

    let parsed = ParsedChallenge::parse(&capture)?;
    info!("decoded capture for {}\\{}", parsed.domain(), parsed.username());

    let flags = args.report_flags();
    let output = match args.format {
        OutputFormat::Text => report::render_text(&parsed, flags),
        OutputFormat::Json => {
            let mut json = report::render_json(&parsed, flags)?;
            json.push('\n');
            json
        },
    };
    Ok(output)
}

fn assemble(key1: &str, key2: &str, tail: Option<&str>) -> Result<String, CliError> {
    let key1 = deskey::parse_des_key(key1)?;
    let key2 = deskey::parse_des_key(key2)?;

    let output = match tail {
        Some(t) => {
            let tail = deskey::parse_ct3_tail(t)?;
            hex::encode(deskey::assemble_nt_hash(key1, key2, tail))
        },
        None => {
            // without the tail, only 14 of the 16 bytes are known
            let mut partial = hex::encode(deskey::des_key_to_nt_segment(key1));
            partial.push_str(&hex::encode(deskey::des_key_to_nt_segment(key2)));
            partial
        },
    };
    Ok(format!("{}\n", output))
}

fn run(cli: Cli) -> Result<(), CliError> {
    let output = match cli.command {
        Some(Command::Assemble { key1, key2, tail }) => assemble(&key1, &key2, tail.as_deref())?,
        None => decode(cli.decode)?,
    };

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(output.as_bytes())?;
    handle.flush()?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        },
    }
}
