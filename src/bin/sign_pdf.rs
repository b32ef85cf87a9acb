//! Sign a PDF
//!
//! Signs one document with the transport configured in the environment
//! (`NEXT_PRIVATE_SIGNING_*`).
//!
//! Usage:
//!   sign-pdf input.pdf output.pdf
//!   sign-pdf input.pdf output.pdf --signer "Jane Doe" --signer "John Roe"
//!   sign-pdf input.pdf output.pdf --document-id 42
//!
//! Set `RUST_LOG=debug` for progress output.

use pdf_signing::{PdfSigner, SignOptions, SigningConfig};
use std::path::PathBuf;
use std::process::ExitCode;

const USAGE: &str = "usage: sign-pdf <input.pdf> <output.pdf> [--signer NAME]... [--document-id N]";

struct SignArgs {
    input: PathBuf,
    output: PathBuf,
    options: SignOptions,
}

impl SignArgs {
    fn from_args() -> Result<Self, String> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let mut paths = Vec::new();
        let mut signers = Vec::new();
        let mut document_id = None;

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--signer" => {
                    i += 1;
                    let name = args.get(i).ok_or("--signer needs a value")?;
                    signers.push(name.clone());
                },
                "--document-id" => {
                    i += 1;
                    let value = args.get(i).ok_or("--document-id needs a value")?;
                    let id = value
                        .parse::<i64>()
                        .map_err(|_| format!("invalid document id '{}'", value))?;
                    document_id = Some(id);
                },
                "--help" | "-h" => return Err(USAGE.to_string()),
                flag if flag.starts_with("--") => return Err(format!("unknown option {}\n{}", flag, USAGE)),
                path => paths.push(PathBuf::from(path)),
            }
            i += 1;
        }

        let [input, output]: [PathBuf; 2] = paths.try_into().map_err(|_| USAGE.to_string())?;
        let mut options = SignOptions::default();
        if !signers.is_empty() {
            options = options.with_signers(signers);
        }
        if let Some(id) = document_id {
            options = options.with_document_id(id);
        }

        Ok(Self {
            input,
            output,
            options,
        })
    }
}

fn run(args: &SignArgs) -> pdf_signing::Result<usize> {
    let config = SigningConfig::from_env()?;
    let signer = PdfSigner::from_config(&config)?;

    let input = std::fs::read(&args.input)?;
    let signed = signer.sign(&input, &args.options)?;
    std::fs::write(&args.output, &signed)?;
    Ok(signed.len())
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match SignArgs::from_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::from(2);
        },
    };

    match run(&args) {
        Ok(len) => {
            println!("Signed {} -> {} ({} bytes)", args.input.display(), args.output.display(), len);
            ExitCode::SUCCESS
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        },
    }
}
