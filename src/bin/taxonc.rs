//! Validate a classification response document against the output contract.

use std::fs;
use std::io::{self, Read};
use std::process::ExitCode;

use clap::error::ErrorKind;
use ortho_config::{OrthoConfig, OrthoError};
use serde_json::Value;
use taxon_contract::cli::{TaxoncArgs, init_tracing};
use taxon_contract::{CanonicalOutput, OutputValidator};

fn read_document(args: &TaxoncArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let raw = match &args.document {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    Ok(serde_json::from_str(&raw)?)
}

/// The clap error behind a `--help` or `--version` request, if that is what
/// stopped argument loading.
fn display_request(error: &OrthoError) -> Option<&clap::Error> {
    match error {
        OrthoError::CliParsing(e)
            if matches!(
                e.kind(),
                ErrorKind::DisplayHelp
                    | ErrorKind::DisplayVersion
                    | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
            ) =>
        {
            Some(&**e)
        }
        OrthoError::Aggregate(errors) => errors.iter().find_map(display_request),
        _ => None,
    }
}

fn run(args: &TaxoncArgs) -> Result<String, Box<dyn std::error::Error>> {
    let validator = OutputValidator::new(args.policy()?);
    let document = read_document(args)?;
    let output = CanonicalOutput::from_value_with(&document, &validator)?;
    tracing::info!(
        taxonomies = output.predicted_labels().len(),
        "response document satisfies the output contract"
    );
    Ok(serde_json::to_string_pretty(&output.to_mapping())?)
}

fn main() -> ExitCode {
    init_tracing();
    let args = match TaxoncArgs::load() {
        Ok(args) => args,
        Err(e) => {
            if let Some(display) = display_request(&e) {
                print!("{display}");
                return ExitCode::SUCCESS;
            }
            eprintln!("taxonc: {e}");
            return ExitCode::from(2);
        }
    };
    match run(&args) {
        Ok(rendered) => {
            println!("{rendered}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("taxonc: {e}");
            ExitCode::FAILURE
        }
    }
}
