mod args;
mod error;
mod render;
mod session;

use std::fs::{self, File};
use std::path::Path;
use std::process::ExitCode;

use log::{error, info};
use schemaform::{FormDefinition, FormEngine, RuleRegistry};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode, WriteLogger};

use crate::args::{Cli, Command};
use crate::error::CliError;
use crate::render::{TextRenderer, layout};
use crate::session::Session;

fn init_logging(cli: &Cli) -> Result<(), CliError> {
    match &cli.log_file {
        Some(path) => {
            let file = File::create(path).map_err(|source| CliError::LogFile {
                path: path.clone(),
                source,
            })?;
            WriteLogger::init(cli.log_level, Config::default(), file)?;
        }
        None => TermLogger::init(
            cli.log_level,
            Config::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        )?,
    }
    Ok(())
}

fn load(path: &Path) -> Result<FormEngine, CliError> {
    let text = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let definition = FormDefinition::from_json(&text)?;
    let form = FormEngine::from_definition(definition, RuleRegistry::builtin())?;
    info!("Loaded {} ({} entries)", path.display(), form.fields().len());
    Ok(form)
}

async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    match cli.command {
        Command::Check { definition } => {
            let form = load(&definition)?;
            for (index, field) in form.fields().iter().enumerate() {
                let rules: Vec<&str> = field.rules.keys().map(String::as_str).collect();
                println!(
                    "{:>3}  {:<14} {:<16} {}",
                    index,
                    field.kind.as_str(),
                    field.model.as_deref().unwrap_or("-"),
                    rules.join(", ")
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            definition,
            steps,
            json,
        } => {
            let mut session = Session::new(load(&definition)?);
            session.run(&steps).await?;

            for line in session.log() {
                println!("{}", line);
            }
            println!();

            let form = session.form();
            print!("{}", layout(&form.render(&TextRenderer)));
            if json {
                println!("{}", serde_json::to_string_pretty(&form.validity())?);
            }

            Ok(if form.invalid() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();
    if let Err(e) = init_logging(&cli) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
