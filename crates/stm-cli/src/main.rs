use clap::Parser;

mod bootstrap;
mod cli;
mod convert;
mod status;

use status::Status;

fn main() {
    let status = match run() {
        Ok(status) => status,
        Err(error) => {
            tracing::error!(error = %format!("{error:#}"), "conversion failed");
            Status::failure(root_message(&error))
        }
    };
    println!("{}", status.render());
    if !status.is_success() {
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<Status> {
    let cli = cli::Cli::try_parse().or_else(|error| {
        if error.use_stderr() {
            Err(anyhow::anyhow!(error.render().to_string().trim().to_string()))
        } else {
            error.exit()
        }
    })?;
    init_tracing(cli.quiet, cli.verbose)?;

    let config = bootstrap::load_config(cli.config.as_deref())?;
    let conversion = convert::convert(
        &config,
        &cli.input,
        cli.output.as_deref(),
        cli.report.as_deref(),
    )?;

    Ok(Status::success(
        conversion.output.display().to_string(),
        &conversion.report,
    ))
}

/// Translation errors speak for themselves; anything else keeps its context.
fn root_message(error: &anyhow::Error) -> String {
    error
        .downcast_ref::<stm_core::errors::TranslationError>()
        .map_or_else(|| format!("{error:#}"), ToString::to_string)
}

fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("STIX2MISP_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
