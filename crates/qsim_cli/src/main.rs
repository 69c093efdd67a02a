mod cli;
mod output;

use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::Parser;
use qsim_core::{check_similarity, group_similar_questions, ErrorBody, QsimError, ServiceContext};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Request};

/// Distinct per failure kind so scripts can tell a bad request from an
/// unreachable provider.
fn exit_code(err: &QsimError) -> u8 {
    match err {
        QsimError::Validation(_) => 2,
        QsimError::PoorQualityInput { .. } => 3,
        QsimError::ResourceNotFound { .. } => 4,
        QsimError::ProviderConfig { .. } => 5,
        QsimError::ProviderUnavailable { .. } => 6,
        QsimError::DimensionMismatch { .. } => 7,
    }
}

async fn run(cli: &Cli) -> Result<ExitCode> {
    cli.validate().map_err(|e| anyhow!(e))?;

    let ctx = ServiceContext::new(cli.to_settings());
    let outcome = match cli.request() {
        Request::Check(request) => check_similarity(&request, &ctx)
            .await
            .map(|response| output::print_check(cli.output, &response)),
        Request::Group(request) => group_similar_questions(&request, &ctx)
            .await
            .map(|response| output::print_group(cli.output, &response)),
    };

    match outcome {
        Ok(printed) => {
            printed?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            tracing::debug!(kind = err.kind(), error = %err, "request failed");
            output::print_error(cli.output, &ErrorBody::from(&err))?;
            Ok(ExitCode::from(exit_code(&err)))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    match run(&cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
