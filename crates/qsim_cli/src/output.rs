use std::io::{self, Write};

use anyhow::Result;
use qsim_core::{CheckResponse, ErrorBody, GroupResponse, Record};
use serde::Serialize;

use crate::cli::OutputFormat;

pub fn print_check(format: OutputFormat, response: &CheckResponse) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(response),
        OutputFormat::Text => {
            let mut out = io::stdout().lock();
            writeln!(out, "Response: {}", response.response)?;
            if let Some(reason) = &response.reason {
                writeln!(out, "Reason: {reason}")?;
            }
            for record in response.matched_questions.iter().flatten() {
                write_record(&mut out, "  ", record)?;
            }
            Ok(())
        }
    }
}

pub fn print_group(format: OutputFormat, response: &GroupResponse) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(response),
        OutputFormat::Text => {
            let mut out = io::stdout().lock();
            writeln!(out, "Response: {}", response.response)?;
            if let Some(reason) = &response.reason {
                writeln!(out, "Reason: {reason}")?;
            }
            for (i, group) in response.matched_groups.iter().flatten().enumerate() {
                writeln!(out, "Group {} ({} questions)", i + 1, group.len())?;
                for record in group {
                    write_record(&mut out, "  ", record)?;
                }
            }
            Ok(())
        }
    }
}

/// Failures go to stdout in JSON mode so callers always get a parseable body.
pub fn print_error(format: OutputFormat, body: &ErrorBody) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(body),
        OutputFormat::Text => {
            let mut err = io::stderr().lock();
            writeln!(err, "error [{}]: {}", body.kind, body.error)?;
            if let Some(reason) = &body.reason {
                writeln!(err, "  reason: {reason}")?;
            }
            if let Some(fields) = &body.fields {
                writeln!(err, "  fields: {fields}")?;
            }
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}

fn write_record(out: &mut impl Write, indent: &str, record: &Record) -> io::Result<()> {
    writeln!(out, "{indent}Q: {}", record.question)?;
    if !record.answer.is_empty() {
        writeln!(out, "{indent}A: {}", record.answer)?;
    }
    Ok(())
}
