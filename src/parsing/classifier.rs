// Positional token parsing of tgen log lines
//
// The tgen log grammar is a fixed external contract. Every field below is
// located by its whitespace-delimited token index, so a format change only
// ever touches this file.

use super::types::{Classification, TransferEvent, TransferOutcome, TransferTiming};

/// Marker of the startup line that names the host
pub const HOST_MARKER: &str = "Initializing traffic generator on host";
/// Marker of a successful transfer
pub const COMPLETE_MARKER: &str = "transfer-complete";
/// Marker of a failed transfer
pub const ERROR_MARKER: &str = "transfer-error";

const TIMESTAMP_TOKEN: usize = 2;
const EVENT_TOKEN: usize = 6;
const ERROR_DETAIL_TOKEN: usize = 10;
const HOST_TOKEN: usize = 11;
const DIRECTION_TOKEN: usize = 13;
const TIMING_TOKENS: [(usize, &str); 5] = [
    (15, "command"),
    (16, "response"),
    (17, "first-byte"),
    (18, "last-byte"),
    (19, "checksum"),
];
const ERROR_CODE_FIELD: usize = 7;

/// Classify a single log line. Never fails: lines that match a trigger but
/// cannot be parsed come back as [`Classification::Malformed`].
///
/// Host lines are only recognised while `host_known` is false; once the
/// source is named they are checked for transfer triggers like any other line.
pub fn classify(line: &str, host_known: bool) -> Classification {
    if !host_known && line.contains(HOST_MARKER) {
        return match line.split_whitespace().nth(HOST_TOKEN) {
            Some(name) => Classification::HostIdentity(name.to_string()),
            None => Classification::Malformed(format!(
                "host line has no token {}",
                HOST_TOKEN + 1
            )),
        };
    }

    if !line.contains(COMPLETE_MARKER) && !line.contains(ERROR_MARKER) {
        return Classification::Irrelevant;
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    parse_transfer(&tokens).unwrap_or_else(Classification::Malformed)
}

/// Unix timestamp in seconds carried by a tgen line, if any
pub fn line_timestamp(line: &str) -> Option<f64> {
    line.split_whitespace()
        .nth(TIMESTAMP_TOKEN)
        .and_then(|t| t.parse::<f64>().ok())
}

fn parse_transfer(tokens: &[&str]) -> Result<Classification, String> {
    let io = token(tokens, DIRECTION_TOKEN)?;
    let mut io_parts = io.split('=');

    // The direction is checked before anything else is extracted
    let direction = io_parts.next().unwrap_or_default();
    if !direction.contains("read") {
        return Ok(Classification::ServerSide);
    }

    let amount = io_parts
        .next()
        .ok_or_else(|| format!("direction token '{}' has no value", io))?;
    let bytes = amount
        .split('/')
        .next()
        .unwrap_or_default()
        .parse::<u64>()
        .map_err(|e| format!("invalid byte count in '{}': {}", io, e))?;

    let event = token(tokens, EVENT_TOKEN)?;
    let outcome = if event.contains(COMPLETE_MARKER) {
        TransferOutcome::Success(parse_timing(tokens)?)
    } else if event.contains(ERROR_MARKER) {
        TransferOutcome::Error {
            code: parse_error_code(tokens)?,
        }
    } else {
        return Ok(Classification::Irrelevant);
    };

    let timestamp = tokens
        .get(TIMESTAMP_TOKEN)
        .and_then(|t| t.parse::<f64>().ok());

    Ok(Classification::Transfer(TransferEvent {
        timestamp,
        bytes,
        outcome,
    }))
}

fn parse_timing(tokens: &[&str]) -> Result<TransferTiming, String> {
    let mut values = [0.0f64; TIMING_TOKENS.len()];
    for (slot, (index, name)) in values.iter_mut().zip(TIMING_TOKENS) {
        let raw = token(tokens, index)?;
        let millis = raw
            .split('=')
            .nth(1)
            .ok_or_else(|| format!("{} time token '{}' has no value", name, raw))?
            .parse::<i64>()
            .map_err(|e| format!("invalid {} time in '{}': {}", name, raw, e))?;
        *slot = millis as f64 / 1000.0;
    }

    let [command, response, first_byte, last_byte, checksum] = values;
    Ok(TransferTiming {
        command,
        response,
        first_byte,
        last_byte,
        checksum,
    })
}

fn parse_error_code(tokens: &[&str]) -> Result<String, String> {
    let detail = token(tokens, ERROR_DETAIL_TOKEN)?;
    let field = detail
        .trim_matches(|c| c == '(' || c == ')')
        .split('-')
        .nth(ERROR_CODE_FIELD)
        .ok_or_else(|| format!("error detail '{}' has too few fields", detail))?;
    field
        .split('=')
        .nth(1)
        .map(str::to_string)
        .ok_or_else(|| format!("error field '{}' has no value", field))
}

fn token<'a>(tokens: &[&'a str], index: usize) -> Result<&'a str, String> {
    tokens
        .get(index)
        .copied()
        .ok_or_else(|| {
            format!(
                "line has {} tokens, expected at least {}",
                tokens.len(),
                index + 1
            )
        })
}
