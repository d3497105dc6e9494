use thiserror::Error;

/// Errors in command-line input
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid hex input '{input}': {source}")]
    InvalidHex {
        input: String,
        #[source]
        source: hex::FromHexError,
    },

    #[error("Invalid message ID '{0}', expected a byte such as 0x30")]
    InvalidMessageId(String),

    #[error("Product code character '{0}' names no known MTi family")]
    UnknownFamily(char),

    #[error("Replay transport cannot send on the control pipe")]
    ReadOnly,
}

pub fn parse_hex(input: &str) -> Result<Vec<u8>, CliError> {
    let cleaned: String = input
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(&cleaned).map_err(|source| CliError::InvalidHex {
        input: input.to_string(),
        source,
    })
}

pub fn parse_message_id(input: &str) -> Result<u8, CliError> {
    let digits = input.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(digits, 16).map_err(|_| CliError::InvalidMessageId(input.to_string()))
}
