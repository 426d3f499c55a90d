//! CLI command implementations

pub mod convert;
pub mod directory;
pub mod filter;

use crate::error::CliResult;

/// Use the argument if given, otherwise read all of stdin.
pub(crate) fn read_input(arg: Option<String>) -> CliResult<String> {
    match arg {
        Some(text) => Ok(text),
        None => Ok(std::io::read_to_string(std::io::stdin())?),
    }
}
