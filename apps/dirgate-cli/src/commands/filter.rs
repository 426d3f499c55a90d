//! Filter command - Render a structured filter to wire syntax

use clap::Args;
use dirgate_directory::filter::{from_structured, to_structured, FilterStatement};
use serde_json::Value;

use super::read_input;
use crate::error::CliResult;

/// Arguments for the filter command
#[derive(Args)]
pub struct FilterArgs {
    /// Structured filter as JSON (read from stdin when omitted)
    pub filter: Option<String>,

    /// Print the normalized structured form instead of wire syntax
    #[arg(long)]
    pub json: bool,

    /// Negate the filter before printing
    #[arg(long)]
    pub negate: bool,
}

/// Execute the filter command
pub fn execute(args: FilterArgs) -> CliResult<()> {
    let input = read_input(args.filter)?;
    let mut statement = parse(&input)?;
    if args.negate {
        statement = statement.negate();
    }
    println!("{}", render(&statement, args.json)?);
    Ok(())
}

pub(crate) fn parse(input: &str) -> CliResult<FilterStatement> {
    let value: Value = serde_json::from_str(input)?;
    Ok(from_structured(&value)?)
}

fn render(statement: &FilterStatement, json: bool) -> CliResult<String> {
    if json {
        Ok(serde_json::to_string_pretty(&to_structured(statement))?)
    } else {
        Ok(statement.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;

    #[test]
    fn test_parse_and_render() {
        let statement = parse(r#"{"or": [{"cn": {"pattern": "a*"}}, {"not": {"mail": null}}]}"#).unwrap();
        assert_eq!(render(&statement, false).unwrap(), "(|(cn=a*)(!(mail=*)))");
        assert_eq!(
            render(&statement.negate(), false).unwrap(),
            "(!(|(cn=a*)(!(mail=*))))"
        );
    }

    #[test]
    fn test_render_structured() {
        let statement = parse(r#"{"objectClass": "user"}"#).unwrap();
        let json: Value = serde_json::from_str(&render(&statement, true).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"objectClass": "user"}));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse("{"), Err(CliError::Validation(_))));
        assert!(matches!(
            parse(r#"{"a": 1, "b": 2}"#),
            Err(CliError::Directory(_))
        ));
    }
}
