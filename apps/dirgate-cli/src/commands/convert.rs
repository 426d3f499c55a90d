//! Convert command - Run an attribute value through the converter registry

use base64::Engine;
use clap::Args;
use dirgate_directory::convert::ConverterRegistry;
use dirgate_directory::schema::SchemaCatalog;
use dirgate_directory::value::RawValue;
use serde_json::Value;

use crate::error::{CliError, CliResult};

/// Arguments for the convert command
#[derive(Args)]
pub struct ConvertArgs {
    /// Attribute name (e.g. objectSid, userAccountControl)
    pub attribute: String,

    /// Raw value as text (repeatable)
    #[arg(long = "text")]
    pub text: Vec<String>,

    /// Raw binary value as base64 (repeatable)
    #[arg(long = "base64")]
    pub base64: Vec<String>,

    /// JSON value to convert to wire form instead
    #[arg(long, conflicts_with_all = ["text", "base64"])]
    pub reverse: Option<String>,
}

/// Execute the convert command
pub fn execute(args: ConvertArgs) -> CliResult<()> {
    let registry = ConverterRegistry::with_defaults();
    let catalog = SchemaCatalog::active_directory_defaults();

    let output = match &args.reverse {
        Some(json) => to_wire(&registry, &catalog, &args.attribute, json)?,
        None => {
            let raws = raw_values(&args)?;
            registry
                .convert_for_response(&catalog, &args.attribute, &raws)
                .unwrap_or(Value::Null)
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn raw_values(args: &ConvertArgs) -> CliResult<Vec<RawValue>> {
    let mut raws: Vec<RawValue> = args.text.iter().map(|t| RawValue::from(t.as_str())).collect();
    for encoded in &args.base64 {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| CliError::Validation(format!("invalid base64 '{encoded}': {e}")))?;
        raws.push(RawValue::Binary(bytes));
    }
    if raws.is_empty() {
        return Err(CliError::Validation(
            "provide at least one --text or --base64 value".into(),
        ));
    }
    Ok(raws)
}

/// Wire values as JSON: text stays a string, binary becomes base64.
fn to_wire(
    registry: &ConverterRegistry,
    catalog: &SchemaCatalog,
    attribute: &str,
    json: &str,
) -> CliResult<Value> {
    let value: Value = serde_json::from_str(json)?;
    let raws = registry.to_raw(attribute, catalog.value_kind(attribute), &value)?;
    Ok(Value::Array(
        raws.iter()
            .map(|raw| match raw {
                RawValue::Text(text) => Value::String(text.clone()),
                RawValue::Binary(bytes) => {
                    Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
                }
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(attribute: &str, text: &[&str], base64: &[&str]) -> ConvertArgs {
        ConvertArgs {
            attribute: attribute.to_string(),
            text: text.iter().map(|s| s.to_string()).collect(),
            base64: base64.iter().map(|s| s.to_string()).collect(),
            reverse: None,
        }
    }

    #[test]
    fn test_raw_values_requires_input() {
        assert!(raw_values(&args("cn", &[], &[])).is_err());
        assert!(raw_values(&args("objectSid", &[], &["not base64!"])).is_err());
        assert_eq!(raw_values(&args("cn", &["a", "b"], &[])).unwrap().len(), 2);
    }

    #[test]
    fn test_to_wire_flags() {
        let registry = ConverterRegistry::with_defaults();
        let catalog = SchemaCatalog::active_directory_defaults();
        let wire = to_wire(
            &registry,
            &catalog,
            "userAccountControl",
            r#"["AccountDisabled", "NormalAccount"]"#,
        )
        .unwrap();
        assert_eq!(wire, json!(["514"]));
    }

    #[test]
    fn test_to_wire_binary() {
        let registry = ConverterRegistry::with_defaults();
        let catalog = SchemaCatalog::active_directory_defaults();
        let wire = to_wire(&registry, &catalog, "objectSid", r#""S-1-5-32-544""#).unwrap();
        assert_eq!(wire, json!(["AQIAAAAAAAUgAAAAIAIAAA=="]));
    }
}
