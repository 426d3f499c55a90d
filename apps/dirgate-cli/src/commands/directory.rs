//! Directory commands - Search and modify a configured domain

use clap::Args;
use dirgate_directory::config::EngineConfig;
use dirgate_directory::edit::EditRequest;
use dirgate_directory::search::{SearchScope, SortDirection};
use dirgate_directory::service::DirectoryService;
use dirgate_ldap::{build_service, DomainsConfig};
use serde_json::Value;
use tracing::debug;

use super::{filter, read_input};
use crate::error::{CliError, CliResult};

/// Options shared by every directory command
#[derive(Args)]
pub struct DomainArgs {
    /// Domain key from DIRGATE_DOMAINS
    #[arg(long, short = 'd', env = "DIRGATE_DOMAIN")]
    pub domain: String,
}

/// Arguments for the search command
#[derive(Args)]
pub struct SearchArgs {
    #[command(flatten)]
    pub target: DomainArgs,

    /// Structured filter as JSON (read from stdin when omitted)
    pub filter: Option<String>,

    /// Search base DN (defaults to the domain's base DN)
    #[arg(long)]
    pub base: Option<String>,

    /// Search scope: base, onelevel or subtree
    #[arg(long, default_value = "subtree")]
    pub scope: SearchScope,

    /// Properties to return; "default" expands to the class defaults
    #[arg(long, short = 'p', value_delimiter = ',')]
    pub properties: Vec<String>,

    /// Object class used to pick default properties
    #[arg(long)]
    pub object_class: Option<String>,

    /// Maximum number of objects (0 = no limit)
    #[arg(long, default_value_t = 0)]
    pub size_limit: u32,

    /// Sort by this property
    #[arg(long)]
    pub sort: Option<String>,

    /// Sort descending
    #[arg(long, requires = "sort")]
    pub descending: bool,
}

/// Arguments for the edit command
#[derive(Args)]
pub struct EditArgs {
    #[command(flatten)]
    pub target: DomainArgs,

    /// Distinguished name of the entry
    #[arg(long)]
    pub dn: String,

    /// Edits as a JSON array of {property, kind, value} (stdin when omitted)
    pub edits: Option<String>,
}

/// Arguments for the create command
#[derive(Args)]
pub struct CreateArgs {
    #[command(flatten)]
    pub target: DomainArgs,

    /// Distinguished name of the new entry
    #[arg(long)]
    pub dn: String,

    /// Attributes as a JSON object (stdin when omitted)
    pub attributes: Option<String>,
}

/// Arguments for the rename command
#[derive(Args)]
pub struct RenameArgs {
    #[command(flatten)]
    pub target: DomainArgs,

    #[arg(long)]
    pub dn: String,

    /// New relative name (e.g. "CN=Jane Smith")
    #[arg(long)]
    pub new_rdn: String,
}

/// Arguments for the move command
#[derive(Args)]
pub struct MoveArgs {
    #[command(flatten)]
    pub target: DomainArgs,

    #[arg(long)]
    pub dn: String,

    /// DN of the new parent container
    #[arg(long)]
    pub new_parent: String,
}

/// Arguments for the delete command
#[derive(Args)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub target: DomainArgs,

    #[arg(long)]
    pub dn: String,
}

/// Connect to every configured domain.
async fn connect() -> CliResult<(DomainsConfig, DirectoryService)> {
    let domains = DomainsConfig::from_env()?;
    let engine = EngineConfig::from_env()?;
    let service = build_service(&domains, engine).await?;
    Ok((domains, service))
}

/// Execute the search command
pub async fn search(args: SearchArgs) -> CliResult<()> {
    let statement = filter::parse(&read_input(args.filter)?)?;
    let (domains, service) = connect().await?;

    let base = match args.base {
        Some(base) => base,
        None => domains
            .get(&args.target.domain)
            .map(|config| config.base_dn.clone())
            .ok_or_else(|| CliError::Config(format!("unknown domain '{}'", args.target.domain)))?,
    };

    let mut builder = service
        .query(statement)
        .base(base)
        .scope(args.scope)
        .size_limit(args.size_limit)
        .properties(args.properties)
        .resolve_defaults(
            args.object_class.as_deref(),
            &service.config().default_properties,
        );
    if let Some(sort) = args.sort {
        let direction = if args.descending {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        };
        builder = builder.sort_by(sort, direction);
    }
    let query = builder.build();
    debug!(filter = %query.filter, properties = ?query.properties_to_load, "Running search");

    let results = service.search(&args.target.domain, query).await?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    if results.truncated {
        eprintln!("(results truncated at {} objects)", results.count());
    }
    Ok(())
}

/// Execute the edit command
pub async fn edit(args: EditArgs) -> CliResult<()> {
    let edits: Vec<EditRequest> = serde_json::from_str(&read_input(args.edits)?)?;
    let (_, service) = connect().await?;
    service.edit(&args.target.domain, &args.dn, edits).await?;
    println!("Modified {}", args.dn);
    Ok(())
}

/// Execute the create command
pub async fn create(args: CreateArgs) -> CliResult<()> {
    let Value::Object(attributes) = serde_json::from_str::<Value>(&read_input(args.attributes)?)? else {
        return Err(CliError::Validation("attributes must be a JSON object".into()));
    };
    let (_, service) = connect().await?;
    service
        .create(&args.target.domain, &args.dn, &attributes)
        .await?;
    println!("Created {}", args.dn);
    Ok(())
}

/// Execute the rename command
pub async fn rename(args: RenameArgs) -> CliResult<()> {
    let (_, service) = connect().await?;
    service
        .rename(&args.target.domain, &args.dn, &args.new_rdn)
        .await?;
    println!("Renamed {} to {}", args.dn, args.new_rdn);
    Ok(())
}

/// Execute the move command
pub async fn move_object(args: MoveArgs) -> CliResult<()> {
    let (_, service) = connect().await?;
    service
        .move_object(&args.target.domain, &args.dn, &args.new_parent)
        .await?;
    println!("Moved {} under {}", args.dn, args.new_parent);
    Ok(())
}

/// Execute the delete command
pub async fn delete(args: DeleteArgs) -> CliResult<()> {
    let (_, service) = connect().await?;
    service.delete(&args.target.domain, &args.dn).await?;
    println!("Deleted {}", args.dn);
    Ok(())
}
