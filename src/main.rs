//! Purpose: `salespad` CLI entry point for read-only queries against a SalesPad service.
//! Role: Binary crate root; parses args, opens a session, emits JSON lines on stdout.
//! Invariants: Records are written one JSON object per line, in service order.
//! Invariants: Errors are emitted on stderr (JSON when stderr is not a terminal).
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, error::ErrorKind as ClapErrorKind};
use salespad::api::{
    CUSTOMER, ClientConfig, ENV_HOST, EntityType, Error, ErrorKind, Inventory, PagedSequence,
    PriceLevels, Record, Session, SessionKind, entity_type, to_exit_code,
};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "salespad", version, about = "Query a SalesPad web api from the command line")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ConnectionArgs {
    /// Service base url, e.g. https://salespad.example.com
    #[arg(long, global = true, env = "SALESPAD_HOST")]
    host: Option<String>,
    /// Rows requested per page
    #[arg(long, global = true, env = "SALESPAD_PAGE_SIZE")]
    page_size: Option<usize>,
    /// Per-request timeout in seconds
    #[arg(long, global = true, env = "SALESPAD_TIMEOUT_SECS")]
    timeout: Option<u64>,
    /// PEM file with additional trusted CA certificates
    #[arg(long, global = true, env = "SALESPAD_TLS_CA_FILE")]
    tls_ca_file: Option<PathBuf>,
    /// Existing session id to reuse instead of logging in
    #[arg(long, global = true, env = "SALESPAD_SESSION")]
    session: Option<String>,
    #[arg(long, global = true, env = "SALESPAD_USER")]
    user: Option<String>,
    #[arg(long, global = true, env = "SALESPAD_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and print the new session id
    Login {
        /// Request a session that does not expire when idle
        #[arg(long)]
        permanent: bool,
    },
    /// Check that the session is still valid
    Ping,
    /// Page through an entity collection
    Search {
        /// Item, Customer, CustomerAddress, SalesDocument or SalesLineItem
        entity: String,
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Look up one record by its identifier
    Get { entity: String, id: String },
    /// List the addresses of one customer
    Addresses { customer: String },
    /// Search inventory with one record per item and its locations nested
    Inventory {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// List price levels, or show one by name
    PriceLevels { name: Option<String> },
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// OData filter expression, e.g. "Item_Class eq 'HW'"
    #[arg(long, default_value = "")]
    filter: String,
    /// Stop after this many records
    #[arg(long)]
    limit: Option<usize>,
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(code) => code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<i32, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let missing = matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                );
                return Ok(if missing { 2 } else { 0 });
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `salespad --help`."));
            }
        },
    };

    let config = client_config(&cli.connection)?;
    let unauthenticated = Session::connect(config)?;

    if let Command::Login { permanent } = &cli.command {
        let kind = if *permanent {
            SessionKind::Permanent
        } else {
            SessionKind::Temporary
        };
        let session = login(&unauthenticated, &cli.connection, kind)?;
        emit(&json!({ "session_id": session.key() }))?;
        return Ok(0);
    }

    let session = open_session(&unauthenticated, &cli.connection)?;
    match cli.command {
        Command::Login { .. } => {}
        Command::Ping => {
            session.ping()?;
            emit(&json!({ "ok": true }))?;
        }
        Command::Search { entity, query } => {
            let kind = resolve_entity(&entity)?;
            let results = session.entities(kind).search(&query.filter)?;
            emit_records(results, query.limit)?;
        }
        Command::Get { entity, id } => {
            let kind = resolve_entity(&entity)?;
            let record = session.entities(kind).get(&id)?.ok_or_else(|| {
                Error::new(ErrorKind::NotFound)
                    .with_message(format!("no {} with id {id}", kind.short_name()))
                    .with_endpoint(kind.endpoint())
            })?;
            emit(&record.to_json())?;
        }
        Command::Addresses { customer } => {
            let record = session.entities(CUSTOMER).get(&customer)?.ok_or_else(|| {
                Error::new(ErrorKind::NotFound)
                    .with_message(format!("no customer with id {customer}"))
                    .with_endpoint(CUSTOMER.endpoint())
            })?;
            for address in session.customer_addresses(&record)? {
                emit(&address.to_json())?;
            }
        }
        Command::Inventory { query } => {
            let results = Inventory::new(session).search(&query.filter)?;
            emit_records(results, query.limit)?;
        }
        Command::PriceLevels { name } => {
            let levels = PriceLevels::new(session);
            match name {
                Some(name) => {
                    let level = levels.get(&name)?.ok_or_else(|| {
                        Error::new(ErrorKind::NotFound)
                            .with_message(format!("no price level named {name}"))
                    })?;
                    emit(&level)?;
                }
                None => {
                    for level in levels.all()? {
                        emit(&level)?;
                    }
                }
            }
        }
    }
    Ok(0)
}

fn client_config(args: &ConnectionArgs) -> Result<ClientConfig, Error> {
    let host = args.host.clone().ok_or_else(|| {
        Error::new(ErrorKind::Usage)
            .with_message("no service host given")
            .with_hint(format!("Pass --host or set {ENV_HOST}."))
    })?;
    let mut config = ClientConfig::new(host)?;
    if let Some(page_size) = args.page_size {
        config = config.with_page_size(page_size)?;
    }
    if let Some(timeout) = args.timeout {
        config = config.with_timeout(Duration::from_secs(timeout));
    }
    if let Some(path) = &args.tls_ca_file {
        config = config.with_tls_ca_file(path);
    }
    Ok(config)
}

fn login(session: &Session, args: &ConnectionArgs, kind: SessionKind) -> Result<Session, Error> {
    match (&args.user, &args.password) {
        (Some(user), Some(password)) => session.login(user, password, kind),
        _ => Err(Error::new(ErrorKind::Usage)
            .with_message("login needs a user name and password")
            .with_hint("Pass --user and --password or set SALESPAD_USER and SALESPAD_PASSWORD.")),
    }
}

fn open_session(session: &Session, args: &ConnectionArgs) -> Result<Session, Error> {
    match &args.session {
        Some(id) => session.resume(id),
        None => login(session, args, SessionKind::Temporary).map_err(|err| {
            if err.kind() == ErrorKind::Usage {
                err.with_hint("Pass --session, or --user and --password.")
            } else {
                err
            }
        }),
    }
}

fn resolve_entity(name: &str) -> Result<EntityType, Error> {
    entity_type(name).ok_or_else(|| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("unknown entity type {name}"))
            .with_hint("Use Item, Customer, CustomerAddress, SalesDocument or SalesLineItem.")
    })
}

fn emit_records(mut results: PagedSequence<Record>, limit: Option<usize>) -> Result<(), Error> {
    let mut written = 0usize;
    while limit.is_none_or(|limit| written < limit) {
        let Some((record, _)) = results.advance()? else {
            break;
        };
        emit(&record.to_json())?;
        written += 1;
    }
    tracing::debug!(written, "finished writing records");
    Ok(())
}

fn emit(value: &impl Serialize) -> Result<(), Error> {
    let line = serde_json::to_string(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode output json")
            .with_source(err)
    })?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{line}").map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to write output")
            .with_source(err)
    })
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    match err.message() {
        Some(message) => message.to_string(),
        None => format!("{:?} error", err.kind()).to_lowercase(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(endpoint) = err.endpoint() {
        inner.insert("endpoint".to_string(), json!(endpoint));
    }
    if let Some(status) = err.status() {
        inner.insert("status".to_string(), json!(status));
    }
    if let Some(index) = err.index() {
        inner.insert("index".to_string(), json!(index));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }
    json!({ "error": Value::Object(inner) })
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(endpoint) = err.endpoint() {
        lines.push(format!("endpoint: {endpoint}"));
    }
    if let Some(status) = err.status() {
        lines.push(format!("status: {status}"));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    err.to_string()
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.strip_prefix("error:").unwrap_or(line).trim().to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}
