//! sso-ha CLI
//!
//! Operator tooling for replicated single-sign-on snapshots.
//!
//! # Commands
//!
//! - `new`: mint a snapshot for a freshly authenticated identity
//! - `inspect`: decode a replicated snapshot and show what it carries
//! - `inflate`: replay failover reconstruction against a container fixture
//!
//! Exit code 0 on success, 1 on any failure (unreadable config, undecodable
//! snapshot or principal, fatal reconstruction).

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use sso_ha_core::config::Config;
use sso_ha_core::container::LocalSession;
use sso_ha_core::logging::init_logging;
use sso_ha_core::{
    InflationContext, InflationReport, JsonPrincipalCodec, NewSsoEntry, Principal,
    PrincipalTypes, SsoEntry, SsoEntrySnapshot, UserPrincipal, inflate,
};

mod fixture;

use fixture::SessionFixture;

/// sso-ha - inspect and replay replicated single-sign-on entries
#[derive(Parser)]
#[command(name = "sso-ha")]
#[command(version)]
#[command(about = "Inspect and inflate replicated single-sign-on snapshots")]
#[command(propagate_version = true)]
struct Cli {
    /// Raise log verbosity above the configured level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to sso-ha.toml
    #[arg(long, global = true, env = "SSO_HA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mint a snapshot for a freshly authenticated identity
    New(NewArgs),
    /// Decode a snapshot file ("-" for stdin) and print its contents
    Inspect(InspectArgs),
    /// Inflate a snapshot against a container fixture
    ///
    /// The fixture lists the applications deployed on the takeover node and
    /// the sessions each one already holds.
    Inflate(InflateArgs),
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    #[default]
    Plain,
    Json,
}

#[derive(Args)]
struct NewArgs {
    /// SSO identity id (the cookie value)
    #[arg(long)]
    id: String,
    #[arg(long)]
    username: String,
    /// Principal name; defaults to the username. Pass --anonymous for none.
    #[arg(long, conflicts_with = "anonymous")]
    principal: Option<String>,
    #[arg(long = "group")]
    groups: Vec<String>,
    #[arg(long)]
    anonymous: bool,
    #[arg(long, default_value = "FORM")]
    auth_type: String,
    #[arg(long, default_value = "default")]
    realm: String,
    /// Idle timeout; defaults to `[replication] default_max_idle_ms`
    #[arg(long)]
    max_idle_ms: Option<u64>,
    /// Session binding as SESSION@CONTEXT_PATH (repeatable)
    #[arg(long = "bind", value_parser = parse_binding)]
    bindings: Vec<(String, String)>,
    #[arg(long)]
    last_access_ms: Option<u64>,
    /// Starting entry version
    #[arg(long = "initial-version", default_value_t = 0)]
    initial_version: u64,
}

#[derive(Args)]
struct InspectArgs {
    snapshot: PathBuf,
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
    /// Clock used for the idle check; defaults to the system clock
    #[arg(long)]
    now_ms: Option<u64>,
}

#[derive(Args)]
struct InflateArgs {
    snapshot: PathBuf,
    /// TOML container fixture
    #[arg(long)]
    sessions: PathBuf,
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
}

fn parse_binding(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('@') {
        Some((session, path)) if !session.is_empty() && path.starts_with('/') => {
            Ok((session.to_string(), path.to_string()))
        }
        _ => Err(format!("expected SESSION@/context-path, got `{raw}`")),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("reading snapshot from stdin")?;
        return Ok(buf);
    }
    std::fs::read(path).with_context(|| format!("reading snapshot {}", path.display()))
}

fn read_snapshot(path: &Path) -> Result<SsoEntrySnapshot> {
    let bytes = read_input(path)?;
    SsoEntrySnapshot::from_slice(&bytes)
        .map_err(sso_ha_core::Error::from)
        .with_context(|| format!("decoding snapshot {}", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::load_from(path).map_err(sso_ha_core::Error::from)?),
        None => Ok(Config::default()),
    }
}

/// Level forced by `-v` flags; `None` keeps the configured level.
fn verbosity_level(verbose: u8) -> Option<&'static str> {
    match verbose {
        0 => None,
        1 => Some("debug"),
        _ => Some("trace"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            report_error(&err);
            return ExitCode::FAILURE;
        }
    };

    let mut log_config = config.log_config();
    if let Some(level) = verbosity_level(cli.verbose) {
        log_config.level = level.into();
    }
    if let Err(err) = init_logging(&log_config) {
        eprintln!("warning: logging disabled: {err}");
    }

    let result = match cli.command {
        Commands::New(args) => cmd_new(args, &config),
        Commands::Inspect(args) => cmd_inspect(args),
        Commands::Inflate(args) => cmd_inflate(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

fn report_error(err: &anyhow::Error) {
    eprintln!("error: {err:#}");
    let remediation = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<sso_ha_core::Error>())
        .and_then(sso_ha_core::Error::remediation);
    if let Some(remediation) = remediation {
        eprint!("{}", remediation.render_plain());
    }
}

fn cmd_new(args: NewArgs, config: &Config) -> Result<()> {
    let principal: Option<Arc<dyn Principal>> = if args.anonymous {
        None
    } else {
        let name = args.principal.unwrap_or_else(|| args.username.clone());
        Some(Arc::new(UserPrincipal::new(name).with_groups(args.groups)))
    };

    let entry = SsoEntry::new(
        NewSsoEntry {
            id: args.id,
            principal,
            auth_type: args.auth_type,
            username: args.username,
            realm_name: args.realm,
            last_access_ms: args.last_access_ms.unwrap_or_else(now_ms),
            max_idle_ms: args
                .max_idle_ms
                .unwrap_or(config.replication.default_max_idle_ms),
            version: args.initial_version,
        },
        &JsonPrincipalCodec,
    )
    .map_err(sso_ha_core::Error::from)?;

    for (session_id, context_path) in args.bindings {
        entry.add_session(&LocalSession::new(session_id, context_path));
    }

    println!("{}", entry.snapshot().to_json_pretty()?);
    Ok(())
}

fn cmd_inspect(args: InspectArgs) -> Result<()> {
    let snapshot = read_snapshot(&args.snapshot)?;
    let principal = snapshot
        .decode_principal(&JsonPrincipalCodec, &PrincipalTypes::with_defaults())
        .map_err(sso_ha_core::Error::from)
        .with_context(|| format!("decoding principal of SSO entry {}", snapshot.id()))?;
    let now = args.now_ms.unwrap_or_else(now_ms);

    match args.format {
        OutputFormat::Json => {
            let doc = json!({
                "id": snapshot.id(),
                "version": snapshot.version(),
                "principal": principal.as_ref().map(|p| json!({
                    "name": p.name(),
                    "type": p.type_tag(),
                })),
                "auth_type": snapshot.auth_type(),
                "username": snapshot.username(),
                "realm_name": snapshot.realm_name(),
                "last_access_ms": snapshot.last_access_ms(),
                "max_idle_ms": snapshot.max_idle_ms(),
                "idle_deadline_ms": snapshot.idle_deadline_ms(),
                "idle_expired": snapshot.is_idle_expired(now),
                "bindings": snapshot.bindings(),
            });
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        OutputFormat::Plain => {
            println!("SSO entry {}", snapshot.id());
            println!("  version      {}", snapshot.version());
            match &principal {
                Some(p) => println!("  principal    {} ({})", p.name(), p.type_tag()),
                None => println!("  principal    <none>"),
            }
            println!("  auth type    {}", snapshot.auth_type());
            println!("  username     {}", snapshot.username());
            println!("  realm        {}", snapshot.realm_name());
            println!("  last access  {}", snapshot.last_access_ms());
            match snapshot.idle_deadline_ms() {
                Some(deadline) => println!(
                    "  idle         {} ms, deadline {deadline}{}",
                    snapshot.max_idle_ms(),
                    if snapshot.is_idle_expired(now) { " (expired)" } else { "" }
                ),
                None => println!("  idle         no timeout"),
            }
            println!("  bindings     {}", snapshot.bindings().len());
            for binding in snapshot.bindings() {
                println!("    {binding}");
            }
        }
    }
    Ok(())
}

async fn cmd_inflate(args: InflateArgs) -> Result<()> {
    let snapshot = read_snapshot(&args.snapshot)?;
    let container = SessionFixture::load(&args.sessions)?.build_container();
    let types = PrincipalTypes::with_defaults();
    let ctx = InflationContext {
        registry: &container,
        codec: &JsonPrincipalCodec,
        types: &types,
    };

    let inflated = inflate(&snapshot, &ctx)
        .await
        .map_err(sso_ha_core::Error::from)?;
    let rebuilt = inflated.entry.snapshot();

    match args.format {
        OutputFormat::Json => {
            let doc = json!({
                "report": inflated.report,
                "snapshot": rebuilt,
            });
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        OutputFormat::Plain => {
            print_report(&inflated.report);
            println!();
            println!("{}", rebuilt.to_json_pretty()?);
        }
    }
    Ok(())
}

fn print_report(report: &InflationReport) {
    println!(
        "Inflated SSO entry {} (version {}): {}/{} bindings restored",
        report.entry_id,
        report.version,
        report.restored.len(),
        report.requested()
    );
    for binding in &report.restored {
        println!("  restored  {binding}");
    }
    for skipped in &report.skipped {
        println!("  skipped   {}  {}", skipped.binding, skipped.reason);
    }
}
