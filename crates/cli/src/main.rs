mod config;
mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, TimeZone, Utc};
use clap::{Parser, Subcommand};
use permissions::{
    Caveat, Permission, PermissionController, PermissionSpecification, PermissionStore,
    RestrictedMethodArgs, SpecificationRegistry, endowments,
};
use rpc::{PLUGIN_METHOD_PREFIX, RpcEngine};
use scheduler::{CronSchedule, CronjobHandler, CronjobService};
use serde_json::{Map, Value, json};
use storage::PermissionDb;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};

const CONFIG_FILE: &str = "warden.toml";

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Plugin permissions and cronjob scheduling", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grant a permission to a subject
    Grant {
        subject: String,
        target: String,
        /// Caveats as a JSON array of {"type", "value"} objects
        #[arg(long)]
        caveats: Option<String>,
    },
    /// Revoke a permission from a subject
    Revoke { subject: String, target: String },
    /// List the permissions of a subject
    List { subject: String },
    /// Seed configured grants and run cronjobs until Ctrl-C
    Run,
    /// Show the next occurrences of a cron expression
    Next {
        expression: String,
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,
    },
    /// Send one JSON-RPC request on behalf of an origin
    Call { origin: String, request: String },
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Grant {
            subject,
            target,
            caveats,
        } => cmd_grant(&config, &subject, &target, caveats.as_deref()),
        Commands::Revoke { subject, target } => cmd_revoke(&config, &subject, &target),
        Commands::List { subject } => cmd_list(&config, &subject),
        Commands::Run => cmd_run(&config).await,
        Commands::Next { expression, count } => cmd_next(&expression, count),
        Commands::Call { origin, request } => cmd_call(&config, &origin, &request),
    }
}

fn cmd_grant(config: &Config, subject: &str, target: &str, caveats: Option<&str>) -> Result<()> {
    let caveats: Option<Vec<Caveat>> = caveats.map(serde_json::from_str).transpose()?;
    let controller = open_controller(config)?;
    let permission = controller.grant(subject, target, caveats)?;
    println!("Granted {target} to {subject} ({})", permission.id());
    Ok(())
}

fn cmd_revoke(config: &Config, subject: &str, target: &str) -> Result<()> {
    let controller = open_controller(config)?;
    if !controller.revoke(subject, target)? {
        return Err(Error::NotGranted {
            subject: subject.to_string(),
            target: target.to_string(),
        });
    }
    println!("Revoked {target} from {subject}");
    Ok(())
}

fn cmd_list(config: &Config, subject: &str) -> Result<()> {
    let controller = open_controller(config)?;
    let permissions = controller.get_permissions(subject);

    if permissions.is_empty() {
        println!("{subject} holds no permissions.");
        return Ok(());
    }

    println!("{:<32}  {:<16}  CAVEATS", "TARGET", "GRANTED");
    println!("{}", "-".repeat(72));
    for permission in permissions.values() {
        print_permission(permission);
    }
    Ok(())
}

fn print_permission(permission: &Permission) {
    let granted = Local
        .timestamp_millis_opt(permission.date())
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    let caveats = permission
        .caveats()
        .map(|caveats| {
            caveats
                .iter()
                .map(|c| c.kind.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();
    println!("{:<32}  {granted:<16}  {caveats}", permission.target());
}

async fn cmd_run(config: &Config) -> Result<()> {
    let controller = open_controller(config)?;
    seed_grants(&controller, config)?;

    let service = CronjobService::new(controller.clone(), LogHandler);
    let mut jobs = 0;
    for (_, result) in service.register_all(controller.subjects()) {
        jobs += result.unwrap_or(0);
    }

    println!("Scheduled {jobs} cronjob(s). Press Ctrl-C to stop.");
    tokio::signal::ctrl_c().await?;
    service.shutdown();
    println!("Stopped.");
    Ok(())
}

fn cmd_next(expression: &str, count: usize) -> Result<()> {
    let schedule = CronSchedule::parse(expression)?;
    let upcoming = schedule.upcoming(Utc::now(), count);
    if upcoming.is_empty() {
        println!("'{expression}' has no upcoming occurrences.");
    }
    for time in upcoming {
        println!("{}", time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S %Z"));
    }
    Ok(())
}

fn cmd_call(config: &Config, origin: &str, request: &str) -> Result<()> {
    let engine = RpcEngine::new(open_controller(config)?);
    let response = engine.handle_str(origin, request);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Hands due cronjob requests to the log; the CLI hosts no plugin runtime.
struct LogHandler;

impl CronjobHandler for LogHandler {
    async fn deliver(
        &self,
        plugin: &str,
        origin: &str,
        request: Map<String, Value>,
    ) -> scheduler::Result<()> {
        info!(plugin, origin, request = %serde_json::Value::Object(request), "cronjob due");
        Ok(())
    }
}

/// Reports the routed plugin request instead of executing it.
fn route_plugin_request(args: RestrictedMethodArgs) -> permissions::Result<Value> {
    let plugin = args
        .method
        .strip_prefix(PLUGIN_METHOD_PREFIX)
        .unwrap_or(&args.method);
    Ok(json!({
        "plugin": plugin,
        "origin": args.origin,
        "params": args.params,
    }))
}

fn registry() -> Result<SpecificationRegistry> {
    let mut registry = SpecificationRegistry::new();
    for spec in endowments::all_endowment_specifications() {
        registry.register(spec)?;
    }
    registry.register(PermissionSpecification::restricted_method(
        format!("{PLUGIN_METHOD_PREFIX}*"),
        route_plugin_request,
    ))?;
    Ok(registry)
}

/// Build a controller backed by the configured database, with its grants loaded.
fn open_controller(config: &Config) -> Result<Arc<PermissionController>> {
    let path = database_path(config)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db = PermissionDb::open(&path)?;
    let stored = db.load_all()?;
    let controller = PermissionController::new(registry()?).with_persistence(db);
    controller.restore(stored)?;
    Ok(Arc::new(controller))
}

/// Apply configured grants the subject does not hold yet.
fn seed_grants(controller: &PermissionController, config: &Config) -> Result<()> {
    for grant in &config.grants {
        if controller.has_permission(&grant.subject, &grant.target) {
            continue;
        }
        if let Err(e) = controller.grant(&grant.subject, &grant.target, grant.caveats.clone()) {
            warn!(
                subject = %grant.subject,
                target = %grant.target,
                error = %e,
                "configured grant rejected"
            );
            return Err(e.into());
        }
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Ok(Config::load(path)?)
    } else {
        Ok(Config::default_config())
    }
}

fn database_path(config: &Config) -> Result<PathBuf> {
    match &config.database {
        Some(path) => Ok(path.clone()),
        None => dirs_data_dir()
            .map(|dir| dir.join("permissions.db"))
            .ok_or(Error::NoDatabase),
    }
}

fn dirs_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share/warden"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
            .map(|p| p.join("warden"))
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|h| PathBuf::from(h).join("warden"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}
