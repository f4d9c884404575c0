use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{LevelFilter, warn};
use tokio_util::sync::CancellationToken;

use stratus_core::differ::{Diff, diff};
use stratus_core::provider::{OperationContext, Provider};
use stratus_core::resource::{Resource, ResourceId, State, Timeouts, Value};
use stratus_provider_hwc::jobs::job_wait_config;
use stratus_provider_hwc::{HwcProvider, ProviderConfig};

#[derive(Parser)]
#[command(name = "stratus")]
#[command(about = "Manage Huawei Cloud resources from the command line", long_about = None)]
struct Cli {
    /// Provider configuration file (JSON). Defaults to HW_* environment variables
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current state of a resource
    Read {
        /// Resource type (e.g., dcs_instance)
        resource_type: String,
        /// Cloud-side ID
        identifier: String,
    },
    /// Create a resource and wait until it is ready
    Create {
        resource_type: String,
        name: String,

        /// Attribute as key=value, repeatable
        #[arg(long = "attr", value_name = "KEY=VALUE")]
        attrs: Vec<String>,

        /// Override the resource type's timeout (e.g., 30m)
        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,
    },
    /// Update a resource in place
    Update {
        resource_type: String,
        name: String,
        identifier: String,

        /// Attribute as key=value, repeatable
        #[arg(long = "attr", value_name = "KEY=VALUE")]
        attrs: Vec<String>,

        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,
    },
    /// Delete a resource and wait until it is gone
    Delete {
        resource_type: String,
        name: String,
        identifier: String,

        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,
    },
    /// Wait for an asynchronous job to finish
    WaitJob {
        /// Service owning the job (e.g., ims)
        service: String,
        job_id: String,

        #[arg(long, value_parser = parse_duration, default_value = "10m")]
        timeout: Duration,

        #[arg(long, value_parser = parse_duration, default_value = "10s")]
        interval: Duration,
    },
    /// List supported resource types
    ResourceTypes,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            signal_token.cancel();
        }
    });

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Read {
            resource_type,
            identifier,
        } => run_read(config, &cancel, &resource_type, &identifier).await,
        Commands::Create {
            resource_type,
            name,
            attrs,
            timeout,
        } => run_create(config, &cancel, &resource_type, &name, &attrs, timeout).await,
        Commands::Update {
            resource_type,
            name,
            identifier,
            attrs,
            timeout,
        } => {
            let id = ResourceId::new(resource_type, name);
            run_update(config, &cancel, id, &identifier, &attrs, timeout).await
        }
        Commands::Delete {
            resource_type,
            name,
            identifier,
            timeout,
        } => run_delete(config, &cancel, &resource_type, &name, &identifier, timeout).await,
        Commands::WaitJob {
            service,
            job_id,
            timeout,
            interval,
        } => run_wait_job(config, &cancel, &service, &job_id, timeout, interval).await,
        Commands::ResourceTypes => run_resource_types(),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let env = env_logger::Env::default().default_filter_or("warn");
    let mut builder = env_logger::Builder::from_env(env);
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
}

fn load_provider(config: Option<&Path>) -> Result<HwcProvider, String> {
    let config = match config {
        Some(path) => ProviderConfig::load(path),
        None => ProviderConfig::from_env(),
    }
    .map_err(|e| e.to_string())?;
    HwcProvider::new(config).map_err(|e| e.to_string())
}

fn context(cancel: &CancellationToken, timeout: Option<Duration>) -> OperationContext {
    let ctx = OperationContext::new(cancel.clone());
    match timeout {
        Some(timeout) => ctx.with_timeouts(Timeouts::uniform(timeout)),
        None => ctx,
    }
}

async fn run_read(
    config: Option<&Path>,
    cancel: &CancellationToken,
    resource_type: &str,
    identifier: &str,
) -> Result<(), String> {
    let provider = load_provider(config)?;
    let id = ResourceId::new(resource_type, identifier);
    let state = provider
        .read(&context(cancel, None), &id, identifier)
        .await
        .map_err(|e| e.to_string())?;
    print_state(&state);
    Ok(())
}

async fn run_create(
    config: Option<&Path>,
    cancel: &CancellationToken,
    resource_type: &str,
    name: &str,
    attrs: &[String],
    timeout: Option<Duration>,
) -> Result<(), String> {
    let resource = build_resource(resource_type, name, attrs, None)?;
    let provider = load_provider(config)?;

    println!("{}", format!("Creating {}...", resource.id).cyan().bold());
    let state = provider
        .create(&context(cancel, timeout), &resource)
        .await
        .map_err(|e| e.to_string())?;
    print_state(&state);
    Ok(())
}

async fn run_update(
    config: Option<&Path>,
    cancel: &CancellationToken,
    id: ResourceId,
    identifier: &str,
    attrs: &[String],
    timeout: Option<Duration>,
) -> Result<(), String> {
    let resource = build_resource(&id.resource_type, &id.name, attrs, timeout)?;
    let provider = load_provider(config)?;
    let ctx = context(cancel, None);

    let current = provider
        .read(&ctx, &resource.id, identifier)
        .await
        .map_err(|e| e.to_string())?;

    match plan_update(resource, &current) {
        Diff::Create(resource) => Err(format!("{} ({}) does not exist", resource.id, identifier)),
        Diff::NoChange(id) => {
            println!("{} {} is up to date", "✓".green(), id);
            Ok(())
        }
        Diff::Update {
            id,
            from,
            to,
            changed_attributes,
        } => {
            println!(
                "{}",
                format!("Updating {} ({})...", id, changed_attributes.join(", "))
                    .cyan()
                    .bold()
            );
            let state = provider
                .update(&ctx, &id, identifier, &from, &to)
                .await
                .map_err(|e| e.to_string())?;
            print_state(&state);
            Ok(())
        }
    }
}

/// Fill attributes not given on the command line from `current`, then
/// classify what is left to do
fn plan_update(mut desired: Resource, current: &State) -> Diff {
    for (key, value) in &current.attributes {
        desired
            .attributes
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
    diff(&desired, current)
}

async fn run_delete(
    config: Option<&Path>,
    cancel: &CancellationToken,
    resource_type: &str,
    name: &str,
    identifier: &str,
    timeout: Option<Duration>,
) -> Result<(), String> {
    let provider = load_provider(config)?;
    let id = ResourceId::new(resource_type, name);

    println!("{}", format!("Deleting {}...", id).red().bold());
    provider
        .delete(&context(cancel, timeout), &id, identifier)
        .await
        .map_err(|e| e.to_string())?;
    println!("  {} {} ({})", "✓".green(), id, identifier);
    Ok(())
}

async fn run_wait_job(
    config: Option<&Path>,
    cancel: &CancellationToken,
    service: &str,
    job_id: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<(), String> {
    let provider = load_provider(config)?;
    let wait_config = job_wait_config(job_id, timeout).with_poll_interval(interval);

    println!("{}", format!("Waiting for job {}...", job_id).cyan());
    let job = provider
        .wait_job(service, job_id, &wait_config, cancel)
        .await
        .map_err(|e| e.to_string())?;

    println!("  {} job {} succeeded", "✓".green(), job_id);
    let rendered = serde_json::to_string_pretty(&job).map_err(|e| e.to_string())?;
    println!("{}", rendered);
    Ok(())
}

fn run_resource_types() -> Result<(), String> {
    for resource_type in stratus_provider_hwc::resources::resource_types() {
        let timeouts = resource_type.timeouts();
        println!(
            "{}  {}",
            resource_type.name().bold(),
            resource_type.description()
        );
        println!(
            "    timeouts: create {}, update {}, delete {}",
            format_duration(timeouts.create),
            format_duration(timeouts.update),
            format_duration(timeouts.delete)
        );
    }
    Ok(())
}

/// Parse `<n>s`, `<n>m` or `<n>h`
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing unit in '{}', expected s, m or h", s))?;
    let (number, unit) = s.split_at(split);
    let n: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration '{}'", s))?;
    let scale = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => return Err(format!("unknown unit '{}', expected s, m or h", unit)),
    };
    n.checked_mul(scale)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{}' is too large", s))
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

/// Parse the value of a `--attr`: integers, floats, booleans and JSON
/// lists/objects are typed, anything else is a string
fn parse_value(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Int(n);
    }
    if let Ok(f) = raw.parse::<f64>()
        && f.is_finite()
    {
        return Value::Float(f);
    }
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if (raw.starts_with('[') || raw.starts_with('{'))
        && let Ok(json) = serde_json::from_str::<serde_json::Value>(raw)
        && let Some(value) = Value::from_json(&json)
    {
        return value;
    }
    Value::String(raw.to_string())
}

fn parse_attributes(attrs: &[String]) -> Result<HashMap<String, Value>, String> {
    attrs
        .iter()
        .map(|attr| {
            let (key, value) = attr
                .split_once('=')
                .filter(|(key, _)| !key.is_empty())
                .ok_or_else(|| format!("invalid attribute '{}', expected key=value", attr))?;
            Ok((key.to_string(), parse_value(value)))
        })
        .collect()
}

fn build_resource(
    resource_type: &str,
    name: &str,
    attrs: &[String],
    timeout: Option<Duration>,
) -> Result<Resource, String> {
    let mut resource = Resource::new(resource_type, name);
    resource.attributes = parse_attributes(attrs)?;
    if let Some(timeout) = timeout {
        resource = resource.with_timeouts(Timeouts::uniform(timeout));
    }
    Ok(resource)
}

fn print_state(state: &State) {
    if !state.exists {
        println!("{}", format!("{} not found.", state.id).yellow());
        return;
    }

    match &state.identifier {
        Some(identifier) => println!("  {} {} ({})", "✓".green(), state.id, identifier),
        None => println!("  {} {}", "✓".green(), state.id),
    }
    let mut keys: Vec<_> = state.attributes.keys().collect();
    keys.sort();
    for key in keys {
        println!("      {}: {}", key, state.attributes[key].to_json());
    }
}
