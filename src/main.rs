//! CLI entry point for `attachsort`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use attachsort::config::{Config, SaveMode};
use attachsort::credentials::{self, CredentialSource, EnvSource, FileSource, OverrideSource};
use attachsort::export::ExportFormat;
use attachsort::mail::graph::GraphClient;
use attachsort::manifest::reader as manifest_reader;
use attachsort::manifest::store::ManifestStore;
use attachsort::processor::AttachmentProcessor;
use attachsort::run::{RunOptions, RunOrchestrator, RunSummary};
use attachsort::verify::{self, FileStatus};

#[derive(Parser)]
#[command(
    name = "attachsort",
    version,
    about = "Save mailbox attachments once and tag messages as new or duplicate",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Process the folder (default when no subcommand is given)
    Run(RunArgs),
    /// Show what the manifest holds
    Manifest {
        #[arg(long, value_name = "PATH")]
        manifest: Option<PathBuf>,
        /// Number of recent entries to list
        #[arg(long, default_value_t = 10)]
        recent: usize,
        #[arg(long)]
        json: bool,
    },
    /// Export the manifest
    Export {
        #[arg(long, value_name = "PATH")]
        manifest: Option<PathBuf>,
        #[arg(short, long, value_enum, default_value_t = FormatArg::Csv)]
        format: FormatArg,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Check saved files against their recorded fingerprints
    Verify {
        #[arg(long, value_name = "PATH")]
        manifest: Option<PathBuf>,
        #[arg(long, value_name = "DIR")]
        destination: Option<PathBuf>,
        /// Exit with an error when any entry fails verification
        #[arg(long)]
        strict: bool,
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Mail folder display name
    #[arg(long)]
    folder: Option<String>,

    /// Directory attachments are saved into
    #[arg(long, value_name = "DIR")]
    destination: Option<PathBuf>,

    /// Manifest file
    #[arg(long, value_name = "PATH")]
    manifest: Option<PathBuf>,

    /// Mailbox owner (user principal name)
    #[arg(long, value_name = "EMAIL", env = "ATTACHSORT_USER")]
    user: Option<String>,

    /// Classify and report without saving files, tagging messages or writing the manifest
    #[arg(long)]
    dry_run: bool,

    /// Save the manifest after every new attachment
    #[arg(long)]
    incremental: bool,

    /// TOML file with tenant_id, client_id and client_secret
    #[arg(long, value_name = "PATH")]
    credentials_file: Option<PathBuf>,

    #[arg(long, value_name = "ID")]
    tenant_id: Option<String>,

    #[arg(long, value_name = "ID")]
    client_id: Option<String>,

    #[arg(long, value_name = "SECRET")]
    client_secret: Option<String>,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Csv,
    Json,
}

impl From<FormatArg> for ExportFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Csv => ExportFormat::Csv,
            FormatArg::Json => ExportFormat::Json,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration; a broken file stops every command
    let config = attachsort::config::load_config()?;

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        None => cmd_run(&cli.run, &config),
        Some(Commands::Run(args)) => cmd_run(&args, &config),
        Some(Commands::Manifest {
            manifest,
            recent,
            json,
        }) => cmd_manifest(&manifest_path(manifest, &config), recent, json),
        Some(Commands::Export {
            manifest,
            format,
            output,
        }) => cmd_export(&manifest_path(manifest, &config), format.into(), &output),
        Some(Commands::Verify {
            manifest,
            destination,
            strict,
            json,
        }) => {
            let destination = destination.unwrap_or_else(|| config.mail.destination.clone());
            cmd_verify(&manifest_path(manifest, &config), &destination, strict, json)
        }
        Some(Commands::Completions { shell }) => cmd_completions(shell),
        Some(Commands::Manpage) => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Try to set up file logging
    let log_dir = attachsort::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "attachsort.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn manifest_path(arg: Option<PathBuf>, config: &Config) -> PathBuf {
    arg.unwrap_or_else(|| config.manifest_path())
}

/// Process the configured folder against the manifest.
fn cmd_run(args: &RunArgs, config: &Config) -> anyhow::Result<()> {
    config.validate()?;
    let folder = args.folder.as_deref().unwrap_or(&config.mail.folder);
    let user = args.user.as_deref().unwrap_or(&config.mail.user_email);
    if user.trim().is_empty() {
        anyhow::bail!(
            "No mailbox user configured. Pass --user or set mail.user_email in the config file"
        );
    }
    let store = ManifestStore::new(manifest_path(args.manifest.clone(), config));

    // Fail on a corrupt manifest before touching the network.
    store.load()?;

    let overrides = OverrideSource {
        tenant_id: args.tenant_id.clone(),
        client_id: args.client_id.clone(),
        client_secret: args.client_secret.clone(),
    };
    let file = FileSource::new(
        args.credentials_file
            .clone()
            .unwrap_or_else(|| config.credentials_file()),
    );
    let env = EnvSource::from_process();
    let sources: [&dyn CredentialSource; 3] = [&overrides, &file, &env];
    let creds = credentials::resolve(&sources)?;

    let timeout = Duration::from_secs(config.mail.request_timeout_secs);
    let client = GraphClient::connect(&creds, user, timeout)?;

    let mut mail = config.mail.clone();
    if let Some(dest) = &args.destination {
        mail.destination = dest.clone();
    }
    let processor = AttachmentProcessor::from_config(&mail).with_dry_run(args.dry_run);

    let options = RunOptions {
        save_mode: if args.incremental {
            SaveMode::Incremental
        } else {
            config.manifest.save_mode
        },
        categories: config.categories.clone(),
        mark_read_on_new: config.mail.mark_read_on_new,
        flag_without_eligible: config.mail.flag_without_eligible,
    };

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .expect("valid template"),
    );
    pb.set_message(format!("Scanning '{folder}'"));
    pb.enable_steady_tick(Duration::from_millis(120));

    let start = Instant::now();
    let orchestrator = RunOrchestrator::new(&client, &store, &processor, options);
    let result = orchestrator.run(
        folder,
        Some(&|s: &RunSummary| {
            pb.set_message(format!(
                "{} message(s), {} new, {} duplicate(s)",
                s.messages, s.new, s.duplicates
            ));
        }),
    );
    pb.finish_and_clear();
    let summary = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_run_summary(
            &summary,
            folder,
            processor.destination(),
            store.path(),
            start.elapsed(),
        );
    }
    Ok(())
}

/// Print a run summary in a human-readable table.
fn print_run_summary(
    summary: &RunSummary,
    folder: &str,
    destination: &Path,
    manifest: &Path,
    elapsed: Duration,
) {
    use humansize::{format_size, BINARY};

    println!();
    if summary.dry_run {
        println!("  Dry run: no files, categories or manifest were written");
        println!();
    }
    println!("  {:<20} {}", "Folder", folder);
    println!("  {:<20} {}", "Messages", summary.messages);
    println!(
        "  {:<20} {} ({} message(s) tagged)",
        "New", summary.new, summary.messages_new
    );
    println!(
        "  {:<20} {} ({} message(s) tagged)",
        "Duplicates", summary.duplicates, summary.messages_duplicate
    );
    if summary.skipped > 0 {
        println!("  {:<20} {}", "Skipped", summary.skipped);
    }
    if summary.messages_flagged > 0 {
        println!("  {:<20} {}", "Flagged complete", summary.messages_flagged);
    }
    println!("  {:<20} {}", "Errors", summary.error_count());
    println!(
        "  {:<20} {}",
        "Saved",
        format_size(summary.bytes_saved, BINARY)
    );
    println!("  {:<20} {}", "Destination", destination.display());
    println!(
        "  {:<20} {} ({} entries)",
        "Manifest",
        manifest.display(),
        summary.manifest_entries
    );
    println!("  {:<20} {:.2?}", "Elapsed", elapsed);

    if !summary.errors.is_empty() {
        println!();
        println!("  Errors:");
        for err in &summary.errors {
            let id = if err.message_id.is_empty() {
                "(listing)".to_string()
            } else if err.subject.is_empty() {
                err.message_id.clone()
            } else {
                format!("{} \"{}\"", err.message_id, err.subject)
            };
            match &err.attachment {
                Some(name) => println!("    {id} [{name}]: {}", err.reason),
                None => println!("    {id}: {}", err.reason),
            }
        }
    }
    println!();
}

/// Show manifest statistics.
fn cmd_manifest(path: &Path, recent: usize, json: bool) -> anyhow::Result<()> {
    let manifest = ManifestStore::new(path).load()?;
    let range = manifest_reader::first_seen_range(&manifest);
    let extensions = manifest_reader::extension_counts(&manifest);
    let latest = manifest_reader::most_recent(&manifest, recent);

    if json {
        let stats = serde_json::json!({
            "manifest": path.to_string_lossy(),
            "entries": manifest.len(),
            "first_seen": range.map(|(min, max)| serde_json::json!({
                "oldest": min.to_rfc3339(),
                "newest": max.to_rfc3339(),
            })),
            "extensions": extensions
                .iter()
                .map(|(ext, count)| serde_json::json!({ "extension": ext, "count": count }))
                .collect::<Vec<_>>(),
            "recent": latest
                .iter()
                .map(|(fp, e)| serde_json::json!({
                    "fingerprint": fp.to_hex(),
                    "filename": e.filename,
                    "message_id": e.message_id,
                    "timestamp": e.timestamp.to_rfc3339(),
                }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!();
    println!("  {:<20} {}", "Manifest", path.display());
    println!("  {:<20} {}", "Entries", manifest.len());
    if let Some((min, max)) = range {
        println!(
            "  {:<20} {} to {}",
            "First seen",
            min.format("%Y-%m-%d"),
            max.format("%Y-%m-%d")
        );
    }
    if !extensions.is_empty() {
        println!();
        println!("  By extension:");
        for (ext, count) in &extensions {
            println!("    {count:>6}  {ext}");
        }
    }
    if !latest.is_empty() {
        println!();
        println!("  {:<14} {:<17} {:<40}", "Fingerprint", "Recorded", "Filename");
        println!("  {}", "-".repeat(72));
        for (fp, entry) in &latest {
            let name: String = entry.filename.chars().take(40).collect();
            println!(
                "  {:<14} {:<17} {:<40}",
                fp.short(),
                entry.timestamp.format("%Y-%m-%d %H:%M"),
                name
            );
        }
    }
    println!();
    Ok(())
}

/// Export the manifest as CSV or JSON.
fn cmd_export(path: &Path, format: ExportFormat, output: &Path) -> anyhow::Result<()> {
    let manifest = ManifestStore::new(path).load()?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    attachsort::export::export(&manifest, format, output)?;
    println!(
        "  Exported {} entr{} to {}",
        manifest.len(),
        if manifest.len() == 1 { "y" } else { "ies" },
        output.display()
    );
    Ok(())
}

/// Rehash saved attachments and report missing or altered files.
fn cmd_verify(path: &Path, destination: &Path, strict: bool, json: bool) -> anyhow::Result<()> {
    let manifest = ManifestStore::new(path).load()?;

    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("Verifying {} file(s)", manifest.len()));
    pb.enable_steady_tick(Duration::from_millis(120));
    let report = verify::verify(&manifest, destination);
    pb.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        println!("  {:<20} {}", "Checked", report.checked);
        println!("  {:<20} {}", "OK", report.ok);
        println!("  {:<20} {}", "Missing", report.count(FileStatus::Missing));
        println!("  {:<20} {}", "Changed", report.count(FileStatus::Mismatch));
        println!("  {:<20} {}", "Unreadable", report.count(FileStatus::Unreadable));
        if !report.is_clean() {
            println!();
            for problem in &report.problems {
                println!(
                    "    {:<10} {}  {}",
                    format!("{:?}", problem.status).to_lowercase(),
                    problem.fingerprint.short(),
                    problem.path.display()
                );
            }
        }
        println!();
    }

    if strict && !report.is_clean() {
        anyhow::bail!("{} manifest entries failed verification", report.problems.len());
    }
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "attachsort", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
