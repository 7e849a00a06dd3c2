use crate::client::{geo, logs, CheckClient};
use crate::config::{self, ClientConfig};
use crate::logging::{self, LogSink, Verbosity};
use crate::model::CheckForm;
use crate::orchestrator::{
    process_run_completion, run_controller, AppEvent, ControllerOptions, Forms, UiCommand,
};
use crate::reconcile::Board;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "checkrun",
    version,
    about = "Launch HTTP reachability and DNS/whois check runs and follow them live"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Check server base URL (default: config file, then http://127.0.0.1:5000)
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Config file with server and endpoint overrides (JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Timeout for submissions and lookups; push streams never time out
    #[arg(long, global = true)]
    pub request_timeout: Option<humantime::Duration>,

    /// Submission path for URL check runs
    #[arg(long)]
    pub submit_path: Option<String>,

    /// Submission path for DNS check runs
    #[arg(long)]
    pub dns_submit_path: Option<String>,

    /// Push-stream base path for URL check runs (run id is appended)
    #[arg(long)]
    pub events_path: Option<String>,

    /// Push-stream base path for DNS check runs (run id is appended)
    #[arg(long)]
    pub dns_events_path: Option<String>,

    /// Base path for screenshot and whois artifact links
    #[arg(long)]
    pub artifacts_path: Option<String>,

    /// URL to check (repeatable)
    #[arg(long = "url")]
    pub urls: Vec<String>,

    /// File with one URL per line
    #[arg(long)]
    pub urls_file: Option<PathBuf>,

    /// Domain for DNS/whois lookup (repeatable)
    #[arg(long = "domain")]
    pub domains: Vec<String>,

    /// File with one domain per line
    #[arg(long)]
    pub domains_file: Option<PathBuf>,

    /// Country code for the exit location
    #[arg(long)]
    pub country: Option<String>,

    /// Region code (see `checkrun geo`)
    #[arg(long)]
    pub region: Option<String>,

    /// City code (see `checkrun geo`)
    #[arg(long)]
    pub city: Option<String>,

    /// ISP value (see `checkrun geo`)
    #[arg(long)]
    pub isp: Option<String>,

    /// Proxy type: http or socks5
    #[arg(long)]
    pub proxy_type: Option<String>,

    /// DNS resolution: proxy or local
    #[arg(long)]
    pub dns_mode: Option<String>,

    /// Connection type: wifi or mobile
    #[arg(long)]
    pub connection_type: Option<String>,

    /// Override proxy host
    #[arg(long)]
    pub proxy_host: Option<String>,

    /// Override proxy port
    #[arg(long)]
    pub proxy_port: Option<u16>,

    /// Per-check timeout on the server, in seconds
    #[arg(long)]
    pub timeout_sec: Option<u32>,

    /// Ask the server to screenshot successful checks
    #[arg(long)]
    pub screenshot: bool,

    /// Ask the server to include debug details in its logs
    #[arg(long)]
    pub debug_mode: bool,

    /// Sticky session policy: auto, on or off
    #[arg(long)]
    pub sticky_policy: Option<String>,

    /// Sticky session TTL, in seconds
    #[arg(long)]
    pub sticky_ttl_sec: Option<u32>,

    /// Extra form field sent with every submission (KEY=VALUE, repeatable)
    #[arg(long = "field", value_parser = parse_field)]
    pub fields: Vec<(String, String)>,

    /// Print the final board as JSON and exit (no TUI)
    #[arg(long, global = true)]
    pub json: bool,

    /// Print results as text and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Write the board as JSON after every finished run
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Submit the configured runs when the TUI starts
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub run_on_launch: bool,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log file for TUI mode (the TUI does not log otherwise)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// List regions, cities and ISPs available for a country
    Geo {
        #[arg(long)]
        country: String,
        /// Narrow cities to one region
        #[arg(long)]
        region: Option<String>,
    },
    /// Delete all log files on the server
    ClearLogs {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

impl Cli {
    pub fn is_headless(&self) -> bool {
        self.json || self.text || self.command.is_some()
    }
}

/// Resolve server, timeout and endpoints: flag, then config file, then default.
pub fn build_client_config(args: &Cli) -> Result<ClientConfig> {
    let file = config::load_file_config(args.config.as_deref())?;
    let mut endpoints = file.endpoints;
    let overrides = [
        (&args.submit_path, &mut endpoints.submit),
        (&args.dns_submit_path, &mut endpoints.dns_submit),
        (&args.events_path, &mut endpoints.events),
        (&args.dns_events_path, &mut endpoints.dns_events),
        (&args.artifacts_path, &mut endpoints.artifacts),
    ];
    for (flag, slot) in overrides {
        if let Some(v) = flag {
            *slot = v.clone();
        }
    }
    let server = args
        .server
        .clone()
        .or(file.server)
        .unwrap_or_else(|| config::DEFAULT_SERVER.to_string());
    let mut cfg = ClientConfig::new(server, endpoints);
    if let Some(t) = args.request_timeout.map(Into::into).or(file.request_timeout) {
        cfg.request_timeout = t;
    }
    Ok(cfg)
}

fn read_list(inline: &[String], file: Option<&Path>) -> Result<Vec<String>> {
    let mut out: Vec<String> = inline
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if let Some(path) = file {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        out.extend(
            raw.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string),
        );
    }
    Ok(out)
}

/// Build the submission forms from CLI arguments. A kind with no subjects
/// gets no form.
pub(crate) fn build_forms(args: &Cli) -> Result<Forms> {
    let urls = read_list(&args.urls, args.urls_file.as_deref())?;
    let domains = read_list(&args.domains, args.domains_file.as_deref())?;

    let generic = (!urls.is_empty()).then(|| {
        let mut f = CheckForm::default();
        f.push("urls", urls.join("\n"));
        f.push_opt("country", args.country.as_deref());
        f.push_opt("region", args.region.as_deref());
        f.push_opt("city", args.city.as_deref());
        f.push_opt("isp", args.isp.as_deref());
        f.push_opt("proxy_type", args.proxy_type.as_deref());
        f.push_opt("dns_mode", args.dns_mode.as_deref());
        f.push_opt("connection_type", args.connection_type.as_deref());
        f.push_opt("proxy_host", args.proxy_host.as_deref());
        if let Some(port) = args.proxy_port {
            f.push("proxy_port", port.to_string());
        }
        if let Some(t) = args.timeout_sec {
            f.push("timeout_sec", t.to_string());
        }
        if args.screenshot {
            f.push("make_screenshot", "on");
        }
        if args.debug_mode {
            f.push("debug_mode", "on");
        }
        f.push_opt("sticky_policy", args.sticky_policy.as_deref());
        if let Some(ttl) = args.sticky_ttl_sec {
            f.push("sticky_ttl_sec", ttl.to_string());
        }
        for (k, v) in &args.fields {
            f.push(k, v.clone());
        }
        f
    });

    let dns = (!domains.is_empty()).then(|| {
        let mut f = CheckForm::default();
        f.push("domains", domains.join("\n"));
        for (k, v) in &args.fields {
            f.push(k, v.clone());
        }
        f
    });

    Ok(Forms { generic, dns })
}

pub async fn run(args: Cli) -> Result<()> {
    let verbosity = Verbosity::from_flags(args.verbose, args.quiet);
    let sink = if args.is_headless() {
        LogSink::Stderr
    } else {
        match args.log_file.as_deref() {
            Some(p) => LogSink::File(p),
            None => LogSink::Off,
        }
    };
    logging::init(verbosity, sink)?;

    let cfg = build_client_config(&args)?;
    let client = CheckClient::new(&cfg)?;

    match &args.command {
        Some(Command::Geo { country, region }) => {
            return run_geo(&client, country, region.as_deref(), args.json).await;
        }
        Some(Command::ClearLogs { yes }) => return run_clear_logs(&client, *yes).await,
        None => {}
    }

    let forms = build_forms(&args)?;

    if !args.json && !args.text {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args, client, forms).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_headless(args, client, forms).await;
        }
    }

    run_headless(args, client, forms).await
}

async fn run_geo(client: &CheckClient, country: &str, region: Option<&str>, json: bool) -> Result<()> {
    let choices = geo::fetch_choices(client, country, region)
        .await
        .context("Failed to fetch geo data")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&choices)?);
        return Ok(());
    }
    for (title, list) in [
        ("Regions", &choices.regions),
        ("Cities", &choices.cities),
        ("ISPs", &choices.isps),
    ] {
        println!("{title}:");
        if list.is_empty() {
            println!("  (none)");
        }
        for c in list {
            println!("  {:<24} {}", c.value, c.label);
        }
    }
    Ok(())
}

async fn run_clear_logs(client: &CheckClient, yes: bool) -> Result<()> {
    if !yes {
        let confirmed = tokio::task::spawn_blocking(|| -> Result<bool> {
            print!("Are you sure you want to delete all log files? This cannot be undone. [y/N] ");
            std::io::stdout().flush()?;
            let mut answer = String::new();
            std::io::stdin().read_line(&mut answer)?;
            Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
        })
        .await
        .context("confirmation prompt failed")??;
        if !confirmed {
            eprintln!("Aborted.");
            return Ok(());
        }
    }
    logs::clear_logs(client).await?;
    eprintln!("Logs cleared successfully.");
    Ok(())
}

/// Run every configured kind once, print results as they land, and exit.
async fn run_headless(args: Cli, client: CheckClient, forms: Forms) -> Result<()> {
    if forms.generic.is_none() && forms.dns.is_none() {
        bail!("nothing to run: pass --url/--urls-file and/or --domain/--domains-file");
    }
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<AppEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let opts = ControllerOptions {
        submit_on_launch: true,
        exit_when_idle: true,
    };
    let handle = tokio::spawn(run_controller(client.clone(), forms, opts, evt_tx, cmd_rx));

    let link = |p: &str| client.artifact_url(p);
    let mut board = Board::default();
    let mut failures = 0usize;

    while let Some(ev) = evt_rx.recv().await {
        let change = board.apply(&ev);
        match &ev {
            AppEvent::SubmissionFailed { kind, message } => {
                failures += 1;
                let _ = out_tx.send(OutputLine::Stderr(format!("{}: {message}", kind.title())));
            }
            AppEvent::StreamLost { kind, message } => {
                failures += 1;
                let _ = out_tx.send(OutputLine::Stderr(format!("{}: {message}", kind.title())));
            }
            AppEvent::Info(msg) => {
                let _ = out_tx.send(OutputLine::Stderr(msg.clone()));
            }
            AppEvent::Stream { kind, event } => {
                if !args.json {
                    if let Some(change) = change.as_ref() {
                        for line in crate::text_summary::change_lines(board.panel(*kind), change, &link) {
                            let _ = out_tx.send(OutputLine::Stdout(line));
                        }
                    }
                }
                if event.is_terminal() {
                    let processed = process_run_completion(args.export_json.as_deref(), &board);
                    for m in processed.export_messages {
                        let _ = out_tx.send(OutputLine::Stderr(m));
                    }
                }
            }
            AppEvent::Cleared { .. } | AppEvent::Trigger { .. } => {}
        }
    }
    drop(cmd_tx);

    handle.await.context("controller task failed")??;

    if args.json {
        let out = serde_json::to_string_pretty(&board.snapshot())?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        let summary = crate::text_summary::build_text_summary(&board);
        for line in summary.lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    drop(out_tx);
    let _ = out_handle.await;

    if failures > 0 {
        bail!("{failures} run(s) did not complete");
    }
    Ok(())
}
