mod coordinator;
mod dashboard;
mod executor;
mod input;
mod scheduler;
mod shell;
mod ui;

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use secrecy::SecretString;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fleetwatch_core::config::{CommandMap, ConfigError, FleetConfig, expand_path};
use fleetwatch_core::executor::RemoteExecutor;
use fleetwatch_core::fleet::Fleet;
use fleetwatch_core::trust::{TrustError, bind_host_keys, load_known_hosts};

use dashboard::Dashboard;
use executor::{DemoExecutor, SshExecutor, SshOptions};
use input::CommandLoop;
use scheduler::Scheduler;
use shell::ShellLauncher;

const LOG_ENV: &str = "FLEETWATCH_LOG";
const DEFAULT_KNOWN_HOSTS: &str = "~/.ssh/known_hosts";

#[derive(Parser, Debug)]
#[command(name = "fleetwatch")]
#[command(about = "Live health dashboard for a fleet of ssh hosts", long_about = None)]
#[command(version)]
struct Cli {
    /// Host list (JSON, or YAML with a .yml/.yaml extension)
    #[arg(short = 'd', long = "data")]
    data: PathBuf,

    /// Private key used for ssh
    #[arg(short = 'k', long = "key")]
    key: Option<PathBuf>,

    /// File holding the private key's passphrase
    #[arg(short = 'p', long = "pass")]
    pass: Option<PathBuf>,

    /// Function key command map (F1=... through F12=...)
    #[arg(short = 'c', long = "cmd")]
    cmd: Option<PathBuf>,

    /// Terminal program used to open shells [default: $TERM, then xterm]
    #[arg(short = 'T', long = "term")]
    term: Option<String>,

    /// Seconds it takes the background refresh to cover the whole fleet
    #[arg(short = 't', long = "period", default_value_t = 300)]
    period: u64,

    /// known_hosts file used to pin host keys [default: ~/.ssh/known_hosts]
    #[arg(long = "known-hosts")]
    known_hosts: Option<PathBuf>,

    /// Seconds before a dial or probe is abandoned
    #[arg(long = "timeout", default_value_t = 15)]
    timeout: u64,

    /// Write logs to this file
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,

    /// Show synthetic data instead of contacting hosts
    #[arg(long = "demo")]
    demo: bool,
}

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Trust(#[from] TrustError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("no ssh signer available: start an ssh-agent or pass --key")]
    NoSigner,
}

fn io_context(context: impl Into<String>) -> impl FnOnce(io::Error) -> StartupError {
    let context = context.into();
    move |source| StartupError::Io { context, source }
}

fn init_logging(log_file: Option<&Path>) -> Result<(), StartupError> {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_ansi(false);
    // the terminal belongs to the dashboard, so logs go to a file or nowhere
    let result = match log_file {
        Some(path) => {
            let path = expand_path(path);
            let file = File::create(&path)
                .map_err(io_context(format!("cannot create log file {}", path.display())))?;
            builder.with_writer(Mutex::new(file)).try_init()
        }
        None => builder.with_writer(io::sink).try_init(),
    };
    if let Err(e) = result {
        eprintln!("Warning: logging disabled: {}", e);
    }
    Ok(())
}

fn agent_available() -> bool {
    std::env::var_os("SSH_AUTH_SOCK")
        .map(PathBuf::from)
        .is_some_and(|sock| sock.exists())
}

/// A usable key file, or an agent to sign with
fn check_signer(key: Option<&Path>) -> Result<Option<PathBuf>, StartupError> {
    match key {
        Some(key) => {
            let key = expand_path(key);
            File::open(&key)
                .map_err(io_context(format!("cannot read key {}", key.display())))?;
            Ok(Some(key))
        }
        None if agent_available() => Ok(None),
        None => Err(StartupError::NoSigner),
    }
}

fn read_passphrase(path: &Path) -> Result<SecretString, StartupError> {
    let path = expand_path(path);
    let raw = std::fs::read_to_string(&path)
        .map_err(io_context(format!("cannot read password file {}", path.display())))?;
    let pass = raw.strip_suffix('\n').unwrap_or(&raw);
    let pass = pass.strip_suffix('\r').unwrap_or(pass);
    Ok(SecretString::from(pass.to_string()))
}

fn terminal_program(flag: Option<String>) -> String {
    flag.or_else(|| std::env::var("TERM").ok())
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| "xterm".to_string())
}

/// An explicitly named store must exist; the default one is optional
fn known_hosts_path(flag: Option<&Path>) -> Option<PathBuf> {
    match flag {
        Some(path) => Some(expand_path(path)),
        None => {
            let path = expand_path(Path::new(DEFAULT_KNOWN_HOSTS));
            path.exists().then_some(path)
        }
    }
}

// --- Terminal setup/teardown ---
fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

async fn run_dashboard<E: RemoteExecutor>(
    executor: E,
    fleet: Fleet,
    commands: CommandMap,
    launcher: ShellLauncher,
    cli: &Cli,
) -> Result<(), StartupError> {
    info!(
        executor = executor.name(),
        hosts = fleet.len(),
        commands = commands.len(),
        "starting dashboard"
    );
    let (dashboard, signals) = Dashboard::new(fleet);
    let scheduler = Arc::new(Scheduler::new(
        executor,
        Arc::clone(&dashboard),
        Duration::from_secs(cli.timeout),
    ));

    let terminal = setup_terminal().map_err(io_context("cannot set up terminal"))?;
    let (stop, shutdown) = oneshot::channel();
    let resort = tokio::spawn(coordinator::run_resort(
        Arc::clone(&dashboard),
        signals.resort,
    ));
    let redraw = tokio::spawn(coordinator::run_redraw(
        Arc::clone(&dashboard),
        signals.redraw,
        terminal,
        shutdown,
    ));

    scheduler.request_fleet_refresh(false);
    let stagger = tokio::spawn(
        Arc::clone(&scheduler).stagger(Duration::from_secs(cli.period.max(1))),
    );

    let command_loop = CommandLoop::new(
        Arc::clone(&dashboard),
        Arc::clone(&scheduler),
        commands,
        launcher,
    );
    let result = command_loop.run().await;

    stagger.abort();
    resort.abort();
    let _ = stop.send(());
    match redraw.await {
        Ok(terminal) => {
            if let Err(e) = restore_terminal(terminal) {
                warn!(error = %e, "terminal restore failed");
            }
        }
        Err(e) => {
            warn!(error = %e, "redraw task failed");
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen);
        }
    }

    scheduler.close_all().await;
    info!("dashboard stopped");
    result.map_err(io_context("terminal input failed"))
}

async fn run(cli: Cli) -> Result<(), StartupError> {
    init_logging(cli.log_file.as_deref())?;

    let config = FleetConfig::load(&cli.data)?;
    let commands = match &cli.cmd {
        Some(path) => CommandMap::load(path)?,
        None => CommandMap::default(),
    };
    let launcher = ShellLauncher::new(terminal_program(cli.term.clone()), cli.key.clone());

    if cli.demo {
        let fleet = Fleet::new(config.hosts);
        return run_dashboard(DemoExecutor::new(), fleet, commands, launcher, &cli).await;
    }

    let identity = check_signer(cli.key.as_deref())?;
    let passphrase = cli.pass.as_deref().map(read_passphrase).transpose()?;

    let mut host_keys = HashMap::new();
    if let Some(path) = known_hosts_path(cli.known_hosts.as_deref()) {
        let entries = load_known_hosts(&path)?;
        let bound = bind_host_keys(&entries, &config.hosts);
        info!(
            store = %path.display(),
            entries = entries.len(),
            pinned = bound.len(),
            "host keys loaded"
        );
        for spec in &config.hosts {
            if let Some(key) = bound.get(&spec.name) {
                host_keys.insert((spec.address.clone(), spec.port), key.clone());
            }
        }
    }

    let executor = SshExecutor::new(SshOptions {
        identity,
        passphrase,
        connect_timeout: Duration::from_secs(cli.timeout),
        host_keys,
    })
    .map_err(io_context("cannot create ssh runtime directory"))?;

    let fleet = Fleet::new(config.hosts);
    run_dashboard(executor, fleet, commands, launcher, &cli).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["fleetwatch", "-d", "hosts.json"]).unwrap();
        assert_eq!(cli.data, PathBuf::from("hosts.json"));
        assert_eq!(cli.period, 300);
        assert_eq!(cli.timeout, 15);
        assert!(!cli.demo);
        assert!(cli.key.is_none());
    }

    #[test]
    fn test_cli_requires_host_list() {
        assert!(Cli::try_parse_from(["fleetwatch"]).is_err());
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::try_parse_from([
            "fleetwatch", "-d", "h.yml", "-k", "id", "-p", "pw", "-c", "cmds", "-T", "urxvt",
            "-t", "60",
        ])
        .unwrap();
        assert_eq!(cli.key, Some(PathBuf::from("id")));
        assert_eq!(cli.pass, Some(PathBuf::from("pw")));
        assert_eq!(cli.cmd, Some(PathBuf::from("cmds")));
        assert_eq!(terminal_program(cli.term), "urxvt");
        assert_eq!(cli.period, 60);
    }

    #[test]
    fn test_passphrase_strips_one_newline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"s3cret \r\n").unwrap();
        let pass = read_passphrase(file.path()).unwrap();
        use secrecy::ExposeSecret;
        assert_eq!(pass.expose_secret(), "s3cret ");
    }

    #[test]
    fn test_explicit_key_must_be_readable() {
        let err = check_signer(Some(Path::new("/nonexistent/id_ed25519"))).unwrap_err();
        assert!(matches!(err, StartupError::Io { .. }));

        let file = tempfile::NamedTempFile::new().unwrap();
        let key = check_signer(Some(file.path())).unwrap();
        assert_eq!(key.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_explicit_known_hosts_is_kept_even_if_missing() {
        let path = known_hosts_path(Some(Path::new("/nonexistent/known_hosts")));
        assert_eq!(path, Some(PathBuf::from("/nonexistent/known_hosts")));
    }
}
