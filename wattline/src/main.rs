#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result};
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wattconfig::WattConfig;
use wattson::dashboard::{DashboardCoordinator, DashboardView};
use wattson::guard::{GuardDecision, Guarded, RouteGuard};
use wattson::route::{History, Navigator, Route};
use wattson::session::{SessionManager, SessionState};
use wattson::store::FileSessionStore;
use wattson::types::{Period, RegisterForm};
use wattson::{Error as WattsonError, WattsonClient};
mod render;

#[derive(Parser)]
#[command(name = "wattline", about = "A CLI for the Wattson energy tracker")]
struct Cli {
    /// Log more (-v for debug output)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account
    Register {
        username: String,
        email: String,
        /// Password; prompted for (twice) when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign in and remember the session
    Login {
        username: String,
        /// Password; prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show who is signed in
    Whoami,
    /// Upload a CSV file of meter readings
    Upload {
        /// Path to the .csv file
        file: PathBuf,
    },
    /// Show consumption statistics and the energy series
    Dashboard {
        /// hourly, daily or monthly (defaults to the configured period)
        #[arg(long)]
        period: Option<Period>,
        /// Reload this many times if loading fails
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },
    /// Show the config, or change and save it
    Config {
        /// Backend API base URL, e.g. http://localhost:8000/api/
        #[arg(long)]
        api_url: Option<String>,
        /// Per-request timeout in seconds
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout_secs: Option<u64>,
    },
    /// Resolve a client path through the route guard
    Open {
        /// e.g. /dashboard or /login
        path: String,
    },
    /// Generate shell completions
    #[command(hide = true)]
    Completions {
        /// The shell to generate completions for
        shell: Shell,
    },
}

/// Everything a command needs, restored from disk.
struct App {
    config: WattConfig,
    session: Arc<SessionManager>,
    history: Arc<History>,
    client: WattsonClient,
    guard: RouteGuard,
}

impl App {
    async fn load() -> Result<Self> {
        let config = WattConfig::load().with_context(|| "Failed to load wattson config")?;
        let session_path = config
            .session_path()
            .with_context(|| "Failed to locate session file")?;
        tracing::debug!(path = %session_path.display(), api = %config.api_url, "loading session");

        let history = Arc::new(History::default());
        let navigator: Arc<dyn Navigator> = history.clone();
        let session = Arc::new(SessionManager::new(
            Arc::new(FileSessionStore::new(session_path)),
            navigator.clone(),
        ));
        session
            .initialize()
            .with_context(|| "Failed to restore session")?;

        let client = WattsonClient::new(session.clone())
            .with_base_url(config.api_url.clone())
            .with_timeout(config.timeout());
        let guard = RouteGuard::new(&session, navigator);
        guard.decided().await;

        Ok(Self {
            config,
            session,
            history,
            client,
            guard,
        })
    }

    /// Lets a protected command through only for a signed-in user; anyone
    /// else gets a hint pointing at the page they were sent to.
    fn enter(&self, route: Route) -> bool {
        match self.guard.check(route) {
            GuardDecision::Render => true,
            GuardDecision::Redirect(to) => {
                println!(
                    "{} (redirected to {to}). Run `wattline login <username>` first.",
                    "Not signed in".yellow()
                );
                false
            }
            GuardDecision::Defer => {
                println!("{}", "Session is still being restored".yellow());
                false
            }
        }
    }

    /// Turns a session dropped by a 401 into a clear message.
    fn ensure_still_signed_in(&self) -> Result<()> {
        if self.session.state().is_authenticated() {
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "Session expired (now at {}). Please log in again.",
                self.history.current()
            ))
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = if verbose > 0 { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn prompt_password(prompt: &str) -> Result<String> {
    rpassword::prompt_password(prompt).with_context(|| "Failed to read password")
}

fn upload_file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Not a file path: {}", path.display()))
}

fn handle_error(err: &anyhow::Error) -> ! {
    if let Some(err) = err.downcast_ref::<WattsonError>() {
        eprintln!("{}", err.message().red());
        process::exit(1);
    }

    eprintln!("{}", format!("{err:#}").red());
    process::exit(1);
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli.command).await {
        handle_error(&err);
    }
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "wattline", &mut std::io::stdout());
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            let app = App::load().await?;
            let (password, password2) = match password {
                Some(password) => (password.clone(), password),
                None => (
                    prompt_password("Password: ")?,
                    prompt_password("Confirm password: ")?,
                ),
            };
            let form = RegisterForm::new(username, email, password, password2);
            app.client.register(&form).await?;
            println!(
                "{}",
                format!("Registered {}. You can now log in.", form.username).green()
            );
        }
        Command::Login { username, password } => {
            let app = App::load().await?;
            let password = match password {
                Some(password) => password,
                None => prompt_password("Password: ")?,
            };
            let signed_in = app.client.login(&username, &password).await?;
            app.session
                .login(signed_in.credential, signed_in.identity.username)
                .with_context(|| "Failed to save session")?;
            println!("{} {}", "Signed in as".green(), username.bold());
        }
        Command::Logout => {
            let app = App::load().await?;
            let was = app.session.identity();
            app.session.logout();
            match was {
                Some(identity) => println!("Signed out {identity}"),
                None => println!("Not signed in"),
            }
        }
        Command::Whoami => {
            let app = App::load().await?;
            match app.session.state() {
                SessionState::Authenticated { identity, .. } => println!("{identity}"),
                SessionState::Unauthenticated | SessionState::Unknown => {
                    println!("{}", "Not signed in".yellow());
                }
            }
        }
        Command::Upload { file } => {
            let app = App::load().await?;
            if !app.enter(Route::Upload) {
                return Ok(());
            }
            let file_name = upload_file_name(&file)?;
            let contents =
                fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let result = app.client.upload_csv(&file_name, contents).await;
            if result.is_err() {
                app.ensure_still_signed_in()?;
            }
            println!("{}", result?.green());
        }
        Command::Config {
            api_url,
            timeout_secs,
        } => {
            let mut config = WattConfig::load_file().with_context(|| "Failed to load config")?;
            let changed = api_url.is_some() || timeout_secs.is_some();
            if let Some(api_url) = api_url {
                config.api_url = api_url;
            }
            if let Some(timeout_secs) = timeout_secs {
                config.timeout_secs = timeout_secs;
            }
            if changed {
                config.store().with_context(|| "Failed to save config")?;
            }
            let path = WattConfig::path()?;
            println!("{:14}{}", "config file", path.display());
            println!("{:14}{}", "api_url", config.api_url);
            println!("{:14}{}s", "timeout", config.timeout_secs);
            println!("{:14}{}", "session file", config.session_path()?.display());
        }
        Command::Dashboard { period, retries } => {
            let app = App::load().await?;
            if !app.enter(Route::Dashboard) {
                return Ok(());
            }
            let period = match period {
                Some(period) => period,
                None => app
                    .config
                    .display
                    .default_period
                    .parse::<Period>()
                    .map_err(|err| anyhow::anyhow!("Invalid display.default_period: {err}"))?,
            };

            let dashboard = DashboardCoordinator::new(app.client.clone(), period);
            dashboard.mount().await;
            for attempt in 1..=retries {
                if !matches!(dashboard.view(), DashboardView::Failed(_)) {
                    break;
                }
                app.ensure_still_signed_in()?;
                tracing::info!(attempt, "dashboard failed to load, retrying");
                dashboard.refresh().await;
            }
            match dashboard.view() {
                DashboardView::Ready {
                    period,
                    energy,
                    statistics,
                } => render::print_dashboard(period, &energy, &statistics, &app.config.display),
                DashboardView::Failed(message) => {
                    app.ensure_still_signed_in()?;
                    return Err(anyhow::anyhow!(message));
                }
                DashboardView::Loading => {
                    return Err(anyhow::anyhow!("Dashboard did not finish loading"));
                }
            }
        }
        Command::Open { path } => {
            let app = App::load().await?;
            let route = Route::from_path(&path);
            match app.guard.render(route, || route.to_string().green()) {
                Guarded::Rendered(line) => println!("{line}"),
                Guarded::Redirected(to) => println!("{route} {} {to}", "->".yellow()),
                Guarded::Deferred => println!("{route} {}", "(waiting for session)".yellow()),
            }
            tracing::debug!(%route, now = %app.history.current(), "route resolved");
        }
    }

    Ok(())
}
