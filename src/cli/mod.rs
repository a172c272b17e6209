//! CLI module for the mealplan command-line interface.
//!
//! Without a subcommand (or with `serve`) the binary runs the API server.
//! The other subcommands talk to a running server:
//! - `signup` / `login` / `logout` - manage the local session
//! - `whoami` - show the signed-in account
//! - `update` - change email, password, calorie goal or preferences
//! - `delete-account` - remove the signed-in account
//! - `forgot-password` - email the login details for an address

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{LockoutPolicy, LockoutStatus};
use crate::client::{
    ApiClient, ClientError, DEFAULT_TIMEOUT_SECS, LoginError, LoginSurface, StateFile,
};
use crate::db::{AccountResponse, SignupRequest, UpdateAccountRequest};

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "mealplan")]
#[command(author, version, about = "Meal-planning account server and client", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "mealplan.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// API URL to connect to
    #[arg(long, env = "MEALPLAN_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Where the client keeps its session token and lockout counters
    #[arg(long, env = "MEALPLAN_STATE_FILE", default_value = ".mealplan/client.json")]
    pub state_file: PathBuf,

    /// Timeout for each API call, in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the API server
    Serve,

    /// Create an account (password is read from stdin)
    Signup {
        username: String,
        email: String,
    },

    /// Sign in and store the session token (password is read from stdin)
    Login {
        /// Defaults to the last username that signed in on this device
        username: Option<String>,
    },

    /// Discard the stored session token
    Logout,

    /// Show the signed-in account
    Whoami,

    /// Update fields of the signed-in account
    Update {
        #[arg(long)]
        email: Option<String>,
        /// Prompt for a new password on stdin
        #[arg(long)]
        password: bool,
        #[arg(long)]
        calorie_goal: Option<i64>,
        #[arg(long)]
        preferences: Option<String>,
    },

    /// Delete the signed-in account
    DeleteAccount {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Email the login details registered to an address
    ForgotPassword { email: String },
}

impl Cli {
    /// True when the invocation should start the server
    pub fn is_serve(&self) -> bool {
        matches!(self.command, None | Some(Commands::Serve))
    }

    fn api_client(&self) -> Result<ApiClient> {
        ApiClient::new(&self.api_url, Duration::from_secs(self.timeout_secs))
            .context("Failed to create HTTP client")
    }

    fn state_file(&self) -> StateFile {
        StateFile::new(&self.state_file)
    }
}

/// Run a client subcommand
pub async fn run_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Some(Commands::Signup { username, email }) => cmd_signup(cli, username, email).await,
        Some(Commands::Login { username }) => cmd_login(cli, username.as_deref()).await,
        Some(Commands::Logout) => cmd_logout(cli).await,
        Some(Commands::Whoami) => cmd_whoami(cli).await,
        Some(Commands::Update {
            email,
            password,
            calorie_goal,
            preferences,
        }) => {
            let new_password = if *password {
                Some(read_password("New password: ")?)
            } else {
                None
            };
            let request = UpdateAccountRequest {
                email: email.clone(),
                password: new_password,
                daily_calorie_goal: *calorie_goal,
                dietary_preferences: preferences.clone(),
            };
            cmd_update(cli, request).await
        }
        Some(Commands::DeleteAccount { yes }) => cmd_delete_account(cli, *yes).await,
        Some(Commands::ForgotPassword { email }) => cmd_forgot_password(cli, email).await,
        Some(Commands::Serve) | None => {
            // Starting the server is handled in main.rs
            Ok(())
        }
    }
}

async fn cmd_signup(cli: &Cli, username: &str, email: &str) -> Result<()> {
    let password = read_password("Password: ")?;
    let request = SignupRequest {
        username: username.to_string(),
        email: email.to_string(),
        password,
    };

    let account = cli
        .api_client()?
        .signup(&request)
        .await
        .map_err(describe_client_error)?;

    println!("Created account '{}' (id {}).", account.username, account.id);
    println!("Run `mealplan login {}` to sign in.", account.username);
    Ok(())
}

async fn cmd_login(cli: &Cli, username: Option<&str>) -> Result<()> {
    let surface = LoginSurface::open(
        Arc::new(cli.api_client()?),
        LockoutPolicy::default(),
        cli.state_file(),
    )
    .context("Failed to load client state")?;

    // Refuse before prompting; an expired lockout is cleared first
    surface
        .tick_at(Utc::now())
        .context("Failed to save client state")?;
    if let LockoutStatus::Locked { until } = surface.status() {
        anyhow::bail!(
            "Too many failed attempts. Try again after {}.",
            until.format("%H:%M:%S UTC")
        );
    }

    let username = match username.map(str::to_string).or_else(|| surface.cached_username()) {
        Some(username) => username,
        None => anyhow::bail!("Username is required for the first login on this device"),
    };
    let password = read_password(&format!("Password for {}: ", username))?;

    match surface.login(&username, &password).await {
        Ok(_) => {
            println!("Logged in as {}.", username);
            Ok(())
        }
        Err(LoginError::InvalidCredentials { remaining_attempts }) => {
            anyhow::bail!(
                "Invalid credentials. {} attempt{} left before login is locked.",
                remaining_attempts,
                if remaining_attempts == 1 { "" } else { "s" }
            )
        }
        Err(LoginError::LockedOut { until }) => {
            anyhow::bail!(
                "Too many failed attempts. Try again after {}.",
                until.format("%H:%M:%S UTC")
            )
        }
        Err(LoginError::Client(e)) => Err(describe_client_error(e)),
        Err(e) => Err(e.into()),
    }
}

async fn cmd_logout(cli: &Cli) -> Result<()> {
    let surface = LoginSurface::open(
        Arc::new(cli.api_client()?),
        LockoutPolicy::default(),
        cli.state_file(),
    )
    .context("Failed to load client state")?;

    if surface.logout().context("Failed to save client state")? {
        println!("Logged out.");
    } else {
        println!("Not logged in.");
    }
    Ok(())
}

/// Fetch the current profile, dropping the stored token if the server rejects it
async fn current_account(cli: &Cli, client: &ApiClient) -> Result<(String, AccountResponse)> {
    let file = cli.state_file();
    let mut state = file.load().context("Failed to load client state")?;
    let token = state
        .token
        .clone()
        .context("Not logged in. Run `mealplan login` first.")?;

    match client.get_user(&token).await {
        Ok(account) => Ok((token, account)),
        Err(e) if e.status() == Some(reqwest::StatusCode::UNAUTHORIZED) => {
            state.token = None;
            file.save(&state).context("Failed to save client state")?;
            anyhow::bail!("Session expired. Run `mealplan login` again.")
        }
        Err(e) => Err(describe_client_error(e)),
    }
}

async fn cmd_whoami(cli: &Cli) -> Result<()> {
    let client = cli.api_client()?;
    let (_, account) = current_account(cli, &client).await?;
    print_account(&account);
    Ok(())
}

async fn cmd_update(cli: &Cli, request: UpdateAccountRequest) -> Result<()> {
    let client = cli.api_client()?;
    let (token, account) = current_account(cli, &client).await?;

    let updated = client
        .update_user(&token, &account.username, &request)
        .await
        .map_err(describe_client_error)?;

    println!("Account updated.");
    print_account(&updated);
    Ok(())
}

async fn cmd_delete_account(cli: &Cli, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!("Refusing to delete without --yes");
    }

    let client = cli.api_client()?;
    let (token, account) = current_account(cli, &client).await?;
    client
        .delete_account(&token)
        .await
        .map_err(describe_client_error)?;

    let file = cli.state_file();
    let mut state = file.load().context("Failed to load client state")?;
    state.token = None;
    state.username = None;
    file.save(&state).context("Failed to save client state")?;

    println!("Deleted account '{}'.", account.username);
    Ok(())
}

async fn cmd_forgot_password(cli: &Cli, email: &str) -> Result<()> {
    let response = cli
        .api_client()?
        .forgot_password(email)
        .await
        .map_err(describe_client_error)?;
    println!("{}", response.message);
    Ok(())
}

fn print_account(account: &AccountResponse) {
    println!();
    println!("Username:      {}", account.username);
    println!("Email:         {}", account.email);
    println!(
        "Calorie goal:  {}",
        account
            .daily_calorie_goal
            .map(|g| g.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!(
        "Preferences:   {}",
        account.dietary_preferences.as_deref().unwrap_or("-")
    );
    println!("Member since:  {}", account.created_at);
    println!();
}

/// Read one line from stdin without the trailing newline
fn read_password(prompt: &str) -> Result<String> {
    eprint!("{}", prompt);
    io::stderr().flush().ok();

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;

    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        anyhow::bail!("Password must not be empty");
    }
    Ok(password)
}

fn describe_client_error(err: ClientError) -> anyhow::Error {
    match err {
        ClientError::Transport(e) if e.is_timeout() => {
            anyhow::anyhow!("Request timed out. Is the server running?")
        }
        ClientError::Transport(e) if e.is_connect() => {
            anyhow::anyhow!("Failed to connect to server. Is mealplan running?")
        }
        ClientError::Api { message, .. } => anyhow::anyhow!(message),
        other => other.into(),
    }
}
