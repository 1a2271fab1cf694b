//! adminctl - command-line client for the admin API

use std::io::{BufRead, IsTerminal, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adminctl::api::{self, transport::HttpTransport};
use adminctl::auth::{self, NoticeLevel, Registration, Session, SessionEvent};
use adminctl::config::{FileStore, Settings};
use adminctl::models::{ItemDraft, ItemSearch, ItemStatus, ItemType, Sort, SortDirection};
use adminctl::models::{UserDraft, UserRole, UserSearch, UserStatus};

#[derive(Parser)]
#[command(name = "adminctl")]
#[command(about = "Command-line client for the admin API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override the API base URL from config.toml
    #[arg(long, global = true)]
    api_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with email and password
    Login {
        #[arg(short, long)]
        email: String,

        /// Read from stdin when not given
        #[arg(short, long, env = "ADMINCTL_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Create a new account
    Register {
        #[arg(long)]
        email: String,

        /// Read from stdin when not given
        #[arg(long, env = "ADMINCTL_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,
    },

    /// Log out and clear stored credentials
    Logout,

    /// Show token and session status
    Status,

    /// Show the logged-in user
    Whoami,

    /// Show or change persistent settings
    Config {
        /// New API base URL
        #[arg(long)]
        set_api_url: Option<String>,

        /// New request timeout in milliseconds
        #[arg(long)]
        set_timeout_ms: Option<u64>,
    },

    /// Manage items
    #[command(subcommand)]
    Items(ItemCommand),

    /// Manage users
    #[command(subcommand)]
    Users(UserCommand),
}

#[derive(Args)]
struct PageArgs {
    #[arg(long, default_value = "1")]
    page: u64,

    #[arg(short, long, default_value = "10")]
    limit: u64,
}

#[derive(Args)]
struct SortArgs {
    /// Field to sort by
    #[arg(long)]
    sort: Option<String>,

    /// Sort descending
    #[arg(long)]
    desc: bool,
}

impl SortArgs {
    fn to_sort(&self) -> Option<Sort> {
        self.sort.as_ref().map(|field| Sort {
            field: field.clone(),
            direction: if self.desc {
                SortDirection::Desc
            } else {
                SortDirection::Asc
            },
        })
    }
}

#[derive(Args)]
struct ItemFields {
    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    description: Option<String>,

    #[arg(long = "type", value_enum)]
    item_type: Option<ItemTypeArg>,

    #[arg(long, value_enum)]
    status: Option<ItemStatusArg>,

    /// Comma-separated tags
    #[arg(long, value_delimiter = ',')]
    tags: Option<Vec<String>>,
}

impl ItemFields {
    fn into_draft(self) -> ItemDraft {
        ItemDraft {
            name: self.name,
            description: self.description,
            item_type: self.item_type.map(Into::into),
            status: self.status.map(Into::into),
            tags: self.tags,
        }
    }
}

#[derive(Args)]
struct UserFields {
    #[arg(long)]
    username: Option<String>,

    #[arg(long)]
    email: Option<String>,

    /// Initial or new password; prefer ADMINCTL_USER_PASSWORD over the flag
    #[arg(long, env = "ADMINCTL_USER_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[arg(long, value_enum)]
    role: Option<UserRoleArg>,

    #[arg(long, value_enum)]
    status: Option<UserStatusArg>,

    #[arg(long)]
    active: Option<bool>,

    #[arg(long)]
    phone: Option<String>,
}

impl UserFields {
    fn into_draft(self) -> UserDraft {
        UserDraft {
            username: self.username,
            email: self.email,
            password: self.password,
            role: self.role.map(Into::into),
            status: self.status.map(Into::into),
            is_active: self.active,
            phone_number: self.phone,
        }
    }
}

#[derive(Subcommand)]
enum ItemCommand {
    /// List items page by page
    List(PageArgs),

    /// Show one item
    Get { id: String },

    /// Create an item
    Create(ItemFields),

    /// Replace fields of an item
    Update {
        id: String,

        #[command(flatten)]
        fields: ItemFields,
    },

    /// Delete an item
    Delete { id: String },

    /// Search items
    Search {
        #[arg(long)]
        name: Option<String>,

        #[arg(long = "type", value_enum)]
        types: Vec<ItemTypeArg>,

        #[arg(long, value_enum)]
        status: Vec<ItemStatusArg>,

        #[arg(long)]
        tag: Vec<String>,

        /// Custom field filter as key=value (repeatable)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,

        #[command(flatten)]
        sort: SortArgs,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Change the status of an item
    Status {
        id: String,

        #[arg(value_enum)]
        status: ItemStatusArg,
    },

    /// Show item statistics
    Stats,
}

#[derive(Subcommand)]
enum UserCommand {
    /// List users page by page
    List(PageArgs),

    /// Show one user
    Get { id: String },

    /// Create a user
    Create(UserFields),

    /// Change fields of a user
    Update {
        id: String,

        #[command(flatten)]
        fields: UserFields,
    },

    /// Delete a user
    Delete { id: String },

    /// Search users
    Search {
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long, value_enum)]
        role: Vec<UserRoleArg>,

        #[arg(long, value_enum)]
        status: Vec<UserStatusArg>,

        #[command(flatten)]
        sort: SortArgs,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Change the status of a user
    Status {
        id: String,

        #[arg(value_enum)]
        status: UserStatusArg,
    },

    /// Change the role of a user
    Role {
        id: String,

        #[arg(value_enum)]
        role: UserRoleArg,
    },

    /// Show user statistics
    Stats,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got {:?}", s)),
    }
}

/// Read a password from stdin, prompting when attached to a terminal.
fn read_password() -> Result<String> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprint!("Password: ");
        std::io::stderr().flush().ok();
    }
    let mut line = String::new();
    stdin
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        anyhow::bail!("No password given");
    }
    Ok(password)
}

#[derive(Clone, Copy, ValueEnum)]
enum ItemTypeArg {
    Type1,
    Type2,
    Type3,
    Type4,
    Type5,
    Other,
}

impl From<ItemTypeArg> for ItemType {
    fn from(arg: ItemTypeArg) -> Self {
        match arg {
            ItemTypeArg::Type1 => ItemType::Type1,
            ItemTypeArg::Type2 => ItemType::Type2,
            ItemTypeArg::Type3 => ItemType::Type3,
            ItemTypeArg::Type4 => ItemType::Type4,
            ItemTypeArg::Type5 => ItemType::Type5,
            ItemTypeArg::Other => ItemType::Other,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ItemStatusArg {
    Active,
    Inactive,
    Pending,
    Archived,
}

impl From<ItemStatusArg> for ItemStatus {
    fn from(arg: ItemStatusArg) -> Self {
        match arg {
            ItemStatusArg::Active => ItemStatus::Active,
            ItemStatusArg::Inactive => ItemStatus::Inactive,
            ItemStatusArg::Pending => ItemStatus::Pending,
            ItemStatusArg::Archived => ItemStatus::Archived,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum UserRoleArg {
    Admin,
    Manager,
    User,
    Guest,
}

impl From<UserRoleArg> for UserRole {
    fn from(arg: UserRoleArg) -> Self {
        match arg {
            UserRoleArg::Admin => UserRole::Admin,
            UserRoleArg::Manager => UserRole::Manager,
            UserRoleArg::User => UserRole::User,
            UserRoleArg::Guest => UserRole::Guest,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum UserStatusArg {
    Active,
    Inactive,
    Pending,
    Suspended,
}

impl From<UserStatusArg> for UserStatus {
    fn from(arg: UserStatusArg) -> Self {
        match arg {
            UserStatusArg::Active => UserStatus::Active,
            UserStatusArg::Inactive => UserStatus::Inactive,
            UserStatusArg::Pending => UserStatus::Pending,
            UserStatusArg::Suspended => UserStatus::Suspended,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut settings = Settings::load()?;

    if let Commands::Config {
        set_api_url,
        set_timeout_ms,
    } = &cli.command
    {
        return configure(settings, set_api_url.clone(), *set_timeout_ms);
    }

    if let Some(url) = cli.api_url {
        settings.api_url = url;
    }

    let store = Arc::new(FileStore::open_default()?);
    let transport = Arc::new(HttpTransport::new());
    let (session, mut events) = Session::open(settings, store, transport);
    let client = session.client();

    let result = match cli.command {
        Commands::Login { email, password } => {
            let password = match password {
                Some(p) => p,
                None => read_password()?,
            };
            tracing::info!("Logging in as {}...", email);
            auth::login(&session, &email, &password).await
        }
        Commands::Register {
            email,
            password,
            first_name,
            last_name,
        } => {
            let password = match password {
                Some(p) => p,
                None => read_password()?,
            };
            let registration = Registration {
                email,
                password,
                first_name,
                last_name,
            };
            auth::register(&session, &registration).await
        }
        Commands::Logout => {
            tracing::info!("Logging out...");
            auth::logout(&session).await
        }
        Commands::Status => auth::status(&session),
        Commands::Whoami => auth::whoami(&session),
        Commands::Config { .. } => Ok(()),
        Commands::Items(cmd) => match cmd {
            ItemCommand::List(p) => api::items::list(client, p.page, p.limit).await,
            ItemCommand::Get { id } => api::items::show(client, &id).await,
            ItemCommand::Create(fields) => api::items::create(client, &fields.into_draft()).await,
            ItemCommand::Update { id, fields } => {
                api::items::update(client, &id, &fields.into_draft()).await
            }
            ItemCommand::Delete { id } => api::items::delete(client, &id).await,
            ItemCommand::Search {
                name,
                types,
                status,
                tag,
                fields,
                sort,
                page,
            } => {
                let custom_fields = (!fields.is_empty()).then(|| {
                    fields
                        .into_iter()
                        .map(|(k, v)| (k, serde_json::Value::String(v)))
                        .collect()
                });
                let criteria = ItemSearch {
                    name,
                    types: types.into_iter().map(Into::into).collect(),
                    status: status.into_iter().map(Into::into).collect(),
                    tags: tag,
                    custom_fields,
                    sort: sort.to_sort(),
                    page: Some(page.page),
                    limit: Some(page.limit),
                    ..ItemSearch::default()
                };
                api::items::search(client, &criteria).await
            }
            ItemCommand::Status { id, status } => {
                api::items::set_status(client, &id, status.into()).await
            }
            ItemCommand::Stats => api::items::statistics(client).await,
        },
        Commands::Users(cmd) => match cmd {
            UserCommand::List(p) => api::users::list(client, p.page, p.limit).await,
            UserCommand::Get { id } => api::users::show(client, &id).await,
            UserCommand::Create(fields) => api::users::create(client, &fields.into_draft()).await,
            UserCommand::Update { id, fields } => {
                api::users::update(client, &id, &fields.into_draft()).await
            }
            UserCommand::Delete { id } => api::users::delete(client, &id).await,
            UserCommand::Search {
                name,
                email,
                role,
                status,
                sort,
                page,
            } => {
                let criteria = UserSearch {
                    name,
                    email,
                    role: role.into_iter().map(Into::into).collect(),
                    status: status.into_iter().map(Into::into).collect(),
                    sort: sort.to_sort(),
                    page: Some(page.page),
                    limit: Some(page.limit),
                    ..UserSearch::default()
                };
                api::users::search(client, &criteria).await
            }
            UserCommand::Status { id, status } => {
                api::users::set_status(client, &id, status.into()).await
            }
            UserCommand::Role { id, role } => api::users::set_role(client, &id, role.into()).await,
            UserCommand::Stats => api::users::statistics(client).await,
        },
    };

    print_events(&mut events);
    result
}

/// Print session notices queued while the command ran.
fn print_events(events: &mut mpsc::UnboundedReceiver<SessionEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::Notice { level, message } => match level {
                NoticeLevel::Error => eprintln!("error: {}", message),
                NoticeLevel::Success | NoticeLevel::Info => eprintln!("{}", message),
            },
            SessionEvent::Navigate(route) => {
                tracing::debug!("Session navigated to {}", route);
                eprintln!("Run `adminctl login` to sign in again.");
            }
        }
    }
}

fn configure(
    mut settings: Settings,
    api_url: Option<String>,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let changed = api_url.is_some() || timeout_ms.is_some();
    if let Some(url) = api_url {
        settings.api_url = url;
    }
    if let Some(ms) = timeout_ms {
        settings.request_timeout_ms = ms;
    }
    if changed {
        settings.save().context("Failed to save settings")?;
        println!("Settings saved.");
    }

    println!("api_url:                  {}", settings.api_url);
    println!("request_timeout_ms:       {}", settings.request_timeout_ms);
    println!("token_expiry_buffer_secs: {}", settings.token_expiry_buffer_secs);
    println!("login_route:              {}", settings.login_route);
    Ok(())
}
