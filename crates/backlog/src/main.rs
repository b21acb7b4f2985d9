use std::env;
use std::path::PathBuf;

mod logging;

use anyhow::{anyhow, bail, Context, Result};
use backlog_core::api::{Attachment, HttpBacklogClient, Ticket};
use backlog_core::auth::{
    AuthError, AuthLifecycle, AuthManager, AuthSession, FileCredentialStore, FlowPreference,
    OAuthClient,
};
use backlog_core::config::{ConfigStore, Configuration};
use backlog_core::links;
use backlog_core::session::{ProjectData, Session};
use clap::{Args, Parser, Subcommand};
use textwrap::wrap;
use tokio::task;
use url::Url;

#[derive(Parser, Debug)]
#[command(author, version, about = "Backlog terminal CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connection settings
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Authentication related commands
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Ticket operations
    #[command(subcommand)]
    Ticket(TicketCommand),
    /// Space attachment operations
    #[command(subcommand)]
    Attachment(AttachmentCommand),
    /// Open the ticket list, a ticket, or the project page in the browser
    Open(OpenArgs),
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the current configuration
    Show(ConfigShowArgs),
    /// Print the configuration file location
    Path,
    /// Change one configuration field (e.g. `space_key acme`)
    Set(ConfigSetArgs),
}

#[derive(Args, Debug)]
struct ConfigShowArgs {
    /// Output raw JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ConfigSetArgs {
    /// Field name: space_key, domain, project_key, client_id, client_secret,
    /// redirect_uri or token_cache_path
    field: String,
    value: String,
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    /// Log in to Backlog using OAuth2
    Login(LoginArgs),
    /// Forget the cached OAuth2 token
    Logout,
    /// Authenticate and load project information to verify the settings
    Test(LoginArgs),
}

#[derive(Args, Debug)]
struct LoginArgs {
    /// Use manual copy/paste flow instead of launching a browser
    #[arg(long)]
    manual: bool,
}

#[derive(Subcommand, Debug)]
enum TicketCommand {
    /// View a single ticket by key (e.g. WEB-123)
    View(TicketViewArgs),
    /// Create a new ticket in the configured project
    Create(TicketCreateArgs),
    /// Update fields of an existing ticket
    Update(TicketUpdateArgs),
}

#[derive(Args, Debug)]
struct TicketViewArgs {
    /// Ticket key (e.g. WEB-123)
    key: String,
    /// Output raw JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug, Default)]
struct TicketFieldArgs {
    /// Ticket description
    #[arg(long)]
    description: Option<String>,
    /// Ticket type name (e.g. Bug)
    #[arg(long = "type")]
    ticket_type: Option<String>,
    /// Priority name (e.g. High)
    #[arg(long)]
    priority: Option<String>,
    /// Category names (repeatable)
    #[arg(long = "category")]
    categories: Vec<String>,
    /// Milestone names (repeatable)
    #[arg(long = "milestone")]
    milestones: Vec<String>,
    /// Assignee name or user id
    #[arg(long)]
    assignee: Option<String>,
}

#[derive(Args, Debug)]
struct TicketCreateArgs {
    /// Ticket summary
    #[arg(long)]
    summary: String,
    #[command(flatten)]
    fields: TicketFieldArgs,
    /// Files to upload and attach (repeatable)
    #[arg(long = "attach")]
    attachments: Vec<PathBuf>,
    /// Open the created ticket in the browser
    #[arg(long)]
    open: bool,
    /// Output raw JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct TicketUpdateArgs {
    /// Ticket key (e.g. WEB-123)
    key: String,
    /// New summary
    #[arg(long)]
    summary: Option<String>,
    #[command(flatten)]
    fields: TicketFieldArgs,
    /// Output raw JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum AttachmentCommand {
    /// Upload a local file to the space attachment area
    Upload(AttachmentUploadArgs),
}

#[derive(Args, Debug)]
struct AttachmentUploadArgs {
    /// Path of the file to upload
    path: PathBuf,
    /// Output raw JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct OpenArgs {
    /// Open a single ticket instead of the ticket list
    #[arg(long, conflicts_with = "project")]
    ticket: Option<String>,
    /// Open the project home page
    #[arg(long)]
    project: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init()?;
    let cli = Cli::parse();
    match cli.command {
        Commands::Config(cmd) => match cmd {
            ConfigCommand::Show(args) => config_show(args)?,
            ConfigCommand::Path => config_path()?,
            ConfigCommand::Set(args) => config_set(args)?,
        },
        Commands::Auth(cmd) => match cmd {
            AuthCommand::Login(args) => auth_login(args).await?,
            AuthCommand::Logout => auth_logout().await?,
            AuthCommand::Test(args) => auth_test(args).await?,
        },
        Commands::Ticket(cmd) => match cmd {
            TicketCommand::View(args) => ticket_view(args).await?,
            TicketCommand::Create(args) => ticket_create(args).await?,
            TicketCommand::Update(args) => ticket_update(args).await?,
        },
        Commands::Attachment(cmd) => match cmd {
            AttachmentCommand::Upload(args) => attachment_upload(args).await?,
        },
        Commands::Open(args) => open_page(args)?,
    }
    Ok(())
}

fn load_configuration() -> Result<(ConfigStore, Configuration)> {
    let store =
        ConfigStore::with_default_locator().context("unable to locate configuration directory")?;
    let mut config = store.load().context("failed to load configuration")?;
    apply_env_overrides(&mut config);
    Ok((store, config))
}

/// Environment variables win over the configuration file.
fn apply_env_overrides(config: &mut Configuration) {
    let overrides: [(&str, &mut String); 6] = [
        ("BACKLOG_SPACE_KEY", &mut config.space_key),
        ("BACKLOG_DOMAIN", &mut config.domain),
        ("BACKLOG_PROJECT_KEY", &mut config.project_key),
        ("BACKLOG_CLIENT_ID", &mut config.client_id),
        ("BACKLOG_CLIENT_SECRET", &mut config.client_secret),
        ("BACKLOG_REDIRECT_URI", &mut config.redirect_uri),
    ];
    for (var, field) in overrides {
        if let Ok(value) = env::var(var) {
            let value = value.trim();
            if !value.is_empty() {
                *field = value.to_owned();
            }
        }
    }
}

const SECRET_MASK: &str = "********";

/// Copy of `config` safe to print.
fn masked(config: &Configuration) -> Configuration {
    let mut shown = config.clone();
    if !shown.client_secret.is_empty() {
        shown.client_secret = SECRET_MASK.to_owned();
    }
    shown
}

fn config_show(args: ConfigShowArgs) -> Result<()> {
    let (_, config) = load_configuration()?;
    let config = masked(&config);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }
    println!("Space key     : {}", config.space_key);
    println!("Domain        : {}", config.domain);
    println!("Project key   : {}", config.project_key);
    println!("Client ID     : {}", config.client_id);
    println!("Client secret : {}", config.client_secret);
    println!("Redirect URI  : {}", config.redirect_uri);
    println!("Token cache   : {}", config.token_cache_path.display());
    Ok(())
}

fn config_path() -> Result<()> {
    let store =
        ConfigStore::with_default_locator().context("unable to locate configuration directory")?;
    store.load().context("failed to load configuration")?;
    println!("{}", store.path().display());
    Ok(())
}

fn config_set(args: ConfigSetArgs) -> Result<()> {
    let store =
        ConfigStore::with_default_locator().context("unable to locate configuration directory")?;
    let mut config = store.load().context("failed to load configuration")?;
    config.set_field(&args.field, &args.value)?;
    store.save(&config).context("failed to save configuration")?;
    println!("Updated {}.", args.field);
    Ok(())
}

/// Tells the user the CLI is blocked on the browser while authorization is pending.
struct TerminalLifecycle;

impl AuthLifecycle for TerminalLifecycle {
    fn suspend(&self) {
        tracing::info!("waiting for Backlog authorization");
    }

    fn resume(&self) {
        tracing::debug!("authorization wait finished");
    }
}

fn auth_manager(
    store: &ConfigStore,
    config: &Configuration,
) -> Result<AuthManager<FileCredentialStore>> {
    config.validate()?;
    let credentials = FileCredentialStore::for_config(store, config);
    let oauth = OAuthClient::for_configuration(config).context("failed to build OAuth client")?;
    Ok(AuthManager::new(credentials, oauth))
}

async fn authenticate(
    store: &ConfigStore,
    config: &Configuration,
    manual: bool,
) -> Result<AuthSession> {
    let manager = auth_manager(store, config)?;
    let preference = if manual {
        FlowPreference::manual()
    } else {
        FlowPreference::detect()
    };
    let session = manager
        .authenticate(
            &preference,
            &TerminalLifecycle,
            print_authorization_url,
            || async { prompt_for_code().await },
        )
        .await
        .context("authentication failed")?;
    Ok(session)
}

async fn open_session(manual: bool) -> Result<Session<HttpBacklogClient>> {
    let (store, config) = load_configuration()?;
    let auth = authenticate(&store, &config, manual).await?;
    let client =
        HttpBacklogClient::from_session(&config, &auth).context("failed to build API client")?;
    let session = Session::load(client, config)
        .await
        .context("failed to load project information")?;
    Ok(session)
}

async fn auth_login(args: LoginArgs) -> Result<()> {
    let (store, config) = load_configuration()?;
    let session = authenticate(&store, &config, args.manual).await?;
    println!(
        "Login succeeded. Token cached at {}.",
        store.token_cache_file(&config).display()
    );
    if let Some(expiry) = session.expires_at {
        println!("Token expires at {} (UTC).", expiry);
    }
    Ok(())
}

async fn auth_logout() -> Result<()> {
    let (store, config) = load_configuration()?;
    let manager = auth_manager(&store, &config)?;
    manager
        .logout()
        .await
        .context("failed to remove cached credentials")?;
    println!("Deleted cached credentials.");
    Ok(())
}

async fn auth_test(args: LoginArgs) -> Result<()> {
    let session = open_session(args.manual).await?;
    println!(
        "Authenticated against space '{}' ({}), project {} ({}).",
        session.space().name,
        session.space().space_key,
        session.project().project_key,
        session.project().name
    );
    render_project_data(session.data());
    Ok(())
}

async fn prompt_for_code() -> Result<String, AuthError> {
    task::spawn_blocking(|| {
        use std::io::{self, Write};
        print!("Paste the verification code or redirect URL: ");
        io::stdout().flush().map_err(AuthError::Io)?;
        let mut input = String::new();
        io::stdin().read_line(&mut input).map_err(AuthError::Io)?;
        Ok::<_, AuthError>(input.trim().to_owned())
    })
    .await
    .map_err(|_| AuthError::Cancelled)?
}

fn print_authorization_url(url: &Url) -> Result<(), AuthError> {
    println!("\nAuthorize the application by visiting:\n  {}\n", url);
    Ok(())
}

async fn ticket_view(args: TicketViewArgs) -> Result<()> {
    let session = open_session(false).await?;
    let ticket = session
        .get_ticket_by_key(&args.key)
        .await
        .ok_or_else(|| anyhow!("ticket '{}' could not be loaded", args.key))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&ticket)?);
    } else {
        render_ticket(&ticket, &session.ticket_url(&args.key));
    }
    Ok(())
}

async fn ticket_create(args: TicketCreateArgs) -> Result<()> {
    let session = open_session(false).await?;
    let mut ticket = Ticket::new(args.summary);
    apply_fields(&mut ticket, &args.fields, session.data())?;

    for path in &args.attachments {
        let attachment = session
            .add_attachment(path)
            .await
            .ok_or_else(|| anyhow!("failed to upload {}", path.display()))?;
        ticket.attachment_ids.push(attachment.id);
    }

    let created = session
        .add_ticket(&ticket)
        .await
        .ok_or_else(|| anyhow!("ticket creation failed"))?;
    let key = created.key.clone().unwrap_or_default();
    let url = session.ticket_url(&key);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&created)?);
    } else {
        println!("Created {} {}", key, created.summary);
        println!("  {}", url);
    }
    if args.open {
        links::open_in_browser(&url).context("failed to open browser")?;
    }
    Ok(())
}

async fn ticket_update(args: TicketUpdateArgs) -> Result<()> {
    let session = open_session(false).await?;
    let mut ticket = session
        .get_ticket_by_key(&args.key)
        .await
        .ok_or_else(|| anyhow!("ticket '{}' could not be loaded", args.key))?;
    if let Some(summary) = args.summary {
        ticket.summary = summary;
    }
    apply_fields(&mut ticket, &args.fields, session.data())?;

    let updated = session
        .update_ticket(&ticket)
        .await
        .ok_or_else(|| anyhow!("ticket update failed"))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&updated)?);
    } else {
        println!(
            "Updated {} {}",
            updated.key.as_deref().unwrap_or(&args.key),
            updated.summary
        );
    }
    Ok(())
}

/// Resolve names given on the command line against the session's reference data.
fn apply_fields(ticket: &mut Ticket, fields: &TicketFieldArgs, data: &ProjectData) -> Result<()> {
    if let Some(description) = &fields.description {
        ticket.description = Some(description.clone());
    }
    if let Some(name) = &fields.ticket_type {
        ticket.issue_type = Some(lookup(data.ticket_type_named(name), "ticket type", name)?);
    }
    if let Some(name) = &fields.priority {
        ticket.priority = Some(lookup(data.priority_named(name), "priority", name)?);
    }
    if !fields.categories.is_empty() {
        ticket.category = fields
            .categories
            .iter()
            .map(|name| lookup(data.category_named(name), "category", name))
            .collect::<Result<_>>()?;
    }
    if !fields.milestones.is_empty() {
        ticket.milestone = fields
            .milestones
            .iter()
            .map(|name| lookup(data.milestone_named(name), "milestone", name))
            .collect::<Result<_>>()?;
    }
    if let Some(name) = &fields.assignee {
        ticket.assignee = Some(lookup(data.user_named(name), "user", name)?);
    }
    Ok(())
}

fn lookup<T: Clone>(found: Option<&T>, kind: &str, name: &str) -> Result<T> {
    found
        .cloned()
        .ok_or_else(|| anyhow!("unknown {kind} '{name}' in this project"))
}

async fn attachment_upload(args: AttachmentUploadArgs) -> Result<()> {
    let session = open_session(false).await?;
    let attachment: Attachment = session
        .add_attachment(&args.path)
        .await
        .ok_or_else(|| anyhow!("failed to upload {}", args.path.display()))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&attachment)?);
    } else {
        println!(
            "Uploaded {} ({} bytes) as attachment {}.",
            attachment.name, attachment.size, attachment.id
        );
    }
    Ok(())
}

fn open_page(args: OpenArgs) -> Result<()> {
    let (_, config) = load_configuration()?;
    if config.space_key.is_empty() || config.project_key.is_empty() {
        bail!("space_key and project_key must be configured; see `backlog config set`");
    }
    let url = match (&args.ticket, args.project) {
        (Some(key), _) => links::ticket_url(&config, key),
        (None, true) => links::project_url(&config),
        (None, false) => links::ticket_list_url(&config),
    };
    println!("Opening {}", url);
    links::open_in_browser(&url).context("failed to open browser")?;
    Ok(())
}

fn render_ticket(ticket: &Ticket, url: &str) {
    println!(
        "{} {}",
        ticket.key.as_deref().unwrap_or("-"),
        ticket.summary
    );
    if let Some(issue_type) = &ticket.issue_type {
        println!("Type      : {}", issue_type.name);
    }
    if let Some(status) = &ticket.status {
        println!("Status    : {}", status.name);
    }
    if let Some(priority) = &ticket.priority {
        println!("Priority  : {}", priority.name);
    }
    if let Some(assignee) = &ticket.assignee {
        println!("Assignee  : {}", assignee.name);
    }
    if !ticket.category.is_empty() {
        let names: Vec<_> = ticket.category.iter().map(|c| c.name.as_str()).collect();
        println!("Category  : {}", names.join(", "));
    }
    if !ticket.milestone.is_empty() {
        let names: Vec<_> = ticket.milestone.iter().map(|m| m.name.as_str()).collect();
        println!("Milestone : {}", names.join(", "));
    }
    if let Some(updated) = ticket.updated {
        println!("Updated   : {}", updated.to_rfc3339());
    }
    println!("URL       : {}", url);
    if let Some(description) = ticket.description.as_deref().filter(|d| !d.is_empty()) {
        println!();
        for line in description.lines() {
            for wrapped in wrap(line, 80) {
                println!("  {}", wrapped);
            }
        }
    }
}

fn render_project_data(data: &ProjectData) {
    let names = |items: Vec<&str>| {
        if items.is_empty() {
            "-".to_string()
        } else {
            items.join(", ")
        }
    };
    println!(
        "Ticket types : {}",
        names(data.ticket_types.iter().map(|t| t.name.as_str()).collect())
    );
    println!(
        "Priorities   : {}",
        names(data.priorities.iter().map(|p| p.name.as_str()).collect())
    );
    println!(
        "Categories   : {}",
        names(data.categories.iter().map(|c| c.name.as_str()).collect())
    );
    println!(
        "Milestones   : {}",
        names(data.milestones.iter().map(|m| m.name.as_str()).collect())
    );
    println!("Users        : {}", data.users.len());
}
