mod config;
mod display;

use anyhow::{bail, Context as AnyhowContext, Result};
use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand};
use config::{Config, Context};
use expense_client::{
    ApiClient, AuthEvent, Category, ClientConfig, ClientError, FileTokenStore, NewExpense,
};
use rust_decimal::Decimal;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "expensectl")]
#[command(version, about = "Expense Tracker Command Line Tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Expense API URL (overrides the selected context)
    #[arg(long, global = true)]
    server_url: Option<String>,

    /// Use this context instead of the current one
    #[arg(long, global = true)]
    context: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Context management
    Context {
        #[command(subcommand)]
        command: ContextCommand,
    },
    #[command(flatten)]
    Api(ApiCommand),
}

/// Commands that talk to the expense API.
#[derive(Subcommand)]
enum ApiCommand {
    /// Log in and store the session
    /// Examples:
    ///     expensectl login --username asha
    ///     expensectl --context prod login
    #[command(verbatim_doc_comment)]
    Login {
        /// Username (prompted when omitted)
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Create an account and store the session
    Register {
        /// Username
        #[arg(short, long)]
        username: String,

        /// Email address, used for password reset
        #[arg(short, long)]
        email: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Reset a forgotten password with an emailed one-time password
    PasswordReset {
        #[command(subcommand)]
        command: PasswordResetCommand,
    },
    /// Expense management
    Expense {
        #[command(subcommand)]
        command: ExpenseCommand,
    },
    /// Category management
    Category {
        #[command(subcommand)]
        command: CategoryCommand,
    },
    /// Show spending statistics
    Dashboard {
        /// Emit only the JSON response
        #[arg(short, long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ContextCommand {
    /// Add a new context for connecting to an expense API
    /// Examples:
    ///     expensectl context add local --url=http://localhost:8000
    ///     expensectl context add prod --url=https://expenses.example.com --set-current
    #[command(verbatim_doc_comment)]
    Add {
        /// Context name
        name: String,
        /// Server URL (e.g., http://localhost:8000)
        #[arg(long)]
        url: String,
        /// Make this the current context
        #[arg(long)]
        set_current: bool,
    },
    /// Switch the current context
    Use {
        /// Context name
        name: String,
    },
    /// List contexts
    List,
    /// Show the current context
    Current,
    /// Delete a context
    Delete {
        /// Context name
        name: String,
    },
}

#[derive(Subcommand)]
enum PasswordResetCommand {
    /// Email a one-time password to the account address
    Request {
        #[arg(short, long)]
        email: String,
    },
    /// Set a new password (prompted) using the one-time password
    Verify {
        #[arg(short, long)]
        email: String,

        #[arg(long)]
        otp: String,
    },
}

#[derive(Subcommand)]
enum ExpenseCommand {
    /// List expenses
    List {
        /// Only expenses in this category (id or name)
        #[arg(short, long)]
        category: Option<String>,

        /// Only expenses in this month (YYYY-MM)
        #[arg(short, long)]
        month: Option<String>,

        /// Emit only the JSON response
        #[arg(short, long)]
        json: bool,
    },
    /// Record an expense
    /// Examples:
    ///     expensectl expense add 149.50 "Groceries" --category "Food & Dining"
    ///     expensectl expense add 12 "Bus pass" --date 2024-03-01 --category 2
    #[command(verbatim_doc_comment)]
    Add {
        amount: Decimal,
        description: String,

        /// Date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Category id or name
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Change an expense; omitted fields keep their value
    Update {
        id: i64,

        #[arg(short, long)]
        amount: Option<Decimal>,

        #[arg(long)]
        description: Option<String>,

        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Category id or name
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Delete an expense
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum CategoryCommand {
    /// List categories
    List {
        /// Emit only the JSON response
        #[arg(short, long)]
        json: bool,
    },
    /// Create a category
    Add { name: String },
    /// Rename a category
    Rename { id: i64, name: String },
    /// Delete a category (refused while expenses use it)
    Delete { id: i64 },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<ClientError>() {
            Some(client_err) => eprintln!("Error: {}", display::error_message(client_err)),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "info,expense_client=debug,expensectl=debug"
    } else {
        "warn,expense_client=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;

    let command = match cli.command {
        Commands::Context { command } => return handle_context_command(&mut config, command),
        Commands::Api(command) => command,
    };

    let client_config = resolve_client_config(
        cli.server_url.as_deref(),
        cli.context.as_deref(),
        cli.timeout,
        &config,
    )?;
    tracing::debug!(base_url = %client_config.base_url, "Using expense API");

    let store = Arc::new(FileTokenStore::default_location()?);
    let client = ApiClient::new(client_config, store)?;
    let events = client.subscribe();
    let was_authenticated = *events.borrow() == AuthEvent::Authenticated;

    let result = dispatch(&client, command).await;

    if result.is_err() && was_authenticated && *events.borrow() == AuthEvent::LoggedOut {
        eprintln!("Your session has expired. Run 'expensectl login' to sign in again.");
    }
    result
}

fn resolve_client_config(
    server_url: Option<&str>,
    context: Option<&str>,
    timeout: Option<u64>,
    config: &Config,
) -> Result<ClientConfig> {
    let url = match server_url {
        Some(url) => Some(url.to_string()),
        None => config.server_url(context)?,
    };
    let client_config = match url {
        Some(url) => ClientConfig::new(&url)?.with_timeout(ClientConfig::timeout_from_env()),
        None => ClientConfig::from_env()?,
    };
    Ok(match timeout {
        Some(secs) => client_config.with_timeout(Duration::from_secs(secs)),
        None => client_config,
    })
}

async fn dispatch(client: &ApiClient, command: ApiCommand) -> Result<()> {
    match command {
        ApiCommand::Login { username } => {
            let username = match username {
                Some(u) => u,
                None => prompt("Username: ")?,
            };
            let password = rpassword::prompt_password("Password: ")?;
            let auth = client.login(&username, &password).await?;
            println!("Logged in as {}.", auth.user.username);
        }
        ApiCommand::Register { username, email } => {
            let password = prompt_new_password()?;
            let auth = client.register(&username, &email, &password).await?;
            println!("Account '{}' created and logged in.", auth.user.username);
        }
        ApiCommand::Logout => {
            client.logout()?;
            println!("Logged out.");
        }
        ApiCommand::Whoami => match client.session()?.user {
            Some(user) if client.is_authenticated() => {
                println!("{} <{}>", user.username, user.email);
            }
            _ => println!("Not logged in."),
        },
        ApiCommand::PasswordReset { command } => match command {
            PasswordResetCommand::Request { email } => {
                let response = client.request_password_reset(&email).await?;
                println!("{}", response.message);
            }
            PasswordResetCommand::Verify { email, otp } => {
                let password = prompt_new_password()?;
                let response = client.verify_otp(&email, &otp, &password).await?;
                println!("{}", response.message);
            }
        },
        ApiCommand::Expense { command } => handle_expense_command(client, command).await?,
        ApiCommand::Category { command } => handle_category_command(client, command).await?,
        ApiCommand::Dashboard { json } => {
            let stats = client.dashboard_stats().await?;
            if json {
                println!("{}", serde_json::to_string(&stats)?);
            } else {
                print!("{}", display::dashboard(&stats));
            }
        }
    }
    Ok(())
}

async fn handle_expense_command(client: &ApiClient, command: ExpenseCommand) -> Result<()> {
    match command {
        ExpenseCommand::List {
            category,
            month,
            json,
        } => {
            let month = month.as_deref().map(parse_month).transpose()?;
            let (expenses, categories) = tokio::join!(client.list_expenses(), async {
                match &category {
                    Some(_) => client.list_categories().await.map(Some),
                    None => Ok(None),
                }
            });
            let mut expenses = expenses?;

            if let (Some(wanted), Some(categories)) = (category.as_deref(), categories?) {
                let id = resolve_category(&categories, wanted)?.id;
                expenses.retain(|e| e.category == Some(id));
            }
            if let Some((year, month)) = month {
                expenses.retain(|e| e.date.year() == year && e.date.month() == month);
            }

            if json {
                println!("{}", serde_json::to_string(&expenses)?);
            } else {
                print!("{}", display::expense_table(&expenses));
            }
        }
        ExpenseCommand::Add {
            amount,
            description,
            date,
            category,
        } => {
            let category = match category {
                Some(wanted) => Some(lookup_category(client, &wanted).await?.id),
                None => None,
            };
            let expense = NewExpense {
                amount,
                description,
                date: date.unwrap_or_else(|| chrono::Local::now().date_naive()),
                category,
            };
            let created = client.create_expense(&expense).await?;
            println!(
                "Expense {} recorded: {} on {}.",
                created.id,
                display::format_amount(created.amount),
                created.date
            );
        }
        ExpenseCommand::Update {
            id,
            amount,
            description,
            date,
            category,
        } => {
            let current = client
                .list_expenses()
                .await?
                .into_iter()
                .find(|e| e.id == id)
                .with_context(|| format!("Expense {} not found", id))?;

            let mut expense = NewExpense::from(&current);
            if let Some(amount) = amount {
                expense.amount = amount;
            }
            if let Some(description) = description {
                expense.description = description;
            }
            if let Some(date) = date {
                expense.date = date;
            }
            if let Some(wanted) = category {
                expense.category = Some(lookup_category(client, &wanted).await?.id);
            }

            let updated = client.update_expense(id, &expense).await?;
            println!("Expense {} updated.", updated.id);
        }
        ExpenseCommand::Delete { id } => {
            client.delete_expense(id).await?;
            println!("Expense {} deleted.", id);
        }
    }
    Ok(())
}

async fn handle_category_command(client: &ApiClient, command: CategoryCommand) -> Result<()> {
    match command {
        CategoryCommand::List { json } => {
            let categories = client.list_categories().await?;
            if json {
                println!("{}", serde_json::to_string(&categories)?);
            } else {
                print!("{}", display::category_table(&categories));
            }
        }
        CategoryCommand::Add { name } => {
            let name = name.trim();
            if name.is_empty() {
                bail!("Category name cannot be empty");
            }
            let category = client.create_category(name).await?;
            println!("Category '{}' created with id {}.", category.name, category.id);
        }
        CategoryCommand::Rename { id, name } => {
            let category = client.update_category(id, name.trim()).await?;
            println!("Category {} renamed to '{}'.", category.id, category.name);
        }
        CategoryCommand::Delete { id } => {
            client.delete_category(id).await?;
            println!("Category {} deleted.", id);
        }
    }
    Ok(())
}

fn handle_context_command(config: &mut Config, command: ContextCommand) -> Result<()> {
    match command {
        ContextCommand::Add {
            name,
            url,
            set_current,
        } => {
            let normalized = ClientConfig::new(&url)?.base_url;
            config.contexts.insert(name.clone(), Context::new(normalized));
            if set_current || config.current_context.is_none() {
                config.current_context = Some(name.clone());
            }
            config.save()?;
            println!("Context '{}' added.", name);
            if config.current_context.as_ref() == Some(&name) {
                println!("Context '{}' is now the current context.", name);
            }
        }
        ContextCommand::List => {
            println!("  {:<15} {:<40}", "NAME", "SERVER URL");
            for (name, ctx) in &config.contexts {
                let current_mark = if config.current_context.as_ref() == Some(name) {
                    "*"
                } else {
                    " "
                };
                println!("{} {:<15} {:<40}", current_mark, name, ctx.server_url);
            }
        }
        ContextCommand::Use { name } => {
            if !config.contexts.contains_key(&name) {
                bail!("Context '{}' not found", name);
            }
            config.current_context = Some(name.clone());
            config.save()?;
            println!("Switched to context '{}'.", name);
        }
        ContextCommand::Delete { name } => {
            if config.contexts.remove(&name).is_none() {
                bail!("Context '{}' not found", name);
            }
            if config.current_context.as_ref() == Some(&name) {
                config.current_context = None;
            }
            config.save()?;
            println!("Context '{}' deleted.", name);
        }
        ContextCommand::Current => {
            if let Some((name, ctx)) = config.get_current_context() {
                println!("Current context: {}", name);
                println!("  Server URL: {}", ctx.server_url);
            } else {
                println!("No current context set.");
            }
        }
    }
    Ok(())
}

async fn lookup_category(client: &ApiClient, wanted: &str) -> Result<Category> {
    let categories = client.list_categories().await?;
    resolve_category(&categories, wanted).cloned()
}

/// Match a category by id, then by case-insensitive name.
fn resolve_category<'a>(categories: &'a [Category], wanted: &str) -> Result<&'a Category> {
    let wanted = wanted.trim();
    if let Ok(id) = wanted.parse::<i64>() {
        if let Some(category) = categories.iter().find(|c| c.id == id) {
            return Ok(category);
        }
    }
    categories
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(wanted))
        .with_context(|| format!("Category '{}' not found", wanted))
}

fn parse_month(raw: &str) -> Result<(i32, u32)> {
    let date = NaiveDate::parse_from_str(&format!("{}-01", raw.trim()), "%Y-%m-%d")
        .with_context(|| format!("Invalid month '{}', expected YYYY-MM", raw))?;
    Ok((date.year(), date.month()))
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let value = line.trim().to_string();
    if value.is_empty() {
        bail!("No input given");
    }
    Ok(value)
}

fn prompt_new_password() -> Result<String> {
    let password = rpassword::prompt_password("New password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }
    if password.is_empty() {
        bail!("Password cannot be empty");
    }
    Ok(password)
}
