//! School Admin - operator command-line interface
//!
//! Runs migrations, seeds the default roles and creates roles and admin
//! accounts directly against the database.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use serde::Serialize;
use std::sync::Arc;
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

use school_core::{
    config::Config,
    identity::{CoarseRole, LocalCredentials, RegistrationRequest},
    rbac::{catalog, graph, NewRole, Role},
    service::SchoolService,
    store::{PgStore, Store},
};

// ═══════════════════════════════════════════════════════════════════════════════
// CLI Structure
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Parser)]
#[command(
    name = "school-admin",
    version,
    about = "Operator tooling for the school backend",
    propagate_version = true
)]
struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Configuration file path (falls back to SCHOOL__* environment variables)
    #[arg(short, long, global = true, env = "SCHOOL_CONFIG")]
    config: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,

    /// Insert the built-in permissions and the Admin, Teacher and Student roles
    Seed,

    /// Create a role from existing permission codes
    CreateRole {
        /// Role name (unique, case-insensitive)
        name: String,

        /// Permission codes, comma separated
        #[arg(short, long, value_delimiter = ',')]
        permissions: Vec<String>,

        /// Coarse role this role maps to
        #[arg(long)]
        category: Option<CategoryArg>,

        /// Free-form description
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Create an administrator account
    CreateAdmin {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        email: String,

        #[arg(short, long, env = "SCHOOL_ADMIN_PASSWORD")]
        password: String,
    },

    /// List roles with their permissions
    ListRoles,
}

#[derive(Clone, Copy, ValueEnum)]
enum CategoryArg {
    Admin,
    Teacher,
    Student,
}

impl From<CategoryArg> for CoarseRole {
    fn from(value: CategoryArg) -> Self {
        match value {
            CategoryArg::Admin => CoarseRole::Admin,
            CategoryArg::Teacher => CoarseRole::Teacher,
            CategoryArg::Student => CoarseRole::Student,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Table Rows
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize, Tabled)]
struct RoleRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Permissions")]
    permissions: String,
}

impl From<&Role> for RoleRow {
    fn from(role: &Role) -> Self {
        Self {
            id: role.id.to_string(),
            name: role.name.clone(),
            category: role
                .category
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
            permissions: role
                .permissions
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Output Helpers
// ═══════════════════════════════════════════════════════════════════════════════

struct OutputHelper {
    format: OutputFormat,
}

impl OutputHelper {
    fn new(format: OutputFormat, no_color: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format }
    }

    fn print_success(&self, message: &str) {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"status": "success", "message": message}));
            }
            OutputFormat::Text => println!("{} {}", "[OK]".green().bold(), message),
        }
    }

    fn print_error(&self, message: &str) {
        match self.format {
            OutputFormat::Json => {
                eprintln!("{}", serde_json::json!({"status": "error", "message": message}));
            }
            OutputFormat::Text => eprintln!("{} {}", "[ERROR]".red().bold(), message),
        }
    }

    fn print_table<T: Tabled + Serialize>(&self, items: &[T]) -> Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(items)?),
            OutputFormat::Text => {
                if items.is_empty() {
                    println!("{}", "No results found.".dimmed());
                    return Ok(());
                }
                let table = Table::new(items)
                    .with(Style::rounded())
                    .with(Modify::new(Columns::first()).with(Alignment::left()))
                    .to_string();
                println!("{}", table);
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Command Handlers
// ═══════════════════════════════════════════════════════════════════════════════

async fn connect(config: &Config) -> Result<PgStore> {
    Ok(PgStore::connect(&config.database).await?)
}

async fn handle_create_role(
    store: &PgStore,
    request: NewRole,
    output: &OutputHelper,
) -> Result<()> {
    let permissions = store.list_permissions().await?;
    let role = graph::build_role(&request, &permissions)?;
    store.insert_role(&role).await?;
    output.print_success(&format!(
        "Created role {} with {} permission(s)",
        role.name,
        role.permissions.len()
    ));
    Ok(())
}

async fn handle_create_admin(
    config: &Config,
    store: PgStore,
    request: RegistrationRequest,
    output: &OutputHelper,
) -> Result<()> {
    let credentials = LocalCredentials::new(&config.auth)?;
    let service = SchoolService::new(
        Arc::new(store),
        Arc::new(credentials),
        config.school.clone(),
    );
    let response = service.register(request).await?;
    output.print_success(&format!(
        "Created admin {} ({})",
        response.user.username, response.user.id
    ));
    Ok(())
}

async fn run(cli: Cli, output: &OutputHelper) -> Result<()> {
    let config = match cli.config.as_deref() {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    let store = connect(&config).await?;

    match cli.command {
        Commands::Migrate => {
            store.migrate().await?;
            output.print_success("Migrations applied");
        }
        Commands::Seed => {
            let report = catalog::seed_defaults(&store).await?;
            output.print_success(&format!(
                "Seeded {} permission(s) and {} role(s)",
                report.permissions_created, report.roles_created
            ));
        }
        Commands::CreateRole {
            name,
            permissions,
            category,
            description,
        } => {
            let request = NewRole {
                name,
                description,
                category: category.map(CoarseRole::from),
                permissions,
            };
            handle_create_role(&store, request, output).await?;
        }
        Commands::CreateAdmin {
            username,
            email,
            password,
        } => {
            let request =
                RegistrationRequest::new(username, email, password).with_role(CoarseRole::Admin);
            handle_create_admin(&config, store, request, output).await?;
        }
        Commands::ListRoles => {
            let rows: Vec<RoleRow> = store.list_roles().await?.iter().map(RoleRow::from).collect();
            output.print_table(&rows)?;
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Entry Point
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let output = OutputHelper::new(cli.format, cli.no_color);

    if let Err(e) = run(cli, &output).await {
        output.print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
