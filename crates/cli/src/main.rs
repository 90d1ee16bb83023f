//! Supply Desk CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run portal database migrations
//! sd-cli migrate
//!
//! # Create the first administrator (password read from $SD_PASSWORD)
//! sd-cli user create -e ana@flota.com -g Ana -f Paz -r Admin
//!
//! # Load the catalog, replacing what is there
//! sd-cli seed products catalog.yaml --clear
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `user create` - Create users with any role
//! - `seed products` - Seed the catalog from YAML

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "sd-cli")]
#[command(author, version, about = "Supply Desk CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Seed the database
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a new user
    Create {
        /// Email address (the sign-in name)
        #[arg(short, long)]
        email: String,

        /// Given name
        #[arg(short, long)]
        given_name: String,

        /// Family name
        #[arg(short, long)]
        family_name: String,

        /// Role (`Admin` or `Tecnico`)
        #[arg(short, long, default_value = "Tecnico")]
        role: String,

        /// Environment variable holding the password
        #[arg(long, default_value = "SD_PASSWORD")]
        password_env: String,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Seed catalog products from a YAML file
    Products {
        /// Path to the YAML file
        file: String,

        /// Delete every existing product first
        #[arg(long)]
        clear: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::Create {
                email,
                given_name,
                family_name,
                role,
                password_env,
            } => {
                commands::user::create(&email, &given_name, &family_name, &role, &password_env)
                    .await?;
            }
        },
        Commands::Seed { target } => match target {
            SeedTarget::Products { file, clear } => {
                commands::seed::products(&file, clear).await?;
            }
        },
    }
    Ok(())
}
