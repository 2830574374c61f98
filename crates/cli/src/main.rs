//! Atelier Floral CLI - migrations, accounts and billing runs.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! florist migrate
//!
//! # Create a corporate customer
//! florist user create -e achats@example.fr -n "Achats" -p '...' --account corporate --company "Exemple SAS"
//!
//! # Draft last month's corporate invoices
//! florist invoices generate
//!
//! # Flag unpaid invoices past their due date
//! florist invoices mark-overdue
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `user create` - Create an individual, corporate or admin account
//! - `invoices generate` - Draft invoices for a billing period
//! - `invoices mark-overdue` - Overdue sweep

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

use commands::user::AccountKind;

#[derive(Parser)]
#[command(name = "florist")]
#[command(author, version, about = "Atelier Floral CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Corporate billing
    Invoices {
        #[command(subcommand)]
        action: InvoiceAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a new account
    Create {
        /// Email address (login)
        #[arg(short, long)]
        email: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Initial password
        #[arg(short, long)]
        password: String,

        /// Account kind
        #[arg(long, value_enum, default_value_t)]
        account: AccountKind,

        /// Company name, required for corporate accounts
        #[arg(long)]
        company: Option<String>,
    },
}

#[derive(Subcommand)]
enum InvoiceAction {
    /// Draft invoices for a billing period (defaults to last month)
    Generate {
        /// Month, 1-12
        #[arg(long)]
        month: Option<u32>,

        /// Year
        #[arg(long)]
        year: Option<i32>,

        /// Only bill this user id
        #[arg(long)]
        user: Option<i32>,
    },
    /// Mark sent invoices past their due date as overdue
    MarkOverdue,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::Create {
                email,
                name,
                password,
                account,
                company,
            } => {
                commands::user::create(&email, &name, &password, account, company.as_deref())
                    .await?;
            }
        },
        Commands::Invoices { action } => match action {
            InvoiceAction::Generate { month, year, user } => {
                commands::invoices::generate(month, year, user).await?;
            }
            InvoiceAction::MarkOverdue => commands::invoices::mark_overdue().await?,
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_corporate_user() {
        let cli = Cli::try_parse_from([
            "florist", "user", "create", "-e", "a@b.fr", "-n", "A", "-p", "secret", "--account",
            "corporate", "--company", "Exemple",
        ]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::User {
                action: UserAction::Create {
                    account: AccountKind::Corporate,
                    ..
                }
            })
        ));
    }

    #[test]
    fn test_parse_mark_overdue() {
        let cli = Cli::try_parse_from(["florist", "invoices", "mark-overdue"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Invoices {
                action: InvoiceAction::MarkOverdue
            })
        ));
    }
}
