use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use engine::{
    CancellationToken, Engine, Expense, ExpenseCmd, MemberBalances, MoneyCents, Settlement,
    SettlementStatus,
};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

use crate::{
    error::{CliError, Result},
    settings::Settings,
};

mod error;
mod settings;

#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(about = "Shared expenses and settlements for groups")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Optional config file path (TOML).
    #[arg(long, global = true)]
    pub config: Option<String>,
    /// Override the database connection string.
    #[arg(long, global = true)]
    pub database_url: Option<String>,
    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,
    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record, edit and inspect expenses.
    Expense(ExpenseArgs),
    /// Inspect, recompute and pay settlements.
    Settlements(SettlementsArgs),
    /// Net balance of every member of a group.
    Balances(GroupArgs),
}

#[derive(Args, Debug)]
struct ExpenseArgs {
    #[command(subcommand)]
    command: ExpenseCommand,
}

#[derive(Subcommand, Debug)]
enum ExpenseCommand {
    Add(ExpenseInput),
    Edit {
        #[arg(long)]
        id: Uuid,
        #[command(flatten)]
        input: ExpenseInput,
    },
    Delete {
        #[arg(long)]
        group: Uuid,
        #[arg(long)]
        id: Uuid,
    },
    Show {
        #[arg(long)]
        group: Uuid,
        #[arg(long)]
        id: Uuid,
    },
    List(GroupArgs),
}

#[derive(Args, Debug)]
struct ExpenseInput {
    #[arg(long)]
    group: Uuid,
    #[arg(long)]
    payer: String,
    /// Amount as a decimal, e.g. `12.34`.
    #[arg(long)]
    amount: MoneyCents,
    /// Split the amount evenly among these members, in order.
    #[arg(long, value_delimiter = ',', conflicts_with = "share")]
    split: Vec<String>,
    /// Exact share as `member=amount`; repeat for each beneficiary.
    #[arg(long)]
    share: Vec<String>,
    #[arg(long)]
    description: Option<String>,
}

#[derive(Args, Debug)]
struct SettlementsArgs {
    #[command(subcommand)]
    command: SettlementsCommand,
}

#[derive(Subcommand, Debug)]
enum SettlementsCommand {
    List {
        #[arg(long)]
        group: Uuid,
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
    },
    /// Recompute the pending settlements from the whole ledger.
    Recalc(GroupArgs),
    /// Mark a pending settlement as paid.
    Pay {
        #[arg(long)]
        group: Uuid,
        #[arg(long)]
        id: Uuid,
    },
}

#[derive(Args, Debug)]
struct GroupArgs {
    #[arg(long)]
    group: Uuid,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StatusArg {
    Pending,
    Paid,
}

impl From<StatusArg> for SettlementStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Pending => SettlementStatus::Pending,
            StatusArg::Paid => SettlementStatus::Paid,
        }
    }
}

impl ExpenseInput {
    fn into_cmd(self) -> Result<ExpenseCmd> {
        let mut cmd = ExpenseCmd::new(self.group, self.payer, self.amount, Utc::now());
        cmd = if self.share.is_empty() {
            cmd.split_even(self.split)
        } else {
            cmd.split_exact(
                self.share
                    .iter()
                    .map(|raw| parse_share(raw))
                    .collect::<Result<Vec<_>>>()?,
            )
        };
        if let Some(description) = self.description {
            cmd = cmd.description(description);
        }
        Ok(cmd)
    }
}

fn parse_share(raw: &str) -> Result<(String, MoneyCents)> {
    let (member, amount) = raw
        .split_once('=')
        .ok_or_else(|| CliError::Argument(format!("expected member=amount, got {raw}")))?;
    Ok((member.trim().to_string(), amount.parse()?))
}

async fn connect_db(database_url: &str) -> Result<DatabaseConnection> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

/// Cancels the token on Ctrl-C so an in-flight write rolls back.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            token.cancel();
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli.global)?;

    tracing_subscriber::fmt()
        .with_env_filter(settings.log_filter())
        .with_writer(std::io::stderr)
        .init();

    let db = connect_db(&settings.database_url).await?;
    let engine = Engine::builder().database(db).build().await?;
    let cancel = cancel_on_ctrl_c();
    let json = cli.global.json;

    match cli.command {
        Command::Expense(ExpenseArgs { command }) => match command {
            ExpenseCommand::Add(input) => {
                let expense = engine.create_expense(input.into_cmd()?, &cancel).await?;
                print_expenses(&[expense], json)?;
            }
            ExpenseCommand::Edit { id, input } => {
                let expense = engine.update_expense(id, input.into_cmd()?, &cancel).await?;
                print_expenses(&[expense], json)?;
            }
            ExpenseCommand::Delete { group, id } => {
                let expense = engine.delete_expense(group, id, &cancel).await?;
                println!("deleted expense: {}", expense.id);
            }
            ExpenseCommand::Show { group, id } => {
                print_expenses(&[engine.expense(group, id).await?], json)?;
            }
            ExpenseCommand::List(GroupArgs { group }) => {
                print_expenses(&engine.list_expenses(group).await?, json)?;
            }
        },
        Command::Settlements(SettlementsArgs { command }) => match command {
            SettlementsCommand::List { group, status } => {
                let settlements = engine
                    .list_settlements(group, status.map(Into::into))
                    .await?;
                print_settlements(&settlements, json)?;
            }
            SettlementsCommand::Recalc(GroupArgs { group }) => {
                let summary = engine.recalculate_settlements(group, &cancel).await?;
                println!(
                    "inserted {}, updated {}, deleted {}, unchanged {}",
                    summary.inserted, summary.updated, summary.deleted, summary.unchanged
                );
            }
            SettlementsCommand::Pay { group, id } => {
                let settlement = engine.mark_settlement_paid(group, id, &cancel).await?;
                print_settlements(&[settlement], json)?;
            }
        },
        Command::Balances(GroupArgs { group }) => {
            print_balances(&engine.member_balances(group).await?, json)?;
        }
    }

    Ok(())
}

fn print_expenses(expenses: &[Expense], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(expenses)?);
        return Ok(());
    }
    for expense in expenses {
        println!(
            "{}  {}  {} paid {}  {}",
            expense.id,
            expense.created_at.format("%Y-%m-%d"),
            expense.payer_id,
            expense.amount,
            expense.description.as_deref().unwrap_or("-"),
        );
        for beneficiary in &expense.beneficiaries {
            println!("    {:<16} {}", beneficiary.member_id, beneficiary.share);
        }
    }
    Ok(())
}

fn print_settlements(settlements: &[Settlement], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(settlements)?);
        return Ok(());
    }
    for settlement in settlements {
        println!(
            "{}  {:<7}  {} -> {}  {}",
            settlement.id,
            settlement.status.as_str(),
            settlement.debtor_id,
            settlement.creditor_id,
            settlement.amount,
        );
    }
    Ok(())
}

fn print_balances(balances: &MemberBalances, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(balances)?);
        return Ok(());
    }
    for (member, balance) in balances {
        println!("{member:<16} {balance}");
    }
    Ok(())
}
