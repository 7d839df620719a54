mod config;
mod escalation_cmds;
mod gateways;
mod inventory_cmds;
mod order_cmds;
#[cfg(test)]
mod test_util;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use wrench_core::store::PgPlanStore;
use wrench_db::models::{ExpertiseLevel, TechnicianStatus};
use wrench_db::pool;

use config::WrenchConfig;

#[derive(Parser)]
#[command(name = "wrench", version, about = "Data center work order planner and runner")]
struct Cli {
    /// Database URL (overrides WRENCH_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a wrench config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = wrench_db::config::DbConfig::DEFAULT_URL)]
        db_url: String,
        /// Planner command line; reads a prompt on stdin, answers with JSON
        #[arg(long)]
        planner_command: Option<String>,
        /// Executor command line; reads a prompt on stdin, answers with text
        #[arg(long)]
        executor_command: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create and migrate the wrench database
    DbInit,
    /// Work order management
    Order {
        #[command(subcommand)]
        command: OrderCommands,
    },
    /// Execute a work order's plan, optionally resuming after a technician
    Run {
        /// Work order ID
        id: String,
        /// Step a technician finished by hand
        #[arg(long)]
        resume_from: Option<i32>,
        /// Technician's note, stored as the step result
        #[arg(long, requires = "resume_from")]
        note: Option<String>,
    },
    /// Report an issue and replace the plan from a step onward
    Regenerate {
        /// Work order ID
        id: String,
        /// First step number to replace
        #[arg(long)]
        from: i32,
        /// What went wrong
        #[arg(long)]
        issue: String,
    },
    /// Show the action log for a work order
    Logs {
        /// Work order ID
        id: String,
    },
    /// Escalation management
    Escalation {
        #[command(subcommand)]
        command: EscalationCommands,
    },
    /// Technician management
    Technician {
        #[command(subcommand)]
        command: TechnicianCommands,
    },
    /// Spare-part inventory
    Inventory {
        #[command(subcommand)]
        command: InventoryCommands,
    },
    /// Print shell completions
    Completions {
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum OrderCommands {
    /// Classify and plan a new work order
    Create {
        title: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Show a work order with its steps
    Show { id: String },
    /// List all work orders
    List,
}

#[derive(Subcommand)]
pub enum EscalationCommands {
    /// List escalations for a work order (or all open ones)
    List {
        #[arg(long)]
        work_order: Option<String>,
    },
    /// Escalate a work order to a human
    Raise {
        /// Work order ID
        work_order: String,
        message: String,
        /// Technician ID to notify (defaults to the assigned technician)
        #[arg(long)]
        technician: Option<String>,
        /// Step number the escalation concerns
        #[arg(long)]
        step: Option<i32>,
    },
    /// Mark an escalation acknowledged
    Ack { id: String },
    /// Mark an escalation resolved
    Resolve { id: String },
}

#[derive(Subcommand)]
pub enum TechnicianCommands {
    /// Register a technician
    Add {
        name: String,
        /// junior, mid or senior
        #[arg(long, default_value = "mid")]
        skill: ExpertiseLevel,
    },
    /// List technicians
    List,
    /// Assign a technician to a work order
    Assign { work_order: String, technician: String },
    /// Set a technician's availability
    Status {
        id: String,
        /// available, busy or offline
        status: TechnicianStatus,
    },
}

#[derive(Subcommand)]
pub enum InventoryCommands {
    /// List all stock
    List,
    /// Search stock by name and/or location (case-insensitive substring)
    Search {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        location: Option<String>,
    },
    /// Add a stock line
    Add {
        name: String,
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(i32).range(0..))]
        quantity: i32,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long)]
        unit_cost_cents: Option<i64>,
    },
    /// Change the quantity on hand by DELTA; never drops below zero
    Adjust {
        id: String,
        #[arg(allow_hyphen_values = true)]
        delta: i32,
    },
    /// Hold an item back from the executor's inventory checks
    Reserve {
        id: String,
        /// Release a previous reservation instead
        #[arg(long)]
        release: bool,
    },
}

/// Split a command line given on the command line into program and args.
fn model_command(line: Option<String>) -> anyhow::Result<Option<config::ModelCommand>> {
    let Some(line) = line else {
        return Ok(None);
    };
    let mut words = line.split_whitespace().map(str::to_owned);
    let command = words
        .next()
        .ok_or_else(|| anyhow::anyhow!("command line must not be empty"))?;
    Ok(Some(config::ModelCommand {
        command,
        args: words.collect(),
    }))
}

/// Execute the `wrench init` command: write config file.
fn cmd_init(
    db_url: &str,
    planner_command: Option<String>,
    executor_command: Option<String>,
    force: bool,
) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        gateway: config::GatewaySection {
            planner: model_command(planner_command)?,
            executor: model_command(executor_command)?,
            ..config::GatewaySection::default()
        },
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    for (role, cmd) in [("planner", &cfg.gateway.planner), ("executor", &cfg.gateway.executor)] {
        match cmd {
            Some(cmd) => println!("  gateway.{role} = {} {}", cmd.command, cmd.args.join(" ")),
            None => println!("  gateway.{role} not set; edit the file before running plans"),
        }
    }
    println!();
    println!("Next: run `wrench db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `wrench db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = WrenchConfig::resolve(cli_db_url)?;

    println!("Initializing wrench database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("wrench db-init complete.");
    Ok(())
}

/// Resolve config and open a pool for commands that touch the database.
async fn connect(cli_db_url: Option<&str>) -> anyhow::Result<(sqlx::PgPool, WrenchConfig)> {
    let resolved = WrenchConfig::resolve(cli_db_url)?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    Ok((db_pool, resolved))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let db_url = cli.database_url.as_deref();
    match cli.command {
        Commands::Init {
            db_url,
            planner_command,
            executor_command,
            force,
        } => cmd_init(&db_url, planner_command, executor_command, force),
        Commands::DbInit => cmd_db_init(db_url).await,
        Commands::Order { command } => {
            let (db_pool, resolved) = connect(db_url).await?;
            let orchestrator = gateways::build_orchestrator(&db_pool, &resolved.gateway);
            let result = order_cmds::run_order_command(command, &db_pool, &orchestrator).await;
            db_pool.close().await;
            result
        }
        Commands::Run {
            id,
            resume_from,
            note,
        } => {
            let (db_pool, resolved) = connect(db_url).await?;
            let orchestrator = gateways::build_orchestrator(&db_pool, &resolved.gateway);
            let result = order_cmds::run_work_order(&orchestrator, &id, resume_from, note).await;
            db_pool.close().await;
            result
        }
        Commands::Regenerate { id, from, issue } => {
            let (db_pool, resolved) = connect(db_url).await?;
            let orchestrator = gateways::build_orchestrator(&db_pool, &resolved.gateway);
            let result = order_cmds::regenerate_plan(&orchestrator, &id, from, &issue).await;
            db_pool.close().await;
            result
        }
        Commands::Logs { id } => {
            let (db_pool, _) = connect(db_url).await?;
            let result = order_cmds::show_logs(&db_pool, &id).await;
            db_pool.close().await;
            result
        }
        Commands::Escalation { command } => {
            let (db_pool, _) = connect(db_url).await?;
            let result = escalation_cmds::run_escalation_command(command, &db_pool).await;
            db_pool.close().await;
            result
        }
        Commands::Technician { command } => {
            let (db_pool, _) = connect(db_url).await?;
            let result = escalation_cmds::run_technician_command(command, &db_pool).await;
            db_pool.close().await;
            result
        }
        Commands::Inventory { command } => {
            let (db_pool, _) = connect(db_url).await?;
            let store = PgPlanStore::new(db_pool.clone());
            let result = inventory_cmds::run_inventory_command(command, &store).await;
            db_pool.close().await;
            result
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "wrench", &mut std::io::stdout());
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}
