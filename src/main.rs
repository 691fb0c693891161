use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use interaction_log::config::ServerConfig;
use interaction_log::models::{ReportFilter, ReportStatus};
use interaction_log::{auth, build_router, db, export, import, AppState};

#[derive(Parser)]
#[command(name = "interaction-log")]
#[command(about = "Student interaction reports: shout-outs, check-ins, infractions and interventions", long_about = None)]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load the default type catalogs and sample students
    Seed,
    /// Run the HTTP API
    Serve(ServerConfig),
    /// Import legacy reports from a CSV file
    ImportReports {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import or update students from a CSV roster
    ImportStudents {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Export reports in the legacy CSV layout
    ExportReports {
        #[arg(long, default_value = "reports.csv")]
        out: PathBuf,
        #[arg(long)]
        since_days: Option<i64>,
        #[arg(long)]
        status: Option<ReportStatus>,
    },
    /// Create a user account
    CreateUser {
        #[arg(long)]
        email: String,
        #[arg(long, env = "INITIAL_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
        #[arg(long)]
        admin: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let database_url = cli
        .database_url
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Serve(config) => {
            let bind = config.bind;
            if config.summary.endpoint.is_none() {
                info!("AI_ENDPOINT not set; report summaries are disabled");
            }
            let app = build_router(AppState::new(pool, config));
            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .with_context(|| format!("failed to bind {bind}"))?;
            info!("interaction log listening on http://{bind}");
            axum::serve(listener, app).await?;
        }
        Commands::ImportReports { csv } => {
            let bytes = std::fs::read(&csv)
                .with_context(|| format!("failed to read {}", csv.display()))?;
            let summary = import::import_reports(&pool, &bytes).await?;
            println!(
                "Imported {} of {} reports from {}.",
                summary.imported,
                summary.total,
                csv.display()
            );
            for error in summary.errors.iter() {
                println!("- {error}");
            }
        }
        Commands::ImportStudents { csv } => {
            let bytes = std::fs::read(&csv)
                .with_context(|| format!("failed to read {}", csv.display()))?;
            let summary = import::import_students(&pool, &bytes).await?;
            println!(
                "Imported {} of {} students from {}.",
                summary.imported,
                summary.total,
                csv.display()
            );
            for error in summary.errors.iter() {
                println!("- {error}");
            }
        }
        Commands::ExportReports {
            out,
            since_days,
            status,
        } => {
            let filter = ReportFilter {
                status,
                since_days,
                limit: Some(i64::MAX),
                ..ReportFilter::default()
            };
            let reports = db::fetch_reports(&pool, &filter).await?;
            std::fs::write(&out, export::reports_to_csv(&reports)?)?;
            println!("Exported {} reports to {}.", reports.len(), out.display());
        }
        Commands::CreateUser {
            email,
            password,
            first_name,
            last_name,
            admin,
        } => {
            if password.chars().count() < auth::MIN_PASSWORD_LEN {
                anyhow::bail!(
                    "password must be at least {} characters",
                    auth::MIN_PASSWORD_LEN
                );
            }
            let password_hash = auth::hash_password(&password)?;
            let user = db::insert_user(
                &pool,
                &db::NewUser {
                    email: &email,
                    password_hash: &password_hash,
                    first_name: &first_name,
                    last_name: &last_name,
                    is_admin: admin,
                },
            )
            .await
            .context("failed to create user")?;
            println!(
                "Created {} {}.",
                if user.is_admin { "admin" } else { "user" },
                user.email
            );
        }
    }

    Ok(())
}
