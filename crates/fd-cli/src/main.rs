use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fd_db::PgShipmentStore;
use fd_lifecycle::{allowed_next, apply_transition, available_actions, ShipmentStore};
use fd_schemas::ShipmentStatus;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "fd")]
#[command(about = "FreightDesk operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Shipment row commands
    Shipment {
        #[command(subcommand)]
        cmd: ShipmentCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum ShipmentCmd {
    /// Print one shipment row
    Show {
        #[arg(long)]
        id: String,
    },

    /// Print the manual transitions allowed from a status (no DB needed)
    Transitions {
        /// pending | in_transit | arrived | delivered | cancelled
        #[arg(long)]
        status: String,
    },

    /// Guarded status change (same rules as the dashboard)
    SetStatus {
        #[arg(long)]
        id: String,

        #[arg(long)]
        status: String,
    },

    /// Delete a shipment in any status. Requires --yes.
    Delete {
        #[arg(long)]
        id: String,

        /// Acknowledge the row is removed permanently.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = fd_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = fd_db::status(&pool).await?;
                    println!(
                        "db_ok={} has_shipments_table={}",
                        s.ok, s.has_shipments_table
                    );
                }
                DbCmd::Migrate => {
                    fd_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = fd_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);

            let unused = fd_config::report_unused_keys(&loaded.config_json);
            for key in &unused.unused_leaf_pointers {
                eprintln!("unused_key={key}");
            }
        }

        Commands::Shipment { cmd } => match cmd {
            ShipmentCmd::Transitions { status } => {
                let from = parse_status(&status)?;
                let next: Vec<String> = allowed_next(from).iter().map(|s| s.to_string()).collect();
                println!("status={from}");
                println!("allowed_next={}", next.join(","));
                println!("terminal={}", from.is_terminal());
            }
            ShipmentCmd::Show { id } => {
                let id = parse_id(&id)?;
                let store = store_from_env().await?;
                let Some(row) = store.fetch_shipment(id).await? else {
                    bail!("shipment not found: {id}");
                };
                let s = &row.shipment;
                println!("id={}", s.id);
                println!("shipment_number={}", s.shipment_number);
                println!("status={}", s.status);
                println!("payment_status={}", opt(s.payment_status));
                println!("phonepe_order_id={}", s.phonepe_order_id.as_deref().unwrap_or(""));
                println!("revenue={}", opt(s.revenue));
                println!(
                    "otp_verified_at={}",
                    s.otp_verified_at.map(|t| t.to_rfc3339()).unwrap_or_default()
                );
                println!("route={} -> {}", s.start_location, s.destination);
                println!("customer_phone={}", row.customer_phone());
                let labels: Vec<&str> = available_actions(s.status).iter().map(|a| a.label).collect();
                println!("actions={}", labels.join(","));
            }
            ShipmentCmd::SetStatus { id, status } => {
                let id = parse_id(&id)?;
                let target = parse_status(&status)?;
                let store = store_from_env().await?;
                let t = apply_transition(&store, id, target).await?;
                println!("status_changed=true id={} from={} to={}", t.id, t.from, t.to);
            }
            ShipmentCmd::Delete { id, yes } => {
                let id = parse_id(&id)?;
                if !yes {
                    bail!("REFUSING DELETE: shipment {id} would be removed permanently. Re-run with: `fd-cli shipment delete --id {id} --yes`");
                }
                let store = store_from_env().await?;
                fd_lifecycle::delete_shipment(&store, id).await?;
                println!("deleted=true id={id}");
            }
        },
    }
    Ok(())
}

async fn store_from_env() -> Result<PgShipmentStore> {
    let pool = fd_db::connect_from_env().await?;
    Ok(PgShipmentStore::new(pool))
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).context("invalid shipment id uuid")
}

fn parse_status(raw: &str) -> Result<ShipmentStatus> {
    raw.parse::<ShipmentStatus>().context("invalid --status")
}

fn opt<T: std::fmt::Display>(v: Option<T>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}
