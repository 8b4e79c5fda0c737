//! # Demo Seeder
//!
//! Installs the demo burger shop into a database for development.
//!
//! ## Usage
//! ```bash
//! cargo run -p mise-engine --bin seed
//! cargo run -p mise-engine --bin seed -- --db ./data/mise.db --branch main
//! ```
//!
//! Re-running against a seeded database is a no-op.

use std::env;
use std::time::Duration;

use mise_db::{Database, DbConfig};
use mise_engine::telemetry::init_tracing;
use mise_engine::{demo, Ledger};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./mise_dev.db");
    let mut branch: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--branch" | "-b" => {
                if i + 1 < args.len() {
                    branch = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Mise POS Demo Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>       Database file path (default: ./mise_dev.db)");
                println!("  -b, --branch <ID>     Book opening stock to a branch (default: tenant-wide)");
                println!("  -h, --help            Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    init_tracing();

    println!("Mise POS Demo Seeder");
    println!("====================");
    println!("Database: {}", db_path);
    println!("Branch:   {}", branch.as_deref().unwrap_or("(tenant-wide)"));
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    let schema = db.verify_schema().await?;
    println!("✓ Schema at version {}", schema.latest_applied().unwrap_or_default());

    if db.catalog().get_item(demo::CHEESE).await?.is_some() {
        println!("⚠ Demo catalog already present");
        println!("  Delete the database file to reseed.");
        return Ok(());
    }

    let ledger = Ledger::new(db.clone(), Duration::from_secs(5));
    demo::install(&ledger, demo::TENANT_ID, branch.as_deref()).await?;

    println!();
    println!("Opening stock:");
    for record in ledger.snapshot(demo::TENANT_ID, branch.as_deref()).await? {
        println!(
            "  {:<12} {:>8} (reserved {})",
            record.item_id,
            record.quantity.to_string(),
            record.reserved_quantity
        );
    }

    println!();
    println!("✓ Seed complete!");
    db.close().await;
    Ok(())
}
