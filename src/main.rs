// Toll Ledger - CLI
// import: backfill the legacy CSV export, report: shift close-out summary,
// pending: one vehicle's outstanding balance

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::env;
use std::path::{Path, PathBuf};
use toll_ledger::{
    count_events, display_pending, import_events, load_csv, round2, setup_database, Audience,
    PaymentType, ReconciliationService,
};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("import") => run_import(args.get(2).map(Path::new))?,
        Some("report") => run_report(&args[2..])?,
        Some("pending") => run_pending(args.get(2))?,
        _ => print_usage(),
    }

    Ok(())
}

fn db_path() -> PathBuf {
    env::var("TOLL_LEDGER_DB")
        .unwrap_or_else(|_| "toll-ledger.db".to_string())
        .into()
}

fn print_usage() {
    println!("Toll Ledger v{}", toll_ledger::VERSION);
    println!();
    println!("Usage:");
    println!("  toll-ledger import <csv>                 backfill legacy CSV export");
    println!("  toll-ledger report [--starting-cash N]   shift close-out summary");
    println!("  toll-ledger pending <vehicle>            outstanding balance for one vehicle");
    println!();
    println!("Database path comes from TOLL_LEDGER_DB (default: toll-ledger.db)");
}

fn run_import(csv_path: Option<&Path>) -> Result<()> {
    let Some(csv_path) = csv_path else {
        bail!("usage: toll-ledger import <csv>");
    };

    println!("🗄️  Toll Ledger - CSV Backfill");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n📂 Loading CSV...");
    let rows = load_csv(csv_path)?;
    println!("✓ Loaded {} rows from {:?}", rows.len(), csv_path);

    println!("\n🔧 Setting up database...");
    let conn = Connection::open(db_path()).context("Failed to open database")?;
    setup_database(&conn)?;
    println!("✓ Database initialized with WAL mode");

    println!("\n💾 Importing events...");
    import_events(&conn, &rows)?;

    let count = count_events(&conn)?;
    println!("\n✓ Ledger now contains {} events", count);

    Ok(())
}

fn run_report(args: &[String]) -> Result<()> {
    let starting_cash = parse_starting_cash(args)?;
    let service = ReconciliationService::open(&db_path())?;

    let report = service.shift_report(starting_cash)?;

    println!("🧾 Shift Report");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Events recorded:   {}", report.event_count);
    println!("Gross amount:      {:.2}", round2(report.total_amount));
    println!();
    println!("Totals by payment type (starting cash {:.2}):", starting_cash);
    for instrument in PaymentType::ALL {
        println!(
            "  {:<20} {:>12.2}",
            instrument.as_str(),
            round2(report.instrument_totals.get(instrument))
        );
    }
    println!();
    println!("Cash drawer:       {:.2}", round2(report.cash_drawer));

    if report.pending_vehicles.is_empty() {
        println!("\n✓ No vehicles with outstanding balance");
    } else {
        println!("\nVehicles with outstanding balance:");
        for row in &report.pending_vehicles {
            println!("  {:<15} {:>12.2}", row.vehicle, round2(row.pending));
        }
    }

    Ok(())
}

fn run_pending(vehicle: Option<&String>) -> Result<()> {
    let Some(vehicle) = vehicle else {
        bail!("usage: toll-ledger pending <vehicle>");
    };

    let service = ReconciliationService::open(&db_path())?;
    let balance = service.pending_balance(vehicle)?;

    // Owner view: signed, over-settlement visible
    println!(
        "Pending for {}: {:.2}",
        toll_ledger::normalize_vehicle(vehicle),
        display_pending(balance, Audience::Owner)
    );

    Ok(())
}

fn parse_starting_cash(args: &[String]) -> Result<f64> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--starting-cash" {
            let value = iter
                .next()
                .context("--starting-cash requires a value")?;
            let cash: f64 = value
                .parse()
                .with_context(|| format!("invalid starting cash: {:?}", value))?;
            if !cash.is_finite() || cash < 0.0 {
                bail!("starting cash must be non-negative");
            }
            return Ok(cash);
        }
    }
    Ok(0.0)
}
