use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inventory_valuation::{
    apply_manual_prices, apply_request, in_batch, CatalogStore, Config, HttpFetcher,
    InventoryReport, SqliteCatalog,
};

#[derive(Parser)]
#[command(
    name = "inventory-valuation",
    version,
    about = "Track item quantities and their market value"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add quantities from free text, e.g. "3 maçã, 2 pão e 1 banana"
    Add { text: String },
    /// Show the inventory and its total value
    List,
    /// Show items that still need a price
    Unpriced,
    /// Set the unit price of an item
    Price { name: String, value: String },
    /// Fetch the price table again
    Refresh,
    /// Remove every item
    Clear,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    let mut catalog = SqliteCatalog::open(&config.database_path)?;

    match cli.command {
        Command::Add { text } => {
            let needs_pricing = apply_request(&mut catalog, &config.normalizer(), &text)?;
            println!("✓ Added");
            if needs_pricing {
                println!("\n⚠️  New items without a price:");
                print_unpriced(&catalog)?;
                println!("\n   Run: inventory-valuation price <name> <value>");
            }
        }
        Command::List => {
            let fetcher = HttpFetcher::new();
            if let Some(report) = config.extractor().ensure_prices(&mut catalog, &fetcher)? {
                println!("✓ Loaded {} prices", report.prices_applied);
            }
            print_report(&InventoryReport::build(catalog.all()?));
        }
        Command::Unpriced => print_unpriced(&catalog)?,
        Command::Price { name, value } => {
            let updated = apply_manual_prices(&mut catalog, &[(name.clone(), value)])?;
            if updated == 0 {
                println!("❌ No item named {:?}", name);
            } else {
                println!("✓ Price set for {}", name);
            }
        }
        Command::Refresh => {
            let report = config.extractor().refresh(&mut catalog, &HttpFetcher::new())?;
            println!(
                "✓ {} prices applied ({} rows, {} skipped)",
                report.prices_applied, report.rows_seen, report.pairs_skipped
            );
        }
        Command::Clear => {
            let removed = in_batch(&mut catalog, "operator", |catalog| catalog.clear())?;
            println!("✓ Removed {} items", removed);
        }
    }

    Ok(())
}

fn print_report(report: &InventoryReport) {
    println!("{:<30} {:>10} {:>10}", "Item", "Quantity", "Price");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for line in report.lines.iter().filter(|l| l.quantity > 0) {
        println!(
            "{:<30} {:>10} {:>10}",
            line.name, line.quantity, line.unit_price_formatted
        );
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Total: {}", report.total_formatted);
}

fn print_unpriced(catalog: &SqliteCatalog) -> Result<()> {
    for entry in catalog.unpriced()? {
        println!("   {} (x{})", entry.name, entry.quantity);
    }
    Ok(())
}
