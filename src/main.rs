use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

use bond_chatbot::{db, format_amount, parse_amount, Config, LookupQuery, RecordSet, RecordSource};

const USAGE: &str = "Usage:
  bond-chatbot [chat] [--csv PATH]          start the conversational form
  bond-chatbot import PATH                  load a bond CSV into the database
  bond-chatbot lookup STATE CITY LIMIT NAME one-shot exact-match lookup";

fn main() -> Result<()> {
    // Logs go to stderr so they stay out of the chat screen
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = Config::load().context("Failed to load configuration")?;

    match args.first().map(String::as_str) {
        Some("import") => {
            let path = args.get(1).context("import needs a CSV path")?;
            run_import(&config, Path::new(path))?;
        }
        Some("lookup") => {
            if args.len() != 5 {
                bail!("lookup needs STATE CITY LIMIT NAME\n\n{}", USAGE);
            }
            run_lookup(&config, &args[1..])?;
        }
        Some("help" | "--help" | "-h") => println!("{}", USAGE),
        Some("chat") | None => run_chat(config, csv_flag(&args)?)?,
        Some(flag) if flag.starts_with("--") => run_chat(config, csv_flag(&args)?)?,
        Some(other) => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    }

    Ok(())
}

fn csv_flag(args: &[String]) -> Result<Option<PathBuf>> {
    match args.iter().position(|a| a == "--csv") {
        Some(i) => {
            let path = args.get(i + 1).context("--csv needs a path")?;
            Ok(Some(PathBuf::from(path)))
        }
        None => Ok(None),
    }
}

fn open_database(config: &Config) -> Result<Connection> {
    let conn = Connection::open(&config.db_path)
        .with_context(|| format!("Failed to open database {:?}", config.db_path))?;
    db::setup_database(&conn)?;
    Ok(conn)
}

fn record_source(config: &Config, conn: &Connection) -> Result<RecordSource> {
    let stored = db::get_all_records(conn)?;
    Ok(config.record_source(stored)?)
}

fn run_import(config: &Config, csv_path: &Path) -> Result<()> {
    println!("🗄️  Bond record import - CSV → SQLite");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load CSV
    println!("\n📂 Loading CSV...");
    let set = RecordSet::load_csv(csv_path)?;
    println!("✓ Loaded {} bond records from {:?}", set.len(), csv_path);

    // 2. Setup database
    println!("\n🔧 Setting up database...");
    let conn = open_database(config)?;
    println!("✓ Database ready at {:?}", config.db_path);

    // 3. Insert records
    println!("\n💾 Inserting records...");
    let inserted = db::insert_records(&conn, set.records())?;
    println!("✓ Inserted: {}", inserted);
    println!("✓ Skipped duplicates: {}", set.len() - inserted);

    // 4. Verify count
    let count = db::count_records(&conn)?;
    println!("\n✅ Database contains {} bond records", count);

    Ok(())
}

fn run_lookup(config: &Config, args: &[String]) -> Result<()> {
    let limit = parse_amount(&args[2]).with_context(|| format!("'{}' is not an amount", args[2]))?;
    let query = LookupQuery::new(&args[0], &args[1], limit, &args[3]);

    let conn = open_database(config)?;
    let source = record_source(config, &conn)?;

    let runtime = tokio::runtime::Runtime::new()?;
    match runtime.block_on(source.lookup(&query))? {
        Some(record) => {
            println!("✓ Match: {}, {} - ${} requested by {}", record.city, record.state, format_amount(record.bond_limit), record.name);
            if let Some(premium) = record.premium {
                println!("  Premium: ${:.2}", premium);
            }
        }
        None => println!("✗ No bond matches {} / {} / ${} / {}", query.state, query.city, format_amount(query.bond_limit), query.name),
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_chat(mut config: Config, csv: Option<PathBuf>) -> Result<()> {
    if csv.is_some() {
        config.csv_path = csv;
    }

    let conn = open_database(&config)?;
    let source = record_source(&config, &conn)?;
    println!("💬 Starting Bond Chatbot ({})... (Ctrl+C to quit)\n", source.describe());

    let mut app = bond_chatbot::ui::App::new(source, Some(conn))?;
    bond_chatbot::ui::run_ui(&mut app)?;

    if let Some(request) = app.wizard.request() {
        println!("✅ Payment link request {} sent to {}", request.reference, request.destination);
    } else if let Some(inquiry) = app.wizard.inquiry() {
        println!("📨 Inquiry {} recorded", inquiry.reference);
    }

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_chat(_config: Config, _csv: Option<PathBuf>) -> Result<()> {
    eprintln!("❌ Chat mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin bond-server --features server");
    std::process::exit(1);
}
