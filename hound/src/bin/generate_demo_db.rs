//! Generate a demo product database with synthetic industrial catalog data.
//!
//! The database is created through the crate's own [`Database`] layer, so the
//! schema always matches what the search engine expects. Generation is seeded:
//! the same seed produces the same catalog and training set.
//!
//! Usage:
//!     cargo run --release --bin generate-demo-db -- --db-path demo.sqlite
//!     cargo run --release --bin generate-demo-db -- --products 20000 --training 1500

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use hound::database::Database;
use hound::models::{NewTrainingExample, ProductRecord};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path of the SQLite database to create
    #[arg(short, long, default_value = "hound-demo.sqlite")]
    db_path: PathBuf,

    /// Number of synthetic catalog products to generate
    #[arg(short, long, default_value_t = 5000)]
    products: usize,

    /// Number of synthetic training examples to record
    #[arg(short, long, default_value_t = 400)]
    training: usize,

    /// RNG seed; rerunning with the same seed rebuilds the same data
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Add rows to an existing database instead of refusing to touch it
    #[arg(long)]
    force: bool,
}

struct Family {
    code_block: &'static str,
    dashed_code: bool,
    noun: &'static str,
    series: &'static [&'static str],
}

const FAMILIES: &[Family] = &[
    Family {
        code_block: "1SFL",
        dashed_code: false,
        noun: "Contactor",
        series: &["AF09", "AF16", "AF26", "AF40", "AF116", "AF140", "AF205", "AF370"],
    },
    Family {
        code_block: "2CDS",
        dashed_code: false,
        noun: "Miniature Circuit Breaker",
        series: &["S201", "S202", "S203", "S204", "SH201", "S251"],
    },
    Family {
        code_block: "1SDA",
        dashed_code: false,
        noun: "Molded Case Circuit Breaker",
        series: &["XT1", "XT2", "XT4", "T5", "T6"],
    },
    Family {
        code_block: "1SVR",
        dashed_code: false,
        noun: "Electronic Timer Relay",
        series: &["CT-MFD", "CT-ERD", "CT-AHD", "CT-SDD"],
    },
    Family {
        code_block: "1SBL",
        dashed_code: false,
        noun: "Installation Contactor",
        series: &["ESB16", "ESB20", "ESB24", "ESB40", "ESB63"],
    },
    Family {
        code_block: "GJL1",
        dashed_code: false,
        noun: "Pilot Light",
        series: &["CL-100", "CL-502", "CL-523"],
    },
    Family {
        code_block: "3HAC",
        dashed_code: true,
        noun: "Servo Motor Cable",
        series: &["IRB120", "IRB1200", "IRB2600", "IRB4600"],
    },
    Family {
        code_block: "GHD2",
        dashed_code: false,
        noun: "Emergency Stop Button",
        series: &["MPET3", "MPET4", "MPMT3"],
    },
];

const VOLTAGES: &[&str] = &[
    "24V DC",
    "110V AC",
    "230V AC",
    "400V AC",
    "100-250V AC/DC",
    "690V AC",
];

const RATINGS: &[&str] = &[
    "6A", "10A", "16A", "20A", "25A", "32A", "40A", "63A", "100A", "160A", "250A",
];

const EXTRAS: &[&str] = &[
    "3-pole",
    "4-pole",
    "1NO 1NC",
    "2NO 2NC",
    "IP20",
    "IP65",
    "DIN Rail",
    "Front Mount",
    "Screw Terminals",
];

/// A few fixed rows so every demo database answers the queries used in the
/// README and the benchmark, regardless of seed.
const SHOWCASE: &[(&str, &str)] = &[
    ("1SFL447101R1300", "Contactor#AF140-40-00-13#100-250V"),
    ("1SFL397101R1311", "Contactor#AF116-30-11-13#100-250V"),
    ("2CDS251001R0254", "Miniature Circuit Breaker#S201-C25"),
    ("3HAC026225-001", "Servo Motor Cable 7m IRB Robot"),
    ("GHD2101912R0001", "Emergency Stop Button Red 40mm"),
    ("E217-16-10", "Pilot Light LED Green 230V Front Mount"),
];

fn build_catalog(count: usize, rng: &mut StdRng) -> Vec<ProductRecord> {
    let mut records: Vec<ProductRecord> = SHOWCASE
        .iter()
        .map(|&(code, description)| ProductRecord::new(code, description))
        .collect();

    for i in 0..count {
        let family = &FAMILIES[i % FAMILIES.len()];
        // The sequence number keeps generated codes unique.
        let order_code = if family.dashed_code {
            format!(
                "{}{:06}-{:03}",
                family.code_block,
                100_000 + i,
                rng.gen_range(1..999)
            )
        } else {
            format!(
                "{}{:06}R{:04}",
                family.code_block,
                100_000 + i,
                rng.gen_range(0..10_000)
            )
        };

        let series = family.series.choose(rng).unwrap_or(&family.series[0]);
        let rating = RATINGS.choose(rng).unwrap_or(&RATINGS[0]);
        let voltage = VOLTAGES.choose(rng).unwrap_or(&VOLTAGES[0]);
        let description = if rng.gen_bool(0.4) {
            // Some vendor exports glue fields with '#'; keep that flavor.
            format!("{}#{}-{}#{}", family.noun, series, rating, voltage)
        } else {
            let extra = EXTRAS.choose(rng).unwrap_or(&EXTRAS[0]);
            format!("{} {} {} {} {}", family.noun, series, rating, voltage, extra)
        };

        records.push(ProductRecord::new(order_code, description));
    }

    records
}

/// Drop one interior character so the fuzzy scorer has something to chew on.
fn misspell(word: &str, rng: &mut StdRng) -> String {
    if word.len() > 4 {
        let pos = rng.gen_range(1..word.len() - 1);
        format!("{}{}", &word[..pos], &word[pos + 1..])
    } else {
        word.to_string()
    }
}

fn build_query(record: &ProductRecord, rng: &mut StdRng) -> String {
    let words: Vec<String> = record
        .description
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1)
        .map(str::to_lowercase)
        .collect();
    if words.is_empty() {
        return record.order_code.to_lowercase();
    }

    match rng.gen_range(0..10) {
        // Customers usually type a couple of description words.
        0..=5 => {
            let take = rng.gen_range(1..=2.min(words.len()));
            let start = rng.gen_range(0..=words.len() - take);
            let mut picked = words[start..start + take].join(" ");
            if rng.gen_bool(0.3) {
                picked = misspell(&picked, rng);
            }
            picked
        }
        // Sometimes a partial order code.
        6..=7 => record.order_code[..record.order_code.len().min(8)].to_lowercase(),
        // Sometimes the full description, typos included.
        _ => misspell(&words.join(" "), rng),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.db_path.exists() && !args.force {
        anyhow::bail!(
            "{} already exists; pass --force to add rows to it",
            args.db_path.display()
        );
    }

    let mut rng = StdRng::seed_from_u64(args.seed);
    let db = Database::open(&args.db_path)
        .with_context(|| format!("failed to open {}", args.db_path.display()))?;

    println!("Generating {} catalog products...", args.products);
    let catalog = build_catalog(args.products, &mut rng);
    let inserted = db
        .bulk_insert_products(&catalog, true)
        .context("failed to insert catalog products")?;

    println!("Generating {} training examples...", args.training);
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut recorded = 0usize;
    let mut attempts = 0usize;
    while recorded < args.training && attempts < args.training.saturating_mul(20) {
        attempts += 1;
        let record = match catalog.choose(&mut rng) {
            Some(record) => record,
            None => break,
        };
        let query = build_query(record, &mut rng);
        if !seen.insert((query.clone(), record.order_code.clone())) {
            continue;
        }
        let example = NewTrainingExample::new(&query, &record.order_code, &record.description)
            .with_source_file("demo_seed");
        db.append_training(&example)
            .with_context(|| format!("failed to record training example for {query:?}"))?;
        recorded += 1;
        if recorded % 100 == 0 {
            println!("  {} / {}", recorded, args.training);
        }
    }

    println!("Done.");
    println!("  Products inserted:  {inserted}");
    println!("  Training examples:  {recorded}");
    println!("  Database:           {}", args.db_path.display());
    println!();
    println!("Try it:");
    println!(
        "  cargo run --release --bin query-db -- --db-path {} contactor af140",
        args.db_path.display()
    );

    Ok(())
}
