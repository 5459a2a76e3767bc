use anyhow::{Context, Result};
use std::{
    env,
    fs::{self, File},
    io::Read,
};

use importer::ProductCsvImporter;

fn main() -> Result<()> {
    // Usage:
    //   importer [file1.csv file2.csv ...] [database_path]
    //
    // If no .csv files specified, will auto-discover all .csv files in current directory
    //
    // Defaults:
    //   Auto-discover all .csv files in current directory
    //   database_path: database (resolves to database.json)

    let args: Vec<String> = env::args().collect();

    // Separate .csv files from other arguments
    let mut csv_files: Vec<String> = Vec::new();
    let mut other_args: Vec<String> = Vec::new();

    for arg in args.iter().skip(1) {
        if arg.ends_with(".csv") {
            csv_files.push(arg.clone());
        } else {
            other_args.push(arg.clone());
        }
    }

    // If no .csv files specified, auto-discover them
    if csv_files.is_empty() {
        println!("📂 No .csv files specified, scanning current directory...");
        let current_dir = env::current_dir()?;
        for entry in fs::read_dir(&current_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("csv") {
                if let Some(filename) = path.file_name().and_then(|s| s.to_str()) {
                    csv_files.push(filename.to_string());
                    println!("  ✓ Found: {}", filename);
                }
            }
        }
    }

    if csv_files.is_empty() {
        eprintln!("❌ No .csv files found!");
        return Ok(());
    }

    let database_path = other_args.get(0).map(|s| s.as_str()).unwrap_or("database");

    let importer = ProductCsvImporter::new();

    // Parse all discovered .csv files
    let mut all_products = Vec::new();
    let mut in_batch_duplicates = 0usize;

    for csv_file_path in &csv_files {
        println!("\n📖 Parsing {}", csv_file_path);

        let mut csv_file =
            File::open(csv_file_path).with_context(|| format!("Cannot open {}", csv_file_path))?;
        let mut csv_buf = Vec::new();
        csv_file.read_to_end(&mut csv_buf)?;

        match importer.import_batch(&csv_buf) {
            Ok(batch) => {
                println!(
                    "  ✓ Found {} products ({} in-file duplicates dropped)",
                    batch.records.len(),
                    batch.duplicates_in_batch
                );
                in_batch_duplicates += batch.duplicates_in_batch;
                all_products.extend(batch.records);
            }
            Err(e) => {
                eprintln!("  ⚠ Warning: Could not parse file: {}", e);
                eprintln!("    Continuing with next file...");
            }
        }
    }

    if all_products.is_empty() {
        eprintln!("❌ No products found in any file!");
        return Ok(());
    }

    // Read database.json (utils handles initialization if needed)
    println!("📖 Reading database from: {}", database_path);
    let template = utils::read_database(database_path)?;

    let new_products = all_products
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let (merged, stats) = utils::merge_products_with_deduplication(template, new_products)?;

    let written = utils::write_database(database_path, &merged)?;

    println!("\n📊 Summary:");
    println!("─────────────────────────────────────────");
    println!(
        "✓ Processed {} products: {} added, {} skipped (already exist)",
        stats.total, stats.added, stats.skipped
    );
    println!(
        "✓ Dropped {} in-file duplicates before merging",
        in_batch_duplicates
    );
    println!(
        "✓ Total products in database: {}",
        merged
            .get("products")
            .and_then(|p| p.as_array())
            .map(|p| p.len())
            .unwrap_or(0)
    );
    println!("─────────────────────────────────────────");
    println!("✅ Database written to: {}", written.display());

    Ok(())
}
