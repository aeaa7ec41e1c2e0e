//! Main entry point for the storezip CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;

use storezip::{Archive, Cli, CompressionMethod, Mode};

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    match cli.mode() {
        Mode::List => list_files(&open_archive(&cli.archive)?),
        Mode::Extract => extract_files(&mut open_archive(&cli.archive)?, &cli),
        Mode::Replace => add_files(&cli),
        Mode::Delete => delete_files(&mut open_archive(&cli.archive)?, &cli),
    }
}

fn open_archive(path: &Path) -> Result<Archive> {
    Archive::open(path).with_context(|| format!("cannot open {}", path.display()))
}

/// Print the table of contents in the verbose unzip layout.
fn list_files(archive: &Archive) -> Result<()> {
    println!("Archive:  {}", archive.path().display());
    println!(
        "{:>10}  {:<8}  {:>10}  {:>5}  {:>10}  {:>5}  {:>8}  Name",
        "Length", "Method", "Size", "Cmpr", "Date", "Time", "CRC-32"
    );
    println!("{}", "-".repeat(80));

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in archive.entries() {
        let compressed = u64::from(entry.compressed_size);
        let uncompressed = u64::from(entry.uncompressed_size);
        let dos = entry.modified;
        println!(
            "{:>10}  {:<8}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {:08x}  {}",
            uncompressed,
            entry.compression_method.to_string(),
            compressed,
            ratio(compressed, uncompressed),
            dos.year(),
            dos.month(),
            dos.day(),
            dos.hour(),
            dos.minute(),
            entry.crc32,
            entry.name_lossy()
        );

        if !entry.is_dir() {
            total_uncompressed += uncompressed;
            total_compressed += compressed;
            file_count += 1;
        }
    }

    println!("{}", "-".repeat(80));
    println!(
        "{:>10}  {:8}  {:>10}  {}  {:>31}  {} files",
        total_uncompressed,
        "",
        total_compressed,
        ratio(total_compressed, total_uncompressed),
        "",
        file_count
    );
    if !archive.comment().is_empty() {
        println!("{}", String::from_utf8_lossy(archive.comment()));
    }

    Ok(())
}

/// Space saved as a percentage, right-aligned to five columns.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 && compressed <= uncompressed {
        format!("{:>4}%", 100 - compressed * 100 / uncompressed)
    } else {
        "  0%".to_string()
    }
}

/// Extract the named members, or every member when none are named.
fn extract_files(archive: &mut Archive, cli: &Cli) -> Result<()> {
    let names: Vec<Vec<u8>> = if cli.files.is_empty() {
        archive
            .entries()
            .iter()
            .map(|entry| entry.file_name.clone())
            .collect()
    } else {
        cli.files.iter().map(|f| f.clone().into_bytes()).collect()
    };

    for name in names {
        let display = String::from_utf8_lossy(&name).into_owned();
        if !cli.is_quiet() {
            println!("  extracting: {display}");
        }
        archive
            .extract_file(&name, &cli.dir)
            .with_context(|| format!("cannot extract {display}"))?;
    }

    Ok(())
}

/// Add each named file, creating the archive first if needed.
fn add_files(cli: &Cli) -> Result<()> {
    let mut archive = if cli.archive.exists() {
        open_archive(&cli.archive)?
    } else {
        if !cli.is_quiet() {
            println!("creating: {}", cli.archive.display());
        }
        Archive::create(&cli.archive)
            .with_context(|| format!("cannot create {}", cli.archive.display()))?
    };

    for file in &cli.files {
        if !cli.is_quiet() {
            println!("  adding: {file}");
        }
        archive
            .add_file(file, CompressionMethod::Stored)
            .with_context(|| format!("cannot add {file} to {}", cli.archive.display()))?;
    }

    Ok(())
}

fn delete_files(archive: &mut Archive, cli: &Cli) -> Result<()> {
    for name in &cli.files {
        let removed = archive
            .remove_file(name)
            .with_context(|| format!("cannot delete {name} from {}", cli.archive.display()))?;

        if cli.is_quiet() {
            continue;
        }
        if removed {
            println!("  deleting: {name}");
        } else {
            eprintln!("  not found: {name}");
        }
    }

    Ok(())
}
