//! wsvcr CLI

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;

use wsvcr::cassette::{format, naming::CASSETTE_EXTENSION, Direction};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!("wsvcr v{}", env!("CARGO_PKG_VERSION"));
        eprintln!();
        eprintln!("Usage: wsvcr <command> <path>");
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  inspect <cassette>   Print every frame of a cassette");
        eprintln!("  stats <dir>          Summarize all cassettes under a directory");
        process::exit(1);
    }

    let path = PathBuf::from(&args[2]);
    let result = match args[1].as_str() {
        "inspect" => inspect(&path),
        "stats" => show_stats(&path),
        command => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'wsvcr' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn inspect(path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let frames = format::decode(path, &content)?;

    println!("Cassette: {} ({} frames)", path.display(), frames.len());
    for (i, frame) in frames.iter().enumerate() {
        let arrow = match frame.direction {
            Direction::Sent => "->",
            Direction::Received => "<-",
        };
        println!("#{i:<4} {arrow} {}", frame.payload);
    }
    Ok(())
}

fn show_stats(dir: &Path) -> anyhow::Result<()> {
    if !dir.is_dir() {
        bail!("Directory not found: {}", dir.display());
    }

    let mut files = Vec::new();
    collect_cassettes(dir, &mut files)?;
    files.sort();

    println!("Cassette directory: {}", dir.display());
    println!();

    let mut total_sent = 0;
    let mut total_received = 0;
    for file in &files {
        let name = file.strip_prefix(dir).unwrap_or(file).display();
        let frames = std::fs::read_to_string(file)
            .map_err(wsvcr::VcrError::from)
            .and_then(|content| format::decode(file, &content));

        match frames {
            Ok(frames) => {
                let sent = frames
                    .iter()
                    .filter(|f| f.direction == Direction::Sent)
                    .count();
                let received = frames.len() - sent;
                total_sent += sent;
                total_received += received;
                println!("  {name}: {sent} sent, {received} received");
            }
            Err(e) => println!("  {name}: unreadable ({e})"),
        }
    }

    println!();
    println!(
        "{} cassettes, {total_sent} sent, {total_received} received",
        files.len()
    );
    Ok(())
}

fn collect_cassettes(dir: &Path, files: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            collect_cassettes(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == CASSETTE_EXTENSION) {
            files.push(path);
        }
    }
    Ok(())
}
