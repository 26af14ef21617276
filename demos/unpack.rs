//! Unpack a file or directory from the command line
//!
//! Usage: cargo run --example unpack -- <path> [config.json] [password...]
//!
//! Passwords from the configured password file are tried after the ones given here.

use nested_unpack::{CliArchiveTool, Config, Event, PasswordList, RecursiveExtractionDriver};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let input = PathBuf::from(
        args.next()
            .ok_or("usage: unpack <path> [config.json] [password...]")?,
    );

    let mut rest: Vec<String> = args.collect();
    let config = match rest.first() {
        Some(first) if first.ends_with(".json") => {
            let path = PathBuf::from(rest.remove(0));
            Config::from_json_file(&path)?
        }
        _ => Config::default(),
    };

    let tool = CliArchiveTool::from_config(&config.tools)
        .ok_or("no 7-Zip binary found (install 7z, 7zz or 7za, or set tools.archiver_path)")?;
    println!("Using archiver at {}", tool.binary_path().display());

    let passwords = PasswordList::collect(
        &rest,
        config.tools.password_file.as_deref(),
        config.tools.try_no_password,
    )
    .await;

    let driver = RecursiveExtractionDriver::new(config, Arc::new(tool));

    let mut events = driver.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::Queued { path, depth } => {
                    println!("+ queued {} (depth {})", path.display(), depth);
                }
                Event::Waiting {
                    prefix,
                    found,
                    expected,
                } => match expected {
                    Some(expected) => println!("… {}: {}/{} volumes", prefix, found, expected),
                    None => println!("… {}: {} volume(s), total unknown", prefix, found),
                },
                Event::Extracting {
                    archive,
                    attempt,
                    total,
                } => {
                    println!("📦 {} (password {}/{})", archive.display(), attempt, total);
                }
                Event::Extracted { output, ratio, .. } => {
                    println!("✓ extracted to {} (ratio {:.2})", output.display(), ratio);
                }
                Event::ExtractFailed { archive, reason, .. } => {
                    println!("✗ {}: {}", archive.display(), reason);
                }
                Event::MovedToSuccess { destination, .. } => {
                    println!("→ {}", destination.display());
                }
                Event::MovedToFailure { destination, .. } => {
                    println!("⚠ {}", destination.display());
                }
                Event::RunComplete { .. } => break,
                _ => {}
            }
        }
    });

    let summary = driver.run(&input, passwords).await?;
    printer.await.ok();

    println!(
        "\n{} extraction(s), {} result(s), {} failure(s)",
        summary.extractions,
        summary.succeeded.len(),
        summary.failed.len()
    );
    Ok(())
}
