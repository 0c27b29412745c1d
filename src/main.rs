//! Main entry point for the zipstream CLI application.
//!
//! Streams local files, directory entries and HTTP URLs into a ZIP archive
//! written to a file or stdout.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::Path;
use std::time::SystemTime;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tracing::Level;

use zipstream::{
    ArchiveOptions, ChunkSink, Cli, EntryOptions, HttpSource, ReaderSource, WriterSink, Zip64Mode,
    ZipStream,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    // Declared totals let the archive pick ZIP64 before the first header
    let mut expected_size = 0u64;
    for input in cli.inputs.iter().filter(|input| !Cli::is_http_url(input)) {
        if entry_name(input, cli.junk_paths).is_empty() {
            bail!("cannot derive an entry name from {input}");
        }
        let metadata = tokio::fs::metadata(input)
            .await
            .with_context(|| format!("cannot stat {input}"))?;
        if metadata.is_file() {
            expected_size += metadata.len();
        }
    }

    let mut options = ArchiveOptions::new()
        .expected_entries(cli.inputs.len() as u64)
        .expected_size(expected_size)
        .compression_level(cli.level);
    if cli.zip64 {
        options = options.zip64(Zip64Mode::Always);
    }

    let total = if cli.is_stdout() {
        write_archive(WriterSink::new(tokio::io::stdout()), options, &cli).await?
    } else {
        let sink = WriterSink::create(Path::new(&cli.output))
            .await
            .with_context(|| format!("cannot create {}", cli.output))?;
        write_archive(sink, options, &cli).await?
    };

    if !cli.is_quiet() {
        eprintln!("\nTotal archive size: {}", format_size(total));
    }

    Ok(())
}

fn init_logging(cli: &Cli) {
    let level = match (cli.is_quiet(), cli.verbose) {
        (true, 0) => Level::ERROR,
        (_, 0) => Level::WARN,
        (_, 1) => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Add every input in order, then finalize. Any failure aborts the archive.
async fn write_archive<S: ChunkSink>(sink: S, options: ArchiveOptions, cli: &Cli) -> Result<u64> {
    let mut zip = ZipStream::with_options(sink, options);

    for input in &cli.inputs {
        if let Err(err) = add_input(&mut zip, input, cli).await {
            zip.destroy();
            return Err(err);
        }
    }

    let total = zip.finalize().await?.unwrap_or(zip.bytes_written());
    Ok(total)
}

async fn add_input<S: ChunkSink>(zip: &mut ZipStream<S>, input: &str, cli: &Cli) -> Result<()> {
    if Cli::is_http_url(input) {
        let source = HttpSource::new(input.to_string())
            .await
            .with_context(|| format!("cannot fetch {input}"))?;
        let Some(name) = source.file_name().map(str::to_string) else {
            bail!("cannot derive an entry name from {input}");
        };

        report(cli, &name);
        zip.add_file(source, file_options(name, cli)).await?;
        return Ok(());
    }

    let path = Path::new(input);
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("cannot stat {input}"))?;
    let name = entry_name(input, cli.junk_paths);

    let mut options = if metadata.is_dir() {
        EntryOptions::directory(name)
    } else {
        file_options(name, cli)
    };
    if let Ok(modified) = metadata.modified() {
        options = options.modified(local_datetime(modified));
    }

    report(cli, options.name());
    if metadata.is_dir() {
        zip.add_directory(options).await?;
    } else {
        let source = ReaderSource::open(path)
            .await
            .with_context(|| format!("cannot open {input}"))?;
        zip.add_file(source, options).await?;
    }

    Ok(())
}

fn file_options(name: String, cli: &Cli) -> EntryOptions {
    let options = EntryOptions::new(name);
    if cli.store { options.stored() } else { options }
}

fn report(cli: &Cli, name: &str) {
    if !cli.is_quiet() {
        eprintln!("  adding: {}", name);
    }
}

/// Archive name for a local input: forward slashes, no empty or `.`
/// components, and only the last component with `-j`. Empty when nothing
/// nameable is left, as for `.` or `/`.
fn entry_name(input: &str, junk_paths: bool) -> String {
    let normalized = input.replace('\\', "/");
    let components: Vec<&str> = normalized
        .split('/')
        .filter(|component| !component.is_empty() && *component != ".")
        .collect();

    if junk_paths {
        components.last().map(|c| c.to_string()).unwrap_or_default()
    } else {
        components.join("/")
    }
}

fn local_datetime(modified: SystemTime) -> PrimitiveDateTime {
    let utc = OffsetDateTime::from(modified);
    let local = UtcOffset::current_local_offset().map_or(utc, |offset| utc.to_offset(offset));
    PrimitiveDateTime::new(local.date(), local.time())
}

/// Format a byte size into a human-readable string.
///
/// Automatically selects the appropriate unit (bytes, KB, MB, GB)
/// based on the size magnitude.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_name() {
        assert_eq!(entry_name("a.txt", false), "a.txt");
        assert_eq!(entry_name("./docs/a.txt", false), "docs/a.txt");
        assert_eq!(entry_name("/var/log/syslog", false), "var/log/syslog");
        assert_eq!(entry_name("dir\\sub\\f.bin", false), "dir/sub/f.bin");
        assert_eq!(entry_name("docs/", false), "docs");
        assert_eq!(entry_name("/var/log/syslog", true), "syslog");
        assert_eq!(entry_name("./a/b/", true), "b");
        assert_eq!(entry_name("a/./b//c", false), "a/b/c");
        assert_eq!(entry_name("../up", false), "../up");
    }

    #[test]
    fn test_entry_name_without_components() {
        for input in [".", "/", "./", "./.", "\\"] {
            assert_eq!(entry_name(input, false), "", "{input}");
            assert_eq!(entry_name(input, true), "", "{input}");
        }
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 bytes");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
    }
}
