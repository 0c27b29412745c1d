use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "zipstream")]
#[command(version)]
#[command(about = "Stream local files and HTTP URLs into a ZIP archive", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipstream -o out.zip a.txt docs        add a.txt and the docs directory entry\n  \
  zipstream -0 big.iso | ssh host 'cat > big.zip'   store without compression, write to stdout\n  \
  zipstream -o mirror.zip https://example.com/data.csv   stream a remote file into the archive")]
pub struct Cli {
    /// Local files, directories or HTTP URLs to add
    #[arg(value_name = "INPUTS", required = true)]
    pub inputs: Vec<String>,

    /// Output archive path (`-` for stdout)
    #[arg(short = 'o', value_name = "ZIPFILE", default_value = "-")]
    pub output: String,

    /// Store entries without compression
    #[arg(short = '0')]
    pub store: bool,

    /// Deflate level (0-9)
    #[arg(short = 'l', value_name = "LEVEL", default_value_t = 6,
          value_parser = clap::value_parser!(u32).range(0..=9))]
    pub level: u32,

    /// Always write ZIP64 records
    #[arg(long = "zip64")]
    pub zip64: bool,

    /// Junk paths (store only file names)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Quiet mode
    #[arg(short = 'q')]
    pub quiet: bool,

    /// Verbose logging (-vv => trace)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn is_http_url(input: &str) -> bool {
        input.starts_with("http://") || input.starts_with("https://")
    }

    pub fn is_stdout(&self) -> bool {
        self.output == "-"
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["zipstream", "a.txt"]);
        assert!(cli.is_stdout());
        assert_eq!(cli.level, 6);
        assert!(!cli.store && !cli.zip64 && !cli.junk_paths && !cli.is_quiet());
        assert_eq!(cli.inputs, ["a.txt"]);
    }

    #[test]
    fn test_flags() {
        let cli = Cli::parse_from([
            "zipstream", "-o", "out.zip", "-0", "-l", "9", "--zip64", "-j", "-q", "-vv", "a", "b",
        ]);
        assert!(!cli.is_stdout());
        assert!(cli.store && cli.zip64 && cli.junk_paths && cli.is_quiet());
        assert_eq!(cli.level, 9);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.inputs.len(), 2);
    }

    #[test]
    fn test_rejects_bad_level() {
        assert!(Cli::try_parse_from(["zipstream", "-l", "10", "a"]).is_err());
        assert!(Cli::try_parse_from(["zipstream"]).is_err());
    }

    #[test]
    fn test_is_http_url() {
        assert!(Cli::is_http_url("https://example.com/a"));
        assert!(Cli::is_http_url("http://example.com/a"));
        assert!(!Cli::is_http_url("ftp://example.com/a"));
        assert!(!Cli::is_http_url("./http.txt"));
    }
}
