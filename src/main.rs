use clap::{ArgAction, Args, Parser, Subcommand};
use hamarc::command::{self, Command, Invocation, Outcome};
use hamarc::hamming::{
    HammingConfig, DEFAULT_DATA_BITS, DEFAULT_PARITY_BITS, MAX_DATA_BITS, MAX_PARITY_BITS,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "hamarc", version, about = "Archiver with Hamming error-correcting payloads")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ArchiveArgs {
    /// Archive file path
    #[arg(short = 'f', long = "file")]
    archive: PathBuf,
    /// Data bits per codeword (k)
    #[arg(short = 'D', long, default_value_t = DEFAULT_DATA_BITS,
          value_parser = clap::value_parser!(u32).range(1..=MAX_DATA_BITS as i64))]
    data_bits: u32,
    /// Parity bits per codeword (r)
    #[arg(short = 'P', long, default_value_t = DEFAULT_PARITY_BITS,
          value_parser = clap::value_parser!(u32).range(1..=MAX_PARITY_BITS as i64))]
    parity_bits: u32,
    /// Reject k/r pairs that cannot correct every single-bit error
    #[arg(long)]
    strict: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new archive from one or more files
    Create {
        #[command(flatten)]
        archive: ArchiveArgs,
        #[arg(required = true, num_args = 1..)]
        files: Vec<String>,
    },
    /// List archive contents
    List {
        #[command(flatten)]
        archive: ArchiveArgs,
        /// Print the entry directory as JSON
        #[arg(long)]
        json: bool,
    },
    /// Extract all files, or only the named ones
    Extract {
        #[command(flatten)]
        archive: ArchiveArgs,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        files: Vec<String>,
    },
    /// Append files to an existing archive
    Append {
        #[command(flatten)]
        archive: ArchiveArgs,
        #[arg(required = true, num_args = 1..)]
        files: Vec<String>,
    },
    /// Delete entries from an archive
    Delete {
        #[command(flatten)]
        archive: ArchiveArgs,
        #[arg(required = true, num_args = 1..)]
        names: Vec<String>,
    },
    /// Merge two or more archives into the archive given by --file
    Concatenate {
        #[command(flatten)]
        archive: ArchiveArgs,
        #[arg(required = true, num_args = 2..)]
        sources: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match execute(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cmd: Commands) -> Result<(), Box<dyn std::error::Error>> {
    let mut json = false;
    let inv = match cmd {
        Commands::Create { archive, files } => invocation(Command::Create, archive)?.files(files),
        Commands::List { archive, json: j } => {
            json = j;
            invocation(Command::List, archive)?
        }
        Commands::Extract { archive, output_dir, files } => {
            invocation(Command::Extract, archive)?.files(files).output_dir(output_dir)
        }
        Commands::Append { archive, files } => invocation(Command::Append, archive)?.files(files),
        Commands::Delete { archive, names } => invocation(Command::Delete, archive)?.files(names),
        Commands::Concatenate { archive, sources } => {
            invocation(Command::Concatenate, archive)?.files(sources)
        }
    };

    match command::run(&inv)? {
        // ── Listing ──────────────────────────────────────────────────────────
        Outcome::Listing(entries) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for e in &entries {
                    println!("{} ({} bytes)", e.name, e.original_size);
                }
            }
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Outcome::Extracted(report) => {
            for f in &report.files {
                println!("  extracted  {}", f.path.display());
            }
            let repaired = report.corrected();
            if repaired > 0 {
                println!("Repaired {repaired} corrupted codeword(s)");
            }
        }

        // ── Delete ───────────────────────────────────────────────────────────
        Outcome::Deleted(removed) => {
            for e in &removed {
                println!("  deleted  {}", e.name);
            }
        }

        // ── Create / Append / Concatenate ────────────────────────────────────
        Outcome::Written(entries) => {
            println!("Wrote: {} ({} entries)", inv.archive_path.display(), entries.len());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn invocation(command: Command, args: ArchiveArgs) -> Result<Invocation, hamarc::HammingError> {
    let config = HammingConfig::new(args.data_bits, args.parity_bits)?;
    Ok(Invocation::new(command, args.archive).hamming(config).strict(args.strict))
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}
