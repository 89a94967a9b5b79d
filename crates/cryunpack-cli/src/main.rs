//! cryunpack - Read Star Citizen archives, DataForge databases and chunk files
//!
//! Usage:
//!   cryunpack list <p4k_file> [filter]       - List files matching filter
//!   cryunpack info <p4k_file>                - Show archive information
//!   cryunpack extract <p4k_file> [filter]    - Extract files matching filter
//!   cryunpack dcb <dcb_file> [-f filter]     - Dump DataForge records as JSON or XML
//!   cryunpack chunks <file>                  - Show the chunk table of a chunk file
//!   cryunpack cryxml <file>                  - Convert a CryXML file to XML or JSON
//!
//! `dcb`, `chunks` and `cryxml` read their input from inside an archive when
//! `--p4k <archive>` is given.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "cryunpack")]
#[command(version)]
#[command(about = "Read CryEngine P4K archives, DataForge databases and chunk files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log debug diagnostics (RUST_LOG overrides this)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Xml,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List files in the archive
    List {
        /// Path to the .p4k file
        p4k_file: PathBuf,
        /// Filter pattern (e.g., *.xml, Data/*); plain text matches anywhere in the path
        filter: Option<String>,
    },
    /// Show archive information
    Info {
        /// Path to the .p4k file
        p4k_file: PathBuf,
    },
    /// Extract files from the archive
    Extract {
        /// Path to the .p4k file
        p4k_file: PathBuf,
        /// Filter pattern or specific file path
        filter: Option<String>,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// Convert CryXML entries while extracting
        #[arg(short, long, value_enum)]
        convert: Option<OutputFormat>,
        /// Keep files that already exist in the output directory
        #[arg(long)]
        no_overwrite: bool,
        /// Do not look inside .pak/.socpak entries
        #[arg(long)]
        no_mount: bool,
    },
    /// Dump DataForge/DCB records
    Dcb {
        /// Path to the .dcb file, or its path inside the archive given with --p4k
        dcb_file: PathBuf,
        /// Read the DCB from this archive
        #[arg(long)]
        p4k: Option<PathBuf>,
        /// Output directory (default: same name as input file)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Only dump records whose file name matches
        #[arg(short, long)]
        filter: Option<String>,
        /// Output format
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
        /// Write GUIDs instead of expanding referenced records
        #[arg(long)]
        no_follow: bool,
        /// Depth at which nested pointers are written as references
        #[arg(long, default_value = "64")]
        max_depth: usize,
        /// Show DCB info only (don't convert)
        #[arg(long)]
        info: bool,
    },
    /// Show the chunks of a CrCh/#ivo file
    Chunks {
        /// Path to the chunk file, or its path inside the archive given with --p4k
        file: PathBuf,
        /// Read the file from this archive
        #[arg(long)]
        p4k: Option<PathBuf>,
        /// Print decoded chunks as JSON
        #[arg(long)]
        json: bool,
    },
    /// Convert a CryXML file
    Cryxml {
        /// Path to the CryXML file, or its path inside the archive given with --p4k
        file: PathBuf,
        /// Read the file from this archive
        #[arg(long)]
        p4k: Option<PathBuf>,
        /// Output format
        #[arg(long, value_enum, default_value = "xml")]
        format: OutputFormat,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .format_target(false)
        .init();

    match cli.command {
        Commands::List { p4k_file, filter } => {
            commands::list_files(&p4k_file, filter.as_deref())?;
        }
        Commands::Info { p4k_file } => {
            commands::show_info(&p4k_file)?;
        }
        Commands::Extract {
            p4k_file,
            filter,
            output,
            convert,
            no_overwrite,
            no_mount,
        } => {
            commands::extract_files(
                &p4k_file,
                filter.as_deref(),
                &output,
                convert,
                !no_overwrite,
                !no_mount,
            )?;
        }
        Commands::Dcb {
            dcb_file,
            p4k,
            output,
            filter,
            format,
            no_follow,
            max_depth,
            info,
        } => {
            let data = commands::load_input(&dcb_file, p4k.as_deref())?;
            let options = cryunpack::DumpOptions {
                follow_references: !no_follow,
                max_depth,
            };
            commands::convert_dcb(
                &data,
                &dcb_file,
                output.as_deref(),
                filter.as_deref(),
                format,
                &options,
                info,
            )?;
        }
        Commands::Chunks { file, p4k, json } => {
            let data = commands::load_input(&file, p4k.as_deref())?;
            commands::show_chunks(&data, &file, json)?;
        }
        Commands::Cryxml {
            file,
            p4k,
            format,
            output,
        } => {
            let data = commands::load_input(&file, p4k.as_deref())?;
            commands::convert_cryxml(&data, format, output.as_deref())?;
        }
    }

    Ok(())
}
