//! rcx - A tool for inspecting and editing ReClass memory layouts
//!
//! Usage:
//!   rcx info <xml>                                  - Show layout information
//!   rcx classes <xml> [filter]                      - List classes matching filter
//!   rcx header <xml> [-c class] [-o out]            - Generate C++ definitions
//!   rcx convert <in> <out>                          - Re-encode a ReClass XML file
//!   rcx validate <xml>                              - Report structural issues
//!   rcx view <xml> <binary> -c class [--base addr]  - Show member values from a binary
//!   rcx set <xml> <binary> -c class -f field <value> [-o out]

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rcx::parse_address;
use rcx::rcx_utils::{
    convert_file, list_classes, set_field, show_info, validate_file, view_class, write_header,
};

#[derive(Parser)]
#[command(name = "rcx")]
#[command(author = "xkeyC")]
#[command(version = "0.1.0")]
#[command(about = "Inspect and edit ReClass memory layouts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show layout information
    Info {
        /// Path to the ReClass XML file
        xml_file: PathBuf,
    },
    /// List classes in the layout
    Classes {
        /// Path to the ReClass XML file
        xml_file: PathBuf,
        /// Filter pattern (e.g., Player, C*Ped)
        filter: Option<String>,
    },
    /// Generate C++ struct definitions
    Header {
        /// Path to the ReClass XML file
        xml_file: PathBuf,
        /// Only this class and the types it embeds
        #[arg(short, long)]
        class: Option<String>,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Re-encode a ReClass XML file
    Convert {
        /// Input ReClass XML file
        input: PathBuf,
        /// Output ReClass XML file
        output: PathBuf,
    },
    /// Check the layout for structural problems
    Validate {
        /// Path to the ReClass XML file
        xml_file: PathBuf,
    },
    /// Show the members of a class read from a binary file
    View {
        /// Path to the ReClass XML file
        xml_file: PathBuf,
        /// Binary file holding the bytes to decode
        binary: PathBuf,
        /// Class to display
        #[arg(short, long)]
        class: String,
        /// Base address of the binary (e.g., 0x140000000)
        #[arg(short, long)]
        base: Option<String>,
    },
    /// Write a value into a class member of a binary file
    Set {
        /// Path to the ReClass XML file
        xml_file: PathBuf,
        /// Binary file to patch
        binary: PathBuf,
        /// Class holding the field
        #[arg(short, long)]
        class: String,
        /// Field name
        #[arg(short, long)]
        field: String,
        /// New value (e.g., 42, 1.5, 0xFF, "AA BB")
        value: String,
        /// Output file (default: overwrite the binary)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info { xml_file } => {
            show_info(&xml_file)?;
        }
        Commands::Classes { xml_file, filter } => {
            list_classes(&xml_file, filter.as_deref())?;
        }
        Commands::Header {
            xml_file,
            class,
            output,
        } => {
            write_header(&xml_file, class.as_deref(), output.as_deref())?;
        }
        Commands::Convert { input, output } => {
            convert_file(&input, &output)?;
        }
        Commands::Validate { xml_file } => {
            if !validate_file(&xml_file)? {
                std::process::exit(1);
            }
        }
        Commands::View {
            xml_file,
            binary,
            class,
            base,
        } => {
            let base = base.as_deref().map(parse_address).transpose()?;
            view_class(&xml_file, &binary, &class, base)?;
        }
        Commands::Set {
            xml_file,
            binary,
            class,
            field,
            value,
            output,
        } => {
            set_field(
                &xml_file,
                &binary,
                &class,
                &field,
                &value,
                output.as_deref(),
            )?;
        }
    }

    Ok(())
}
