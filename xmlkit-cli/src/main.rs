//! xmlkit - Unix-style command-line utilities for streaming XML.
//!
//! Every subcommand shares the FILE/`:XPATH` interleaving convention:
//! a token starting with `:` is a path expression attaching to the
//! files named before it; absent any file, standard input is read.

mod cat;
mod cp;
mod echo;
mod fixtags;
mod grep;
mod rm;
mod sed;
mod unecho;
mod wc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use xmlkit_core::signal;

#[derive(Parser)]
#[command(name = "xmlkit")]
#[command(version)]
#[command(about = "Unix-style streaming XML tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Concatenate the XML contents of FILE(s) into one document
    Cat {
        /// FILE and :XPATH tokens, interleaved
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },

    /// Print nodes whose string value matches PATTERN
    Grep {
        /// Regular expression to match against string values
        pattern: String,

        /// Invert the match
        #[arg(short = 'v', long)]
        invert: bool,

        /// Case insensitive matching
        #[arg(short = 'i', long)]
        ignore_case: bool,

        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },

    /// Apply substitution scripts to leaf string values
    Sed {
        /// Script of the form s/regex/replacement/[gi]
        #[arg(short = 'e', long = "expression", required = true)]
        scripts: Vec<String>,

        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },

    /// Render bracketed echo strings as an XML document
    Echo {
        /// Indent the output
        #[arg(short = 'n', long)]
        indent: bool,

        /// Echo strings like "[a/b]hello"
        #[arg(trailing_var_arg = true)]
        strings: Vec<String>,
    },

    /// Print an echo line for each leaf node
    Unecho {
        /// Absolute paths, one leaf per line
        #[arg(long)]
        xml_sed: bool,

        /// Collapse whitespace runs in values
        #[arg(short = 's', long)]
        squeeze: bool,

        /// Drop whitespace-only leaves
        #[arg(long)]
        skip_empty: bool,

        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },

    /// Remove selected nodes
    Rm {
        /// Rewrite the input files in place (atomically)
        #[arg(long)]
        write_files: bool,

        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },

    /// Copy selected nodes into a target document
    Cp {
        /// Insert before the selection instead of replacing it
        #[arg(long)]
        prepend: bool,

        /// Insert after the selection instead of replacing it
        #[arg(long)]
        append: bool,

        /// Insert at every selection, not only the first
        #[arg(long)]
        multi: bool,

        /// Rewrite the target file in place (atomically)
        #[arg(long)]
        write_files: bool,

        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },

    /// Print node statistics per file
    Wc {
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },

    /// Aggressively repair tags and entities, printing well-formed XML
    Fixtags {
        /// Wrap the output in a synthetic root element
        #[arg(long)]
        root_wrap: bool,

        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    signal::init_signal_handling();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Cat { args } => cat::run(&args),
        Commands::Grep {
            pattern,
            invert,
            ignore_case,
            args,
        } => grep::run(&pattern, invert, ignore_case, &args),
        Commands::Sed { scripts, args } => sed::run(&scripts, &args),
        Commands::Echo { indent, strings } => echo::run(indent, &strings),
        Commands::Unecho {
            xml_sed,
            squeeze,
            skip_empty,
            args,
        } => unecho::run(xml_sed, squeeze, skip_empty, &args),
        Commands::Rm { write_files, args } => rm::run(write_files, &args),
        Commands::Cp {
            prepend,
            append,
            multi,
            write_files,
            args,
        } => cp::run(
            cp::Options {
                prepend,
                append,
                multi,
                write_files,
            },
            &args,
        ),
        Commands::Wc { args } => wc::run(&args),
        Commands::Fixtags { root_wrap, args } => fixtags::run(root_wrap, &args),
    };

    xmlkit_core::rollback::cleanup_all();

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            std::process::exit(e.exit_code());
        }
    }
}
