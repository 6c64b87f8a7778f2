use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::version::ClassVersion;

#[derive(Debug, Clone, Parser)]
#[command(name = "sig-sniffer")]
#[command(about = "Check compiled JVM classes against the API signatures of a runtime baseline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Debug-level logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Build a signature database from baseline classes, jars or jmods
    Build {
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,

        #[arg(short = 'o', long, value_name = "FILE")]
        output: PathBuf,

        /// Existing database to extend (repeatable)
        #[arg(long, value_name = "FILE")]
        base: Vec<PathBuf>,

        /// Only keep classes matching this wildcard (repeatable)
        #[arg(long, value_name = "PATTERN")]
        include: Vec<String>,

        /// Drop classes matching this wildcard (repeatable)
        #[arg(long, value_name = "PATTERN")]
        exclude: Vec<String>,
    },
    /// Check classes, directories or jars against a signature database
    Check {
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,

        /// Signature database (default: $SIG_SNIFFER_SIGNATURE)
        #[arg(short = 's', long, value_name = "FILE")]
        signature: Option<PathBuf>,

        /// Package to ignore, e.g. `org.objectweb.*` (repeatable)
        #[arg(short = 'i', long, value_name = "PACKAGE")]
        ignore: Vec<String>,

        /// File with one ignored package per line
        #[arg(long, value_name = "FILE")]
        ignore_file: Option<PathBuf>,

        /// Annotation type that suppresses checks, replacing the defaults (repeatable)
        #[arg(long, value_name = "TYPE")]
        annotation: Vec<String>,

        /// Directory to look up source files in for diagnostics (repeatable)
        #[arg(long, value_name = "DIR")]
        source_root: Vec<PathBuf>,

        /// Dependency whose classes are available at run time but not checked (repeatable)
        #[arg(long, value_name = "PATH")]
        classpath: Vec<PathBuf>,

        /// Do not look inside jar, jmod or zip archives
        #[arg(long)]
        no_archives: bool,
    },
    /// Merge several signature databases into one
    Merge {
        #[arg(required = true, value_name = "FILE")]
        inputs: Vec<PathBuf>,

        #[arg(short = 'o', long, value_name = "FILE")]
        output: PathBuf,
    },
    /// Print the class-file version of every class
    #[command(disable_help_flag = true)]
    Versions {
        /// Show a human readable Java version
        #[arg(short = 'h')]
        human: bool,

        /// Exit with status 1 if any class is newer than N (`52.0` or `Java8`)
        #[arg(short = 't', value_name = "N")]
        threshold: Option<ClassVersion>,

        #[arg(long, action = ArgAction::Help)]
        help: Option<bool>,

        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
    },
}
