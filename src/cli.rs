use clap::{ArgGroup, Parser};
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "storezip")]
#[command(version)]
#[command(about = "List, extract, add and delete stored ZIP archive members", long_about = None)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["toc", "extract", "replace", "delete"])
))]
#[command(after_help = "Examples:\n  \
  storezip -t data.zip                  list the contents of data.zip\n  \
  storezip -x data.zip -C out           extract every member into out/\n  \
  storezip -r data.zip notes.txt        add or replace notes.txt\n  \
  storezip -d data.zip notes.txt        delete notes.txt")]
pub struct Cli {
    /// ZIP file path
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// Members to extract, files to add, or members to delete
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// Print the table of contents
    #[arg(short = 't')]
    pub toc: bool,

    /// Extract the named members (default: all)
    #[arg(short = 'x')]
    pub extract: bool,

    /// Add files, replacing members of the same name; creates the archive
    #[arg(short = 'r')]
    pub replace: bool,

    /// Delete the named members
    #[arg(short = 'd')]
    pub delete: bool,

    /// Extract into DIR
    #[arg(short = 'C', value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Log what the archive code is doing
    #[arg(short = 'v')]
    pub verbose: bool,
}

/// What to do with the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    List,
    Extract,
    Replace,
    Delete,
}

impl Cli {
    pub fn mode(&self) -> Mode {
        if self.extract {
            Mode::Extract
        } else if self.replace {
            Mode::Replace
        } else if self.delete {
            Mode::Delete
        } else {
            Mode::List
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    /// Default log filter, used unless `RUST_LOG` says otherwise.
    pub fn log_level(&self) -> LevelFilter {
        match (self.verbose, self.is_very_quiet()) {
            (true, _) => LevelFilter::Debug,
            (false, true) => LevelFilter::Error,
            (false, false) => LevelFilter::Warn,
        }
    }
}
