use clap::Parser;

pub const HELP_KEYS: &str = "\
Key Bindings:
  Space         : Next file (wraps around)
  Left drag     : Pan the image
";

#[derive(Parser)]
#[command(name = "miv", about = "A minimal pan-and-cycle media viewer", after_help = HELP_KEYS)]
pub struct Cli {
    /// Media files to view, in order; the first is shown initially
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<std::path::PathBuf>,
}
