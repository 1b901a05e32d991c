use std::path::PathBuf;

use clap::{Parser, ValueEnum};

// Some defaults; some of which can be overriden via CLI args
const CONFIG_FILE_PATH: &str = "./counting.json";
const DEFAULT_USER: &str = "anonymous";

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// One JSON frame per line
    Json,
    /// Back-to-back MessagePack frames
    Msgpack,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Recorded tracker output to count (not needed with --listRecords or --writeConfig)
    #[arg(long = "input", required_unless_present_any = ["list_records", "write_config"])]
    pub input: Option<PathBuf>,

    /// Encoding of the input file; guessed from the extension if omitted
    #[arg(long = "format", value_enum)]
    pub format: Option<InputFormat>,

    /// Where to load the counting config
    #[arg(long="config",default_value_t=String::from(CONFIG_FILE_PATH))]
    pub config_path: String,

    /// User (or session) the run is stored under
    #[arg(long="user",default_value_t=String::from(DEFAULT_USER))]
    pub user: String,

    /// Override linePosition (fraction of frame height) from the config file
    #[arg(long = "linePosition")]
    pub line_position: Option<f32>,

    /// Override the hysteresis margin (pixels) from the config file
    #[arg(long = "margin")]
    pub margin: Option<f32>,

    /// Stop after this many frames
    #[arg(long = "maxFrames")]
    pub max_frames: Option<u64>,

    /// Stop after this many seconds of wall-clock time; counts so far are kept
    #[arg(long = "maxSeconds")]
    pub max_seconds: Option<u64>,

    /// Override the JSON-lines file where results are stored
    #[arg(long = "storePath")]
    pub store_path: Option<String>,

    /// Do not store the result
    #[arg(long = "noStore")]
    pub no_store: bool,

    /// Write the effective config (file plus overrides) to --config and exit
    #[arg(long = "writeConfig")]
    pub write_config: bool,

    /// Print the stored runs (for --user, unless it is left as the default) and exit
    #[arg(long = "listRecords")]
    pub list_records: bool,

    #[arg(long = "loglevel",default_value_t=String::from("info"))]
    pub log_level: String,
}

impl Cli {
    pub fn input_format(&self) -> InputFormat {
        self.format.unwrap_or_else(|| {
            match self
                .input
                .as_ref()
                .and_then(|p| p.extension())
                .and_then(|e| e.to_str())
            {
                Some("msgpack") | Some("mp") => InputFormat::Msgpack,
                _ => InputFormat::Json,
            }
        })
    }

    pub fn user_filter(&self) -> Option<&str> {
        if self.user == DEFAULT_USER {
            None
        } else {
            Some(&self.user)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        let cli = Cli::parse_from(["people-counter", "--input", "clip.msgpack"]);
        assert_eq!(cli.input_format(), InputFormat::Msgpack);
        let cli = Cli::parse_from(["people-counter", "--input", "clip.jsonl"]);
        assert_eq!(cli.input_format(), InputFormat::Json);
        let cli = Cli::parse_from([
            "people-counter",
            "--input",
            "clip.bin",
            "--format",
            "msgpack",
        ]);
        assert_eq!(cli.input_format(), InputFormat::Msgpack);
    }

    #[test]
    fn test_input_required_unless_listing() {
        assert!(Cli::try_parse_from(["people-counter"]).is_err());
        let cli = Cli::parse_from(["people-counter", "--listRecords", "--user", "alice"]);
        assert!(cli.list_records);
        assert_eq!(cli.user_filter(), Some("alice"));
        let cli = Cli::parse_from(["people-counter", "--writeConfig", "--margin", "8"]);
        assert!(cli.write_config);
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from([
            "people-counter",
            "--input",
            "a.jsonl",
            "--linePosition",
            "0.5",
            "--margin",
            "3",
            "--maxFrames",
            "10",
        ]);
        assert_eq!(cli.line_position, Some(0.5));
        assert_eq!(cli.margin, Some(3.));
        assert_eq!(cli.max_frames, Some(10));
        assert_eq!(cli.user_filter(), None);
    }
}
