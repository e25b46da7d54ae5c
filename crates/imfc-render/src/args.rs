//! Command-line argument parsing for the IMFC renderer.

use std::env;
use std::path::PathBuf;

/// Default render length in seconds.
pub const DEFAULT_SECONDS: f64 = 5.0;

/// Default output file.
pub const DEFAULT_OUTPUT: &str = "imfc.wav";

/// Parsed command-line arguments.
#[derive(Debug)]
pub struct CliArgs {
    /// JSON card configuration
    pub config: Option<PathBuf>,
    /// Firmware ROM image (overrides the configuration)
    pub rom: Option<PathBuf>,
    /// Output sample rate (overrides the configuration)
    pub rate: Option<u32>,
    /// Length of audio to render
    pub seconds: f64,
    /// Raw MIDI byte stream fed to the card's MIDI input
    pub midi: Option<PathBuf>,
    /// WAV file to write
    pub out: PathBuf,
    /// Whether help was requested
    pub show_help: bool,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            config: None,
            rom: None,
            rate: None,
            seconds: DEFAULT_SECONDS,
            midi: None,
            out: PathBuf::from(DEFAULT_OUTPUT),
            show_help: false,
        }
    }
}

impl CliArgs {
    /// Parse arguments from the command line.
    pub fn parse() -> Self {
        Self::parse_from(env::args().skip(1))
    }

    /// Parse arguments from an iterator (without the program name).
    pub fn parse_from<I: IntoIterator<Item = String>>(argv: I) -> Self {
        let mut args = Self::default();
        let mut iter = argv.into_iter();

        while let Some(arg) = iter.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) if flag.starts_with("--") => {
                    (flag.to_string(), Some(value.to_string()))
                }
                _ => (arg.clone(), None),
            };
            match flag.as_str() {
                "--help" | "-h" => {
                    args.show_help = true;
                }
                "--config" | "--rom" | "--rate" | "--seconds" | "--midi" | "--out" => {
                    let Some(value) = inline.or_else(|| iter.next()) else {
                        eprintln!("{flag} requires an argument");
                        args.show_help = true;
                        continue;
                    };
                    args.apply(&flag, value);
                }
                _ if flag.starts_with('-') => {
                    eprintln!("Unknown flag: {arg}");
                    args.show_help = true;
                }
                _ => {
                    eprintln!("Unexpected argument: {arg}");
                    args.show_help = true;
                }
            }
        }

        args
    }

    fn apply(&mut self, flag: &str, value: String) {
        match flag {
            "--config" => self.config = Some(PathBuf::from(value)),
            "--rom" => self.rom = Some(PathBuf::from(value)),
            "--midi" => self.midi = Some(PathBuf::from(value)),
            "--out" => self.out = PathBuf::from(value),
            "--rate" => match value.parse::<u32>() {
                Ok(rate) => self.rate = Some(rate),
                Err(_) => {
                    eprintln!("Invalid sample rate: {value}");
                    self.show_help = true;
                }
            },
            "--seconds" => match value.parse::<f64>() {
                Ok(seconds) if seconds > 0.0 && seconds.is_finite() => self.seconds = seconds,
                _ => {
                    eprintln!("Invalid duration: {value}");
                    self.show_help = true;
                }
            },
            _ => {}
        }
    }

    /// Print help text to stderr.
    pub fn print_help() {
        eprintln!(
            "Usage:\n  imfc-render [options]\n\n\
             Options:\n\
             \x20 --config <file.json>  Card configuration (base_port, irq, sample_rate, firmware)\n\
             \x20 --rom <file>          IMFC firmware ROM image (32 KiB)\n\
             \x20 --rate <hz>           Output sample rate (minimum 8000, default 44100)\n\
             \x20 --seconds <s>         Length to render (default 5)\n\
             \x20 --midi <file>         Raw MIDI bytes to stream into the card\n\
             \x20 --out <file.wav>      Output file (default imfc.wav)\n\
             \x20 -h, --help            Show this help\n\n\
             Logging:\n\
             \x20 RUST_LOG=imfc=debug   Show unmapped port accesses\n\
             \x20 RUST_LOG=imfc=trace   Show every port access\n"
        );
    }
}
