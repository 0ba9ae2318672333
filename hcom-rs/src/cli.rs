//! Command-line argument parsing.
//!
//! Usage:
//!   hcom [-f<conf>] [-c<cmd>] [-qn] [<script> [<arg>…]]

use std::path::PathBuf;

pub const USAGE: &str = "Usage: hcom [-f<conf>] [-c<cmd>] [-qn] [<script> [<arg>...]]";

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Config-file specification.
    pub config: ConfigFile,
    /// Command to execute after loading config (`-c<cmd>`).
    pub command: Option<String>,
    /// Start with echo off (`-q`).
    pub quiet: bool,
    /// Disable colored output (`-n`).
    pub no_color: bool,
    /// Script to execute, as `exec` would.
    pub script: Option<PathBuf>,
    /// Arguments substituted into the script's `$1`, `$2`, ….
    pub script_args: Vec<String>,
}

/// How to choose the config file.
#[derive(Debug, Default, PartialEq)]
pub enum ConfigFile {
    /// Use `hcom.conf` in the platform config directory if present (default).
    #[default]
    Search,
    /// `-f` with no file argument: skip the config file.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings.
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // Flags stop at `--` and at the script path; the rest belongs to the script.
        if arg == "--" {
            positional.extend(argv[i + 1..].iter().cloned());
            break;
        }
        if !arg.starts_with('-') || arg == "-" {
            positional.extend(argv[i..].iter().cloned());
            break;
        }

        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'q' => args.quiet = true,
                'n' => args.no_color = true,

                // -f[<file>]
                'f' => {
                    if j + 1 < chars.len() {
                        let file: String = chars[j + 1..].iter().collect();
                        args.config = ConfigFile::Explicit(PathBuf::from(file));
                        j = chars.len();
                    } else if i + 1 < argv.len() && !argv[i + 1].starts_with('-') {
                        i += 1;
                        args.config = ConfigFile::Explicit(PathBuf::from(&argv[i]));
                    } else {
                        args.config = ConfigFile::Skip;
                    }
                }

                // -c<cmd>
                'c' => {
                    let cmd = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-c requires a command argument".to_owned());
                    };
                    args.command = Some(cmd);
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    args.script = positional.next().map(PathBuf::from);
    args.script_args = positional.collect();
    Ok(args)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|&s| s.to_owned()).collect()
    }

    #[test]
    fn empty_args() {
        let a = parse_argv(&argv(&[])).unwrap();
        assert!(!a.quiet && !a.no_color);
        assert_eq!(a.config, ConfigFile::Search);
        assert!(a.script.is_none());
    }

    #[test]
    fn combined_bool_flags() {
        let a = parse_argv(&argv(&["-qn"])).unwrap();
        assert!(a.quiet && a.no_color);
    }

    #[test]
    fn config_skip() {
        let a = parse_argv(&argv(&["-f"])).unwrap();
        assert_eq!(a.config, ConfigFile::Skip);
    }

    #[test]
    fn config_explicit_embedded_and_separate() {
        let a = parse_argv(&argv(&["-fmy.conf"])).unwrap();
        assert_eq!(a.config, ConfigFile::Explicit(PathBuf::from("my.conf")));
        let a = parse_argv(&argv(&["-f", "my.conf"])).unwrap();
        assert_eq!(a.config, ConfigFile::Explicit(PathBuf::from("my.conf")));
    }

    #[test]
    fn command_embedded_and_separate() {
        let a = parse_argv(&argv(&["-csim"])).unwrap();
        assert_eq!(a.command.as_deref(), Some("sim"));
        let a = parse_argv(&argv(&["-c", "chss 0 0.001 5"])).unwrap();
        assert_eq!(a.command.as_deref(), Some("chss 0 0.001 5"));
        assert!(parse_argv(&argv(&["-c"])).is_err());
    }

    #[test]
    fn script_takes_remaining_args() {
        let a = parse_argv(&argv(&["-q", "run.hcom", "-n", "3"])).unwrap();
        assert!(a.quiet);
        assert!(!a.no_color);
        assert_eq!(a.script, Some(PathBuf::from("run.hcom")));
        assert_eq!(a.script_args, vec!["-n", "3"]);
    }

    #[test]
    fn double_dash_ends_flags() {
        let a = parse_argv(&argv(&["--", "-odd.hcom"])).unwrap();
        assert_eq!(a.script, Some(PathBuf::from("-odd.hcom")));
    }

    #[test]
    fn unknown_flag() {
        assert!(parse_argv(&argv(&["-z"])).is_err());
    }
}
