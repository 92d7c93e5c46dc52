//! Argument parsing for the `graphbench` binary.

use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Conformance self-test of every configured backend.
    SelfTest,
    /// Bulk import into persistent backends.
    Import,
    Bench,
    Report,
}

impl Command {
    fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "selftest" | "test" => Ok(Command::SelfTest),
            "import" => Ok(Command::Import),
            "bench" => Ok(Command::Bench),
            "report" | "print" => Ok(Command::Report),
            other => Err(format!("unknown command {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CommandLineConfig {
    pub command: Command,
    pub config: Option<PathBuf>,
    pub stats: Option<PathBuf>,
    pub device: Option<String>,
    pub repeat_existing: bool,
    pub output: Option<PathBuf>,
}

impl CommandLineConfig {
    pub fn from_args(args: &[&str]) -> Result<Self, String> {
        let mut command = None;
        let mut config = None;
        let mut stats = None;
        let mut device = None;
        let mut repeat_existing = false;
        let mut output = None;
        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            match *arg {
                "--config" | "-c" => {
                    config = Some(PathBuf::from(
                        iter.next().ok_or_else(|| "--config requires a value".to_string())?,
                    ));
                }
                "--stats" => {
                    stats = Some(PathBuf::from(
                        iter.next().ok_or_else(|| "--stats requires a value".to_string())?,
                    ));
                }
                "--device" => {
                    device = Some(
                        iter.next()
                            .ok_or_else(|| "--device requires a value".to_string())?
                            .to_string(),
                    );
                }
                "--out" | "-o" => {
                    output = Some(PathBuf::from(
                        iter.next().ok_or_else(|| "--out requires a value".to_string())?,
                    ));
                }
                "--repeat" => repeat_existing = true,
                other if other.starts_with('-') => {
                    return Err(format!("unknown flag {other}"));
                }
                other => {
                    if command.is_some() {
                        return Err(format!("unexpected argument {other}"));
                    }
                    command = Some(Command::parse(other)?);
                }
            }
        }
        let command = command.ok_or_else(|| "missing command".to_string())?;
        if matches!(command, Command::Import | Command::Bench) && config.is_none() {
            return Err("--config is required for import and bench".to_string());
        }
        Ok(Self {
            command,
            config,
            stats,
            device,
            repeat_existing,
            output,
        })
    }

    pub fn help() -> &'static str {
        "Usage: graphbench <selftest|import|bench|report> [--config FILE] [--stats FILE] \
         [--device NAME] [--repeat] [--out FILE]\n"
    }
}
