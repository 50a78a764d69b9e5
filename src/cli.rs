use anyhow::{bail, Context, Result};
use std::path::PathBuf;

pub const USAGE: &str = "\
Usage: s3q [-c <config.json>] [-p <profile>] <command>

Transfer view:
  upload <prefix> <file>...   Queue local files for upload under <prefix>
  download <key>...           Queue objects for download

One-shot:
  ls [prefix]                 List a prefix
  rm <key>                    Delete an object
  mv <old> <new>              Rename an object
  mkdir <path>                Create a folder marker
  url <key>                   Print the public URL of an object

The upload prefix is used as given: pass 'photos/' to upload into the
photos folder.";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Upload { prefix: String, files: Vec<PathBuf> },
    Download { keys: Vec<String> },
    List { prefix: String },
    Remove { key: String },
    Move { from: String, to: String },
    MakeDir { path: String },
    Url { key: String },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Upload { .. } => "upload",
            Command::Download { .. } => "download",
            Command::List { .. } => "ls",
            Command::Remove { .. } => "rm",
            Command::Move { .. } => "mv",
            Command::MakeDir { .. } => "mkdir",
            Command::Url { .. } => "url",
        }
    }

    /// Commands that open the transfer view.
    pub fn is_transfer(&self) -> bool {
        matches!(self, Command::Upload { .. } | Command::Download { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub config_path: Option<PathBuf>,
    pub profile: Option<String>,
    pub command: Command,
}

/// Parse the arguments following the program name.
pub fn parse_args<I>(args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut config_path = None;
    let mut profile = None;
    let mut rest = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                config_path = Some(PathBuf::from(
                    args.next().context("'-c' needs a config file path")?,
                ));
            }
            "-p" | "--profile" => {
                profile = Some(args.next().context("'-p' needs a profile name")?);
            }
            _ => {
                rest.push(arg);
                rest.extend(args.by_ref());
            }
        }
    }

    let Some((name, operands)) = rest.split_first() else {
        bail!("No command given");
    };

    let command = match (name.as_str(), operands) {
        ("upload", [prefix, files @ ..]) if !files.is_empty() => Command::Upload {
            prefix: prefix.clone(),
            files: files.iter().map(PathBuf::from).collect(),
        },
        ("download", keys) if !keys.is_empty() => Command::Download {
            keys: keys.to_vec(),
        },
        ("ls", []) => Command::List {
            prefix: String::new(),
        },
        ("ls", [prefix]) => Command::List {
            prefix: prefix.clone(),
        },
        ("rm", [key]) => Command::Remove { key: key.clone() },
        ("mv", [from, to]) => Command::Move {
            from: from.clone(),
            to: to.clone(),
        },
        ("mkdir", [path]) => Command::MakeDir { path: path.clone() },
        ("url", [key]) => Command::Url { key: key.clone() },
        (
            "upload" | "download" | "ls" | "rm" | "mv" | "mkdir" | "url",
            _,
        ) => bail!("Wrong number of arguments for '{name}'"),
        _ => bail!("Unknown command '{name}'"),
    };

    Ok(Invocation {
        config_path,
        profile,
        command,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Invocation> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn options_then_upload() {
        let inv = parse(&["-c", "/tmp/c.json", "-p", "media", "upload", "photos/", "a.jpg", "b.jpg"])
            .unwrap();
        assert_eq!(inv.config_path, Some(PathBuf::from("/tmp/c.json")));
        assert_eq!(inv.profile.as_deref(), Some("media"));
        assert_eq!(
            inv.command,
            Command::Upload {
                prefix: "photos/".to_string(),
                files: vec![PathBuf::from("a.jpg"), PathBuf::from("b.jpg")],
            }
        );
        assert!(inv.command.is_transfer());
    }

    #[test]
    fn operands_after_the_command_are_not_options() {
        let inv = parse(&["download", "-p", "x.txt"]).unwrap();
        assert_eq!(inv.profile, None);
        assert_eq!(
            inv.command,
            Command::Download {
                keys: vec!["-p".to_string(), "x.txt".to_string()],
            }
        );
    }

    #[test]
    fn one_shot_commands() {
        assert_eq!(
            parse(&["ls"]).unwrap().command,
            Command::List {
                prefix: String::new()
            }
        );
        assert_eq!(
            parse(&["mv", "a", "b"]).unwrap().command,
            Command::Move {
                from: "a".to_string(),
                to: "b".to_string()
            }
        );
        assert!(!parse(&["url", "k"]).unwrap().command.is_transfer());
    }

    #[test]
    fn bad_usage_is_rejected() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["-c"]).is_err());
        assert!(parse(&["upload", "photos/"]).is_err());
        assert!(parse(&["rm"]).is_err());
        assert!(parse(&["sync", "a"]).is_err());
    }
}
