use std::io::{self, Write};

use anyhow::{bail, Result};
use fatstore::{ByteStorage, FatFs, FileType, VPath};

pub const HELP_TEXT: &str = "\
commands:
  cd <dir|..|/>          change the current directory
  ls                     list the current directory
  mkdir <name>           create a directory
  mkfile <name>          create an empty file
  write <name> <text>    replace a file's content
  append <name> <text>   append to a file
  read <name>            print a file's content
  rm <name>              remove a file or directory tree
  stat <name>            show type, size and head cluster
  fsck                   check volume consistency
  help                   show this message
  exit                   leave the shell
";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Cd(String),
    Ls,
    Mkdir(String),
    Mkfile(String),
    Write { name: String, text: String },
    Append { name: String, text: String },
    Read(String),
    Rm(String),
    Stat(String),
    Fsck,
    Help,
    Exit,
}

impl Command {
    /// Parses one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();
        let command = match (verb, args.as_slice()) {
            ("ls", []) => Self::Ls,
            ("fsck", []) => Self::Fsck,
            ("help" | "--help", []) => Self::Help,
            ("exit", []) => Self::Exit,
            ("cd", [dir]) => Self::Cd(dir.to_string()),
            ("mkdir", [name]) => Self::Mkdir(name.to_string()),
            ("mkfile", [name]) => Self::Mkfile(name.to_string()),
            ("read", [name]) => Self::Read(name.to_string()),
            ("rm", [name]) => Self::Rm(name.to_string()),
            ("stat", [name]) => Self::Stat(name.to_string()),
            ("write", [name, text @ ..]) if !text.is_empty() => Self::Write {
                name: name.to_string(),
                text: text.join(" "),
            },
            ("append", [name, text @ ..]) if !text.is_empty() => Self::Append {
                name: name.to_string(),
                text: text.join(" "),
            },
            (
                "ls" | "fsck" | "help" | "--help" | "exit" | "cd" | "mkdir" | "mkfile" | "read"
                | "rm" | "stat" | "write" | "append",
                _,
            ) => bail!("incorrect args count for {verb}, use help to check command parameters"),
            _ => bail!("unknown command: {verb}"),
        };
        Ok(Some(command))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Interactive session state: just the working directory.
pub struct Shell {
    cwd: VPath,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell {
    pub fn new() -> Self {
        Self { cwd: VPath::root() }
    }

    pub fn cwd(&self) -> &VPath {
        &self.cwd
    }

    pub fn prompt(&self) -> String {
        if self.cwd.is_root() {
            "/ >".to_string()
        } else {
            format!("{}/ >", self.cwd)
        }
    }

    /// Runs one line. A failing command is reported on `out` and the session goes on.
    pub fn run_line<S: ByteStorage, W: Write>(
        &mut self,
        fs: &mut FatFs<S>,
        line: &str,
        out: &mut W,
    ) -> io::Result<Flow> {
        let result = Command::parse(line).and_then(|command| match command {
            Some(command) => self.execute(fs, command, out),
            None => Ok(Flow::Continue),
        });
        match result {
            Ok(flow) => Ok(flow),
            Err(err) => {
                writeln!(out, "command execution failed")?;
                writeln!(out, "{err:#}")?;
                Ok(Flow::Continue)
            }
        }
    }

    fn execute<S: ByteStorage, W: Write>(
        &mut self,
        fs: &mut FatFs<S>,
        command: Command,
        out: &mut W,
    ) -> Result<Flow> {
        match command {
            Command::Cd(dir) => {
                let target = match dir.as_str() {
                    ".." => self.cwd.parent(),
                    absolute if absolute.starts_with('/') => VPath::parse(absolute)?,
                    name => self.cwd.child(name)?,
                };
                if fs.is_directory(&target)? {
                    self.cwd = target;
                } else {
                    writeln!(out, "directory {target} does not exist")?;
                }
            }
            Command::Ls => {
                let names = fs.list_children(&self.cwd)?;
                writeln!(out, "{}", names.join(" "))?;
            }
            Command::Mkdir(name) => {
                fs.create_directory(&self.cwd, &name)?;
            }
            Command::Mkfile(name) => {
                fs.create_file(&self.cwd, &name)?;
            }
            Command::Write { name, text } => {
                fs.write_str(&self.cwd.child(&name)?, &text)?;
            }
            Command::Append { name, text } => {
                let path = self.cwd.child(&name)?;
                let end = fs.metadata(&path)?.size;
                fs.write_at(&path, end, text.as_bytes())?;
            }
            Command::Read(name) => {
                let text = fs.read_as_string(&self.cwd.child(&name)?)?;
                writeln!(out, "{text}")?;
            }
            Command::Rm(name) => {
                fs.remove_file(&self.cwd.child(&name)?)?;
            }
            Command::Stat(name) => {
                let path = self.cwd.child(&name)?;
                let meta = fs.metadata(&path)?;
                let kind = match meta.file_type {
                    FileType::File => "file",
                    FileType::Dir => "directory",
                };
                writeln!(
                    out,
                    "{path}: {kind}, {} bytes, cluster {}",
                    meta.size, meta.cluster
                )?;
            }
            Command::Fsck => {
                let report = fs.check()?;
                writeln!(
                    out,
                    "entries {} used {} free {} leaked {} stale {}",
                    report.entries,
                    report.used_clusters,
                    report.free_clusters,
                    report.leaked.len(),
                    report.stale_links.len()
                )?;
            }
            Command::Help => out.write_all(HELP_TEXT.as_bytes())?,
            Command::Exit => return Ok(Flow::Exit),
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fatstore::{FormatOptions, MemStorage};

    fn volume() -> FatFs<MemStorage> {
        let options = FormatOptions::new().cluster_count(64).cluster_size(128);
        FatFs::format(MemStorage::new(), options).unwrap()
    }

    fn run(shell: &mut Shell, fs: &mut FatFs<MemStorage>, line: &str) -> String {
        let mut out = Vec::new();
        shell.run_line(fs, line, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn parse_commands() {
        assert_eq!(Command::parse("").unwrap(), None);
        assert_eq!(Command::parse("   ").unwrap(), None);
        assert_eq!(Command::parse("ls").unwrap(), Some(Command::Ls));
        assert_eq!(
            Command::parse("  mkdir   docs ").unwrap(),
            Some(Command::Mkdir("docs".into()))
        );
        assert_eq!(
            Command::parse("write note hello  world").unwrap(),
            Some(Command::Write {
                name: "note".into(),
                text: "hello world".into()
            })
        );
        assert!(Command::parse("ls extra").is_err());
        assert!(Command::parse("write note").is_err());
        assert!(Command::parse("cd").is_err());
        let err = Command::parse("format c").unwrap_err();
        assert_eq!(err.to_string(), "unknown command: format");
    }

    #[test]
    fn session_round_trip() {
        let mut fs = volume();
        let mut shell = Shell::new();
        assert_eq!(shell.prompt(), "/ >");
        assert_eq!(run(&mut shell, &mut fs, "mkdir docs"), "");
        run(&mut shell, &mut fs, "cd docs");
        assert_eq!(shell.prompt(), "/docs/ >");
        run(&mut shell, &mut fs, "mkfile note");
        run(&mut shell, &mut fs, "write note hi there");
        assert_eq!(run(&mut shell, &mut fs, "read note"), "hi there\n");
        run(&mut shell, &mut fs, "append note !");
        assert_eq!(run(&mut shell, &mut fs, "read note"), "hi there!\n");
        assert_eq!(
            run(&mut shell, &mut fs, "stat note"),
            "/docs/note: file, 9 bytes, cluster 2\n"
        );
        run(&mut shell, &mut fs, "cd ..");
        assert!(shell.cwd().is_root());
        assert_eq!(run(&mut shell, &mut fs, "ls"), "docs\n");
        run(&mut shell, &mut fs, "rm docs");
        assert_eq!(run(&mut shell, &mut fs, "ls"), "\n");
        assert_eq!(
            run(&mut shell, &mut fs, "fsck"),
            "entries 1 used 1 free 63 leaked 0 stale 0\n"
        );
    }

    #[test]
    fn failures_keep_the_session() {
        let mut fs = volume();
        let mut shell = Shell::new();
        let out = run(&mut shell, &mut fs, "read missing");
        assert!(out.starts_with("command execution failed\nnot found: /missing"));
        let out = run(&mut shell, &mut fs, "mkdir bad.name");
        assert!(out.starts_with("command execution failed\n"));
        let out = run(&mut shell, &mut fs, "frobnicate");
        assert!(out.contains("unknown command"));

        run(&mut shell, &mut fs, "mkfile plain");
        let out = run(&mut shell, &mut fs, "cd plain");
        assert_eq!(out, "directory /plain does not exist\n");
        assert!(shell.cwd().is_root());
    }

    #[test]
    fn exit_ends_the_loop() {
        let mut fs = volume();
        let mut shell = Shell::new();
        let mut out = Vec::new();
        assert_eq!(
            shell.run_line(&mut fs, "exit", &mut out).unwrap(),
            Flow::Exit
        );
        assert_eq!(
            shell.run_line(&mut fs, "help", &mut out).unwrap(),
            Flow::Continue
        );
        assert!(String::from_utf8(out).unwrap().starts_with("commands:"));
    }
}
