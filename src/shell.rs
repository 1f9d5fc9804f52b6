//! Command line front end of the engine.
//!
//! One line is one command: the first word names it, the remaining
//! whitespace separated words are its arguments. The interactive loop and
//! `load` scripts go through the same dispatcher, results are written to
//! `out` and one line per failure to `err`.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::{BlockDevice, Error as FsError, FileSystem};

/// Every command with its usage line, in the order `help` prints them.
const USAGE: &[(&str, &str)] = &[
    ("format", "format <size><unit>"),
    ("mkdir", "mkdir <path>"),
    ("rmdir", "rmdir <path>"),
    ("cd", "cd <path>"),
    ("ls", "ls [path]"),
    ("pwd", "pwd"),
    ("rm", "rm <path>"),
    ("cat", "cat <path>"),
    ("info", "info <path>"),
    ("incp", "incp <host-src> <dest>"),
    ("outcp", "outcp <src> <host-dest>"),
    ("cp", "cp <src> <dest>"),
    ("mv", "mv <src> <dest>"),
    ("bug", "bug <path>"),
    ("check", "check"),
    ("load", "load <script>"),
    ("help", "help"),
    ("exit", "exit"),
];

fn usage_of(name: &str) -> Option<&'static str> {
    USAGE.iter().find(|(n, _)| *n == name).map(|(_, u)| *u)
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Unknown command: {0}")]
    Unknown(String),
    #[error("Scripts cannot load other scripts")]
    NestedLoad,
    #[error(transparent)]
    Fs(#[from] FsError),
    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Format(String),
    Mkdir(String),
    Rmdir(String),
    Cd(String),
    Ls(Option<String>),
    Pwd,
    Rm(String),
    Cat(String),
    Info(String),
    Incp(String, String),
    Outcp(String, String),
    Cp(String, String),
    Mv(String, String),
    Bug(String),
    Check,
    Load(String),
    Help,
    Exit,
}

impl Command {
    /// Parses one line. Blank lines and `#` comments parse to `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, ShellError> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };
        if name.starts_with('#') {
            return Ok(None);
        }
        let args: Vec<String> = words.map(str::to_string).collect();

        use Command::*;
        let command = match (name, args.as_slice()) {
            ("format", [size]) => Format(size.clone()),
            ("mkdir", [path]) => Mkdir(path.clone()),
            ("rmdir", [path]) => Rmdir(path.clone()),
            ("cd", [path]) => Cd(path.clone()),
            ("ls", []) => Ls(None),
            ("ls", [path]) => Ls(Some(path.clone())),
            ("pwd", []) => Pwd,
            ("rm", [path]) => Rm(path.clone()),
            ("cat", [path]) => Cat(path.clone()),
            ("info", [path]) => Info(path.clone()),
            ("incp", [src, dest]) => Incp(src.clone(), dest.clone()),
            ("outcp", [src, dest]) => Outcp(src.clone(), dest.clone()),
            ("cp", [src, dest]) => Cp(src.clone(), dest.clone()),
            ("mv", [src, dest]) => Mv(src.clone(), dest.clone()),
            ("bug", [path]) => Bug(path.clone()),
            ("check", []) => Check,
            ("load", [script]) => Load(script.clone()),
            ("help", []) => Help,
            ("exit", []) => Exit,
            (name, _) => {
                return Err(match usage_of(name) {
                    Some(usage) => ShellError::Usage(usage),
                    None => ShellError::Unknown(name.to_string()),
                });
            }
        };
        Ok(Some(command))
    }

    /// Commands that make sense on an image whose check found damage.
    fn allowed_when_corrupted(&self) -> bool {
        use Command::*;
        matches!(self, Format(_) | Check | Info(_) | Ls(_) | Pwd | Help | Exit)
    }

    /// Commands that do not need a formatted image.
    fn allowed_when_unformatted(&self) -> bool {
        use Command::*;
        matches!(self, Format(_) | Load(_) | Help | Exit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Holds the engine between commands.
/// Before the first `format` of a fresh device there is no engine at all.
pub struct Shell<D: BlockDevice> {
    device: Arc<D>,
    fs: Option<FileSystem<D>>,
    in_script: bool,
}

impl<D: BlockDevice> Shell<D> {
    /// A shell over a device that has not been formatted yet.
    pub fn new(device: Arc<D>) -> Self {
        Self {
            device,
            fs: None,
            in_script: false,
        }
    }

    /// Mounts the device if it already holds an image,
    /// otherwise starts unformatted.
    pub fn open(device: Arc<D>) -> Result<Self, FsError> {
        let fs = if device.exists() {
            Some(FileSystem::mount(Arc::clone(&device))?)
        } else {
            None
        };
        Ok(Self {
            device,
            fs,
            in_script: false,
        })
    }

    pub fn engine(&self) -> Option<&FileSystem<D>> {
        self.fs.as_ref()
    }

    pub fn prompt(&self) -> String {
        match &self.fs {
            Some(fs) => format!("{}>", fs.pwd()),
            None => ">".to_string(),
        }
    }

    /// Parses and runs one line, reporting any failure on `err`.
    /// Only a failing `err` itself is returned.
    pub fn execute(
        &mut self,
        line: &str,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> std::io::Result<Flow> {
        let result = match Command::parse(line) {
            Ok(Some(command)) => self.run(command, &mut *out, &mut *err),
            Ok(None) => Ok(Flow::Continue),
            Err(e) => Err(e),
        };
        match result {
            Ok(flow) => Ok(flow),
            Err(e) => {
                log::debug!("{:?} failed: {}", line.trim(), e);
                writeln!(err, "{}", e)?;
                Ok(Flow::Continue)
            }
        }
    }

    pub fn run(
        &mut self,
        command: Command,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<Flow, ShellError> {
        match &self.fs {
            None if !command.allowed_when_unformatted() => {
                return Err(FsError::Unformatted.into());
            }
            Some(fs) if fs.is_corrupted() && !command.allowed_when_corrupted() => {
                return Err(FsError::CorruptedImage(
                    "only format, check, info, ls and pwd are available".to_string(),
                )
                .into());
            }
            _ => {}
        }

        match command {
            Command::Format(size) => {
                match FileSystem::format(Arc::clone(&self.device), &size) {
                    Ok(fs) => self.fs = Some(fs),
                    // a bad size is rejected before the device is touched
                    Err(e @ FsError::InvalidSize(_)) => return Err(e.into()),
                    Err(e) => {
                        // whatever the old engine describes is gone from the device
                        self.fs = None;
                        return Err(e.into());
                    }
                }
                writeln!(out, "OK")?;
            }
            Command::Load(script) => {
                self.load(&script, out, err)?;
            }
            Command::Help => {
                for (_, usage) in USAGE {
                    writeln!(out, "{}", usage)?;
                }
            }
            Command::Exit => return Ok(Flow::Exit),
            command => {
                let fs = self.fs.as_mut().ok_or(FsError::Unformatted)?;
                dispatch(fs, command, out)?;
            }
        }
        Ok(Flow::Continue)
    }

    /// Runs every line of a host script through `execute`.
    /// `exit` stops the script, not the shell.
    pub fn load(
        &mut self,
        script: impl AsRef<Path>,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<(), ShellError> {
        if self.in_script {
            return Err(ShellError::NestedLoad);
        }
        let script = script.as_ref();
        let text = std::fs::read_to_string(script).map_err(|source| FsError::HostIo {
            path: script.display().to_string(),
            source,
        })?;
        log::info!("load {}: {} lines", script.display(), text.lines().count());

        self.in_script = true;
        let mut result = Ok(());
        for line in text.lines() {
            match self.execute(line, out, err) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => break,
                Err(e) => {
                    result = Err(e.into());
                    break;
                }
            }
        }
        self.in_script = false;
        result
    }
}

fn ok(out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "OK")
}

/// Runs a command that needs a mounted engine.
fn dispatch<D: BlockDevice>(
    fs: &mut FileSystem<D>,
    command: Command,
    out: &mut dyn Write,
) -> Result<(), ShellError> {
    match command {
        Command::Mkdir(path) => {
            fs.mkdir(&path)?;
            ok(out)?;
        }
        Command::Rmdir(path) => {
            fs.rmdir(&path)?;
            ok(out)?;
        }
        Command::Cd(path) => {
            fs.cd(&path)?;
            ok(out)?;
        }
        Command::Ls(path) => {
            let entries = fs.ls(path.as_deref())?;
            if entries.is_empty() {
                writeln!(out, "Directory is empty")?;
            }
            for entry in entries {
                writeln!(out, "{}", entry)?;
            }
        }
        Command::Pwd => writeln!(out, "{}", fs.pwd())?,
        Command::Rm(path) => {
            fs.rm(&path)?;
            ok(out)?;
        }
        Command::Cat(path) => {
            let data = fs.cat(&path)?;
            out.write_all(&data)?;
            writeln!(out)?;
        }
        Command::Info(path) => writeln!(out, "{}", fs.info(&path)?)?,
        Command::Incp(src, dest) => {
            fs.copy_in(&src, &dest)?;
            ok(out)?;
        }
        Command::Outcp(src, dest) => {
            fs.copy_out(&src, &dest)?;
            ok(out)?;
        }
        Command::Cp(src, dest) => {
            fs.copy(&src, &dest)?;
            ok(out)?;
        }
        Command::Mv(src, dest) => {
            fs.mv(&src, &dest)?;
            ok(out)?;
        }
        Command::Bug(path) => {
            fs.bug(&path)?;
            ok(out)?;
        }
        Command::Check => {
            let report = fs.check();
            if report.is_clean() {
                writeln!(out, "Filesystem is not corrupted")?;
            } else {
                for path in &report.corrupted_files {
                    writeln!(out, "Corrupted: {}", path)?;
                }
                writeln!(out, "Filesystem is corrupted, use 'format' to reformat the image")?;
            }
        }
        Command::Format(_) | Command::Load(_) | Command::Help | Command::Exit => {
            unreachable!("handled by Shell::run")
        }
    }
    Ok(())
}
