//! GUID tool backed by an external encoder program.
//!
//! The program is run as `<command> <args..> -e|-d -o <output> <input>`, with `-e` to encode and `-d` to decode.
//! Input and output are exchanged through files in the system temporary directory.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use patina_ffs_editor::{FvEditError, GuidTool};
use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
    sync::atomic::{AtomicUsize, Ordering},
};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Encode,
    Decode,
}

impl Direction {
    fn flag(self) -> &'static str {
        match self {
            Direction::Encode => "-e",
            Direction::Decode => "-d",
        }
    }

    fn error(self) -> FvEditError {
        match self {
            Direction::Encode => FvEditError::ComposeFailed,
            Direction::Decode => FvEditError::DataCorrupt,
        }
    }
}

/// [`GuidTool`] that runs an external program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalGuidTool {
    command: String,
    args: Vec<String>,
}

impl ExternalGuidTool {
    /// Tool running `command` with `args` placed before the direction and file arguments.
    pub fn new(command: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { command: command.into(), args: args.into_iter().map(Into::into).collect() }
    }

    /// Program run for each encode or decode.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Arguments passed ahead of the direction flag.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn run(&self, direction: Direction, data: &[u8]) -> Result<Vec<u8>, FvEditError> {
        let (input, output) = temp_paths();
        let result = self.run_with_files(direction, data, &input, &output);
        let _ = fs::remove_file(&input);
        let _ = fs::remove_file(&output);
        result
    }

    fn run_with_files(
        &self,
        direction: Direction,
        data: &[u8],
        input: &Path,
        output: &Path,
    ) -> Result<Vec<u8>, FvEditError> {
        fs::write(input, data).map_err(|err| {
            log::error!("cannot write GUID tool input {}: {err}", input.display());
            direction.error()
        })?;

        log::debug!("running GUID tool {} {:?} {}", self.command, self.args, direction.flag());
        let status = Command::new(&self.command)
            .args(&self.args)
            .arg(direction.flag())
            .arg("-o")
            .arg(output)
            .arg(input)
            .status()
            .map_err(|err| {
                log::error!("cannot start GUID tool {}: {err}", self.command);
                direction.error()
            })?;
        if !status.success() {
            log::error!("GUID tool {} exited with {status}", self.command);
            Err(direction.error())?;
        }

        fs::read(output).map_err(|err| {
            log::error!("cannot read GUID tool output {}: {err}", output.display());
            direction.error()
        })
    }
}

impl GuidTool for ExternalGuidTool {
    fn pack(&self, data: &[u8]) -> Result<Vec<u8>, FvEditError> {
        self.run(Direction::Encode, data)
    }

    fn unpack(&self, data: &[u8]) -> Result<Vec<u8>, FvEditError> {
        self.run(Direction::Decode, data)
    }
}

fn temp_paths() -> (PathBuf, PathBuf) {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let stem = format!("fv_guid_tool_{}_{id}", std::process::id());
    let dir = std::env::temp_dir();
    (dir.join(format!("{stem}.in")), dir.join(format!("{stem}.out")))
}

#[cfg(all(test, unix))]
mod test {
    use super::*;

    // `sh -c` binds the trailing arguments to $0..: name, direction, -o, output, input.
    fn shell_tool(script: &str) -> ExternalGuidTool {
        ExternalGuidTool::new("sh", ["-c", script, "guid_tool"])
    }

    #[test]
    fn pack_should_return_program_output() -> Result<(), FvEditError> {
        let tool = shell_tool(r#"{ printf 'X'; cat "$4"; } > "$3""#);
        assert_eq!(tool.pack(b"abc")?, b"Xabc");
        Ok(())
    }

    #[test]
    fn direction_flag_should_follow_operation() -> Result<(), FvEditError> {
        let tool = shell_tool(r#"printf '%s' "$1" > "$3""#);
        assert_eq!(tool.pack(&[])?, b"-e");
        assert_eq!(tool.unpack(&[])?, b"-d");
        Ok(())
    }

    #[test]
    fn failures_should_map_by_direction() {
        let failing = shell_tool("exit 3");
        assert_eq!(failing.pack(&[1]), Err(FvEditError::ComposeFailed));
        assert_eq!(failing.unpack(&[1]), Err(FvEditError::DataCorrupt));

        let missing = ExternalGuidTool::new("/nonexistent/guid_tool", Vec::<String>::new());
        assert_eq!(missing.pack(&[1]), Err(FvEditError::ComposeFailed));
    }

    #[test]
    fn temp_files_should_be_removed() -> Result<(), FvEditError> {
        let tool = shell_tool(r#"printf '%s\n%s' "$4" "$3" > "$3""#);
        let paths = String::from_utf8(tool.pack(&[7; 16])?).map_err(|_| FvEditError::DataCorrupt)?;
        let paths: Vec<&str> = paths.lines().collect();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|path| !Path::new(path).exists()));
        Ok(())
    }
}
