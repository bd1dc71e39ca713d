//! Execution strategies for shell command lines.
//!
//! Every strategy hands the line to `/bin/sh -c`, since callers may embed
//! pre-joined argument strings and output redirection.

use std::io::{self, BufRead, BufReader};
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

const SHELL: &str = "/bin/sh";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status_code: i32,
    pub text: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status_code == 0
    }
}

/// The outcome of one run; which variant is produced depends only on the
/// strategy that was asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    Captured(CommandOutput),
    Status(i32),
    Detached(u32),
}

pub trait CommandRunner {
    /// Runs with stderr merged into stdout, calling `on_line` for each line
    /// (without its terminator) in the order the child wrote them.
    fn capture(
        &self,
        command_line: &str,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<CommandOutput, io::Error>;

    /// Runs with the caller's stdio inherited and returns the exit status.
    fn passthrough(&self, command_line: &str) -> Result<i32, io::Error>;

    /// Starts the line in its own process group with null stdio and returns
    /// its pid without waiting for it. The child is never left for the
    /// caller to reap.
    fn spawn_detached(&self, command_line: &str) -> Result<u32, io::Error>;
}

pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn capture(
        &self,
        command_line: &str,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<CommandOutput, io::Error> {
        let mut child = Command::new(SHELL)
            .arg("-c")
            .arg(format!("exec 2>&1\n{command_line}"))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "child stdout was not piped"))?;

        let mut reader = BufReader::new(stdout);
        let mut text = String::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            on_line(line.trim_end_matches(['\n', '\r']));
            text.push_str(&line);
        }

        let status = child.wait()?;
        Ok(CommandOutput {
            status_code: status_code(status),
            text,
        })
    }

    fn passthrough(&self, command_line: &str) -> Result<i32, io::Error> {
        let status = Command::new(SHELL)
            .arg("-c")
            .arg(command_line)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()?;
        Ok(status_code(status))
    }

    fn spawn_detached(&self, command_line: &str) -> Result<u32, io::Error> {
        // The intermediate shell backgrounds the line, prints its pid and
        // exits. The orphan is reparented to init, which reaps it.
        let output = Command::new(SHELL)
            .arg("-c")
            .arg(format!(
                "{{ {command_line}\n}} </dev/null >/dev/null 2>&1 &\necho $!"
            ))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .process_group(0)
            .output()?;
        let text = String::from_utf8_lossy(&output.stdout);
        text.trim().parse::<u32>().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("detached shell did not report a pid: {:?}", text.trim()),
            )
        })
    }
}

fn status_code(status: std::process::ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or(if status.success() { 0 } else { 1 })
}

/// Escapes one token for a POSIX shell. Tokens made only of safe characters
/// are left alone; everything else is single-quoted.
/// Example: foo'bar -> 'foo'\''bar'
pub fn shell_escape(value: &str) -> String {
    if value.is_empty() {
        return "''".to_string();
    }
    let safe = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "_-.,:/@+=%".contains(c));
    if safe {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum RecordedCall {
        Capture(String),
        Passthrough(String),
        Detached(String),
    }

    /// Records every command line and replays queued outputs in order.
    #[derive(Default)]
    pub(crate) struct MockRunner {
        calls: RefCell<Vec<RecordedCall>>,
        outputs: RefCell<Vec<CommandOutput>>,
    }

    impl MockRunner {
        pub(crate) fn push_output(&self, status_code: i32, text: &str) {
            self.outputs.borrow_mut().push(CommandOutput {
                status_code,
                text: text.to_string(),
            });
        }

        pub(crate) fn calls(&self) -> Vec<RecordedCall> {
            self.calls.borrow().clone()
        }

        fn next_output(&self) -> CommandOutput {
            let mut queued = self.outputs.borrow_mut();
            if queued.is_empty() {
                return CommandOutput {
                    status_code: 0,
                    text: String::new(),
                };
            }
            queued.remove(0)
        }
    }

    impl CommandRunner for MockRunner {
        fn capture(
            &self,
            command_line: &str,
            on_line: &mut dyn FnMut(&str),
        ) -> Result<CommandOutput, io::Error> {
            self.calls
                .borrow_mut()
                .push(RecordedCall::Capture(command_line.to_string()));
            let output = self.next_output();
            for line in output.text.lines() {
                on_line(line);
            }
            Ok(output)
        }

        fn passthrough(&self, command_line: &str) -> Result<i32, io::Error> {
            self.calls
                .borrow_mut()
                .push(RecordedCall::Passthrough(command_line.to_string()));
            Ok(self.next_output().status_code)
        }

        fn spawn_detached(&self, command_line: &str) -> Result<u32, io::Error> {
            self.calls
                .borrow_mut()
                .push(RecordedCall::Detached(command_line.to_string()));
            Ok(4242)
        }
    }

    #[test]
    fn shell_escape_leaves_safe_tokens() {
        assert_eq!(shell_escape("-windowType"), "-windowType");
        assert_eq!(shell_escape("/usr/sbin/jamf"), "/usr/sbin/jamf");
    }

    #[test]
    fn shell_escape_quotes_spaces_and_quotes() {
        assert_eq!(shell_escape("Hello world"), "'Hello world'");
        assert_eq!(shell_escape("foo'bar"), "'foo'\\''bar'");
        assert_eq!(shell_escape(""), "''");
    }

    #[test]
    fn capture_merges_stderr_and_preserves_line_order() {
        let mut seen = Vec::new();
        let output = SystemRunner
            .capture("echo one; echo two 1>&2; echo three; exit 3", &mut |line| {
                seen.push(line.to_string())
            })
            .expect("capture");
        assert_eq!(seen, vec!["one", "two", "three"]);
        assert_eq!(output.text, "one\ntwo\nthree\n");
        assert_eq!(output.status_code, 3);
        assert!(!output.success());
    }

    #[test]
    fn passthrough_returns_exit_status() {
        assert_eq!(SystemRunner.passthrough("exit 7").expect("status"), 7);
    }

    #[test]
    fn spawn_detached_returns_pid_without_waiting() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("done");
        let line = format!("sleep 0.2; touch {}", shell_escape(&marker.to_string_lossy()));
        let pid = SystemRunner.spawn_detached(&line).expect("spawn");
        assert!(pid > 0);
        assert!(!marker.exists());
        for _ in 0..50 {
            if marker.exists() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
        assert!(marker.exists());
    }

    #[test]
    fn spawn_detached_keeps_redirection_in_the_line() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let line = format!("echo 2 > {}", shell_escape(&out.to_string_lossy()));
        SystemRunner.spawn_detached(&line).expect("spawn");
        for _ in 0..50 {
            if fs::read_to_string(&out).map(|s| s == "2\n").unwrap_or(false) {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
        panic!("detached output never reached {}", out.display());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn detached_child_is_not_left_as_our_zombie() {
        let pid = SystemRunner.spawn_detached("exit 0").expect("spawn");
        std::thread::sleep(std::time::Duration::from_millis(500));
        // Gone entirely, or at least no longer our child to reap.
        let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat")) else {
            return;
        };
        let after_name = &stat[stat.rfind(')').expect("stat comm field") + 1..];
        let fields: Vec<&str> = after_name.split_whitespace().collect();
        let parent: u32 = fields[1].parse().expect("ppid");
        assert_ne!(parent, std::process::id(), "state {}", fields[0]);
    }
}
