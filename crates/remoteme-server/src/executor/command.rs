//! Command-line construction for both execution modes.
//!
//! This is the only place that decides how client text reaches an
//! interpreter. `Terminal` text is handed verbatim to the shell as its `-c`
//! script, so anything a connected client sends runs with the server's
//! privileges; the relay has no authentication in front of it. `Agent` text
//! never passes through a shell and is written to the agent's stdin instead.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use remoteme_core::config::ExecutorConfig;
use remoteme_core::protocol::{CommandRequest, Mode};

/// A configured child command plus the bytes to feed its stdin, if any.
#[derive(Debug)]
pub struct PreparedCommand {
    pub command: Command,
    pub stdin: Option<Vec<u8>>,
}

/// Build the child command for `request`, rooted at `working_dir`.
pub fn build(request: &CommandRequest, config: &ExecutorConfig, working_dir: &Path) -> PreparedCommand {
    let (mut command, stdin) = match request.mode {
        Mode::Terminal => {
            let mut command = Command::new(&config.shell);
            command.arg("-c").arg(&request.message);
            (command, None)
        }
        Mode::Agent => {
            let mut command = Command::new(&config.agent_bin);
            command.args(&config.agent_args);
            (command, Some(agent_input(&request.message)))
        }
    };

    command
        .current_dir(working_dir)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    PreparedCommand { command, stdin }
}

/// The agent reads one prompt line from stdin.
fn agent_input(message: &str) -> Vec<u8> {
    let mut input = message.as_bytes().to_vec();
    if !message.ends_with('\n') {
        input.push(b'\n');
    }
    input
}
