// Copyright 2025 The drover authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tests for the command-building surface of the runner.

use drover::runner::{command_line, wrap_elevated, CommandOutput};

#[test]
fn command_line_joins_arguments_with_single_spaces() {
    assert_eq!(
        command_line(&["systemctl", "restart", "nginx"]),
        "systemctl restart nginx"
    );
    assert_eq!(command_line(&["uptime"]), "uptime");
    assert_eq!(command_line::<&str>(&[]), "");
}

#[test]
fn elevation_prefix_reads_secret_from_stdin() {
    let wrapped = wrap_elevated("apt-get update");
    assert_eq!(wrapped, "sudo -S -p '' apt-get update");
    // -S reads from stdin, the empty -p suppresses the prompt.
    assert!(wrapped.starts_with("sudo -S -p ''"));
}

#[test]
fn command_output_lossy_accessors() {
    let output = CommandOutput {
        exit_code: 2,
        stdout: b"partial\n".to_vec(),
        stderr: b"no such file".to_vec(),
    };
    assert_eq!(output.stdout_lossy(), "partial\n");
    assert_eq!(output.stderr_lossy(), "no such file");
}
