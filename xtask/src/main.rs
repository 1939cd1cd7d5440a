// Copyright 2025 ScopeDB <contact@scopedb.io>
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

use std::process::Command as StdCommand;

use clap::Parser;
use clap::Subcommand;

const CARGO_WORKSPACE_DIR: &str = env!("CARGO_WORKSPACE_DIR");

#[derive(Parser)]
#[clap(version)]
struct Command {
    #[clap(subcommand)]
    sub: SubCommand,
}

impl Command {
    fn run(self) {
        match self.sub {
            SubCommand::Build(cmd) => cmd.run(),
            SubCommand::Lint(cmd) => cmd.run(),
            SubCommand::Test(cmd) => cmd.run(),
            SubCommand::Bench(cmd) => cmd.run(),
        }
    }
}

#[derive(Subcommand)]
enum SubCommand {
    #[clap(about = "Compile workspace packages.")]
    Build(CommandBuild),
    #[clap(about = "Run format and clippy checks.")]
    Lint(CommandLint),
    #[clap(about = "Run unit and behavior tests.")]
    Test(CommandTest),
    #[clap(about = "Run the ring benchmarks.")]
    Bench(CommandBench),
}

#[derive(Parser)]
struct CommandBuild {
    #[arg(long, help = "Assert that `Cargo.lock` will remain unchanged.")]
    locked: bool,
    #[arg(long, help = "Build all the tests and benches in the workspace.")]
    all: bool,
}

impl CommandBuild {
    fn run(self) {
        run_command(make_build_cmd(self.locked, self.all));
    }
}

#[derive(Parser)]
struct CommandTest {
    #[arg(long, help = "Run tests serially and do not capture output.")]
    no_capture: bool,
    #[arg(long, help = "Update inline snapshots that no longer match.")]
    accept: bool,
}

impl CommandTest {
    fn run(self) {
        run_command(make_test_cmd(self.no_capture, self.accept));
        run_command(make_doc_test_cmd());
    }
}

#[derive(Parser)]
struct CommandBench {
    #[arg(help = "Only run benchmarks whose name matches this filter.")]
    filter: Option<String>,
}

impl CommandBench {
    fn run(self) {
        run_command(make_bench_cmd(self.filter.as_deref()));
    }
}

#[derive(Parser)]
#[clap(name = "lint")]
struct CommandLint {
    #[arg(long, help = "Automatically apply lint suggestions.")]
    fix: bool,
}

impl CommandLint {
    fn run(self) {
        if self.fix {
            run_command(make_format_cmd(true));
            run_command(make_taplo_cmd(true));
            // cannot fix; but still report errors because developers often call
            // 'cargo x lint --fix' only during developing
            run_command(make_typos_cmd());
            run_command(make_clippy_cmd(true));
            run_command(make_format_cmd(true));
        } else {
            run_command(make_taplo_cmd(false));
            run_command(make_typos_cmd());
            run_command(make_format_cmd(false));
            run_command(make_clippy_cmd(false));
        }
    }
}

fn find_command(cmd: &str) -> StdCommand {
    let output = StdCommand::new("which")
        .arg(cmd)
        .output()
        .expect("broken command: which");
    if output.status.success() {
        let result = String::from_utf8_lossy(&output.stdout);
        let mut cmd = StdCommand::new(result.trim());
        cmd.current_dir(CARGO_WORKSPACE_DIR);
        cmd
    } else {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!("{cmd} not found.\nstdout: {}\nstderr: {}", stdout, stderr);
    }
}

fn ensure_installed(bin: &str, crate_name: &str) {
    let output = StdCommand::new("which")
        .arg(bin)
        .output()
        .expect("broken command: which");
    if !output.status.success() {
        let mut cmd = find_command("cargo");
        cmd.args(["install", crate_name]);
        run_command(cmd);
    }
}

fn run_command(mut cmd: StdCommand) {
    println!("{cmd:?}");
    let status = cmd.status().expect("failed to execute process");
    assert!(status.success(), "command failed: {status}");
}

fn make_build_cmd(locked: bool, all: bool) -> StdCommand {
    let mut cmd = find_command("cargo");
    cmd.args(["build", "--workspace", "--all-features"]);
    if all {
        cmd.args(["--tests", "--benches"]);
    }
    if locked {
        cmd.arg("--locked");
    }
    cmd
}

fn make_test_cmd(no_capture: bool, accept: bool) -> StdCommand {
    ensure_installed("cargo-nextest", "cargo-nextest");
    let mut cmd = find_command("cargo");
    cmd.args(["nextest", "run", "--workspace"]);
    if no_capture {
        cmd.arg("--no-capture");
    }
    if accept {
        cmd.env("INSTA_UPDATE", "always");
    }
    cmd
}

// nextest does not run doctests
fn make_doc_test_cmd() -> StdCommand {
    let mut cmd = find_command("cargo");
    cmd.args(["test", "--workspace", "--doc"]);
    cmd
}

fn make_bench_cmd(filter: Option<&str>) -> StdCommand {
    let mut cmd = find_command("cargo");
    cmd.args(["bench", "--package", "shardring"]);
    if let Some(filter) = filter {
        cmd.args(["--", filter]);
    }
    cmd
}

fn make_format_cmd(fix: bool) -> StdCommand {
    let mut cmd = find_command("cargo");
    cmd.args(["fmt", "--all"]);
    if !fix {
        cmd.arg("--check");
    }
    cmd
}

fn make_clippy_cmd(fix: bool) -> StdCommand {
    let mut cmd = find_command("cargo");
    cmd.args([
        "clippy",
        "--tests",
        "--all-features",
        "--all-targets",
        "--workspace",
    ]);
    if fix {
        cmd.args(["--fix", "--allow-staged", "--allow-dirty"]);
    } else {
        cmd.args(["--", "-D", "warnings"]);
    }
    cmd
}

fn make_typos_cmd() -> StdCommand {
    ensure_installed("typos", "typos-cli");
    find_command("typos")
}

fn make_taplo_cmd(fix: bool) -> StdCommand {
    ensure_installed("taplo", "taplo-cli");
    let mut cmd = find_command("taplo");
    if fix {
        cmd.args(["format"]);
    } else {
        cmd.args(["format", "--check"]);
    }
    cmd
}

fn main() {
    let cmd = Command::parse();
    cmd.run()
}
