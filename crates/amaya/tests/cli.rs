//! CLI integration tests.
//!
//! These run the built binary end-to-end with an isolated home directory,
//! so no user configuration or API key leaks in.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

struct Sandbox {
    home: TempDir,
    project: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            home: TempDir::new().expect("Failed to create home dir"),
            project: TempDir::new().expect("Failed to create project dir"),
        }
    }

    fn project(&self) -> &Path {
        self.project.path()
    }

    fn write_config(&self, content: &str) {
        fs::write(self.project().join("amaya.jsonc"), content).expect("Failed to write config");
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_amaya"));
        cmd.current_dir(self.project())
            .env("HOME", self.home.path())
            .env("XDG_CONFIG_HOME", self.home.path().join(".config"))
            .env("XDG_DATA_HOME", self.home.path().join(".local/share"))
            .env_remove("AMAYA_CONFIG_CONTENT")
            .env_remove("OPENAI_API_KEY")
            .env_remove("ANTHROPIC_API_KEY")
            .env_remove("GEMINI_API_KEY")
            .env_remove("RUST_LOG");
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.command()
            .args(args)
            .output()
            .expect("Failed to execute command")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_version_command() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["version"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains(&format!("amaya {}", env!("CARGO_PKG_VERSION"))));
}

#[test]
fn test_help_command() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["--help"]);

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("Agentic tool-execution runtime"));
    for command in ["run", "tools", "mcp", "config", "version"] {
        assert!(out.contains(command), "help is missing {command}");
    }
}

#[test]
fn test_run_help_lists_overrides() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["run", "--help"]);

    assert!(output.status.success());
    let out = stdout(&output);
    for flag in ["--provider", "--model", "--root", "--max-iterations", "--conversation"] {
        assert!(out.contains(flag), "run help is missing {flag}");
    }
}

#[test]
fn test_tools_command() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["tools"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Local tools:"));
    assert!(out.contains("read_file"));
    assert!(out.contains("run_shell"));
    assert!(out.contains("invoke_subagents"));
    assert!(!out.contains("MCP tools:"));
}

#[test]
fn test_tools_command_marks_ungranted_tools() {
    let sandbox = Sandbox::new();
    sandbox.write_config(r#"{ "capabilities": ["filesystem_read"] }"#);
    let output = sandbox.run(&["tools"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    let shell = out
        .lines()
        .find(|l| l.trim_start().starts_with("run_shell"))
        .expect("run_shell listed");
    assert!(shell.contains("not granted"));
    // Delegation is not granted, so the tool is never registered.
    assert!(!out.contains("invoke_subagents"));
}

#[test]
fn test_mcp_command_without_servers() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["mcp"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("No MCP servers configured"));
}

#[test]
fn test_mcp_command_reports_unreachable_server() {
    let sandbox = Sandbox::new();
    sandbox.write_config(
        r#"{
            // Nothing listens here.
            "mcp_servers": {
                "docs": { "url": "http://127.0.0.1:9/mcp" },
                "off": { "url": "http://127.0.0.1:9/mcp", "enabled": false }
            }
        }"#,
    );
    let output = sandbox.run(&["mcp"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    let docs = out.lines().find(|l| l.contains("docs")).expect("docs listed");
    assert!(docs.contains("failed"));
    let off = out.lines().find(|l| l.contains("off")).expect("off listed");
    assert!(off.contains("disabled"));
}

#[test]
fn test_config_command_defaults() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["config"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Configuration sources:"));
    assert!(out.contains("(none)"));
    assert!(out.contains(r#""max_loop_iterations": 10"#));
    assert!(out.contains(r#""max_recursion_depth": 1"#));
    assert!(out.contains(r#""api_key": "(not set)""#));
}

#[test]
fn test_config_command_masks_api_key() {
    let sandbox = Sandbox::new();
    sandbox.write_config(
        r#"{
            "provider": "anthropic",
            "api_key": "sk-ant-secret-987654",
            "max_loop_iterations": 6
        }"#,
    );
    let output = sandbox.run(&["config"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("amaya.jsonc"));
    assert!(out.contains(r#""provider": "anthropic""#));
    assert!(out.contains(r#""max_loop_iterations": 6"#));
    assert!(!out.contains("sk-ant-secret-987654"));
    assert!(out.contains("****7654"));
}

#[test]
fn test_config_flags_override_file() {
    let sandbox = Sandbox::new();
    sandbox.write_config(r#"{ "provider": "anthropic", "max_loop_iterations": 6 }"#);
    let output = sandbox.run(&["config", "--provider", "gemini", "--max-iterations", "2"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains(r#""provider": "gemini""#));
    assert!(out.contains(r#""max_loop_iterations": 2"#));
}

#[test]
fn test_config_environment_content() {
    let sandbox = Sandbox::new();
    let output = sandbox
        .command()
        .arg("config")
        .env("AMAYA_CONFIG_CONTENT", r#"{ "max_subagents": 2 }"#)
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains(r#""max_subagents": 2"#));
}

#[test]
fn test_invalid_config_fails() {
    let sandbox = Sandbox::new();
    sandbox.write_config(r#"{ "max_loop_iterations": 0 }"#);
    let output = sandbox.run(&["config"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("max_loop_iterations"));
}

#[test]
fn test_invalid_provider() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["run", "--provider", "invalid-provider-name", "hello"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("unknown provider"));
}

#[test]
fn test_run_without_message() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["run"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("No message provided"));
}

#[test]
fn test_run_without_api_key() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["run", "--provider", "openai", "list", "files"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("OPENAI_API_KEY"));
}

#[test]
fn test_run_with_missing_root() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["run", "--root", "does/not/exist", "hello"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Project directory does not exist"));
}
