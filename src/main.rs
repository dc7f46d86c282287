mod cli;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use shellgate_core::AppBuilder;
use shellgate_tools::{CommandRequest, ConnectRequest, ExecutionResult, NOT_EXECUTED, Toolbox};

use crate::cli::{Cli, Command, ExecArgs, RemoteArgs};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_subscriber();

    let cli = Cli::parse();
    let app = AppBuilder::new(cli.config.as_deref())?;
    let toolbox = app.build_toolbox().await?;

    match cli.command {
        Command::Exec(args) => run_exec(&toolbox, args).await,
        Command::Remote(args) => run_remote(&toolbox, &args).await,
        Command::Allowed { remote } => {
            let listed = if remote {
                toolbox.remote().list_allowed_commands()
            } else {
                toolbox.local().list_allowed_commands()
            };
            for line in listed {
                println!("{line}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Tools => {
            let json = serde_json::to_string_pretty(toolbox.tool_definitions())?;
            println!("{json}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Logs go to stderr so stdout carries only JSON results.
fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_exec(toolbox: &Toolbox, args: ExecArgs) -> anyhow::Result<ExitCode> {
    let mut request = CommandRequest::new(args.command_line());
    if let Some(timeout) = args.timeout {
        request = request.with_timeout(timeout);
    }
    if let Some(cwd) = args.cwd {
        request = request.with_working_directory(cwd);
    }

    let result = toolbox.local().execute(&request).await;
    print_result(&result)?;
    Ok(exit_code(result.return_code))
}

async fn run_remote(toolbox: &Toolbox, args: &RemoteArgs) -> anyhow::Result<ExitCode> {
    let password = read_password(args)?;
    let connect = ConnectRequest {
        password,
        key_path: args.key.clone(),
        port: args.port,
        ..ConnectRequest::new(&args.host, &args.user)
    };

    let remote = toolbox.remote();
    let status = remote.connect(connect).await;
    println!("{}", serde_json::to_string(&status)?);
    if !status.success {
        return Ok(ExitCode::FAILURE);
    }

    let mut last_code = 0;
    for command in &args.commands {
        let mut request = CommandRequest::new(command.as_str());
        if let Some(timeout) = args.timeout {
            request = request.with_timeout(timeout);
        }
        tokio::select! {
            result = remote.execute(&request) => {
                print_result(&result)?;
                last_code = result.return_code;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupted, closing SSH session");
                last_code = NOT_EXECUTED;
                break;
            }
        }
    }

    let status = remote.disconnect().await;
    if !status.success {
        tracing::warn!("{}", status.message);
    }
    Ok(exit_code(last_code))
}

fn read_password(args: &RemoteArgs) -> anyhow::Result<Option<String>> {
    if let Some(ref var) = args.password_env {
        let password = std::env::var(var)
            .with_context(|| format!("environment variable {var} is not set"))?;
        return Ok(Some(password));
    }
    if args.ask_password {
        let password = dialoguer::Password::new()
            .with_prompt(format!("Password for {}@{}", args.user, args.host))
            .interact()
            .context("failed to read password")?;
        return Ok(Some(password));
    }
    Ok(None)
}

fn print_result(result: &ExecutionResult) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}

/// `-1` (not executed) becomes 1; codes outside a byte are clamped to 1.
fn exit_code(return_code: i32) -> ExitCode {
    if return_code == NOT_EXECUTED {
        return ExitCode::FAILURE;
    }
    u8::try_from(return_code).map_or(ExitCode::FAILURE, ExitCode::from)
}
