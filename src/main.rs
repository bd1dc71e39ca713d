use clap::{Parser, Subcommand};
use jss_client::config::{read_config, resolve_config_path, Config};
use jss_client::helper::{read_helper_result, HelperExit};
use jss_client::{
    Agent, AgentArgs, AgentCommand, ClientError, DialogHelper, DialogOptions, EffectiveUser,
    EnvironmentProbe, ExecutionResult, HelperRequest, ServerResolver, SystemRunner,
    UnknownOptionPolicy,
};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "jss-client", version, about = "Managed client helper")]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Local IP address used for outbound traffic
    Ip,
    /// Account logged into the graphical console
    ConsoleUser,
    /// Hardware UUID and serial number
    Hardware,
    /// Management server from the agent's preferences
    Server {
        /// Report whether this machine is enrolled under HOST
        #[arg(long)]
        managed_by: Option<String>,
    },
    Receipts,
    Installed,
    /// Whether the agent can reach its server
    Available,
    Version,
    /// Run an agent sub-command
    Agent {
        command: String,
        #[arg(long, conflicts_with = "args")]
        line: Option<String>,
        #[arg(long)]
        verbose: bool,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Show a dialog through the helper
    Helper {
        window_type: String,
        /// JSON object of display options, compiled in key order
        #[arg(long)]
        options: Option<String>,
        #[arg(long)]
        arg_string: Option<String>,
        #[arg(long)]
        output_file: Option<PathBuf>,
        /// Return the helper's pid instead of waiting for it
        #[arg(long)]
        abandon: bool,
        /// Reject unknown option names
        #[arg(long)]
        strict: bool,
    },
    /// Read a detached helper's result file
    HelperResult { output_file: PathBuf },
    Paths,
}

#[derive(Debug, Serialize)]
struct JsonResult<T: Serialize> {
    ok: bool,
    result: Option<T>,
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<&'static str>,
}

#[derive(Debug, Clone)]
struct Context {
    config_path: PathBuf,
    config: Config,
    json: bool,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let json = cli.json;
    let result = build_context(&cli).and_then(|ctx| dispatch(&ctx, cli.command));

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            if json {
                let payload = JsonResult::<serde_json::Value> {
                    ok: false,
                    result: None,
                    error: Some(err.to_string()),
                    error_code: Some(err.code()),
                };
                if let Err(print_err) = print_json(&payload) {
                    eprintln!("{print_err}");
                }
            } else {
                eprintln!("{err}");
            }
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
}

fn build_context(cli: &Cli) -> Result<Context, ClientError> {
    let config_path = resolve_config_path(cli.config.as_ref());
    let config = read_config(&config_path)?;
    Ok(Context {
        config_path,
        config,
        json: cli.json,
    })
}

/// Runs one subcommand and returns the process exit code.
fn dispatch(ctx: &Context, command: Commands) -> Result<i32, ClientError> {
    let runner = SystemRunner;
    let privilege = EffectiveUser;
    let paths = &ctx.config.paths;
    let agent = Agent::new(&runner, &privilege, paths);
    let probe = EnvironmentProbe::new(&runner, &ctx.config.probe);

    match command {
        Commands::Ip => output(ctx, json!({ "ip_address": probe.current_ip_address()? })),
        Commands::ConsoleUser => output(ctx, json!({ "console_user": probe.console_user()? })),
        Commands::Hardware => output(ctx, serde_json::to_value(probe.hardware_identity()?)?),
        Commands::Server { managed_by } => {
            let mut resolver = ServerResolver::new(&paths.preferences_plist);
            let server = resolver.server()?;
            let mut payload = json!({ "configured": server.is_some(), "server": server });
            if let Some(host) = managed_by {
                payload["managed_by"] = json!(resolver.is_managed_by(&host)?);
            }
            output(ctx, payload)
        }
        Commands::Receipts => output(ctx, json!({ "receipts": agent.receipts()? })),
        Commands::Installed => {
            let helper = DialogHelper::new(&runner, &paths.helper_binary);
            output(
                ctx,
                json!({
                    "agent_installed": agent.is_installed(),
                    "agent_path": agent.binary_path(),
                    "helper_installed": helper.is_installed(),
                }),
            )
        }
        Commands::Available => output(ctx, json!({ "available": agent.server_available()? })),
        Commands::Version => output(ctx, json!({ "version": agent.version()? })),
        Commands::Agent {
            command,
            line,
            verbose,
            args,
        } => {
            let agent_args = match line {
                Some(line) => AgentArgs::Line(line),
                None if args.is_empty() => AgentArgs::None,
                None => AgentArgs::List(args),
            };
            // Verbose runs already stream to stdout; keep json output parseable.
            let echoed = verbose && !ctx.json;
            let result = agent.run(&AgentCommand::new(command), &agent_args, echoed)?;
            report_execution(ctx, result, echoed)
        }
        Commands::Helper {
            window_type,
            options,
            arg_string,
            output_file,
            abandon,
            strict,
        } => {
            let options = match options {
                Some(raw) => DialogOptions::from_json(serde_json::from_str(&raw)?)?,
                None => DialogOptions::new(),
            };
            let request = HelperRequest {
                window_type,
                options,
                arg_string,
                output_file,
                abandon_process: abandon,
                unknown_options: if strict {
                    UnknownOptionPolicy::Reject
                } else {
                    UnknownOptionPolicy::Ignore
                },
            };
            let helper = DialogHelper::new(&runner, &paths.helper_binary);
            report_execution(ctx, helper.run(&request)?, false)
        }
        Commands::HelperResult { output_file } => output(
            ctx,
            json!({ "result": read_helper_result(&output_file)? }),
        ),
        Commands::Paths => output(
            ctx,
            json!({
                "config_path": ctx.config_path,
                "config_exists": ctx.config_path.exists(),
                "agent_binaries": paths.agent_binaries,
                "helper_binary": paths.helper_binary,
                "receipts_dir": paths.receipts_dir,
                "preferences_plist": paths.preferences_plist,
            }),
        ),
    }
}

/// Reports a run in the shape of its strategy. A captured run exits with the
/// child's status; the others exit 0.
fn report_execution(
    ctx: &Context,
    result: ExecutionResult,
    echoed: bool,
) -> Result<i32, ClientError> {
    match result {
        ExecutionResult::Captured(captured) => {
            if ctx.json {
                output(
                    ctx,
                    json!({ "status_code": captured.status_code, "output": captured.text }),
                )?;
            } else if !echoed {
                print!("{}", captured.text);
            }
            Ok(captured.status_code)
        }
        ExecutionResult::Status(code) => output(
            ctx,
            json!({ "exit_code": code, "result": HelperExit::from_code(code.into()) }),
        ),
        ExecutionResult::Detached(pid) => output(ctx, json!({ "pid": pid })),
    }
}

fn output(ctx: &Context, payload: serde_json::Value) -> Result<i32, ClientError> {
    if ctx.json {
        let wrapper = JsonResult {
            ok: true,
            result: Some(payload),
            error: None,
            error_code: None,
        };
        print_json(&wrapper)?;
    } else {
        println!("{}", payload);
    }
    Ok(0)
}

fn print_json<T: Serialize>(payload: &T) -> Result<(), ClientError> {
    let text = serde_json::to_string_pretty(payload)?;
    println!("{}", text);
    Ok(())
}
