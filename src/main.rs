use script_debugger::interactive::{run_repl, StdioHost};
use script_debugger::{DebuggerConfig, Interpreter};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

struct Args {
    config: Option<PathBuf>,
    verbose: bool,
    script: Option<PathBuf>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        config: None,
        verbose: false,
        script: None,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => {
                let path = it.next().ok_or("--config needs a file name")?;
                args.config = Some(PathBuf::from(path));
            }
            "--verbose" | "-v" => args.verbose = true,
            other if other.starts_with("--") => return Err(format!("unknown option {}", other)),
            other => {
                if args.script.is_some() {
                    return Err("only one script file may be given".to_string());
                }
                args.script = Some(PathBuf::from(other));
            }
        }
    }
    Ok(args)
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("usage: script-debugger [--config file.json] [--verbose] [script-file]");
            return ExitCode::from(2);
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .init();

    let config = match DebuggerConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "could not load configuration");
            return ExitCode::FAILURE;
        }
    };

    let mut interp = Interpreter::interactive("main", Arc::new(config), Box::new(StdioHost));

    let outcome = match &args.script {
        Some(path) => {
            info!(script = %path.display(), "running script");
            interp
                .setup_debugger(true, false)
                .and_then(|_| interp.eval_file(path))
                .map(|result| {
                    if !result.is_empty() {
                        println!("{}", result);
                    }
                })
        }
        None => run_repl(&mut interp),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            if !interp.error_info().is_empty() {
                eprintln!("{}", interp.error_info());
            }
            ExitCode::FAILURE
        }
    }
}
