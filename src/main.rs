use std::{
    fs,
    io::{self, Read, Write},
    path::Path,
    process,
};

use safe_markup::{
    application::{
        error::AppError,
        render::{RenderPipelineConfig, RenderService, configure_render_service, render_service},
    },
    config::{self, Command, RenderArgs},
    infra::{error::InfraError, telemetry},
};
use tracing::{Dispatch, Level, debug, dispatcher, error};
use tracing_subscriber::fmt as tracing_fmt;

fn main() {
    if let Err(error) = run() {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(Command::Render(RenderArgs::default()));

    telemetry::init(&settings.logging)?;
    configure_render_service(RenderPipelineConfig::from(&settings.render))?;

    match command {
        Command::Render(args) => run_render(&args),
        Command::Policy(_) => run_policy(),
    }
}

fn run_render(args: &RenderArgs) -> Result<(), AppError> {
    let text = read_input(args.input.as_deref())?;
    let markup = render_service().render(&text);
    debug!(
        target = "safe_markup::cli",
        bytes = markup.len(),
        "writing rendered markup"
    );

    let mut stdout = io::stdout().lock();
    stdout
        .write_all(markup.as_str().as_bytes())
        .map_err(InfraError::from)?;
    if !markup.is_empty() {
        stdout.write_all(b"\n").map_err(InfraError::from)?;
    }
    stdout.flush().map_err(InfraError::from)?;
    Ok(())
}

fn run_policy() -> Result<(), AppError> {
    let service = render_service();
    let json = serde_json::to_string_pretty(service.policy()).map_err(InfraError::from)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{json}").map_err(InfraError::from)?;
    Ok(())
}

fn read_input(path: Option<&Path>) -> Result<String, AppError> {
    let bytes = match path {
        Some(path) if path != Path::new("-") => fs::read(path).map_err(InfraError::from)?,
        _ => {
            let mut buffer = Vec::new();
            io::stdin()
                .read_to_end(&mut buffer)
                .map_err(InfraError::from)?;
            buffer
        }
    };
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
