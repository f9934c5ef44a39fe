use std::{error::Error, process::ExitCode};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wamp::{
    cli::{Cli, Commands, PhpAction, ServiceAction, SiteAction, parse_args},
    constants::ServiceKind,
    download::HttpFetcher,
    runtime::StackLayout,
    stack::{Stack, StackVersions},
};

fn main() -> ExitCode {
    let args = parse_args();
    init_logging(&args);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Logs go to stderr so `status --json` output stays parseable.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(args: Cli) -> Result<(), Box<dyn Error>> {
    let layout = StackLayout::resolve(args.root.as_deref())?;
    info!("Wamp dir: {:?}", layout.root());
    let stack = Stack::new(layout);

    match args.command {
        Commands::Init => {
            stack.init()?;
            info!("Stack directory initialized");
        }
        Commands::Install => {
            let fetcher = HttpFetcher::new();
            stack.install(&fetcher, &StackVersions::default())?;
            info!("Stack installed");
        }
        Commands::Uninstall => {
            stack.uninstall()?;
            info!("Stack removed");
        }
        Commands::Apache { action } => control_service(&stack, ServiceKind::Apache, action)?,
        Commands::Mysql { action } => control_service(&stack, ServiceKind::MariaDb, action)?,
        Commands::Site { action } => match action {
            SiteAction::Add { php, ssl, name } => {
                let site = stack.site_add(&name, php.as_deref(), ssl)?;
                let scheme = if site.tls.is_some() { "https" } else { "http" };
                info!("Site ready at {scheme}://{}", site.name);
            }
            SiteAction::Rm { name } => stack.site_rm(&name)?,
        },
        Commands::Php { action } => match action {
            PhpAction::Install { version } => {
                let fetcher = HttpFetcher::new();
                stack.php_install(&fetcher, &version)?;
            }
        },
    }

    Ok(())
}

fn control_service(
    stack: &Stack,
    kind: ServiceKind,
    action: ServiceAction,
) -> Result<(), Box<dyn Error>> {
    match action {
        ServiceAction::Start => {
            stack.start(kind)?;
        }
        ServiceAction::Stop => stack.stop(kind)?,
        ServiceAction::Status { json } => {
            let status = stack.status(kind)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{status}");
            }
        }
    }
    Ok(())
}
