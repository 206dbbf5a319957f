use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::{Builder, Env, Target};
use log::{debug, info};
use std::{io::Write, process::ExitCode, sync::Arc};
use webcall_login::{
    AppConfig, ConnectionNegotiator, FormField, FormState, ReqwestExecutor,
    shell::{DesktopBridge, TerminalView},
};

#[derive(Parser)]
#[command(version, about = "Log in to a WebCall server as callee")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check the user-ID on the server and open the callee page
    Connect {
        /// Server host, optionally with port
        #[arg(long)]
        domain: Option<String>,
        /// User-ID, defaults to the stored one
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        clear_cookies: bool,
        #[arg(long)]
        clear_cache: bool,
        /// Accept any server certificate
        #[arg(long)]
        insecure_tls: bool,
    },
    /// Open the registration page for a new user-ID
    Register {
        #[arg(long)]
        domain: Option<String>,
        /// Forget the stored user-ID first
        #[arg(long)]
        forget_user: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    log_panics::init();

    let mut builder = if cfg!(debug_assertions) {
        Builder::from_env(Env::default().default_filter_or("debug"))
    } else {
        Builder::from_env(Env::default().default_filter_or("info"))
    };

    builder.format(|f, record| match record.level() {
        log::Level::Error => {
            eprintln!("{}", record.args());
            Ok(())
        }
        _ => {
            writeln!(f, "{}", record.args())
        }
    });

    builder.target(Target::Stdout).init();

    info!("module version: {}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config = AppConfig::get();

    let bridge = Arc::new(DesktopBridge::open(&config.shell)?);
    let view = Arc::new(TerminalView::default());
    let mut form = FormState::load(bridge.as_ref(), &config.negotiation);
    info!(
        "version {} webview {}",
        form.version_name, form.webview_version
    );

    match &cli.command {
        Command::Connect {
            domain,
            user,
            clear_cookies,
            clear_cache,
            insecure_tls,
        } => {
            if let Some(domain) = domain {
                form.set_domain(&domain.trim().to_lowercase());
            }
            if let Some(user) = user {
                form.username = user.trim().to_lowercase();
            }
            if *insecure_tls {
                form.set_insecure_tls(true);
            }
            form.options.clear_cookies = *clear_cookies;
            form.options.clear_cache |= *clear_cache;
        }
        Command::Register {
            domain,
            forget_user,
        } => {
            if let Some(domain) = domain {
                form.set_domain(&domain.trim().to_lowercase());
            }
            if *forget_user {
                form.clear_field(FormField::Username);
            }
        }
    }

    if form.options.insecure_tls != bridge.insecure_tls_enabled() {
        form.apply_insecure_tls(bridge.as_ref());
    }

    let executor = ReqwestExecutor::new(
        config.negotiation.request_timeout,
        bridge.insecure_tls_enabled(),
    )?;
    let mut negotiator = ConnectionNegotiator::new(
        bridge.clone(),
        view.clone(),
        executor,
        config.negotiation.clone(),
    );

    let input = form.input();
    let result = match cli.command {
        Command::Connect { .. } => negotiator.connect_server(&input).await,
        Command::Register { .. } => negotiator.request_new_id(&input),
    };

    // the page is handed over to the browser from here on
    negotiator.page_left();

    match result {
        Ok(navigation) => {
            debug!("navigated to {}", navigation.url());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            debug!("negotiation failed: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}
