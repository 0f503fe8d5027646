use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    load_settings, settings::parse_api_url, AuthOutcome, ClientContext, Field, MutationOutcome,
    TodoView,
};
use shared::domain::{Route, TaskId};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod render;

#[derive(Parser, Debug)]
#[command(name = "todo", about = "Terminal client for the to-do service")]
struct Cli {
    /// Backend base URL; overrides client.toml and the environment.
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Where the session token is kept between runs.
    #[arg(long, global = true)]
    session_file: Option<PathBuf>,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account.
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm_password: String,
    },
    /// Sign in and remember the session.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored session.
    Logout,
    /// Show who is signed in.
    Whoami,
    /// Show the task list.
    List,
    Add {
        title: String,
    },
    Edit {
        id: String,
        title: String,
    },
    /// Flip a task's completed flag.
    Toggle {
        id: String,
    },
    Delete {
        id: String,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut settings = load_settings().context("failed to load client settings")?;
    if let Some(api_url) = cli.api_url {
        parse_api_url(&api_url)?;
        settings.api_base_url = api_url;
    }
    if let Some(session_file) = cli.session_file {
        settings.session_file = session_file;
    }
    debug!(?settings, "settings resolved");

    let context = ClientContext::from_settings(&settings)?;
    let ok = match cli.command {
        Command::Signup {
            email,
            password,
            confirm_password,
        } => signup(&context, email, password, confirm_password).await,
        Command::Login { email, password } => login(&context, email, password).await,
        Command::Logout => {
            let redirect = context.logout();
            println!("{}", render::redirect(&redirect));
            redirect.wait().await;
            true
        }
        Command::Whoami => match context.session().current() {
            Some(session) => {
                println!("{}", session.identity);
                true
            }
            None => {
                println!("Not logged in.");
                false
            }
        },
        Command::List => with_view(&context, |_| async { true }).await,
        Command::Add { title } => {
            with_view(&context, |view| async move {
                view.set_new_task_title(title).await;
                report(view.submit_add().await)
            })
            .await
        }
        Command::Edit { id, title } => {
            with_view(&context, |view| async move {
                if !view.begin_edit(&TaskId::new(id.clone())).await {
                    eprintln!("Error: no task with id {id}");
                    return false;
                }
                view.set_edit_value(title).await;
                report(view.submit_edit().await)
            })
            .await
        }
        Command::Toggle { id } => {
            with_view(&context, |view| async move {
                report(view.toggle(&TaskId::new(id)).await)
            })
            .await
        }
        Command::Delete { id } => {
            with_view(&context, |view| async move {
                report(view.delete(&TaskId::new(id)).await)
            })
            .await
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn report(outcome: MutationOutcome) -> bool {
    match render::mutation_outcome(&outcome) {
        Some(message) => {
            eprintln!("{message}");
            false
        }
        None => true,
    }
}

/// Mounts the to-do view, runs `action` against it, then prints the list.
async fn with_view<F, Fut>(context: &ClientContext, action: F) -> bool
where
    F: FnOnce(Arc<TodoView>) -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let view = context.todo_view();
    if !view.mount().await.is_authorized() {
        if let Some(redirect) = view.take_redirect().await {
            debug!(to = redirect.to.path(), "redirected by session guard");
        }
        eprintln!("Not logged in. Run `todo login` first.");
        return false;
    }

    let ok = action(view.clone()).await;
    let state = view.snapshot().await;
    let redirect = view.take_redirect().await;
    view.unmount().await;

    if let Some(redirect) = redirect {
        eprintln!("{}", render::redirect(&redirect));
        return false;
    }
    if let Some(error) = &state.error {
        eprintln!("Error: {error}");
    }
    println!("{}", render::task_list(&state));
    ok
}

async fn login(context: &ClientContext, email: String, password: String) -> bool {
    let flow = context.login_flow();
    flow.set_field(Field::Email, email).await;
    flow.set_field(Field::Password, password).await;
    let outcome = flow.submit().await;
    println!("{}", render::auth_outcome(&outcome));
    let AuthOutcome::Redirect(redirect) = outcome else {
        return false;
    };
    redirect.wait().await;
    if redirect.to == Route::Todos {
        return with_view(context, |_| async { true }).await;
    }
    true
}

async fn signup(
    context: &ClientContext,
    email: String,
    password: String,
    confirm_password: String,
) -> bool {
    let flow = context.signup_flow();
    flow.set_field(Field::Email, email).await;
    flow.set_field(Field::Password, password).await;
    flow.set_field(Field::ConfirmPassword, confirm_password).await;
    let outcome = flow.submit().await;
    println!("{}", render::auth_outcome(&outcome));
    if let AuthOutcome::Redirect(redirect) = &outcome {
        redirect.wait().await;
        return true;
    }
    false
}
