mod api;
mod chat;
mod config;
mod intake;
mod session;
mod ui;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use api::{ApiError, Credentials, HttpApi, Registration, SymptomApi};
use chat::{ChatSession, Sender};
use config::{Config, ConfigArgs};
use intake::{IntakeError, IntakePanel, PanelState};
use session::{Session, SessionStore};

#[derive(Parser)]
#[command(author, version, about = "MedAssist symptom checker and health assistant")]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign in and remember the session
    Login {
        #[arg(long)]
        email: String,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show who is signed in
    Whoami,
    /// Look up symptom names matching a partial entry
    Suggest { partial: String },
    /// Analyze symptoms; interactive when neither --symptom nor --text is given
    Analyze(AnalyzeArgs),
    /// Show saved diagnoses
    History,
    /// Talk to the guided health assistant
    Chat,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// A symptom, may be repeated
    #[arg(long = "symptom", short = 's')]
    symptoms: Vec<String>,

    /// Free-text description of the symptoms
    #[arg(long, short = 't')]
    text: Option<String>,

    /// How many days the symptoms have lasted
    #[arg(long)]
    days: Option<String>,

    /// Patient age in years
    #[arg(long)]
    age: Option<String>,

    /// Save the top match to history
    #[arg(long, default_value_t = false)]
    save: bool,

    /// Download a PDF report of the result
    #[arg(long, default_value_t = false)]
    report: bool,
}

impl AnalyzeArgs {
    fn is_interactive(&self) -> bool {
        self.symptoms.is_empty() && self.text.is_none()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("medassist=warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.config.resolve()?;
    let api = HttpApi::new(config.api_url())?;
    let store = SessionStore::new(config.session_file());

    match cli.command {
        Command::Signup { name, email, password } => signup(&api, name, email, password).await?,
        Command::Login { email, password } => login(&api, &store, email, password).await?,
        Command::Logout => {
            store.clear()?;
            println!("Signed out.");
        }
        Command::Whoami => match store.load()? {
            Some(session) => ui::display_session(&session),
            None => ui::display_login_required(),
        },
        Command::Suggest { partial } => suggest(&api, &partial).await,
        Command::Analyze(args) => match store.load()? {
            Some(session) => analyze(&api, &config, session, args).await?,
            None => ui::display_login_required(),
        },
        Command::History => match store.load()? {
            Some(session) => {
                let mut panel = IntakePanel::new(session);
                match panel.refresh_history(&api).await {
                    Ok(history) => ui::display_history(history),
                    Err(IntakeError::Api(e)) => report_failure(&e),
                    Err(e) => println!("Could not load history: {}", e),
                }
            }
            None => ui::display_login_required(),
        },
        Command::Chat => run_chat(&api, &config).await?,
    }

    Ok(())
}

fn password_or_prompt(password: Option<String>) -> Result<String> {
    match password {
        Some(p) => Ok(p),
        None => Ok(ui::prompt("Password: ")?),
    }
}

fn report_failure(e: &ApiError) {
    if e.is_connectivity() {
        warn!(error = %e, "request failed");
    }
    println!("{}", failure_message(e));
}

/// Service errors are shown verbatim; anything else means the backend is down.
fn failure_message(e: &ApiError) -> String {
    if e.is_connectivity() {
        "Server not reachable".to_string()
    } else {
        e.to_string()
    }
}

async fn signup(api: &impl SymptomApi, name: String, email: String, password: Option<String>) -> Result<()> {
    let password = password_or_prompt(password)?;
    match api.signup(&Registration { name, email, password }).await {
        Ok(_) => println!("Signup successful. Please login."),
        Err(e) => report_failure(&e),
    }
    Ok(())
}

async fn login(api: &impl SymptomApi, store: &SessionStore, email: String, password: Option<String>) -> Result<()> {
    let password = password_or_prompt(password)?;
    match api.login(&Credentials { email, password }).await {
        Ok(user) => {
            let session = Session::new(user);
            store.save(&session)?;
            println!("Welcome, {}!", session.user.name);
        }
        Err(e) => report_failure(&e),
    }
    Ok(())
}

async fn suggest(api: &impl SymptomApi, partial: &str) {
    match api.suggest_symptoms(partial).await {
        Ok(labels) => ui::display_suggestions(&labels),
        Err(e) => {
            warn!(error = %e, "suggestion lookup failed");
            ui::display_suggestions(&[]);
        }
    }
}

async fn analyze(api: &impl SymptomApi, config: &Config, session: Session, args: AnalyzeArgs) -> Result<()> {
    let interactive = args.is_interactive();
    let mut panel = IntakePanel::new(session);

    if let Err(e) = panel.refresh_history(api).await {
        warn!(error = %e, "could not load history");
    }

    if interactive {
        ui::display_welcome();
        fill_form(api, &mut panel).await?;
    } else {
        for symptom in &args.symptoms {
            panel.add_symptom(symptom);
        }
        panel.set_free_text(args.text.clone().unwrap_or_default());
        panel.set_days(args.days.clone().unwrap_or_default());
        panel.set_age(args.age.clone().unwrap_or_default());
    }

    let spinner = ui::analyzing_spinner();
    let validation = panel.analyze(api).await.err();
    spinner.finish_and_clear();

    if let Some(notice) = validation {
        println!("{}", notice);
        return Ok(());
    }

    match panel.state() {
        PanelState::ResultReady(result) => ui::display_result(result, config.confidence_scale()),
        PanelState::ErrorShown(notice) => {
            println!("{}", notice);
            return Ok(());
        }
        PanelState::Idle | PanelState::Loading => return Ok(()),
    }

    if args.save || (interactive && ui::ask_yes_no("Save to history?")?) {
        match panel.save_to_history(api).await {
            Ok(notice) => {
                println!("{}", notice);
                ui::display_history(panel.history());
            }
            Err(e) => println!("Could not save: {}", e),
        }
    }

    if args.report || (interactive && ui::ask_yes_no("Download report?")?) {
        match panel.download_report(api, config.report_dir()).await {
            Ok(path) => println!("Report saved to {}", path.display()),
            Err(e) => println!("Could not download report: {}", e),
        }
    }

    Ok(())
}

/// Interactive form: age, free text, symptom list, duration.
async fn fill_form(api: &impl SymptomApi, panel: &mut IntakePanel) -> Result<()> {
    panel.set_age(ui::prompt("Age: ")?);
    panel.set_free_text(ui::prompt("Describe your symptoms (optional): ")?);

    ui::display_intake_help();
    loop {
        let line = ui::prompt("symptom › ")?;
        if line.is_empty() {
            break;
        }

        if let Some(partial) = line.strip_prefix('?') {
            let suggestions = panel.suggest(api, partial.trim()).await;
            ui::display_suggestions(suggestions);
            continue;
        }

        if let Some(number) = line.strip_prefix('#') {
            let picked = number
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| panel.suggestions().get(i).cloned());
            match picked {
                Some(label) => {
                    panel.accept_suggestion(&label);
                }
                None => println!("  No such suggestion."),
            }
        } else if let Some(label) = line.strip_prefix('-') {
            panel.remove_symptom(label.trim());
        } else if !panel.add_symptom(&line) {
            println!("  Already listed.");
        }
        ui::display_symptoms(panel.symptoms());
    }

    panel.set_days(ui::prompt("Duration (days): ")?);
    Ok(())
}

fn print_bot_messages_since(chat: &ChatSession, mark: usize) {
    for message in chat.messages_since(mark).filter(|m| m.from == Sender::Bot) {
        ui::display_chat_message(message);
    }
}

async fn run_chat(api: &impl SymptomApi, config: &Config) -> Result<()> {
    ui::display_welcome();
    println!("Type `q` to leave. Pick an offered option by its number.\n");

    let mut chat = ChatSession::new(config);
    print_bot_messages_since(&chat, 0);

    loop {
        let line = match ui::prompt("you › ") {
            Ok(line) => line,
            Err(e) if ui::is_end_of_input(&e) => {
                println!("\nGoodbye! Take care!");
                break;
            }
            Err(e) => return Err(e.into()),
        };
        if line.eq_ignore_ascii_case("q") {
            println!("\nGoodbye! Take care!");
            break;
        }

        let mark = chat.emitted();
        let input = line
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|index| chat.option_value(index))
            .unwrap_or(line);

        if let Some(request) = chat.begin_message(&input) {
            print_bot_messages_since(&chat, mark);
            let mark = chat.emitted();

            let spinner = ui::analyzing_spinner();
            let outcome = api.predict(&request).await;
            spinner.finish_and_clear();

            chat.finish_prediction(outcome);
            print_bot_messages_since(&chat, mark);
        } else {
            print_bot_messages_since(&chat, mark);
        }

        if chat.pending_reset().is_some() {
            let mark = chat.emitted();
            let interrupted = tokio::select! {
                _ = chat.run_pending_reset() => false,
                _ = tokio::signal::ctrl_c() => true,
            };
            if interrupted {
                chat.cancel_pending_reset();
                println!("\nGoodbye! Take care!");
                break;
            }
            print_bot_messages_since(&chat, mark);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::unreachable;

    #[test]
    fn service_errors_are_shown_verbatim() {
        let e = ApiError::Service("User not found".to_string());
        assert_eq!(failure_message(&e), "User not found");
    }

    #[test]
    fn connectivity_errors_say_server_not_reachable() {
        assert_eq!(failure_message(&unreachable()), "Server not reachable");
    }
}
