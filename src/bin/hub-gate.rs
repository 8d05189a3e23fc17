use async_trait::async_trait;
use clap::{Arg, ArgMatches, Command};
use dotenv::dotenv;
use log::warn;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use hub_gate::prelude::*;
use hub_gate::ui::SignOutControl;

/// Page surface that reports every action on the terminal
struct TerminalSurface;

impl PageSurface for TerminalSurface {
    fn hide_content(&self) {
        println!("[page] content hidden");
    }

    fn reveal_content(&self) {
        println!("[page] content visible");
    }

    fn set_user_name(&self, name: &str) {
        println!("[nav] user: {}", name);
    }

    fn set_avatar_initials(&self, initials: &str) {
        println!("[nav] avatar: {}", initials);
    }

    fn append_nav_link(&self, link: &NavLink) {
        println!("[nav] link: {} -> {}", link.label, link.href);
    }

    fn bind_sign_out(&self, control: SignOutControl) {
        println!("[nav] sign-out leads to {}", control.location());
    }

    fn redirect(&self, location: &str) {
        println!("[page] redirect to {}", location);
    }
}

/// Name prompt reading submissions from stdin
struct TerminalPrompt {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl TerminalPrompt {
    fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

#[async_trait]
impl NamePrompt for TerminalPrompt {
    fn open(&self) {
        println!("Welcome! Please tell us your name to finish setting up your profile.");
    }

    async fn next_submission(&self) -> String {
        print!("Name: ");
        let _ = std::io::stdout().flush();
        let mut lines = self.lines.lock().await;
        match lines.next_line().await {
            Ok(Some(line)) => line,
            _ => std::future::pending().await,
        }
    }

    fn show_validation(&self, message: &str) {
        eprintln!("{}", message);
    }

    fn close(&self) {}
}

fn values(matches: &ArgMatches, name: &str) -> Vec<String> {
    matches
        .values_of(name)
        .map(|values| values.map(str::to_string).collect())
        .unwrap_or_default()
}

async fn run(matches: &ArgMatches) -> Result<(), Error> {
    let app = AppRegistry::global().get_or_init(ProjectConfig::from_env()?)?;

    let roles = values(matches, "role");
    let mut policy = AccessPolicy::new().with_allowlist(matches.is_present("allowlist"));
    for domain in values(matches, "domain") {
        policy = policy.with_domain(&domain);
    }
    for provider in values(matches, "provider") {
        policy = policy.with_provider(&provider);
    }
    for role in &roles {
        policy = policy.with_role(role);
    }

    let mut options = GateOptions::default();
    if let Some(login_page) = matches.value_of("login-page") {
        options = options.with_login_page(login_page);
    }
    let default_role = matches.value_of("default-role").unwrap_or("viewer");
    let legacy_field = matches.value_of("legacy-role-field").unwrap_or("role");
    options = match matches.value_of("role-field") {
        Some(field) => {
            let allowed: Vec<&str> = roles.iter().map(String::as_str).collect();
            options.with_role_schema(RoleSchema::namespaced(field, legacy_field, &allowed, default_role))
        }
        None => options.with_role_schema(RoleSchema::shared(legacy_field, default_role)),
    };

    let identity = app.identity();
    match matches.value_of("token") {
        Some(token) => {
            if let Err(e) = identity.restore_session(token).await {
                warn!("Could not restore session: {}", e);
            }
        }
        None => identity.mark_signed_out(),
    }

    let gate = app.gate(
        policy,
        Arc::new(TerminalSurface),
        Arc::new(TerminalPrompt::new()),
        options,
    );

    match gate.run().await {
        GateOutcome::Ready(context) => {
            println!("{}", serde_json::to_string_pretty(&context.profile)?);
        }
        GateOutcome::Redirected(redirect) => {
            if let Some(code) = redirect.error_code() {
                println!("access refused: {}", code);
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    pretty_env_logger::init();

    let matches = Command::new("hub-gate")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run the authentication gate for a stored session")
        .arg(
            Arg::new("token")
                .long("token")
                .env("HUB_ACCESS_TOKEN")
                .value_name("JWT")
                .help("Access token of the session to check")
                .takes_value(true),
        )
        .arg(
            Arg::new("domain")
                .long("domain")
                .value_name("DOMAIN")
                .help("Email domain authorized outright")
                .takes_value(true)
                .multiple_occurrences(true),
        )
        .arg(
            Arg::new("provider")
                .long("provider")
                .value_name("METHOD")
                .help("Sign-in method accepted outside the domains")
                .takes_value(true)
                .multiple_occurrences(true),
        )
        .arg(
            Arg::new("role")
                .long("role")
                .value_name("ROLE")
                .help("Role required on the profile")
                .takes_value(true)
                .multiple_occurrences(true),
        )
        .arg(
            Arg::new("allowlist")
                .long("allowlist")
                .help("Consult the allowlist collection"),
        )
        .arg(
            Arg::new("role-field")
                .long("role-field")
                .value_name("FIELD")
                .help("Namespaced role field, migrated from the legacy field")
                .takes_value(true),
        )
        .arg(
            Arg::new("legacy-role-field")
                .long("legacy-role-field")
                .value_name("FIELD")
                .takes_value(true),
        )
        .arg(
            Arg::new("default-role")
                .long("default-role")
                .value_name("ROLE")
                .takes_value(true),
        )
        .arg(
            Arg::new("login-page")
                .long("login-page")
                .value_name("PATH")
                .takes_value(true),
        )
        .get_matches();

    if let Err(e) = run(&matches).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
