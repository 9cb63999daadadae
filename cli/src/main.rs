use std::io::{BufRead, Write};

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;

use ondam_core::compose;
use ondam_core::flow::{Advance, FormSession, FormStep, Submit};
use ondam_core::message::OutboundMessage;
use ondam_core::questions::{self, Category, PlaceholderCtx};
use ondam_core::{classify, questions::render};

#[derive(Parser)]
#[command(name = "ondam", version, about = "ondam operator CLI — health checks, data validation, local flow simulation")]
struct Cli {
    /// Bot base URL
    #[arg(long, env = "ONDAM_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check bot health
    Health,
    /// Validate the static question trees and classification tables
    Validate,
    /// Walk a flow locally on the console, without a chat platform
    Simulate {
        /// Which flow to walk
        #[arg(value_enum, default_value_t = SimFlow::Diagnosis)]
        flow: SimFlow,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SimFlow {
    Diagnosis,
    Followup,
}

fn exit_error(message: &str) -> ! {
    let err = json!({
        "error": "cli_error",
        "message": message
    });
    eprintln!("{}", serde_json::to_string_pretty(&err).unwrap());
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Health => health(&cli.api_url).await,
        Commands::Validate => validate(),
        Commands::Simulate { flow } => match flow {
            SimFlow::Diagnosis => simulate_diagnosis(),
            SimFlow::Followup => simulate_followup(),
        },
    };

    if let Err(e) = result {
        exit_error(&e.to_string());
    }
}

async fn health(api_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let resp = reqwest::Client::new()
        .get(format!("{api_url}/health"))
        .send()
        .await?;
    let body: serde_json::Value = resp.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

/// Run the authoring checks over the static data and report as JSON.
/// Exits non-zero when any defect is found, for use in CI.
fn validate() -> Result<(), Box<dyn std::error::Error>> {
    let mut defects = questions::validate_data();
    defects.extend(classify::validate_tables());
    let sound = defects.is_empty();

    let report = json!({
        "status": if sound { "ok" } else { "defective" },
        "defects": defects,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if sound {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn read_line(prompt: &str) -> String {
    print!("{prompt}");
    std::io::stdout().flush().ok();
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .unwrap_or_default();
    line.trim().to_string()
}

fn print_step(step: &FormStep, ctx: &PlaceholderCtx) {
    println!("\n{}", render(step.header, ctx));
    println!("{}", render(step.body, ctx));
    for field in step.fields {
        if step.is_multi() {
            println!("  [{}]", field.label);
        }
        for choice in field.choices {
            println!("    {}) {}", choice.code, choice.label);
        }
    }
}

fn print_messages(messages: &[OutboundMessage]) {
    for message in messages {
        match message {
            OutboundMessage::Text { text } => println!("\n{text}"),
            OutboundMessage::Menu { title, body, .. } => println!("\n{title}\n{body}"),
        }
    }
}

fn simulate_diagnosis() -> Result<(), Box<dyn std::error::Error>> {
    println!("Constitution check. What bothers you most these days?");
    for category in Category::ALL {
        println!("    {}) {}", category.token(), category.label());
    }

    let category = loop {
        let token = read_line("category> ");
        match Category::from_token(&token) {
            Some(category) => break category,
            None => println!("Pick one of the listed category tokens."),
        }
    };

    let steps = questions::tree(category);
    let ctx = PlaceholderCtx::from_profile(None);
    let mut form = FormSession::new();

    while let Some(step) = form.current(steps) {
        print_step(step, &ctx);
        let code = read_line("answer> ");
        match form.submit(steps, Submit::Single { code: &code }) {
            Advance::Rejected => println!("Not one of the choices; try again."),
            Advance::Pending | Advance::Next { .. } | Advance::Complete { .. } => {}
        }
    }

    let codes = form.single_codes();
    let report = compose::compose(category, &codes);
    print_messages(&compose::render(&report));
    Ok(())
}

fn simulate_followup() -> Result<(), Box<dyn std::error::Error>> {
    let steps = questions::followup_steps();
    let ctx = PlaceholderCtx::from_profile(None);
    let mut form = FormSession::new();

    println!("Weekly check-in (local simulation; nothing is persisted).");

    while let Some(step) = form.current(steps) {
        print_step(step, &ctx);
        for field in step.fields {
            loop {
                let value = read_line(&format!("{}> ", field.key));
                match form.submit(steps, Submit::Field { key: field.key, value: &value }) {
                    Advance::Rejected => println!("Not one of the choices; try again."),
                    Advance::Pending => break,
                    Advance::Next { echo, .. } | Advance::Complete { echo } => {
                        println!("\nNoted.");
                        for (label, value) in &echo {
                            println!("  {label}: {value}");
                        }
                        break;
                    }
                }
            }
        }
    }

    let answers = form.flatten();
    println!("\nCompleted answer set (the bot would persist this, then summarize):");
    println!("{}", serde_json::to_string_pretty(&answers)?);
    Ok(())
}
