use finance_manager_core::{
    config::AppConfig,
    models::ToolInput,
    store,
    tools::{create_default_registry, AgentScope, ToolRegistry},
};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
Commands:
  help                 show this message
  tools                list available tools by agent
  <tool> [json]        run a tool, e.g. set_expense {\"amount\": 12.5, \"category\": \"dining\", \"description\": \"lunch\"}
  quit | exit          leave the console";

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    // Logs go to stderr so tool results on stdout stay machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "Finance console failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> finance_manager_core::Result<()> {
    let config = AppConfig::from_env()?;
    let store = store::open(&config.store).await?;
    let registry = create_default_registry(store.clone());

    info!(user_id = %config.default_user_id, backend = store.backend(), "Finance console ready");
    println!("Finance manager console (user: {}). Type 'help' for commands.", config.default_user_id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "quit" | "exit" => break,
            "help" => println!("{}", HELP),
            "tools" => print_tools(&registry),
            tool_name => {
                let parameters = if rest.is_empty() {
                    Value::Null
                } else {
                    match serde_json::from_str::<Value>(rest) {
                        Ok(v) => v,
                        Err(e) => {
                            println!("Arguments must be a JSON object: {}", e);
                            continue;
                        }
                    }
                };

                let output = registry
                    .invoke(&ToolInput {
                        tool_name: tool_name.to_string(),
                        user_id: config.default_user_id.clone(),
                        parameters,
                    })
                    .await;

                println!("{}", serde_json::to_string_pretty(&output)?);
            }
        }
    }

    store.close().await;
    Ok(())
}

fn print_tools(registry: &ToolRegistry) {
    let described = registry.describe();
    for scope in AgentScope::ALL {
        println!("[{}]", scope);
        for tool in described.iter().filter(|t| t.scope == scope) {
            println!("  {:<28} {}", tool.name, tool.description);
        }
    }
}
