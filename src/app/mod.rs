use crate::api::EngineClient;
use crate::config::Settings;
use crate::tui::run_dashboard;

const USAGE: &str = "usage: agentdeck [command]\n\
  run                     launch the dashboard (default)\n\
  health                  query the engine health endpoint\n\
  executions              list known executions\n\
  checkpoints list        list stored checkpoints\n\
  checkpoints delete <id> delete one checkpoint\n\
  help                    show this text";

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    let settings = Settings::load().map_err(|err| err.to_string())?;
    let command = args.first().map(String::as_str).unwrap_or("run");
    match command {
        "run" => {
            run_dashboard(settings)?;
            Ok("dashboard closed".to_string())
        }
        "health" => {
            let client = EngineClient::new(&settings.api_base);
            let health = client.health().map_err(|err| err.to_string())?;
            Ok(format!("engine {} (time={})", health.status, health.time))
        }
        "executions" => {
            let client = EngineClient::new(&settings.api_base);
            let roster = client.fetch_roster().map_err(|err| err.to_string())?;
            if roster.is_empty() {
                return Ok("no executions".to_string());
            }
            let lines: Vec<String> = roster
                .iter()
                .map(|entry| {
                    format!(
                        "{} {} created={} checkpoint={}",
                        entry.id, entry.status, entry.created_at, entry.checkpoint_id
                    )
                })
                .collect();
            Ok(lines.join("\n"))
        }
        "checkpoints" => run_checkpoints(&settings, &args[1..]),
        "help" | "--help" | "-h" => Ok(USAGE.to_string()),
        other => Err(format!("unknown command `{other}`\n{USAGE}")),
    }
}

fn run_checkpoints(settings: &Settings, args: &[String]) -> Result<String, String> {
    let client = EngineClient::new(&settings.api_base);
    match args.first().map(String::as_str) {
        None | Some("list") => {
            let checkpoints = client.list_checkpoints().map_err(|err| err.to_string())?;
            if checkpoints.is_empty() {
                return Ok("no checkpoints".to_string());
            }
            let lines: Vec<String> = checkpoints
                .iter()
                .map(|entry| {
                    format!(
                        "{} created={} size={}",
                        entry.id, entry.created_at, entry.size
                    )
                })
                .collect();
            Ok(lines.join("\n"))
        }
        Some("delete") => {
            let id = args
                .get(1)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| "checkpoints delete requires a checkpoint id".to_string())?;
            client.delete_checkpoint(id).map_err(|err| err.to_string())?;
            Ok(format!("deleted checkpoint {id}"))
        }
        Some(other) => Err(format!("unknown checkpoints subcommand `{other}`\n{USAGE}")),
    }
}
