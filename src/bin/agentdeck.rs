use agentdeck::app;

fn output_header() -> &'static str {
    "AgentDeck\nAgentDeck is a terminal dashboard for observing and steering interruptible agent workflow executions."
}

fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) != Some("run") && !args.is_empty() {
        println!("{}\n", output_header());
    }
    let output = app::run_cli(args)?;
    println!("{output}");
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
