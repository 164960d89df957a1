use env_logger::Builder;
use relational_change::config::AppConfig;
use relational_change::run_demo;

fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    Builder::new().filter_level(config.log_level()).init();

    println!("relational-change: aggregate change demo");
    println!(
        "Configuration loaded: id_strategy={:?} start={} step={}",
        config.interpreter.id_strategy, config.interpreter.id_start, config.interpreter.id_step
    );

    let (order, interpreter) = run_demo(&config)?;

    println!("Saved aggregate:");
    println!("{}", serde_json::to_string_pretty(&order)?);

    println!("Statements:");
    for statement in interpreter.statements() {
        println!("{}", serde_json::to_string(&statement)?);
    }

    println!("Tables:");
    println!("{}", serde_json::to_string_pretty(&interpreter.tables())?);

    Ok(())
}
