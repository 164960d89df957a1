use crate::store::{IdGeneration, IdStrategy};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub interpreter: InterpreterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// One of off, error, warn, info, debug, trace
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpreterConfig {
    pub id_strategy: IdStrategy,
    pub id_start: i64,
    pub id_step: i64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        let ids = IdGeneration::default();
        Self {
            id_strategy: ids.strategy,
            id_start: ids.start,
            id_step: ids.step,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional `config` file and
    /// `RELCHANGE_` environment variables, in increasing precedence
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        config = config.add_source(config::File::with_name("config").required(false));

        // RELCHANGE_INTERPRETER__ID_STEP=10 sets interpreter.id_step
        config = config.add_source(
            config::Environment::with_prefix("RELCHANGE")
                .prefix_separator("_")
                .separator("__"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    /// Log level filter; unknown names fall back to info
    pub fn log_level(&self) -> LevelFilter {
        self.logging.level.parse().unwrap_or(LevelFilter::Info)
    }

    pub fn id_generation(&self) -> anyhow::Result<IdGeneration> {
        if self.interpreter.id_step <= 0 {
            anyhow::bail!(
                "interpreter.id_step must be positive, got {}",
                self.interpreter.id_step
            );
        }
        Ok(IdGeneration {
            strategy: self.interpreter.id_strategy,
            start: self.interpreter.id_start,
            step: self.interpreter.id_step,
        })
    }
}
