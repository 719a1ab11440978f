use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment, parse_u16,
    parse_u32, parse_u64, parse_weight,
};
use super::types::{
    ApiSettings, ConfigError, CorsSettings, DatabaseSettings, ExamSettings, RuntimeSettings,
    ServerHost, ServerPort, ServerSettings, Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("LSSCTC_HOST", "0.0.0.0");
        let port = env_or_default("LSSCTC_PORT", "8000");

        let environment =
            parse_environment(env_optional("LSSCTC_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("LSSCTC_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "LSSCTC Final Exams");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "lssctc");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "lssctc_db");
        let database_url = env_optional("DATABASE_URL");
        let max_connections =
            parse_u32("DATABASE_MAX_CONNECTIONS", env_or_default("DATABASE_MAX_CONNECTIONS", "20"))?;

        let quiz_fetch_timeout_seconds = parse_u64(
            "QUIZ_FETCH_TIMEOUT_SECONDS",
            env_or_default("QUIZ_FETCH_TIMEOUT_SECONDS", "10"),
        )?;
        let default_theory_weight =
            parse_weight("DEFAULT_THEORY_WEIGHT", env_or_default("DEFAULT_THEORY_WEIGHT", "30"))?;
        let default_simulation_weight = parse_weight(
            "DEFAULT_SIMULATION_WEIGHT",
            env_or_default("DEFAULT_SIMULATION_WEIGHT", "20"),
        )?;
        let default_practical_weight = parse_weight(
            "DEFAULT_PRACTICAL_WEIGHT",
            env_or_default("DEFAULT_PRACTICAL_WEIGHT", "50"),
        )?;

        let log_level = env_or_default("LSSCTC_LOG_LEVEL", "info");
        let json = env_optional("LSSCTC_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings { host: ServerHost::parse(host)?, port: ServerPort::parse(port)? },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            exam: ExamSettings {
                quiz_fetch_timeout_seconds,
                default_theory_weight,
                default_simulation_weight,
                default_practical_weight,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn exam(&self) -> &ExamSettings {
        &self.exam
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.exam.quiz_fetch_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "QUIZ_FETCH_TIMEOUT_SECONDS",
                value: String::from("0"),
            });
        }

        let weight_total = self.exam.default_theory_weight
            + self.exam.default_simulation_weight
            + self.exam.default_practical_weight;
        if (weight_total - 100.0).abs() > 1e-6 {
            return Err(ConfigError::InvalidValue {
                field: "DEFAULT_*_WEIGHT",
                value: format!("{weight_total} (weights must sum to 100)"),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }
}

impl DatabaseSettings {
    pub(crate) fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.postgres_user,
            self.postgres_password,
            self.postgres_server,
            self.postgres_port,
            self.postgres_db
        )
    }
}

impl ServerHost {
    fn parse(value: String) -> Result<Self, ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::InvalidHost(value));
        }
        Ok(Self(value))
    }
}

impl ServerPort {
    fn parse(value: String) -> Result<Self, ConfigError> {
        let parsed: u16 = value.parse().map_err(|_| ConfigError::InvalidPort(value.clone()))?;
        if parsed == 0 {
            return Err(ConfigError::InvalidPort(value));
        }
        Ok(Self(parsed))
    }
}
