//! Process configuration: flags with environment fallbacks.

use clap::Parser;
use dagforge_core::secret::MIN_APP_KEY_LEN;
use dagforge_scheduler::InferencePolicy;
use thiserror::Error;
use url::Url;

/// Raw command line, before validation.
#[derive(Debug, Clone, Parser)]
#[command(name = "dagforge-server")]
#[command(about = "dagforge control plane", long_about = None)]
pub struct ServerArgs {
    #[arg(long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub server_host: String,

    #[arg(long, env = "SERVER_PORT", default_value = "9100")]
    pub server_port: String,

    /// DEBUG, INFO, WARNING, ERROR or FATAL
    #[arg(long, env = "LOG_LEVEL", default_value = "DEBUG")]
    pub log_level: String,

    #[arg(long, env = "DB_HOST")]
    pub db_host: Option<String>,

    #[arg(long, env = "DB_USER")]
    pub db_user: Option<String>,

    #[arg(long, env = "DB_PASSWORD", default_value = "-")]
    pub db_password: String,

    #[arg(long, env = "DB_NAME")]
    pub db_name: Option<String>,

    #[arg(long, env = "DB_SSL_MODE", default_value = "disable")]
    pub db_ssl_mode: String,

    #[arg(long, env = "MAX_IDLE_DB_CONN", default_value = "5")]
    pub max_idle_db_conn: String,

    #[arg(long, env = "MAX_OPEN_DB_CONN", default_value = "10")]
    pub max_open_db_conn: String,

    /// Host compiled jobs call back to
    #[arg(long, env = "INGRESS_HOST")]
    pub ingress_host: Option<String>,

    /// Key sealing project secrets, at least 32 characters
    #[arg(long, env = "APP_KEY", hide_env_values = true)]
    pub app_key: Option<String>,

    /// best-effort or strict
    #[arg(long, env = "INFERENCE_POLICY", default_value = "best-effort")]
    pub inference_policy: String,
}

/// Every problem found in the configuration, one per line.
#[derive(Debug, Error)]
#[error("{}", .0.join("\n"))]
pub struct ConfigError(pub Vec<String>);

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub host: String,
    pub user: String,
    pub password: String,
    pub name: String,
    pub ssl_mode: String,
    pub max_idle: u32,
    pub max_open: u32,
}

impl DatabaseSettings {
    /// Connection URL. Credentials are percent-encoded.
    pub fn url(&self) -> Result<Url, ConfigError> {
        let mut url = Url::parse(&format!("postgres://{}/{}", self.host, self.name))
            .map_err(|e| ConfigError(vec![format!("invalid database host or name: {}", e)]))?;
        let credentials = url
            .set_username(&self.user)
            .and_then(|()| url.set_password(Some(self.password.as_str()).filter(|p| !p.is_empty())));
        if credentials.is_err() {
            return Err(ConfigError(vec!["invalid database credentials".to_string()]));
        }
        if !self.ssl_mode.is_empty() {
            url.query_pairs_mut().append_pair("sslmode", &self.ssl_mode);
        }
        Ok(url)
    }
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// `tracing` filter directive derived from the log level.
    pub log_filter: String,
    pub database: DatabaseSettings,
    pub ingress_host: String,
    pub app_key: String,
    pub inference: InferencePolicy,
}

impl Settings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn missing(flag: &str, env: &str) -> String {
    format!(
        "missing required parameter: --{} (can also be set using {} environment variable)",
        flag, env
    )
}

/// A literal `-` is an explicit empty value.
fn dash_to_empty(value: String) -> String {
    if value == "-" { String::new() } else { value }
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str, errors: &mut Vec<String>) -> T
where
    T: Default,
{
    value.trim().parse().unwrap_or_else(|_| {
        errors.push(format!("invalid value '{}' for --{}: expected a number", value, flag));
        T::default()
    })
}

/// Map a log level name to a `tracing` filter directive.
pub fn log_filter(level: &str) -> Option<&'static str> {
    match level.to_ascii_uppercase().as_str() {
        "DEBUG" => Some("debug"),
        "INFO" => Some("info"),
        "WARNING" | "WARN" => Some("warn"),
        "ERROR" | "FATAL" => Some("error"),
        _ => None,
    }
}

impl ServerArgs {
    /// Check required parameters are present, then parse the rest. Every
    /// problem is reported, not just the first.
    pub fn validate(self) -> Result<Settings, ConfigError> {
        let required = [
            ("db-host", "DB_HOST", &self.db_host),
            ("db-user", "DB_USER", &self.db_user),
            ("db-name", "DB_NAME", &self.db_name),
            ("ingress-host", "INGRESS_HOST", &self.ingress_host),
            ("app-key", "APP_KEY", &self.app_key),
        ];
        let absent: Vec<String> = required
            .iter()
            .filter(|(_, _, value)| value.as_deref().is_none_or(str::is_empty))
            .map(|(flag, env, _)| missing(flag, env))
            .collect();
        if !absent.is_empty() {
            return Err(ConfigError(absent));
        }

        let text = |value: Option<String>| dash_to_empty(value.unwrap_or_default());
        let mut errors = Vec::new();

        let port = parse_number("server-port", &self.server_port, &mut errors);
        let max_idle = parse_number("max-idle-db-conn", &self.max_idle_db_conn, &mut errors);
        let max_open: u32 = parse_number("max-open-db-conn", &self.max_open_db_conn, &mut errors);
        if max_open == 0 {
            errors.push("--max-open-db-conn must be at least 1".to_string());
        }

        let log_filter = match log_filter(&self.log_level) {
            Some(filter) => filter.to_string(),
            None => {
                errors.push(format!(
                    "invalid value '{}' for --log-level: expected DEBUG, INFO, WARNING, ERROR or FATAL",
                    self.log_level
                ));
                String::new()
            }
        };

        let app_key = text(self.app_key);
        if app_key.chars().count() < MIN_APP_KEY_LEN {
            errors.push(format!(
                "--app-key must be at least {} characters",
                MIN_APP_KEY_LEN
            ));
        }

        let inference = self
            .inference_policy
            .parse()
            .unwrap_or_else(|e: dagforge_core::Error| {
                errors.push(e.to_string());
                InferencePolicy::default()
            });

        let settings = Settings {
            host: dash_to_empty(self.server_host),
            port,
            log_filter,
            database: DatabaseSettings {
                host: text(self.db_host),
                user: text(self.db_user),
                password: dash_to_empty(self.db_password),
                name: text(self.db_name),
                ssl_mode: dash_to_empty(self.db_ssl_mode),
                max_idle,
                max_open,
            },
            ingress_host: text(self.ingress_host),
            app_key,
            inference,
        };
        if let Err(e) = settings.database.url() {
            errors.extend(e.0);
        }

        if errors.is_empty() {
            Ok(settings)
        } else {
            Err(ConfigError(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    fn args(extra: &[&str]) -> ServerArgs {
        let mut argv = vec![
            "dagforge-server",
            "--db-host",
            "db:5432",
            "--db-user",
            "dagforge",
            "--db-name",
            "dagforge",
            "--ingress-host",
            "dagforge.internal",
            "--app-key",
            KEY,
        ];
        argv.extend_from_slice(extra);
        ServerArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let settings = args(&[]).validate().unwrap();
        assert_eq!(settings.bind_address(), "0.0.0.0:9100");
        assert_eq!(settings.log_filter, "debug");
        assert_eq!(settings.database.password, "");
        assert_eq!(settings.database.max_idle, 5);
        assert_eq!(settings.database.max_open, 10);
        assert_eq!(settings.inference, InferencePolicy::BestEffort);
        assert_eq!(
            settings.database.url().unwrap().as_str(),
            "postgres://dagforge@db:5432/dagforge?sslmode=disable"
        );
    }

    #[test]
    fn test_missing_parameters_all_reported() {
        let parsed = ServerArgs::try_parse_from(["dagforge-server", "--db-host", "db"]).unwrap();
        let err = parsed.validate().unwrap_err();
        let lines: Vec<&str> = err.0.iter().map(|s| s.as_str()).collect();
        assert!(lines.contains(
            &"missing required parameter: --db-user (can also be set using DB_USER environment variable)"
        ));
        assert!(lines.iter().any(|l| l.contains("--app-key")));
        assert!(lines.iter().any(|l| l.contains("--ingress-host")));
        assert!(!lines.iter().any(|l| l.contains("--db-host")));
    }

    #[test]
    fn test_dash_means_empty() {
        let settings = args(&["--db-password", "-", "--db-ssl-mode", "-"])
            .validate()
            .unwrap();
        assert_eq!(settings.database.ssl_mode, "");
        assert!(!settings.database.url().unwrap().as_str().contains("sslmode"));
    }

    #[test]
    fn test_password_is_encoded() {
        let settings = args(&["--db-password", "p@ss/word"]).validate().unwrap();
        assert_eq!(
            settings.database.url().unwrap().as_str(),
            "postgres://dagforge:p%40ss%2Fword@db:5432/dagforge?sslmode=disable"
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = args(&[
            "--server-port",
            "http",
            "--log-level",
            "TRACE",
            "--inference-policy",
            "lenient",
        ])
        .validate()
        .unwrap_err();
        assert_eq!(err.0.len(), 3);
        assert!(err.to_string().contains("--server-port"));
    }

    #[test]
    fn test_short_app_key_rejected() {
        let err = args(&["--app-key", "short"]).validate().unwrap_err();
        assert!(err.to_string().contains("at least 32"));
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(log_filter("WARNING"), Some("warn"));
        assert_eq!(log_filter("fatal"), Some("error"));
        assert_eq!(log_filter("info"), Some("info"));
        assert_eq!(log_filter("verbose"), None);
    }
}
