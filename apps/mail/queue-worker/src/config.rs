//! Worker settings loaded from the environment.

use core_config::redis::RedisConfig;
use core_config::server::ServerConfig;
use core_config::{ConfigError, Environment, FromEnv, env_bool, env_list, env_or_default, env_parse};
use domain_mail::{DispatchOptions, ProcessorConfig};
use grpc_client::ClientConfig;
use std::time::Duration;
use stream_worker::{QueueSpec, WorkerConfig};

const DEFAULT_QUEUES: &str = "mail:critical=6,mail:default=3,mail:low=1";
const DEFAULT_CLIENTS: &str = "mail-service=http://127.0.0.1:50051";

/// Everything the queue worker reads from the environment
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub environment: Environment,
    pub redis: RedisConfig,
    pub queues: Vec<QueueSpec>,
    pub concurrency: usize,
    pub consumer_group: String,
    /// Unset means a generated `worker-<uuid>`
    pub consumer_id: Option<String>,
    pub max_retries: u32,
    pub job_timeout: Duration,
    pub status_timeout: Duration,
    pub test_recipients: Vec<String>,
    pub test_append: bool,
    pub tls_skip_verify: bool,
    pub send_timeout: Duration,
    /// Pool key of the endpoint serving templates, providers, history and status
    pub mail_service_endpoint: String,
    pub grpc_clients: Vec<ClientConfig>,
    pub health: ServerConfig,
}

impl FromEnv for WorkerSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let environment = Environment::from_env();

        let queues = QueueSpec::parse_list(&env_or_default("MAIL_QUEUES", DEFAULT_QUEUES))
            .map_err(|e| parse_error("MAIL_QUEUES", e))?;

        let client_defaults = ClientConfig::new("defaults", "127.0.0.1")
            .with_dial_timeout(Duration::from_millis(env_parse("GRPC_DIAL_TIMEOUT_MS", 5000u64)?))
            .with_max_retries(env_parse("GRPC_MAX_RETRIES", 3u32)?)
            .with_keepalive(Duration::from_secs(env_parse("GRPC_KEEPALIVE_SECS", 10u64)?));
        let grpc_clients = ClientConfig::parse_list(&env_or_default("GRPC_CLIENTS", DEFAULT_CLIENTS), &client_defaults)
            .map_err(|e| parse_error("GRPC_CLIENTS", e))?;

        let consumer_id = std::env::var("MAIL_CONSUMER_ID")
            .ok()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        Ok(Self {
            redis: RedisConfig::from_env()?,
            queues,
            concurrency: env_parse("MAIL_WORKER_CONCURRENCY", 10usize)?,
            consumer_group: env_or_default("MAIL_CONSUMER_GROUP", "mail_workers"),
            consumer_id,
            max_retries: env_parse("MAIL_MAX_RETRIES", 3u32)?,
            job_timeout: Duration::from_secs(env_parse("MAIL_JOB_TIMEOUT_SECS", 60u64)?),
            status_timeout: Duration::from_secs(env_parse("MAIL_STATUS_TIMEOUT_SECS", 5u64)?),
            test_recipients: env_list("MAIL_TEST_RECIPIENTS"),
            test_append: env_bool("MAIL_TEST_APPEND", false)?,
            tls_skip_verify: env_bool("MAIL_TLS_SKIP_VERIFY", !environment.is_production())?,
            send_timeout: Duration::from_secs(env_parse("MAIL_SEND_TIMEOUT_SECS", 30u64)?),
            mail_service_endpoint: env_or_default("MAIL_SERVICE_ENDPOINT", "mail-service"),
            grpc_clients,
            health: ServerConfig::from_env_with("MAIL_WORKER_HEALTH_HOST", "MAIL_WORKER_HEALTH_PORT", 8081)?,
            environment,
        })
    }
}

impl WorkerSettings {
    pub fn worker_config(&self) -> WorkerConfig {
        let config = WorkerConfig::new(self.queues.clone(), &self.consumer_group)
            .with_concurrency(self.concurrency)
            .with_max_retries(self.max_retries)
            .with_job_timeout(self.job_timeout)
            .with_metrics_prefix("mail");

        match &self.consumer_id {
            Some(id) => config.with_consumer_id(id),
            None => config,
        }
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig::default()
            .with_production(self.environment.is_production())
            .with_test_recipients(self.test_recipients.clone(), self.test_append)
            .with_status_timeout(self.status_timeout)
            .with_dispatch(DispatchOptions {
                skip_tls_verify: self.tls_skip_verify,
                timeout: self.send_timeout,
            })
    }
}

fn parse_error(key: &str, err: impl std::fmt::Display) -> ConfigError {
    ConfigError::ParseError {
        key: key.to_string(),
        details: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYS: [&str; 14] = [
        "APP_ENV",
        "REDIS_URL",
        "REDIS_HOST",
        "MAIL_QUEUES",
        "MAIL_WORKER_CONCURRENCY",
        "MAIL_CONSUMER_ID",
        "MAIL_MAX_RETRIES",
        "MAIL_TEST_RECIPIENTS",
        "MAIL_TEST_APPEND",
        "MAIL_TLS_SKIP_VERIFY",
        "GRPC_CLIENTS",
        "GRPC_DIAL_TIMEOUT_MS",
        "GRPC_MAX_RETRIES",
        "MAIL_WORKER_HEALTH_PORT",
    ];

    fn cleared() -> Vec<(&'static str, Option<&'static str>)> {
        KEYS.iter().map(|k| (*k, None)).collect()
    }

    #[test]
    fn test_defaults() {
        temp_env::with_vars(cleared(), || {
            let settings = WorkerSettings::from_env().unwrap();

            assert_eq!(settings.environment, Environment::Development);
            assert_eq!(settings.redis.url, "redis://127.0.0.1:6379");
            assert_eq!(
                settings.queues,
                vec![
                    QueueSpec::new("mail:critical", 6),
                    QueueSpec::new("mail:default", 3),
                    QueueSpec::new("mail:low", 1),
                ]
            );
            assert_eq!(settings.concurrency, 10);
            assert_eq!(settings.max_retries, 3);
            assert!(settings.consumer_id.is_none());
            assert!(settings.test_recipients.is_empty());
            assert!(settings.tls_skip_verify);
            assert_eq!(settings.grpc_clients.len(), 1);
            assert_eq!(settings.grpc_clients[0].name, "mail-service");
            assert_eq!(settings.grpc_clients[0].dial_timeout, Duration::from_millis(5000));
            assert_eq!(settings.health.port, 8081);
        });
    }

    #[test]
    fn test_production_verifies_tls_and_ignores_test_recipients() {
        let mut vars = cleared();
        vars.push(("APP_ENV", Some("production")));
        vars.push(("MAIL_TEST_RECIPIENTS", Some("qa@x.com")));

        temp_env::with_vars(vars, || {
            let settings = WorkerSettings::from_env().unwrap();
            assert!(!settings.tls_skip_verify);

            let processor = settings.processor_config();
            assert!(processor.production);
            assert!(!processor.dispatch.skip_tls_verify);
        });
    }

    #[test]
    fn test_overrides() {
        let mut vars = cleared();
        vars.push(("MAIL_QUEUES", Some("mail:only=2")));
        vars.push(("MAIL_WORKER_CONCURRENCY", Some("4")));
        vars.push(("MAIL_CONSUMER_ID", Some("worker-a")));
        vars.push(("MAIL_TEST_RECIPIENTS", Some("qa@x.com, dev@x.com")));
        vars.push(("MAIL_TEST_APPEND", Some("true")));
        vars.push(("GRPC_CLIENTS", Some("mail-service=mail:50051,audit=audit:50051")));
        vars.push(("GRPC_MAX_RETRIES", Some("0")));

        temp_env::with_vars(vars, || {
            let settings = WorkerSettings::from_env().unwrap();
            let worker = settings.worker_config();

            assert_eq!(worker.queues, vec![QueueSpec::new("mail:only", 2)]);
            assert_eq!(worker.concurrency, 4);
            assert_eq!(worker.consumer_id, "worker-a");
            assert_eq!(worker.metrics_prefix, "mail");
            assert_eq!(settings.test_recipients, vec!["qa@x.com", "dev@x.com"]);
            assert!(settings.processor_config().test_append);
            assert_eq!(settings.grpc_clients[1].address, "http://audit:50051");
            assert_eq!(settings.grpc_clients[1].max_retries, 0);
        });
    }

    #[test]
    fn test_invalid_values_are_errors() {
        let mut vars = cleared();
        vars.push(("MAIL_WORKER_CONCURRENCY", Some("many")));
        temp_env::with_vars(vars, || {
            assert!(matches!(
                WorkerSettings::from_env(),
                Err(ConfigError::ParseError { ref key, .. }) if key == "MAIL_WORKER_CONCURRENCY"
            ));
        });

        let mut vars = cleared();
        vars.push(("GRPC_CLIENTS", Some("mail-service")));
        temp_env::with_vars(vars, || {
            assert!(matches!(
                WorkerSettings::from_env(),
                Err(ConfigError::ParseError { ref key, .. }) if key == "GRPC_CLIENTS"
            ));
        });
    }
}
