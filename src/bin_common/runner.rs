//! Binary runner utilities
//!
//! Provides a standardized way to run binaries with a banner, a fixed
//! number of steps and a clean shutdown message.

use std::time::Duration;
use tracing::info;

/// Configuration for running a binary application
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Name of the binary (for logging)
    pub name: String,
    /// Number of steps the main loop performs
    pub steps: u32,
    /// Pause between steps
    pub step_interval: Duration,
}

impl RunConfig {
    /// Create a new run configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: 3,
            step_interval: Duration::from_millis(250),
        }
    }

    /// Set number of steps
    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    /// Set pause between steps
    pub fn with_step_interval(mut self, interval: Duration) -> Self {
        self.step_interval = interval;
        self
    }
}

/// Trait for binary applications
#[allow(async_fn_in_trait)]
pub trait BinaryRunner {
    /// Perform one step of the main loop
    async fn step(&mut self, index: u32) -> anyhow::Result<()>;

    /// Get the run configuration
    fn config(&self) -> &RunConfig;

    /// Summary printed on shutdown
    fn summary(&self) -> Option<String> {
        None
    }

    /// Print startup banner
    fn print_banner(&self) {
        let config = self.config();
        info!("");
        info!("========================================");
        info!("Starting {}", config.name);
        info!("========================================");
        info!("");
    }

    /// Print shutdown banner
    fn print_shutdown(&self, stats: Option<&str>) {
        let config = self.config();
        info!("");
        info!("========================================");
        info!("{} stopped gracefully", config.name);
        if let Some(stats) = stats {
            info!("{}", stats);
        }
        info!("========================================");
    }

    /// Execute the binary with proper initialization and cleanup
    async fn execute(&mut self) -> anyhow::Result<()> {
        self.print_banner();
        let steps = self.config().steps;
        let interval = self.config().step_interval;

        let mut result = Ok(());
        for index in 0..steps {
            if let Err(e) = self.step(index).await {
                result = Err(e);
                break;
            }
            if index + 1 < steps {
                tokio::time::sleep(interval).await;
            }
        }

        let summary = self.summary();
        self.print_shutdown(summary.as_deref());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_builder() {
        let config = RunConfig::new("test-binary")
            .with_steps(10)
            .with_step_interval(Duration::from_millis(5));

        assert_eq!(config.name, "test-binary");
        assert_eq!(config.steps, 10);
        assert_eq!(config.step_interval, Duration::from_millis(5));
    }

    #[test]
    fn test_default_config() {
        let config = RunConfig::new("default");
        assert_eq!(config.steps, 3);
        assert_eq!(config.step_interval, Duration::from_millis(250));
    }

    struct Counting {
        config: RunConfig,
        seen: Vec<u32>,
    }

    impl BinaryRunner for Counting {
        async fn step(&mut self, index: u32) -> anyhow::Result<()> {
            self.seen.push(index);
            if index == 2 {
                anyhow::bail!("stop at 2");
            }
            Ok(())
        }

        fn config(&self) -> &RunConfig {
            &self.config
        }
    }

    #[tokio::test]
    async fn test_execute_stops_on_first_error() {
        let mut runner = Counting {
            config: RunConfig::new("counting")
                .with_steps(5)
                .with_step_interval(Duration::from_millis(1)),
            seen: Vec::new(),
        };

        assert!(runner.execute().await.is_err());
        assert_eq!(runner.seen, vec![0, 1, 2]);
    }
}
