use std::env;

use anyhow::{Context, Result};

use crate::pipeline::SimilarityParams;

/// Central configuration loaded from environment variables.
///
/// The .env file is loaded automatically at startup via dotenvy. Every
/// knob has a default, so `kindred init` works with no configuration;
/// CLI flags override these values per run.
pub struct Config {
    pub db_path: String,
    /// Minimum co-rated businesses for a user pair (KINDRED_MIN_COMMON_ITEMS).
    pub min_common_items: u32,
    /// Inclusive edge threshold, 0.0 to 1.0 (KINDRED_MIN_SIMILARITY).
    pub min_similarity: f64,
    /// Entities per batch (KINDRED_BATCH_SIZE).
    pub batch_size: usize,
    /// Concurrent batch workers (KINDRED_WORKERS).
    pub workers: usize,
}

impl Config {
    /// Load configuration from environment variables, falling back to the
    /// defaults of `SimilarityParams` where unset.
    pub fn load() -> Result<Self> {
        let defaults = SimilarityParams::default();

        Ok(Self {
            db_path: env::var("KINDRED_DB_PATH").unwrap_or_else(|_| "./kindred.db".to_string()),
            min_common_items: parse_var("KINDRED_MIN_COMMON_ITEMS", defaults.min_common_items)?,
            min_similarity: parse_var("KINDRED_MIN_SIMILARITY", defaults.min_similarity)?,
            batch_size: parse_var("KINDRED_BATCH_SIZE", defaults.batch_size)?,
            workers: parse_var("KINDRED_WORKERS", defaults.workers)?,
        })
    }

    /// Engine parameters for a run, with optional CLI overrides applied on
    /// top of the environment values.
    pub fn params(
        &self,
        min_common_items: Option<u32>,
        min_similarity: Option<f64>,
        batch_size: Option<usize>,
        workers: Option<usize>,
    ) -> Result<SimilarityParams> {
        let params = SimilarityParams {
            min_common_items: min_common_items.unwrap_or(self.min_common_items),
            min_similarity: min_similarity.unwrap_or(self.min_similarity),
            batch_size: batch_size.unwrap_or(self.batch_size),
            workers: workers.unwrap_or(self.workers),
        };

        if !(0.0..=1.0).contains(&params.min_similarity) {
            anyhow::bail!(
                "min_similarity must be between 0.0 and 1.0, got {}",
                params.min_similarity
            );
        }
        if params.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        if params.workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }

        Ok(params)
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("Invalid value for {name}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            db_path: "./kindred.db".to_string(),
            min_common_items: 3,
            min_similarity: 0.3,
            batch_size: 500,
            workers: 4,
        }
    }

    #[test]
    fn test_params_uses_config_defaults() {
        let params = base_config().params(None, None, None, None).unwrap();
        assert_eq!(params.min_common_items, 3);
        assert_eq!(params.min_similarity, 0.3);
        assert_eq!(params.batch_size, 500);
        assert_eq!(params.workers, 4);
    }

    #[test]
    fn test_params_cli_overrides_win() {
        let params = base_config()
            .params(Some(5), Some(0.7), Some(100), Some(2))
            .unwrap();
        assert_eq!(params.min_common_items, 5);
        assert_eq!(params.min_similarity, 0.7);
        assert_eq!(params.batch_size, 100);
        assert_eq!(params.workers, 2);
    }

    #[test]
    fn test_params_rejects_out_of_range_similarity() {
        assert!(base_config().params(None, Some(1.5), None, None).is_err());
        assert!(base_config().params(None, Some(-0.1), None, None).is_err());
    }

    #[test]
    fn test_params_rejects_zero_workers_and_batch() {
        assert!(base_config().params(None, None, Some(0), None).is_err());
        assert!(base_config().params(None, None, None, Some(0)).is_err());
    }
}
