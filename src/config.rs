//! TOML configuration, grounded in SPEC_FULL.md's `[buckets]`/`[index]`/
//! `[sorter]` schema. `bucket_file` is the only required key; everything
//! else defaults to the values given there.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

fn default_buf_size() -> usize {
    65536
}

fn default_shake_buf_size() -> usize {
    1_048_576
}

fn default_presort_buffer() -> usize {
    16_777_216
}

fn default_stream_buffer() -> usize {
    1_048_576
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketsConfig {
    pub bucket_file: String,
    #[serde(default = "default_buf_size")]
    pub buf_size: usize,
    #[serde(default = "default_shake_buf_size")]
    pub shake_buf_size: usize,
    #[serde(default)]
    pub shake_security: u32,
    #[serde(default = "default_buf_size")]
    pub slurp_buf_size: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct IndexConfig {
    pub presort_buffer: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig { presort_buffer: default_presort_buffer() }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SorterConfig {
    pub stream_buffer: usize,
}

impl Default for SorterConfig {
    fn default() -> Self {
        SorterConfig { stream_buffer: default_stream_buffer() }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub buckets: BucketsConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub sorter: SorterConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_in_defaults() {
        let cfg: Config = toml::from_str(r#"[buckets]
bucket_file = "cards.pool"
"#)
        .unwrap();
        assert_eq!(cfg.buckets.bucket_file, "cards.pool");
        assert_eq!(cfg.buckets.buf_size, 65536);
        assert_eq!(cfg.index.presort_buffer, 16_777_216);
        assert_eq!(cfg.sorter.stream_buffer, 1_048_576);
    }

    #[test]
    fn unknown_key_is_a_configuration_error() {
        let result: Result<Config, _> = toml::from_str(
            r#"[buckets]
bucket_file = "cards.pool"
bogus_key = 1
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn missing_bucket_file_is_a_configuration_error() {
        let result: Result<Config, _> = toml::from_str("[buckets]\n");
        assert!(result.is_err());
    }
}
