// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub mod cli;
pub mod logger;

use std::path::Path;

use anyhow::Context as _;

use crate::cli_shared::cli::Config;

/// Reads the configuration file, or the defaults when no path is given.
pub fn read_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            let toml = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&toml).with_context(|| format!("parsing {}", path.display()))
        }
        None => Ok(Config::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli_shared::cli::StorageBackend;
    use std::io::Write as _;

    #[test]
    fn read_config_default() {
        assert_eq!(read_config(None).unwrap(), Config::default());
    }

    #[test]
    fn read_config_with_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[storage]\nbackend = \"memory\"\n").unwrap();
        let config = read_config(Some(file.path())).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.indexer, Config::default().indexer);
    }

    #[test]
    fn read_config_errors() {
        assert!(read_config(Some(Path::new("/no/such/config.toml"))).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[storage]\nbackend = \"postgres\"\n").unwrap();
        assert!(read_config(Some(file.path())).is_err());
    }
}
