use std::path::PathBuf;

use primitives::Genesis;

/// Controller configuration. The genesis parameters are only consulted
/// when no prior head exists.
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory reserved for the state store.
    pub state_dir: PathBuf,
    /// Directory reserved for the token store.
    pub token_db_dir: PathBuf,
    /// Directory holding the append-only block log.
    pub block_log_dir: PathBuf,
    /// Refuse all block production and application.
    pub read_only: bool,
    pub genesis: Genesis,
}

impl Config {
    /// Lays the standard directory layout under one base directory.
    pub fn under(base: impl Into<PathBuf>, genesis: Genesis) -> Self {
        let base = base.into();
        Config {
            state_dir: base.join("state"),
            token_db_dir: base.join("tokendb"),
            block_log_dir: base.join("blocks"),
            read_only: false,
            genesis,
        }
    }
}
