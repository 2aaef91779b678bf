//! Process-lifetime node configuration.
//!
//! The teacher's `Config` is a `once_cell::sync::Lazy` global. §9 of the spec
//! asks for singletons to be replaced by an explicit node-scoped object, so
//! `Config` here is an ordinary value owned by [`crate::node::NodeState`] and
//! loaded exactly once at startup -- never a process-global.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use uuid::Uuid;

/// Difficulty is clamped into this range at load time (§6).
const DIFFICULTY_RANGE: std::ops::RangeInclusive<u32> = 0..=256;

pub const REWARD_COIN_VALUE: u64 = 5;
pub const BUFFER_SIZE: usize = 256;
pub const DEFAULT_WORKER_POOL_SIZE: usize = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub node_id: Uuid,
    pub difficulty: u32,
    pub worker_pool_size: usize,
    pub is_miner: bool,
    pub benchmark_mode: bool,
    pub peers: Vec<SocketAddr>,
}

impl Config {
    /// Reads `difficulty` out of a `config.ini`-style file (section
    /// `[General]`), clamping to `DIFFICULTY_RANGE`. The rest of the fields
    /// come from the CLI collaborator (§6) and are passed in directly rather
    /// than re-read from disk.
    pub fn load(
        config_path: &Path,
        bind_addr: SocketAddr,
        node_id: Uuid,
        worker_pool_size: usize,
        is_miner: bool,
        benchmark_mode: bool,
        peers: Vec<SocketAddr>,
    ) -> Self {
        let difficulty = read_difficulty(config_path).unwrap_or(0);
        Config {
            bind_addr,
            node_id,
            difficulty: difficulty.clamp(*DIFFICULTY_RANGE.start(), *DIFFICULTY_RANGE.end()),
            worker_pool_size,
            is_miner,
            benchmark_mode,
            peers,
        }
    }
}

fn read_difficulty(path: &Path) -> Option<u32> {
    let contents = fs::read_to_string(path).ok()?;
    let mut in_general = false;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') {
            in_general = line.eq_ignore_ascii_case("[General]");
            continue;
        }
        if !in_general {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim().eq_ignore_ascii_case("difficulty") {
                return value.trim().parse().ok();
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_ini(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn reads_difficulty_from_general_section() {
        let f = write_ini("[General]\ndifficulty = 4\n");
        assert_eq!(read_difficulty(f.path()), Some(4));
    }

    #[test]
    fn clamps_difficulty_above_range() {
        let f = write_ini("[General]\ndifficulty = 9000\n");
        let cfg = Config::load(
            f.path(),
            "127.0.0.1:0".parse().unwrap(),
            Uuid::new_v4(),
            DEFAULT_WORKER_POOL_SIZE,
            false,
            false,
            vec![],
        );
        assert_eq!(cfg.difficulty, 256);
    }

    #[test]
    fn missing_file_defaults_to_zero() {
        let cfg = Config::load(
            Path::new("/nonexistent/config.ini"),
            "127.0.0.1:0".parse().unwrap(),
            Uuid::new_v4(),
            DEFAULT_WORKER_POOL_SIZE,
            false,
            false,
            vec![],
        );
        assert_eq!(cfg.difficulty, 0);
    }
}
