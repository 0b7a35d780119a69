use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use hopwire_core::NodeId;
use thiserror::Error;

use crate::dsr::{PacketLogger, Stats};
use crate::route_cache::RouteCache;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to write {0}: {1}")]
    Write(PathBuf, std::io::Error),
}

/// Reads a node's neighbor list from `AccessTable.txt`: one `NodeId` per
/// non-empty line.
pub fn load_neighbors(path: impl AsRef<Path>) -> Result<Vec<NodeId>, PersistenceError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| PersistenceError::Read(path.to_path_buf(), e))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| line.parse::<u16>().ok())
        .map(|n| n as NodeId)
        .collect())
}

/// Appends a line to a plaintext log file, creating it if absent. Used for
/// `PacketLog.txt` and the ledger activity logs.
fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

/// Writes packet-activity lines into `<node_dir>/PacketLog.txt`.
pub struct FilePacketLogger {
    path: PathBuf,
}

impl FilePacketLogger {
    pub fn new(node_dir: impl AsRef<Path>) -> Self {
        Self {
            path: node_dir.as_ref().join("PacketLog.txt"),
        }
    }
}

impl PacketLogger for FilePacketLogger {
    /// Formats `line` as `<ISO-8601 timestamp> [<ACTION>] <rest>`, splitting
    /// the action code off the line's first word (e.g. `"SEND seq=1 ..."`
    /// becomes `[SEND] seq=1 ...`).
    fn log(&self, line: &str) {
        let timestamp = chrono::Utc::now().to_rfc3339();
        let (action, rest) = line.split_once(' ').unwrap_or((line, ""));
        let formatted = if rest.is_empty() {
            format!("{timestamp} [{action}]")
        } else {
            format!("{timestamp} [{action}] {rest}")
        };
        // best-effort: a logging failure must never take the node down
        let _ = append_line(&self.path, &formatted);
    }
}

/// Renders `Stats.txt`: sent/received/forwarded/dropped counters and the
/// derived packet-delivery ratio.
pub fn render_stats_text(stats: &Stats) -> String {
    let (sent, received, forwarded, dropped) = stats.snapshot();
    let attempted = sent + forwarded + dropped;
    let pdr = if attempted == 0 {
        0.0
    } else {
        (sent + forwarded) as f64 / attempted as f64
    };
    format!(
        "packets_sent={sent}\npackets_received={received}\npackets_forwarded={forwarded}\npackets_dropped={dropped}\npacket_delivery_ratio={pdr:.4}\n"
    )
}

/// Atomically writes text to `path` via a temp-file-then-rename, so a
/// reader never observes a half-written snapshot.
pub fn write_text_atomic(path: impl AsRef<Path>, contents: &str) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PersistenceError::Write(path.to_path_buf(), e))?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents).map_err(|e| PersistenceError::Write(tmp.clone(), e))?;
    fs::rename(&tmp, path).map_err(|e| PersistenceError::Write(path.to_path_buf(), e))
}

/// Snapshots `Stats.txt`, `RouteCache.txt`, and `DSR_RouteCache.txt` into
/// `node_dir`.
pub fn snapshot_node_state(
    node_dir: impl AsRef<Path>,
    stats: &Stats,
    route_cache: &RouteCache,
) -> Result<(), PersistenceError> {
    let node_dir = node_dir.as_ref();
    write_text_atomic(node_dir.join("Stats.txt"), &render_stats_text(stats))?;
    let cache_text = route_cache.render_text();
    write_text_atomic(node_dir.join("RouteCache.txt"), &cache_text)?;
    write_text_atomic(node_dir.join("DSR_RouteCache.txt"), &cache_text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn load_neighbors_parses_one_id_per_line_and_skips_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("AccessTable.txt");
        std::fs::write(&path, "1\n2\n\n3\n").unwrap();

        let neighbors = load_neighbors(&path).unwrap();
        assert_eq!(neighbors, vec![1, 2, 3]);
    }

    #[test]
    fn load_neighbors_errors_when_file_missing() {
        assert!(load_neighbors("/nonexistent/AccessTable.txt").is_err());
    }

    #[test]
    fn file_packet_logger_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let logger = FilePacketLogger::new(dir.path());
        logger.log("SEND seq=1 dest=4 via=1");
        logger.log("ACK seq=1 to=1");

        let contents = std::fs::read_to_string(dir.path().join("PacketLog.txt")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[SEND] seq=1 dest=4 via=1"));
        assert!(lines[1].contains("[ACK] seq=1 to=1"));
    }

    #[test]
    fn file_packet_logger_prefixes_each_line_with_an_rfc3339_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let logger = FilePacketLogger::new(dir.path());
        logger.log("DROP malformed datagram");

        let contents = std::fs::read_to_string(dir.path().join("PacketLog.txt")).unwrap();
        let line = contents.lines().next().unwrap();
        let (timestamp, rest) = line.split_once(' ').unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
        assert_eq!(rest, "[DROP] malformed datagram");
    }

    #[test]
    fn render_stats_text_computes_pdr() {
        let stats = Stats::default();
        stats.packets_sent.store(8, Ordering::Relaxed);
        stats.packets_forwarded.store(0, Ordering::Relaxed);
        stats.packets_dropped.store(2, Ordering::Relaxed);

        let text = render_stats_text(&stats);
        assert!(text.contains("packets_sent=8"));
        assert!(text.contains("packet_delivery_ratio=0.8000"));
    }

    #[test]
    fn snapshot_node_state_writes_all_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let stats = Stats::default();
        let cache = RouteCache::new();
        cache.add_or_update(0, 4, vec![0, 1, 4]);

        snapshot_node_state(dir.path(), &stats, &cache).unwrap();

        assert!(dir.path().join("Stats.txt").exists());
        assert!(dir.path().join("RouteCache.txt").exists());
        assert!(dir.path().join("DSR_RouteCache.txt").exists());
    }
}
