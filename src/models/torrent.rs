use std::collections::BTreeSet;

/// Point-in-time view of a torrent as reported by the download client
#[derive(Clone, Debug, PartialEq)]
pub struct TorrentSnapshot {
    /// Client-assigned numeric id, used as the state store key
    pub id: u32,
    /// Display name
    pub name: String,
    /// Labels attached in the client
    pub labels: BTreeSet<String>,
    /// Unix timestamp the torrent was added
    pub added_at: Option<i64>,
    /// Fraction downloaded, 0.0 to 1.0
    pub completion_fraction: f64,
    /// Unix timestamp the download finished
    pub completed_at: Option<i64>,
    /// Instantaneous download rate in bytes per second
    pub download_rate: u64,
    /// Number of connected peers
    pub connected_peers: u32,
    /// 40-character hex info hash; survives client restarts unlike `id`
    pub removal_key: Option<String>,
}

impl TorrentSnapshot {
    pub fn is_complete(&self) -> bool {
        self.completion_fraction == 1.0
    }

    pub fn download_rate_kbps(&self) -> f64 {
        self.download_rate as f64 / 1024.0
    }

    /// Returns true when any label is in `ignore_labels`
    pub fn has_any_label(&self, ignore_labels: &BTreeSet<String>) -> bool {
        !self.labels.is_disjoint(ignore_labels)
    }

    /// Labels that matched the ignore set, for logging
    pub fn matching_labels(&self, ignore_labels: &BTreeSet<String>) -> Vec<String> {
        self.labels.intersection(ignore_labels).cloned().collect()
    }
}

/// Validates a Transmission `hashString` and returns it in lowercase
pub fn normalize_info_hash(hash: &str) -> Option<String> {
    let bytes = hex::decode(hash.trim()).ok()?;
    if bytes.len() != 20 {
        return None;
    }
    Some(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(labels: &[&str]) -> TorrentSnapshot {
        TorrentSnapshot {
            id: 1,
            name: "ubuntu.iso".to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            added_at: Some(1_700_000_000),
            completion_fraction: 0.5,
            completed_at: None,
            download_rate: 10 * 1024,
            connected_peers: 3,
            removal_key: None,
        }
    }

    #[test]
    fn test_label_intersection() {
        let ignore: BTreeSet<String> = ["keep".to_string()].into_iter().collect();

        assert!(snapshot(&["keep", "movies"]).has_any_label(&ignore));
        assert!(!snapshot(&["movies"]).has_any_label(&ignore));
        assert!(!snapshot(&[]).has_any_label(&ignore));
        assert_eq!(snapshot(&["keep", "movies"]).matching_labels(&ignore), vec!["keep"]);
    }

    #[test]
    fn test_download_rate_kbps() {
        assert_eq!(snapshot(&[]).download_rate_kbps(), 10.0);
    }

    #[test]
    fn test_is_complete_requires_exact_one() {
        let mut t = snapshot(&[]);
        t.completion_fraction = 0.9999;
        assert!(!t.is_complete());
        t.completion_fraction = 1.0;
        assert!(t.is_complete());
    }

    #[test]
    fn test_normalize_info_hash() {
        let hash = "AABBCCDDEEFF00112233445566778899AABBCCDD";
        assert_eq!(
            normalize_info_hash(hash).as_deref(),
            Some("aabbccddeeff00112233445566778899aabbccdd")
        );
        assert!(normalize_info_hash("abcd").is_none());
        assert!(normalize_info_hash("zz").is_none());
        assert!(normalize_info_hash("").is_none());
    }
}
