//! Dedup ids shared by a pixel event and its server-mirrored counterpart.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;

const SUFFIX_LEN: usize = 9;

/// `{epoch millis}-{9 random lowercase alphanumerics}`.
pub fn generate_event_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}-{}", Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_event_id_shape() {
        let id = generate_event_id();
        let (prefix, suffix) = id.split_once('-').unwrap();
        assert!(prefix.parse::<i64>().unwrap() > 0);
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_event_ids_do_not_collide() {
        let ids: HashSet<String> = (0..10_000).map(|_| generate_event_id()).collect();
        assert_eq!(ids.len(), 10_000);
    }
}
