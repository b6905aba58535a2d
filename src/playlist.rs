//! Decoding of the `vod_play_from` / `vod_play_url` fields of a detail record.
//!
//! `vod_play_from` holds source names joined by `$$$`. `vod_play_url` holds one
//! group per source, also joined by `$$$`; a group is a `#`-joined list of
//! `name$url` episodes. Groups are matched to names by position.

use crate::types::{Episode, PlaySource};

pub const GROUP_SEPARATOR: &str = "$$$";
pub const EPISODE_SEPARATOR: char = '#';
pub const FIELD_SEPARATOR: char = '$';

pub fn parse_play_sources(play_from: &str, play_url: &str) -> Vec<PlaySource> {
    let groups: Vec<&str> = play_url.split(GROUP_SEPARATOR).collect();
    play_from
        .split(GROUP_SEPARATOR)
        .enumerate()
        .map(|(i, flag)| PlaySource {
            flag: flag.to_string(),
            episodes: groups.get(i).map(|g| parse_episodes(g)).unwrap_or_default(),
        })
        .collect()
}

fn parse_episodes(group: &str) -> Vec<Episode> {
    group
        .trim()
        .split(EPISODE_SEPARATOR)
        .filter_map(|chunk| {
            let mut parts = chunk.split(FIELD_SEPARATOR);
            match (parts.next(), parts.next(), parts.next()) {
                (Some(name), Some(url), None) => Some(Episode { name: name.to_string(), url: url.to_string() }),
                _ => None,
            }
        })
        .collect()
}

/// Largest episode count over all sources.
pub fn max_episode_count(sources: &[PlaySource]) -> usize {
    sources.iter().map(|s| s.episodes.len()).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(name: &str, url: &str) -> Episode {
        Episode { name: name.into(), url: url.into() }
    }

    #[test]
    fn groups_align_by_position() {
        let out = parse_play_sources("A$$$B", "ep1$u1#ep2$u2$$$ep1$u3");
        assert_eq!(
            out,
            vec![
                PlaySource { flag: "A".into(), episodes: vec![ep("ep1", "u1"), ep("ep2", "u2")] },
                PlaySource { flag: "B".into(), episodes: vec![ep("ep1", "u3")] },
            ]
        );
    }

    #[test]
    fn malformed_chunks_are_dropped() {
        let out = parse_play_sources("A", "ep1$u1#badchunk");
        assert_eq!(out[0].episodes, vec![ep("ep1", "u1")]);
        let out = parse_play_sources("A", "ep1$u1$extra#ep2$u2");
        assert_eq!(out[0].episodes, vec![ep("ep2", "u2")]);
    }

    #[test]
    fn missing_url_group_gives_empty_source() {
        let out = parse_play_sources("A$$$B$$$C", "ep1$u1");
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].episodes.len(), 1);
        assert!(out[1].episodes.is_empty());
        assert!(out[2].episodes.is_empty());
    }

    #[test]
    fn groups_are_trimmed_before_splitting() {
        let out = parse_play_sources("m3u8", "  第1集$https://cdn/1.m3u8#第2集$https://cdn/2.m3u8\n");
        assert_eq!(out[0].episodes.len(), 2);
        assert_eq!(out[0].episodes[1].url, "https://cdn/2.m3u8");
    }

    #[test]
    fn empty_source_name_still_takes_first_group() {
        let out = parse_play_sources("", "ep1$u1#ep2$u2");
        assert_eq!(out, vec![PlaySource { flag: String::new(), episodes: vec![ep("ep1", "u1"), ep("ep2", "u2")] }]);

        let out = parse_play_sources("", "");
        assert_eq!(out, vec![PlaySource { flag: String::new(), episodes: vec![] }]);
        assert_eq!(max_episode_count(&out), 0);
        assert_eq!(max_episode_count(&[]), 0);
    }

    #[test]
    fn max_episode_count_picks_largest_source() {
        let out = parse_play_sources("A$$$B", "1$a$$$1$a#2$b#3$c");
        assert_eq!(max_episode_count(&out), 3);
    }
}
