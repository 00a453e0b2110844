// components/media_probe/src/classify.rs
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlKind {
    Single,
    Playlist,
}

/// Cheap classification against the URL's query parameters, no network.
///
/// A URL carrying pure playlist parameters (a `list` with no explicit
/// single-video `v`) is a playlist; a `watch?v=..&list=..` URL still means
/// the one video.
pub fn classify(url: &Url) -> UrlKind {
    let mut has_list = false;
    let mut has_video = false;
    for (key, _) in url.query_pairs() {
        match key.as_ref() {
            "list" => has_list = true,
            "v" => has_video = true,
            _ => {}
        }
    }

    if url.path().starts_with("/playlist") || (has_list && !has_video) {
        UrlKind::Playlist
    } else {
        UrlKind::Single
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(s: &str) -> UrlKind {
        classify(&Url::parse(s).unwrap())
    }

    #[test]
    fn test_plain_video_is_single() {
        assert_eq!(kind("https://www.youtube.com/watch?v=abc123"), UrlKind::Single);
    }

    #[test]
    fn test_pure_list_parameter_is_playlist() {
        assert_eq!(
            kind("https://www.youtube.com/watch?list=PL123"),
            UrlKind::Playlist
        );
    }

    #[test]
    fn test_playlist_path_is_playlist() {
        assert_eq!(
            kind("https://www.youtube.com/playlist?list=PL123"),
            UrlKind::Playlist
        );
    }

    #[test]
    fn test_video_inside_playlist_is_single() {
        assert_eq!(
            kind("https://www.youtube.com/watch?v=abc123&list=PL123"),
            UrlKind::Single
        );
    }

    #[test]
    fn test_unrelated_url_is_single() {
        assert_eq!(kind("https://example.com/some/audio.mp3"), UrlKind::Single);
    }
}
