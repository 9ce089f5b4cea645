use serde::Deserialize;

/// Envelope shared by the `channels`, `playlistItems` and `videos` list
/// endpoints. Only the fields we consume are modeled; the platform may omit
/// any of them.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelItem {
    pub id: String,
    pub snippet: Option<ChannelSnippet>,
    pub statistics: Option<ChannelStatistics>,
    pub content_details: Option<ChannelContentDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSnippet {
    pub title: Option<String>,
    pub custom_url: Option<String>,
    pub country: Option<String>,
    pub published_at: Option<String>,
}

/// Statistics arrive as strings, and some (subscriber counts in particular)
/// may be hidden by the channel owner.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatistics {
    pub subscriber_count: Option<String>,
    pub view_count: Option<String>,
    pub video_count: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelContentDetails {
    pub related_playlists: Option<RelatedPlaylists>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedPlaylists {
    pub uploads: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItem {
    pub content_details: Option<PlaylistItemContentDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItemContentDetails {
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoItem {
    pub id: String,
    pub snippet: Option<VideoSnippet>,
    pub content_details: Option<VideoContentDetails>,
    pub statistics: Option<VideoStatistics>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSnippet {
    pub title: Option<String>,
    pub published_at: Option<String>,
    pub category_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoContentDetails {
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatistics {
    pub view_count: Option<String>,
    pub like_count: Option<String>,
    pub comment_count: Option<String>,
}

/// Lossy numeric coercion: a count that is absent or non-numeric reads as
/// zero. The platform hides some counts on purpose, so this is not an error.
pub fn parse_count(value: Option<&str>) -> u64 {
    value.and_then(|s| s.trim().parse::<u64>().ok()).unwrap_or(0)
}

impl ChannelItem {
    pub fn title(&self) -> String {
        self.snippet
            .as_ref()
            .and_then(|s| s.title.clone())
            .unwrap_or_default()
    }

    pub fn uploads_playlist_id(&self) -> Option<String> {
        self.content_details
            .as_ref()
            .and_then(|cd| cd.related_playlists.as_ref())
            .and_then(|rp| rp.uploads.clone())
            .filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_count_defaults_to_zero() {
        assert_eq!(parse_count(None), 0);
        assert_eq!(parse_count(Some("")), 0);
        assert_eq!(parse_count(Some("hidden")), 0);
        assert_eq!(parse_count(Some("1234")), 1234);
        assert_eq!(parse_count(Some(" 56 ")), 56);
    }

    #[test]
    fn channel_item_tolerates_missing_parts() {
        let raw = r#"{"id":"UCabcdefghijklmnopqrstuv"}"#;
        let item: ChannelItem = serde_json::from_str(raw).unwrap();
        assert_eq!(item.title(), "");
        assert!(item.uploads_playlist_id().is_none());
    }

    #[test]
    fn channel_item_reads_uploads_playlist() {
        let raw = r#"{
            "id": "UCabcdefghijklmnopqrstuv",
            "snippet": {"title": "Marco", "country": "FR"},
            "statistics": {"subscriberCount": "42", "viewCount": "100"},
            "contentDetails": {"relatedPlaylists": {"uploads": "UUabcdefghijklmnopqrstuv"}}
        }"#;
        let item: ChannelItem = serde_json::from_str(raw).unwrap();
        assert_eq!(item.title(), "Marco");
        assert_eq!(
            item.uploads_playlist_id().as_deref(),
            Some("UUabcdefghijklmnopqrstuv")
        );
    }
}
