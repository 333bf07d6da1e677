use super::SubtitleSet;

pub const VTT_HEADER: &str = "WEBVTT";

/// Convert a subtitle set to the secondary (cue) format.
///
/// Emits the header, then one cue per record with dot-separated timestamps.
pub fn to_vtt(set: &SubtitleSet) -> String {
    let mut content = String::with_capacity(16 + set.len() * 64);
    content.push_str(VTT_HEADER);
    content.push_str("\n\n");

    for record in set {
        content.push_str(&format!(
            "{} --> {}\n{}\n\n",
            record.start.to_vtt(),
            record.end.to_vtt(),
            record.text
        ));
    }

    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtitle::{parse_srt, Timestamp};

    #[test]
    fn test_timestamp_conversion() {
        let ts = Timestamp::parse("00:00:01,500").unwrap();
        assert_eq!(ts.to_vtt(), "00:00:01.500");
        assert_eq!(Timestamp::parse("12:34:56,789").unwrap().to_vtt(), "12:34:56.789");
    }

    #[test]
    fn test_to_vtt_layout() {
        let set = parse_srt("1\n00:00:01,500 --> 00:00:03,000\nHello\nworld\n\n2\n00:00:03,000 --> 00:00:04,250\nBye\n");
        assert_eq!(
            to_vtt(&set),
            "WEBVTT\n\n00:00:01.500 --> 00:00:03.000\nHello\nworld\n\n00:00:03.000 --> 00:00:04.250\nBye\n\n"
        );
    }

    #[test]
    fn test_to_vtt_is_deterministic() {
        let set = parse_srt("1\n00:00:00,000 --> 00:00:01,000\nOne\n\n2\n00:00:01,000 --> 00:00:02,000\nTwo\n");
        assert_eq!(to_vtt(&set).as_bytes(), to_vtt(&set).as_bytes());
    }

    #[test]
    fn test_to_vtt_empty_set_is_header_only() {
        assert_eq!(to_vtt(&SubtitleSet::default()), "WEBVTT\n\n");
    }
}
