use super::{SubtitleRecord, SubtitleSet, Timestamp};

const ARROW: &str = "-->";

/// Parse primary-format text into a subtitle set.
///
/// Blocks are separated by blank lines. A block whose index line is not an
/// integer, whose timing line lacks the arrow or a valid timestamp, or whose
/// text is empty after trimming is dropped without error. CRLF input and
/// trailing whitespace are tolerated; embedded newlines in the text survive.
pub fn parse_srt(content: &str) -> SubtitleSet {
    let content = content.trim_start_matches('\u{feff}');
    let mut records = Vec::new();
    let mut block: Vec<&str> = Vec::new();

    for line in content.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            if let Some(record) = parse_block(&block) {
                records.push(record);
            }
            block.clear();
        } else {
            block.push(line);
        }
    }
    if let Some(record) = parse_block(&block) {
        records.push(record);
    }

    SubtitleSet::new(records)
}

fn parse_block(lines: &[&str]) -> Option<SubtitleRecord> {
    let [index_line, timing_line, text_lines @ ..] = lines else {
        return None;
    };

    let index = index_line.trim().parse::<u32>().ok()?;
    let (start, end) = timing_line.split_once(ARROW)?;
    let start = Timestamp::parse(start.trim())?;
    let end = Timestamp::parse(end.trim())?;

    let text = text_lines.join("\n");
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    Some(SubtitleRecord {
        index,
        start,
        end,
        text: text.to_string(),
    })
}

/// Serialize a subtitle set back to the primary format.
pub fn to_srt(set: &SubtitleSet) -> String {
    let mut content = String::new();

    for record in set {
        content.push_str(&format!(
            "{}\n{} {} {}\n{}\n\n",
            record.index,
            record.start.to_srt(),
            ARROW,
            record.end.to_srt(),
            record.text
        ));
    }

    content
}
