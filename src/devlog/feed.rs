use crate::devlog::config::FeedConfig;
use crate::devlog::entries::LogEntry;
use crate::devlog::util::{STAMP_FORMAT, short_digest, write_atomic};
use anyhow::Result;
use chrono::{Local, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::io::Cursor;
use std::path::Path;

/// Fragment id for an entry, e.g. `log-20240102-083000-1a2b3c4d5e6f`.
/// Entries of one batch share a date, so the suffix hashes title and content.
pub fn entry_anchor(entry: &LogEntry) -> String {
    let digits: String = entry.date.chars().filter(|c| c.is_ascii_digit()).collect();
    let stamp = if digits.len() == 14 {
        format!("{}-{}", &digits[..8], &digits[8..])
    } else {
        digits
    };
    let suffix = short_digest(&format!("{}\n{}", entry.title, entry.content));
    format!("log-{stamp}-{suffix}")
}

pub fn entry_link(site_link: &str, entry: &LogEntry) -> String {
    format!("{}#{}", site_link, entry_anchor(entry))
}

fn rfc2822(date: &str, tz: Option<Tz>) -> Option<String> {
    let naive = NaiveDateTime::parse_from_str(date, STAMP_FORMAT).ok()?;
    match tz {
        Some(tz) => tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.to_rfc2822()),
        None => Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.to_rfc2822()),
    }
}

fn text_element(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_item(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    entry: &LogEntry,
    cfg: &FeedConfig,
    tz: Option<Tz>,
) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new("item")))?;
    text_element(writer, "title", &format!("[{}] {}", entry.status, entry.title))?;
    text_element(writer, "description", &entry.content)?;
    text_element(writer, "link", &entry_link(&cfg.link, entry))?;

    let mut guid = BytesStart::new("guid");
    guid.push_attribute(("isPermaLink", "false"));
    writer.write_event(Event::Start(guid))?;
    writer.write_event(Event::Text(BytesText::new(&entry_anchor(entry))))?;
    writer.write_event(Event::End(BytesEnd::new("guid")))?;

    if let Some(pub_date) = rfc2822(&entry.date, tz) {
        text_element(writer, "pubDate", &pub_date)?;
    }
    for tag in &entry.tags {
        text_element(writer, "category", tag)?;
    }
    writer.write_event(Event::End(BytesEnd::new("item")))?;
    Ok(())
}

/// Render the newest `cfg.max_items` entries, in store order, as RSS 2.0.
pub fn project(entries: &[LogEntry], cfg: &FeedConfig, tz: Option<Tz>) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    writer.write_event(Event::Start(rss))?;
    writer.write_event(Event::Start(BytesStart::new("channel")))?;
    text_element(&mut writer, "title", &cfg.title)?;
    text_element(&mut writer, "link", &cfg.link)?;
    text_element(&mut writer, "description", &cfg.description)?;
    if let Some(newest) = entries.first()
        && let Some(built) = rfc2822(&newest.date, tz)
    {
        text_element(&mut writer, "lastBuildDate", &built)?;
    }

    for entry in entries.iter().take(cfg.max_items) {
        write_item(&mut writer, entry, cfg, tz)?;
    }

    writer.write_event(Event::End(BytesEnd::new("channel")))?;
    writer.write_event(Event::End(BytesEnd::new("rss")))?;

    let bytes = writer.into_inner().into_inner();
    let mut doc = String::from_utf8(bytes)?;
    doc.push('\n');
    Ok(doc)
}

pub fn save(path: &Path, document: &str) -> Result<()> {
    write_atomic(path, document.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::{entry_anchor, entry_link, project};
    use crate::devlog::config::FeedConfig;
    use crate::devlog::entries::entry;

    fn sample(count: usize) -> Vec<crate::devlog::entries::LogEntry> {
        (0..count)
            .rev()
            .map(|day| entry(&format!("2024-03-{:02} 12:00:00", day + 1), &format!("DAY_{}", day + 1)))
            .collect()
    }

    #[test]
    fn anchor_is_derived_from_date() {
        let one = entry("2024-01-02 08:30:00", "WIFI_RESTORED");
        let anchor = entry_anchor(&one);
        assert!(anchor.starts_with("log-20240102-083000-"));
        assert_eq!(anchor.len(), "log-20240102-083000-".len() + 12);
        assert_eq!(
            entry_link("https://logs.example.org/", &one),
            format!("https://logs.example.org/#{anchor}")
        );
    }

    #[test]
    fn entries_sharing_a_date_get_distinct_guids() {
        let entries = vec![
            entry("2024-01-02 08:30:00", "ONE"),
            entry("2024-01-02 08:30:00", "TWO"),
        ];
        let doc = project(&entries, &FeedConfig::default(), Some(chrono_tz::UTC))
            .expect("project feed");

        let first = format!("<guid isPermaLink=\"false\">{}</guid>", entry_anchor(&entries[0]));
        let second = format!("<guid isPermaLink=\"false\">{}</guid>", entry_anchor(&entries[1]));
        assert_ne!(first, second);
        assert_eq!(doc.matches(&first).count(), 1);
        assert_eq!(doc.matches(&second).count(), 1);
    }

    #[test]
    fn feed_keeps_only_the_ten_newest() {
        let entries = sample(15);
        let doc = project(&entries, &FeedConfig::default(), Some(chrono_tz::UTC))
            .expect("project feed");

        assert_eq!(doc.matches("<item>").count(), 10);
        assert!(doc.contains("DAY_15"));
        assert!(doc.contains("DAY_6"));
        assert!(!doc.contains("DAY_5<"));
        assert!(!doc.contains("DAY_1<"));
    }

    #[test]
    fn feed_escapes_markup_and_carries_guid() {
        let mut one = entry("2024-01-02 08:30:00", "WIFI_RESTORED");
        one.content = "Battled radio waves.<br>I won & so did the router.".to_string();
        let doc = project(&[one], &FeedConfig::default(), Some(chrono_tz::UTC))
            .expect("project feed");

        assert!(doc.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(doc.contains("<rss version=\"2.0\">"));
        assert!(doc.contains("&lt;br&gt;"));
        assert!(doc.contains("&amp; so did"));
        assert!(doc.contains("<guid isPermaLink=\"false\">log-20240102-083000-"));
        assert!(doc.contains("<pubDate>Tue, 2 Jan 2024 08:30:00 +0000</pubDate>"));
        assert!(doc.contains("<category>#Homelab</category>"));
    }

    #[test]
    fn projection_is_a_pure_function_of_entries() {
        let entries = sample(3);
        let cfg = FeedConfig::default();
        let a = project(&entries, &cfg, Some(chrono_tz::UTC)).expect("first");
        let b = project(&entries, &cfg, Some(chrono_tz::UTC)).expect("second");
        assert_eq!(a, b);
    }
}
