use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;

/// An RSS channel as fetched, before any item is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedDocument {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Items in document order
    pub items: Vec<FeedItem>,
}

/// One `<item>` of a channel. `pub_date` is the raw, unparsed string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: String,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Title,
    Link,
    Description,
    PubDate,
}

impl Field {
    fn of_channel(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"description" => Some(Field::Description),
            _ => None,
        }
    }

    fn of_item(name: &[u8]) -> Option<Self> {
        match name {
            b"pubDate" => Some(Field::PubDate),
            other => Self::of_channel(other),
        }
    }
}

/// Parse an RSS 2.0 document into a [`FeedDocument`].
///
/// Only direct children of `<channel>` and of each `<item>` are read.
/// Prefixed elements such as `<atom:link>` are ignored. Titles and
/// descriptions are HTML-entity decoded; links and dates are kept as written.
///
/// # Errors
///
/// Returns a message describing the first XML error, or a missing
/// `<channel>` element.
pub fn parse_document(bytes: &[u8]) -> Result<FeedDocument, String> {
    // SEC-002: quick-xml (0.37) never expands <!ENTITY> declarations, so a
    // hostile DOCTYPE cannot pull in external content.
    // Text is not trimmed per event so whitespace around nested markup survives;
    // captured values are trimmed once complete.
    let mut reader = Reader::from_reader(bytes);

    let mut doc = FeedDocument::default();
    let mut buf = Vec::new();

    let mut depth: usize = 0;
    let mut channel_depth: Option<usize> = None;
    let mut channel_done = false;
    let mut item: Option<FeedItem> = None;
    let mut item_depth: Option<usize> = None;
    // Field being captured and the depth of its element
    let mut capture: Option<(Field, usize)> = None;
    let mut text = String::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| format!("XML error at byte {}: {}", reader.buffer_position(), e))?;

        match event {
            Event::Start(e) => {
                depth += 1;
                let name = e.name();
                let name = name.as_ref();
                if capture.is_some() || channel_done {
                    // Markup nested inside a captured field, or a second channel
                } else if channel_depth.is_none() && name == b"channel" {
                    channel_depth = Some(depth);
                } else if item_depth.map(|d| d + 1) == Some(depth) {
                    if let Some(field) = Field::of_item(name) {
                        capture = Some((field, depth));
                        text.clear();
                    }
                } else if item.is_none() && channel_depth.map(|d| d + 1) == Some(depth) {
                    if name == b"item" {
                        item = Some(FeedItem::default());
                        item_depth = Some(depth);
                    } else if let Some(field) = Field::of_channel(name) {
                        capture = Some((field, depth));
                        text.clear();
                    }
                }
            }
            Event::Empty(e) => {
                // A self-closing <item/> is an item with every field empty
                if capture.is_none()
                    && !channel_done
                    && item.is_none()
                    && channel_depth.map(|d| d + 1) == Some(depth + 1)
                    && e.name().as_ref() == b"item"
                {
                    doc.items.push(FeedItem::default());
                }
            }
            Event::Text(e) => {
                if capture.is_some() {
                    let piece = match e.unescape() {
                        Ok(s) => s,
                        // Stray HTML entities like &nbsp; are left for the HTML decoder
                        Err(_) => Cow::Owned(String::from_utf8_lossy(&e).into_owned()),
                    };
                    text.push_str(&piece);
                }
            }
            Event::CData(e) => {
                if capture.is_some() {
                    text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::End(_) => {
                if let Some((field, field_depth)) = capture {
                    if field_depth == depth {
                        let value = std::mem::take(&mut text).trim().to_string();
                        match item.as_mut() {
                            Some(item) => match field {
                                Field::Title => item.title = value,
                                Field::Link => item.link = value,
                                Field::Description => item.description = value,
                                Field::PubDate => item.pub_date = value,
                            },
                            None => match field {
                                Field::Title => doc.title = value,
                                Field::Link => doc.link = value,
                                Field::Description => doc.description = value,
                                Field::PubDate => {}
                            },
                        }
                        capture = None;
                    }
                } else if item_depth == Some(depth) {
                    if let Some(finished) = item.take() {
                        doc.items.push(finished);
                    }
                    item_depth = None;
                } else if channel_depth == Some(depth) {
                    channel_done = true;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if depth > 0 {
        return Err("unexpected end of document".to_string());
    }
    if channel_depth.is_none() {
        return Err("missing <channel> element".to_string());
    }

    unescape_document(&mut doc);
    Ok(doc)
}

/// Decode HTML entities left in titles and descriptions (`&#39;`, `&amp;quot;` once XML-unescaped).
fn unescape_document(doc: &mut FeedDocument) {
    decode_in_place(&mut doc.title);
    decode_in_place(&mut doc.description);
    for item in &mut doc.items {
        decode_in_place(&mut item.title);
        decode_in_place(&mut item.description);
    }
}

fn decode_in_place(s: &mut String) {
    if let Cow::Owned(decoded) = html_escape::decode_html_entities(s.as_str()) {
        *s = decoded;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
<channel>
  <title>Example &amp;amp; Co</title>
  <link>https://example.com/</link>
  <atom:link href="https://example.com/feed.xml" rel="self" type="application/rss+xml"/>
  <description>News &amp;#39;n&amp;#39; notes</description>
  <item>
    <title>First post</title>
    <link>https://example.com/1</link>
    <description><![CDATA[<p>Hello &amp; welcome</p>]]></description>
    <pubDate>Mon, 02 Jan 2006 15:04:05 GMT</pubDate>
    <guid>https://example.com/1</guid>
  </item>
  <item>
    <title>Second post</title>
    <link>https://example.com/2</link>
    <description>Plain</description>
    <pubDate>not-a-date</pubDate>
  </item>
</channel>
</rss>"#;

    #[test]
    fn test_parse_channel_and_items() {
        let doc = parse_document(SAMPLE.as_bytes()).unwrap();
        assert_eq!(doc.title, "Example & Co");
        assert_eq!(doc.link, "https://example.com/");
        assert_eq!(doc.description, "News 'n' notes");
        assert_eq!(doc.items.len(), 2);

        assert_eq!(
            doc.items[0],
            FeedItem {
                title: "First post".into(),
                link: "https://example.com/1".into(),
                description: "<p>Hello & welcome</p>".into(),
                pub_date: "Mon, 02 Jan 2006 15:04:05 GMT".into(),
            }
        );
        assert_eq!(doc.items[1].title, "Second post");
        assert_eq!(doc.items[1].pub_date, "not-a-date");
    }

    #[test]
    fn test_items_keep_document_order() {
        let doc = parse_document(SAMPLE.as_bytes()).unwrap();
        let links: Vec<&str> = doc.items.iter().map(|i| i.link.as_str()).collect();
        assert_eq!(links, vec!["https://example.com/1", "https://example.com/2"]);
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let xml = r#"<rss><channel><title>T</title><item><link>https://x/1</link></item><item/></channel></rss>"#;
        let doc = parse_document(xml.as_bytes()).unwrap();
        assert_eq!(doc.link, "");
        assert_eq!(doc.items.len(), 2);
        assert_eq!(doc.items[0].title, "");
        assert_eq!(doc.items[0].pub_date, "");
        assert_eq!(doc.items[1], FeedItem::default());
    }

    #[test]
    fn test_item_title_does_not_overwrite_channel_title() {
        let xml = r#"<rss><channel><item><title>Item</title></item><title>Channel</title></channel></rss>"#;
        let doc = parse_document(xml.as_bytes()).unwrap();
        assert_eq!(doc.title, "Channel");
        assert_eq!(doc.items[0].title, "Item");
    }

    #[test]
    fn test_nested_markup_in_field_is_flattened() {
        let xml = r#"<rss><channel><item><description>a <b>bold</b> move</description></item></channel></rss>"#;
        let doc = parse_document(xml.as_bytes()).unwrap();
        assert_eq!(doc.items[0].description, "a bold move");
    }

    #[test]
    fn test_empty_channel() {
        let xml = r#"<?xml version="1.0"?><rss version="2.0"><channel></channel></rss>"#;
        let doc = parse_document(xml.as_bytes()).unwrap();
        assert!(doc.items.is_empty());
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        assert!(parse_document(b"<not valid xml").is_err());
        assert!(parse_document(b"<rss><channel><item></channel></rss>").is_err());
    }

    #[test]
    fn test_document_without_channel_is_an_error() {
        let err = parse_document(b"<html><body>hi</body></html>").unwrap_err();
        assert!(err.contains("channel"));
    }
}
