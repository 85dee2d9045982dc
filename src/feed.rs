//! Syndication feed parsing.
//!
//! Turns raw feed bytes into [`RawEntry`] values in document order. Three
//! shapes are recognised by their root element:
//!
//! - RSS 2.0: `<rss><channel><item>…`
//! - RSS 1.0 / RDF: `<rdf:RDF><channel/><item>…`, items next to the channel
//! - Atom: `<feed><entry>…`
//!
//! Field mapping, first present value wins:
//!
//! | Entry field | Elements |
//! |-------------|----------|
//! | `link` | `<link>` text, else its `href` attribute |
//! | `title` | `<title>` |
//! | `published_at` | `<pubDate>`, `<dc:date>`, `<published>`, `<updated>` |
//! | `body` | `<description>`, `<summary>`, `<content:encoded>`, `<content>` |
//!
//! Missing optional fields and unparseable dates become `None`; only
//! markup problems produce a [`ParseError`].

use chrono::{DateTime, Utc};
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ParseError;
use crate::models::RawEntry;

const FEED_ROOTS: &[&[u8]] = &[b"rss", b"RDF", b"feed", b"channel"];
const ITEM_ELEMENTS: &[&[u8]] = &[b"item", b"entry"];

const DATE_FIELDS: &[&str] = &["pubDate", "dc:date", "published", "updated"];
const BODY_FIELDS: &[&str] = &["description", "summary", "content:encoded", "content"];

/// Parse feed markup into entries, preserving item order.
pub fn parse_feed(xml: &[u8]) -> Result<Vec<RawEntry>, ParseError> {
    // Text is not trimmed per event: a field may arrive as several text,
    // CDATA and nested-markup pieces. The joined field is trimmed on close.
    let mut reader = Reader::from_reader(xml);

    let mut buf = Vec::new();
    let mut open: Vec<Vec<u8>> = Vec::new();
    let mut seen_root = false;
    let mut entries = Vec::new();
    let mut item: Option<ItemBuilder> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| ParseError::Malformed {
                position: reader.buffer_position() as u64,
                message: e.to_string(),
            })?;

        match event {
            Event::Start(e) => {
                check_root(&mut seen_root, &e)?;
                let depth = open.len();
                if let Some(builder) = item.as_mut() {
                    if depth == builder.depth + 1 {
                        builder.open_field(&e, reader.decoder());
                    }
                } else if ITEM_ELEMENTS.contains(&e.local_name().as_ref()) {
                    item = Some(ItemBuilder::new(depth));
                }
                open.push(e.name().as_ref().to_vec());
            }
            Event::Empty(e) => {
                check_root(&mut seen_root, &e)?;
                if let Some(builder) = item.as_mut() {
                    if open.len() == builder.depth + 1 {
                        builder.open_field(&e, reader.decoder());
                        builder.close_field();
                    }
                } else if ITEM_ELEMENTS.contains(&e.local_name().as_ref()) {
                    entries.push(RawEntry::default());
                }
            }
            Event::End(_) => {
                open.pop();
                let depth = open.len();
                if let Some(builder) = item.as_mut() {
                    if depth == builder.depth {
                        if let Some(done) = item.take() {
                            entries.push(done.finish());
                        }
                    } else if depth == builder.depth + 1 {
                        builder.close_field();
                    }
                }
            }
            Event::Text(t) => {
                if let Some(builder) = item.as_mut().filter(|b| b.in_field()) {
                    let text = match t.unescape_with(html_entity) {
                        Ok(text) => text.into_owned(),
                        Err(_) => reader
                            .decoder()
                            .decode(&t)
                            .map(|c| c.into_owned())
                            .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned()),
                    };
                    builder.push_text(&text);
                }
            }
            Event::CData(c) => {
                if let Some(builder) = item.as_mut().filter(|b| b.in_field()) {
                    let text = reader
                        .decoder()
                        .decode(&c)
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&c).into_owned());
                    builder.push_text(&text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(element) = open.pop() {
        return Err(ParseError::Unclosed {
            element: String::from_utf8_lossy(&element).into_owned(),
        });
    }
    if !seen_root {
        return Err(ParseError::Empty);
    }

    Ok(entries)
}

fn check_root(seen_root: &mut bool, e: &BytesStart<'_>) -> Result<(), ParseError> {
    if *seen_root {
        return Ok(());
    }
    *seen_root = true;
    let local = e.local_name();
    if FEED_ROOTS.contains(&local.as_ref()) {
        Ok(())
    } else {
        Err(ParseError::NotAFeed {
            root: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
        })
    }
}

/// Accumulates the direct children of one `<item>` / `<entry>`.
struct ItemBuilder {
    depth: usize,
    field: Option<String>,
    text: String,
    link_href: Option<String>,
    link: Option<String>,
    title: Option<String>,
    dates: Vec<(String, String)>,
    bodies: Vec<(String, String)>,
}

impl ItemBuilder {
    fn new(depth: usize) -> Self {
        Self {
            depth,
            field: None,
            text: String::new(),
            link_href: None,
            link: None,
            title: None,
            dates: Vec::new(),
            bodies: Vec::new(),
        }
    }

    fn open_field(&mut self, e: &BytesStart<'_>, decoder: Decoder) {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        if e.local_name().as_ref() == b"link" {
            self.link_href = link_href(e, decoder);
        }
        self.field = Some(name);
        self.text.clear();
    }

    fn in_field(&self) -> bool {
        self.field.is_some()
    }

    fn push_text(&mut self, text: &str) {
        if self.in_field() {
            self.text.push_str(text);
        }
    }

    fn close_field(&mut self) {
        let Some(field) = self.field.take() else {
            return;
        };
        let text = std::mem::take(&mut self.text).trim().to_string();
        let href = self.link_href.take();

        match field.as_str() {
            "link" | "atom:link" => {
                if self.link.is_none() {
                    self.link = Some(text).filter(|t| !t.is_empty()).or(href);
                }
            }
            "title" | "dc:title" => {
                if self.title.is_none() && !text.is_empty() {
                    self.title = Some(text);
                }
            }
            f if DATE_FIELDS.contains(&f) => self.dates.push((f.to_string(), text)),
            f if BODY_FIELDS.contains(&f) => self.bodies.push((f.to_string(), text)),
            _ => {}
        }
    }

    fn finish(self) -> RawEntry {
        let published_at = DATE_FIELDS.iter().find_map(|name| {
            self.dates
                .iter()
                .filter(|(field, _)| field == name)
                .find_map(|(_, value)| parse_date(value))
        });
        let body = BODY_FIELDS.iter().find_map(|name| {
            self.bodies
                .iter()
                .find(|(field, value)| field == name && !value.is_empty())
                .map(|(_, value)| value.clone())
        });
        RawEntry {
            link: self.link,
            title: self.title,
            published_at,
            body,
        }
    }
}

/// `href` of an Atom-style link, ignoring `rel` values other than `alternate`.
fn link_href(e: &BytesStart<'_>, decoder: Decoder) -> Option<String> {
    let mut href = None;
    let mut rel = None;
    for attr in e.attributes().flatten() {
        let value = attr
            .decode_and_unescape_value(decoder)
            .map(|v| v.trim().to_string())
            .unwrap_or_default();
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(value),
            b"rel" => rel = Some(value),
            _ => {}
        }
    }
    match rel.as_deref() {
        None | Some("alternate") => href.filter(|h| !h.is_empty()),
        Some(_) => None,
    }
}

/// HTML entities commonly found in feeds that XML does not predefine.
fn html_entity(name: &str) -> Option<&'static str> {
    Some(match name {
        "nbsp" => "\u{a0}",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "hellip" => "\u{2026}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "laquo" => "\u{ab}",
        "raquo" => "\u{bb}",
        "copy" => "\u{a9}",
        "reg" => "\u{ae}",
        "trade" => "\u{2122}",
        "euro" => "\u{20ac}",
        "aacute" => "\u{e1}",
        "eacute" => "\u{e9}",
        "iacute" => "\u{ed}",
        "oacute" => "\u{f3}",
        "uacute" => "\u{fa}",
        "ntilde" => "\u{f1}",
        "Ntilde" => "\u{d1}",
        "uuml" => "\u{fc}",
        "iexcl" => "\u{a1}",
        "iquest" => "\u{bf}",
        _ => return None,
    })
}

/// Parse RFC 2822 (RSS) or RFC 3339 (Atom, Dublin Core) timestamps.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
