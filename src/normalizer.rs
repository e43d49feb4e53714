use std::sync::LazyLock;

use regex::Regex;

use crate::domain::NormalizedGame;
use crate::error::ShelfError;
use crate::xml::XmlElement;

/// A BGG `<item>` element as returned by the thing endpoint.
pub type RawItem = XmlElement;

pub const UNKNOWN_GAME: &str = "Unknown Game";
pub const UNKNOWN_DESIGNER: &str = "Unknown Designer";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const NOT_AVAILABLE: &str = "N/A";
pub const DESCRIPTION_LIMIT: usize = 200;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));

const ENTITIES: &[(&str, &str)] = &[
    ("&quot;", "\""),
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&apos;", "'"),
    ("&nbsp;", " "),
    ("&#10;", " "),
    ("&#13;", ""),
    ("&rsquo;", "'"),
    ("&lsquo;", "'"),
    ("&rdquo;", "\""),
    ("&ldquo;", "\""),
    ("&ndash;", "-"),
    ("&mdash;", "\u{2014}"),
    ("&hellip;", "..."),
    ("&#039;", "'"),
    ("&deg;", "\u{00b0}"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameKind {
    Primary,
    Alternate,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct NameEntry<'a> {
    kind: NameKind,
    value: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkKind {
    Designer,
    Artist,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Link<'a> {
    kind: LinkKind,
    value: &'a str,
}

/// Borrowed view over a raw item. Names repeat with different `type` tags and
/// links mix designers, artists, publishers and mechanics.
struct ThingRecord<'a> {
    id: &'a str,
    names: Vec<NameEntry<'a>>,
    links: Vec<Link<'a>>,
    image: Option<&'a str>,
    description: Option<&'a str>,
    min_players: Option<&'a str>,
    max_players: Option<&'a str>,
    playing_time: Option<&'a str>,
    average_weight: Option<&'a str>,
}

impl<'a> ThingRecord<'a> {
    fn decode(item: &'a RawItem) -> Result<Self, ShelfError> {
        let id = item
            .attr("id")
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ShelfError::MissingItemId)?;

        let names = item
            .children_named("name")
            .filter_map(|name| {
                let value = name.attr("value").unwrap_or_else(|| name.text());
                if value.trim().is_empty() {
                    return None;
                }
                let kind = match name.attr("type") {
                    Some("primary") => NameKind::Primary,
                    Some("alternate") => NameKind::Alternate,
                    _ => NameKind::Other,
                };
                Some(NameEntry { kind, value })
            })
            .collect();

        let links = item
            .children_named("link")
            .map(|link| Link {
                kind: match link.attr("type") {
                    Some("boardgamedesigner") => LinkKind::Designer,
                    Some("boardgameartist") => LinkKind::Artist,
                    _ => LinkKind::Other,
                },
                value: link.attr("value").unwrap_or(""),
            })
            .collect();

        Ok(Self {
            id,
            names,
            links,
            image: item.child_text("image"),
            description: item.child_text("description"),
            min_players: item.child_value("minplayers"),
            max_players: item.child_value("maxplayers"),
            playing_time: item.child_value("playingtime"),
            average_weight: item
                .path(&["statistics", "ratings", "averageweight"])
                .and_then(|weight| weight.attr("value")),
        })
    }

    fn title(&self) -> &'a str {
        self.names
            .iter()
            .find(|name| name.kind == NameKind::Primary)
            .or_else(|| self.names.first())
            .map(|name| name.value)
            .unwrap_or(UNKNOWN_GAME)
    }

    fn first_link(&self, kind: LinkKind) -> Option<&'a str> {
        self.links
            .iter()
            .find(|link| link.kind == kind)
            .map(|link| link.value)
            .filter(|value| !value.trim().is_empty())
    }
}

/// Builds the detail record for one raw item.
///
/// Only a missing `id` attribute is an error; every other absent field falls
/// back to a sentinel.
pub fn normalize(item: &RawItem) -> Result<NormalizedGame, ShelfError> {
    let record = ThingRecord::decode(item)?;

    let designer = record
        .first_link(LinkKind::Designer)
        .unwrap_or(UNKNOWN_DESIGNER);
    let artist = record.first_link(LinkKind::Artist).unwrap_or(UNKNOWN_ARTIST);

    Ok(NormalizedGame {
        id: record.id.to_string(),
        title: decode_entities(record.title()),
        designer: decode_entities(designer),
        artist: decode_entities(artist),
        image: record.image.unwrap_or_default().trim().to_string(),
        description: clean_description(record.description),
        players: format_players(record.min_players, record.max_players),
        time: format_time(record.playing_time),
        weight: parse_weight(record.average_weight),
    })
}

/// Applies the entity table. Line breaks the XML reader already resolved
/// from `&#10;`/`&#13;` get the same treatment as the entities.
pub fn decode_entities(value: &str) -> String {
    ENTITIES
        .iter()
        .fold(value.to_string(), |text, (entity, replacement)| {
            text.replace(entity, replacement)
        })
        .replace('\r', "")
        .replace('\n', " ")
}

/// Plain-text description: tags stripped, entities decoded, trimmed and cut
/// to [`DESCRIPTION_LIMIT`] characters. The cut may land mid-word.
pub fn clean_description(html: Option<&str>) -> String {
    let Some(html) = html else {
        return String::new();
    };
    let stripped = TAG_RE.replace_all(html, "");
    let decoded = decode_entities(&stripped);
    decoded.trim().chars().take(DESCRIPTION_LIMIT).collect()
}

pub fn format_players(min: Option<&str>, max: Option<&str>) -> String {
    let min = min.map(str::trim).filter(|value| !value.is_empty());
    let max = max.map(str::trim).filter(|value| !value.is_empty());
    match (min, max) {
        (Some(min), Some(max)) if min == max => min.to_string(),
        (Some(min), Some(max)) => format!("{min}-{max}"),
        (Some(only), None) | (None, Some(only)) => only.to_string(),
        (None, None) => NOT_AVAILABLE.to_string(),
    }
}

pub fn format_time(playing_time: Option<&str>) -> String {
    let minutes = playing_time
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(NOT_AVAILABLE);
    format!("{minutes} min")
}

pub fn parse_weight(raw: Option<&str>) -> f64 {
    let weight = raw
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(0.0);
    (weight * 10.0).round() / 10.0
}
