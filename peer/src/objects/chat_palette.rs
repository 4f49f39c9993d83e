use std::cell::RefCell;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use tabletop_shared::{
    EntityId, ObjectBase, ObjectSchema, PeerCursor, PresenceManager, PropertyDecl, Replicate,
    ReplicateBuilder, SyncContext,
};

/// `//name=value`, full-width slashes and equals signs accepted
static VARIABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[/／]{2}([^=＝{}｛｝\s]+)\s*[=＝]\s*(.+)").expect("Invalid palette variable regex")
});

/// `{name}`, full-width braces accepted
static SUBSTITUTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[{｛]\s*([^{}｛｝]+)\s*[}｝]").expect("Invalid palette substitution regex")
});

static CHAT_PALETTE_SCHEMA: ObjectSchema = ObjectSchema {
    alias_name: "chat-palette",
    properties: &[
        PropertyDecl::text("dicebot", ""),
        PropertyDecl::text("paletteColor", ""),
        PropertyDecl::text("value", ""),
    ],
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaletteVariable {
    pub name: String,
    pub value: String,
}

struct ParsedPalette {
    value_version: Option<u32>,
    palettes: Vec<String>,
    lines: Vec<String>,
    variables: Vec<PaletteVariable>,
}

/// Canned chat lines of a character, with `//name=value` variables that
/// other lines reference as `{name}`.
pub struct ChatPalette {
    base: ObjectBase,
    parsed: RefCell<Option<ParsedPalette>>,
}

impl ChatPalette {
    /// Upper bound on substitution passes, nested references resolve one
    /// level per pass
    pub const EVALUATION_LIMIT: usize = 128;

    pub fn for_character(character: &EntityId) -> Self {
        Self::build(EntityId::new(format!("ChatPalette_{}", character)))
    }

    pub fn dicebot(&self) -> String {
        self.base.text("dicebot")
    }

    pub fn palette_color(&self) -> String {
        self.base.text("paletteColor")
    }

    pub fn value(&self) -> String {
        self.base.text("value")
    }

    pub fn set_dicebot(&mut self, dicebot: &str) {
        self.base.set("dicebot", dicebot);
    }

    pub fn set_color(&mut self, color: &str) {
        self.base.set("paletteColor", color);
    }

    pub fn set_palette(&mut self, source: &str) {
        self.base.set("value", source);
        self.parsed.replace(None);
    }

    /// Color used for messages sent through this palette
    pub fn color(&self, presence: &PresenceManager) -> String {
        let palette_color = self.palette_color();
        if !palette_color.is_empty() && palette_color != PeerCursor::TRANSPARENT_COLOR {
            return palette_color;
        }
        if let Some(cursor) = presence.my_cursor() {
            let color = cursor.borrow().color();
            if color != PeerCursor::TRANSPARENT_COLOR {
                return color;
            }
        }
        PeerCursor::DEFAULT_COLOR.to_string()
    }

    /// Every source line, variables included
    pub fn palettes(&self) -> Vec<String> {
        self.with_parsed(|parsed| parsed.palettes.clone())
    }

    /// Source lines that are not variable definitions
    pub fn palette_lines(&self) -> Vec<String> {
        self.with_parsed(|parsed| parsed.lines.clone())
    }

    pub fn palette_variables(&self) -> Vec<PaletteVariable> {
        self.with_parsed(|parsed| parsed.variables.clone())
    }

    /// Replaces `{name}` references with variable values until none remain
    /// or the pass limit is hit. Unknown names become empty.
    pub fn evaluate(&self, line: &str) -> String {
        let variables = self.palette_variables();
        let mut evaluated = line.to_string();
        let mut passes = 0;
        while SUBSTITUTION.is_match(&evaluated) {
            passes += 1;
            evaluated = SUBSTITUTION
                .replace_all(&evaluated, |captures: &Captures| {
                    lookup(&variables, &captures[1])
                })
                .into_owned();
            if Self::EVALUATION_LIMIT < passes {
                break;
            }
        }
        evaluated
    }

    fn with_parsed<R>(&self, reader: impl FnOnce(&ParsedPalette) -> R) -> R {
        let value_version = self.base.version("value");
        let mut parsed = self.parsed.borrow_mut();
        let stale = parsed
            .as_ref()
            .map_or(true, |parsed| parsed.value_version != value_version);
        if stale {
            *parsed = None;
        }
        reader(parsed.get_or_insert_with(|| parse(&self.value(), value_version)))
    }
}

fn parse(source: &str, value_version: Option<u32>) -> ParsedPalette {
    let palettes: Vec<String> = source.split('\n').map(str::to_string).collect();
    let mut lines = Vec::new();
    let mut variables = Vec::new();
    for palette in palettes.iter() {
        match VARIABLE.captures(palette) {
            Some(captures) => variables.push(PaletteVariable {
                name: to_half_width(&captures[1]),
                value: captures[2].to_string(),
            }),
            None => lines.push(palette.clone()),
        }
    }
    ParsedPalette {
        value_version,
        palettes,
        lines,
        variables,
    }
}

// last definition wins
fn lookup(variables: &[PaletteVariable], name: &str) -> String {
    let name = normalize_name(name);
    variables
        .iter()
        .rev()
        .find(|variable| normalize_name(&variable.name) == name)
        .map(|variable| variable.value.clone())
        .unwrap_or_default()
}

fn normalize_name(name: &str) -> String {
    let dashed: String = name
        .chars()
        .map(|c| match c {
            '\u{2015}' | '\u{30FC}' | '\u{2014}' | '\u{2010}' => '-',
            other => other,
        })
        .collect();
    to_half_width(&dashed).to_lowercase().trim().to_string()
}

fn to_half_width(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            other => other,
        })
        .collect()
}

impl Replicate for ChatPalette {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    fn apply(&mut self, context: &SyncContext) {
        self.base.apply(context);
        self.parsed.replace(None);
    }
}

impl ReplicateBuilder for ChatPalette {
    const SCHEMA: &'static ObjectSchema = &CHAT_PALETTE_SCHEMA;

    fn build(identifier: EntityId) -> Self {
        Self {
            base: ObjectBase::new(identifier, Self::SCHEMA),
            parsed: RefCell::new(None),
        }
    }
}
