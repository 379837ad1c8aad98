use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use regex::Regex;
use tracing::info;

use crate::{
    error::RenderError,
    schema::{DailySummary, ReportArtifact},
};

// US Letter, in points
const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 40.0;
const BULLET_INDENT: f32 = 60.0;
const LINE_HEIGHT: f32 = 14.0;
const BODY_SIZE: f32 = 11.0;
const HEADING_SIZE: f32 = 14.0;

// Advance widths for 0x20..=0x7E in 1/1000 em, from the standard Helvetica AFMs
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];
#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Face {
    Regular,
    Bold,
}

impl Face {
    fn resource(self) -> &'static str {
        match self {
            Face::Regular => "F1",
            Face::Bold => "F2",
        }
    }

    fn char_width(self, c: char, size: f32) -> f32 {
        let units = match (c, self) {
            (' '..='~', Face::Regular) => HELVETICA_WIDTHS[c as usize - 0x20],
            (' '..='~', Face::Bold) => HELVETICA_BOLD_WIDTHS[c as usize - 0x20],
            ('\u{2018}' | '\u{2019}', Face::Regular) => 222,
            ('\u{2018}' | '\u{2019}', Face::Bold) => 278,
            ('\u{201C}' | '\u{201D}', Face::Regular) => 333,
            ('\u{201C}' | '\u{201D}', Face::Bold) => 500,
            ('\u{2014}' | '\u{2026}' | '\u{2030}', _) => 1000,
            _ => 556,
        };
        f32::from(units) * size / 1000.0
    }

    fn width(self, text: &str, size: f32) -> f32 {
        text.chars().map(|c| self.char_width(c, size)).sum()
    }
}

lazy_static::lazy_static! {
    static ref LOG_ID: Regex = Regex::new(r"log_[A-Za-z0-9]+").expect("valid log id pattern");
}

pub fn report_basename(date: NaiveDate) -> String {
    format!("{}_log_summary", date.format("%Y-%m-%d"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Heading,
    Bullet,
    Body,
    Blank,
}

fn classify(line: &str) -> LineKind {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        LineKind::Blank
    } else if trimmed.starts_with('-') {
        LineKind::Bullet
    } else if trimmed.len() > 3
        && trimmed.chars().any(char::is_alphabetic)
        && !trimmed.chars().any(char::is_lowercase)
    {
        LineKind::Heading
    } else {
        LineKind::Body
    }
}

/// Greedy word wrap on measured width. Words wider than a line are split.
fn wrap_text(text: &str, max_width: f32, face: Face, size: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word = word.to_string();
        while face.width(&word, size) > max_width && word.chars().count() > 1 {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let mut end = 0;
            let mut used = 0.0;
            for (i, c) in word.char_indices() {
                let advance = face.char_width(c, size);
                if end > 0 && used + advance > max_width {
                    break;
                }
                used += advance;
                end = i + c.len_utf8();
            }
            let rest = word.split_off(end);
            lines.push(word);
            word = rest;
        }

        if current.is_empty() {
            current = word;
            continue;
        }
        let candidate = format!("{current} {word}");
        if face.width(&candidate, size) > max_width {
            lines.push(std::mem::replace(&mut current, word));
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Standard Type1 fonts use WinAnsi: Latin-1 plus typographic punctuation
/// in 0x80..=0x9F. Anything else becomes `?`.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' | '\u{A0}'..='\u{FF}' => c as u32 as u8,
            '\u{20AC}' => 0x80,
            '\u{201A}' => 0x82,
            '\u{0192}' => 0x83,
            '\u{201E}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2020}' => 0x86,
            '\u{2021}' => 0x87,
            '\u{02C6}' => 0x88,
            '\u{2030}' => 0x89,
            '\u{0160}' => 0x8A,
            '\u{2039}' => 0x8B,
            '\u{0152}' => 0x8C,
            '\u{017D}' => 0x8E,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{02DC}' => 0x98,
            '\u{2122}' => 0x99,
            '\u{0161}' => 0x9A,
            '\u{203A}' => 0x9B,
            '\u{0153}' => 0x9C,
            '\u{017E}' => 0x9E,
            '\u{0178}' => 0x9F,
            _ => b'?',
        })
        .collect()
}

fn text_object(text: &str) -> Object {
    Object::String(encode_win_ansi(text), StringFormat::Literal)
}

struct Link {
    rect: [f32; 4],
    url: String,
}

#[derive(Default)]
struct Page {
    operations: Vec<Operation>,
    links: Vec<Link>,
}

struct Layout<'a> {
    link_base: Option<&'a str>,
    pages: Vec<Page>,
    y: f32,
}

impl<'a> Layout<'a> {
    fn new(link_base: Option<&'a str>) -> Self {
        Self {
            link_base,
            pages: vec![Page::default()],
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn page(&mut self) -> &mut Page {
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn ensure_room(&mut self) {
        if self.y < MARGIN {
            self.pages.push(Page::default());
            self.y = PAGE_HEIGHT - MARGIN;
        }
    }

    fn add_line(&mut self, line: &str) {
        match classify(line) {
            LineKind::Blank => self.y -= LINE_HEIGHT,
            LineKind::Heading => {
                self.y -= LINE_HEIGHT;
                for wrapped in wrap_text(line, PAGE_WIDTH - 2.0 * MARGIN, Face::Bold, HEADING_SIZE) {
                    self.draw(&wrapped, MARGIN, Face::Bold, HEADING_SIZE);
                }
                self.y -= LINE_HEIGHT / 2.0;
            }
            LineKind::Bullet => {
                for wrapped in wrap_text(line, PAGE_WIDTH - BULLET_INDENT - MARGIN, Face::Regular, BODY_SIZE) {
                    self.draw(&wrapped, BULLET_INDENT, Face::Regular, BODY_SIZE);
                }
                self.y -= LINE_HEIGHT / 2.0;
            }
            LineKind::Body => {
                for wrapped in wrap_text(line, PAGE_WIDTH - 2.0 * MARGIN, Face::Regular, BODY_SIZE) {
                    self.draw(&wrapped, MARGIN, Face::Regular, BODY_SIZE);
                }
            }
        }
    }

    fn draw(&mut self, text: &str, x: f32, face: Face, size: f32) {
        self.ensure_room();
        let y = self.y;

        let mut ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![face.resource().into(), Object::Real(size)]),
            Operation::new("Td", vec![Object::Real(x), Object::Real(y)]),
        ];
        let mut links = Vec::new();

        match self.link_base {
            Some(base) if LOG_ID.is_match(text) => {
                let mut last_end = 0;
                let mut cursor = x;
                for m in LOG_ID.find_iter(text) {
                    let prefix = &text[last_end..m.start()];
                    if !prefix.is_empty() {
                        ops.push(Operation::new("Tj", vec![text_object(prefix)]));
                        cursor += face.width(prefix, size);
                    }
                    let width = face.width(m.as_str(), size);
                    ops.push(Operation::new("rg", vec![Object::Real(0.0), Object::Real(0.0), Object::Real(1.0)]));
                    ops.push(Operation::new("Tj", vec![text_object(m.as_str())]));
                    ops.push(Operation::new("rg", vec![Object::Real(0.0), Object::Real(0.0), Object::Real(0.0)]));
                    links.push(Link {
                        rect: [cursor, y - 2.0, cursor + width, y + size],
                        url: format!("{base}{}", m.as_str()),
                    });
                    cursor += width;
                    last_end = m.end();
                }
                if last_end < text.len() {
                    ops.push(Operation::new("Tj", vec![text_object(&text[last_end..])]));
                }
            }
            _ => ops.push(Operation::new("Tj", vec![text_object(text)])),
        }
        ops.push(Operation::new("ET", vec![]));

        let page = self.page();
        page.operations.extend(ops);
        page.links.extend(links);
        self.y -= LINE_HEIGHT;
    }
}

pub struct ReportRenderer {
    link_base: Option<String>,
}

impl ReportRenderer {
    /// `link_base` is prefixed to each `log_<id>` to build its hyperlink.
    pub fn new(link_base: Option<String>) -> Self {
        Self { link_base }
    }

    pub fn render(&self, summary: &DailySummary) -> Result<ReportArtifact, RenderError> {
        let bytes = self.render_text(&summary.to_text())?;
        Ok(ReportArtifact {
            filename: format!("{}.pdf", report_basename(summary.date)),
            bytes,
        })
    }

    /// Lays the text report out as a paginated PDF. Output contains no
    /// timestamps, so equal input gives equal bytes.
    pub fn render_text(&self, text: &str) -> Result<Vec<u8>, RenderError> {
        if text.trim().is_empty() {
            return Err(RenderError::EmptyInput);
        }

        let mut layout = Layout::new(self.link_base.as_deref());
        for line in text.lines() {
            layout.add_line(line);
        }
        let pages = layout.pages;

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let body_font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let heading_font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                Face::Regular.resource() => body_font_id,
                Face::Bold.resource() => heading_font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
        for page in pages {
            let content = Content {
                operations: page.operations,
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

            let mut page_dict = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            };
            if !page.links.is_empty() {
                let mut annots: Vec<Object> = Vec::with_capacity(page.links.len());
                for link in page.links {
                    let annot_id = doc.add_object(dictionary! {
                        "Type" => "Annot",
                        "Subtype" => "Link",
                        "Rect" => link.rect.iter().map(|v| Object::Real(*v)).collect::<Vec<Object>>(),
                        "Border" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(0)],
                        "A" => dictionary! {
                            "S" => "URI",
                            "URI" => Object::String(link.url.into_bytes(), StringFormat::Literal),
                        },
                    });
                    annots.push(annot_id.into());
                }
                page_dict.set("Annots", annots);
            }
            kids.push(doc.add_object(page_dict).into());
        }

        let page_count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count,
                "Resources" => resources_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(PAGE_WIDTH),
                    Object::Real(PAGE_HEIGHT),
                ],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)?;
        Ok(bytes)
    }
}

/// Writes the intermediate text form next to where the PDF will go.
pub fn write_text_report(dir: &Path, date: NaiveDate, text: &str) -> Result<PathBuf, RenderError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.txt", report_basename(date)));
    std::fs::write(&path, text)?;
    info!(path = %path.display(), "Wrote text report");
    Ok(path)
}

pub fn write_artifact(dir: &Path, artifact: &ReportArtifact) -> Result<PathBuf, RenderError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(&artifact.filename);
    std::fs::write(&path, &artifact.bytes)?;
    info!(path = %path.display(), bytes = artifact.bytes.len(), "Wrote PDF report");
    Ok(path)
}
