//! Book content model consumed by the reader.
//!
//! A book is a chapter -> section -> point tree where every point carries an
//! ordered list of paragraph strings. Ids are opaque strings. Besides the
//! ordered tree, `BookData` keeps an id-indexed mirror so the reader can
//! validate a chapter/section/point chain without scanning.

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl Chapter {
    pub fn section(&self, section_id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == section_id)
    }
}

impl Section {
    pub fn point(&self, point_id: &str) -> Option<&Point> {
        self.points.iter().find(|p| p.id == point_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookMeta {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub language: String,
}

/// Where a heading anchor id points to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AnchorTarget {
    Chapter {
        chapter_id: String,
    },
    Section {
        chapter_id: String,
        section_id: String,
    },
    Point {
        chapter_id: String,
        section_id: String,
        point_id: String,
    },
}

/// A fully resolved position in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointRef {
    pub chapter_id: String,
    pub section_id: String,
    pub point_id: String,
}

#[derive(Debug, Default)]
struct SectionIndex {
    position: usize,
    points: HashMap<String, usize>,
}

#[derive(Debug, Default)]
struct ChapterIndex {
    position: usize,
    sections: HashMap<String, SectionIndex>,
}

/// On-disk JSON layout accepted by [`BookData::load_json`].
#[derive(Debug, Deserialize)]
struct BookFile {
    #[serde(default)]
    meta: BookMeta,
    chapters: Vec<Chapter>,
    #[serde(default)]
    anchors: HashMap<String, AnchorTarget>,
}

#[derive(Debug)]
pub struct BookData {
    pub meta: BookMeta,
    pub chapters: Vec<Chapter>,
    pub anchor_lookup: HashMap<String, AnchorTarget>,
    pub default_chapter_id: Option<String>,
    pub default_section_id: Option<String>,
    pub default_point_id: Option<String>,
    books: HashMap<String, ChapterIndex>,
}

impl BookData {
    pub fn new(
        meta: BookMeta,
        chapters: Vec<Chapter>,
        anchor_lookup: HashMap<String, AnchorTarget>,
    ) -> Self {
        let mut books = HashMap::new();
        for (chapter_pos, chapter) in chapters.iter().enumerate() {
            let mut chapter_index = ChapterIndex {
                position: chapter_pos,
                sections: HashMap::new(),
            };
            for (section_pos, section) in chapter.sections.iter().enumerate() {
                let points = section
                    .points
                    .iter()
                    .enumerate()
                    .map(|(point_pos, point)| (point.id.clone(), point_pos))
                    .collect();
                chapter_index.sections.insert(
                    section.id.clone(),
                    SectionIndex {
                        position: section_pos,
                        points,
                    },
                );
            }
            books.insert(chapter.id.clone(), chapter_index);
        }

        let first_chapter = chapters.first();
        let first_section = first_chapter.and_then(|c| c.sections.first());
        let first_point = first_section.and_then(|s| s.points.first());

        Self {
            meta,
            default_chapter_id: first_chapter.map(|c| c.id.clone()),
            default_section_id: first_section.map(|s| s.id.clone()),
            default_point_id: first_point.map(|p| p.id.clone()),
            chapters,
            anchor_lookup,
            books,
        }
    }

    /// Build from chapters alone; every id doubles as its own anchor.
    pub fn from_chapters(chapters: Vec<Chapter>) -> Self {
        let anchors = ids_as_anchors(&chapters);
        Self::new(BookMeta::default(), chapters, anchors)
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading book file {}", path.display()))?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let file: BookFile = serde_json::from_str(content)?;
        let mut anchors = ids_as_anchors(&file.chapters);
        anchors.extend(file.anchors);
        let book = Self::new(file.meta, file.chapters, anchors);
        book.log_totals();
        Ok(book)
    }

    /// Load by extension: `.json` as the native layout, `.xhtml`/`.html` as an
    /// EPUB content document.
    pub fn load(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "json" => Self::load_json(path),
            "xhtml" | "html" | "htm" | "xml" => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("reading content file {}", path.display()))?;
                Self::from_xhtml_str(&content)
            }
            other => Err(anyhow!("unsupported book format '{other}'")),
        }
    }

    /// Parse an EPUB-derived XHTML content document: `h1` opens a chapter,
    /// `h2` a section and `h3` a point whose paragraphs are the `p` siblings
    /// up to the next heading.
    pub fn from_xhtml_str(content: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(content)?;
        let mut chapters: Vec<Chapter> = Vec::new();
        let mut anchors = HashMap::new();

        let title = doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == "title")
            .map(|n| element_text(&n))
            .unwrap_or_default();

        for heading in doc.descendants().filter(|n| n.is_element()) {
            let level = match heading.tag_name().name() {
                "h1" => 1,
                "h2" => 2,
                "h3" => 3,
                _ => continue,
            };
            let text = element_text(&heading);
            let anchor_id = heading.attribute("id").map(str::trim).unwrap_or("");
            if text.is_empty() || anchor_id.is_empty() {
                continue;
            }

            match level {
                1 => {
                    let id = format!("chapter-{:02}", chapters.len() + 1);
                    anchors.insert(
                        anchor_id.to_string(),
                        AnchorTarget::Chapter {
                            chapter_id: id.clone(),
                        },
                    );
                    chapters.push(Chapter {
                        id,
                        title: Some(text),
                        sections: Vec::new(),
                    });
                }
                2 => {
                    let chapter_no = chapters.len();
                    let Some(chapter) = chapters.last_mut() else {
                        continue;
                    };
                    let id = format!("section-{:02}-{:02}", chapter_no, chapter.sections.len() + 1);
                    anchors.insert(
                        anchor_id.to_string(),
                        AnchorTarget::Section {
                            chapter_id: chapter.id.clone(),
                            section_id: id.clone(),
                        },
                    );
                    chapter.sections.push(Section {
                        id,
                        title: Some(text),
                        points: Vec::new(),
                    });
                }
                _ => {
                    let chapter_no = chapters.len();
                    let Some(chapter) = chapters.last_mut() else {
                        continue;
                    };
                    let section_no = chapter.sections.len();
                    let chapter_id = chapter.id.clone();
                    let Some(section) = chapter.sections.last_mut() else {
                        continue;
                    };
                    let id = format!(
                        "point-{:02}-{:02}-{:02}",
                        chapter_no,
                        section_no,
                        section.points.len() + 1
                    );
                    anchors.insert(
                        anchor_id.to_string(),
                        AnchorTarget::Point {
                            chapter_id,
                            section_id: section.id.clone(),
                            point_id: id.clone(),
                        },
                    );
                    section.points.push(Point {
                        id,
                        title: Some(text),
                        text: collect_paragraphs(heading),
                    });
                }
            }
        }

        let meta = BookMeta {
            title,
            ..BookMeta::default()
        };
        let book = Self::new(meta, chapters, anchors);
        book.log_totals();
        Ok(book)
    }

    fn log_totals(&self) {
        let sections: usize = self.chapters.iter().map(|c| c.sections.len()).sum();
        let points: usize = self
            .chapters
            .iter()
            .flat_map(|c| c.sections.iter())
            .map(|s| s.points.len())
            .sum();
        info!(
            "Book structure loaded: {} chapters, {} sections, {} points",
            self.chapters.len(),
            sections,
            points
        );
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    pub fn chapter(&self, chapter_id: &str) -> Option<&Chapter> {
        let index = self.books.get(chapter_id)?;
        self.chapters.get(index.position)
    }

    pub fn chapter_position(&self, chapter_id: &str) -> Option<usize> {
        self.books.get(chapter_id).map(|c| c.position)
    }

    pub fn section(&self, chapter_id: &str, section_id: &str) -> Option<&Section> {
        let chapter_index = self.books.get(chapter_id)?;
        let section_index = chapter_index.sections.get(section_id)?;
        self.chapters
            .get(chapter_index.position)?
            .sections
            .get(section_index.position)
    }

    pub fn point(&self, chapter_id: &str, section_id: &str, point_id: &str) -> Option<&Point> {
        let chapter_index = self.books.get(chapter_id)?;
        let section_index = chapter_index.sections.get(section_id)?;
        let point_pos = *section_index.points.get(point_id)?;
        self.chapters
            .get(chapter_index.position)?
            .sections
            .get(section_index.position)?
            .points
            .get(point_pos)
    }

    /// True only if every link of the chain resolves.
    pub fn resolves(&self, chapter_id: &str, section_id: &str, point_id: &str) -> bool {
        self.point(chapter_id, section_id, point_id).is_some()
    }

    pub fn default_point(&self) -> Option<PointRef> {
        Some(PointRef {
            chapter_id: self.default_chapter_id.clone()?,
            section_id: self.default_section_id.clone()?,
            point_id: self.default_point_id.clone()?,
        })
    }

    /// First point of a chapter, optionally constrained to a section.
    pub fn first_point_in(&self, chapter_id: &str, section_id: Option<&str>) -> Option<PointRef> {
        let chapter = self.chapter(chapter_id)?;
        let section = match section_id {
            Some(id) => chapter.section(id)?,
            None => chapter.sections.iter().find(|s| !s.points.is_empty())?,
        };
        let point = section.points.first()?;
        Some(PointRef {
            chapter_id: chapter.id.clone(),
            section_id: section.id.clone(),
            point_id: point.id.clone(),
        })
    }

    /// A point anywhere in the chapter, whichever section holds it.
    pub fn find_point_in(&self, chapter_id: &str, point_id: &str) -> Option<PointRef> {
        let chapter = self.chapter(chapter_id)?;
        let section = chapter
            .sections
            .iter()
            .find(|s| s.point(point_id).is_some())?;
        Some(PointRef {
            chapter_id: chapter.id.clone(),
            section_id: section.id.clone(),
            point_id: point_id.to_string(),
        })
    }

    /// All points in document order.
    pub fn point_sequence(&self) -> Vec<PointRef> {
        let mut sequence = Vec::new();
        for chapter in &self.chapters {
            for section in &chapter.sections {
                for point in &section.points {
                    sequence.push(PointRef {
                        chapter_id: chapter.id.clone(),
                        section_id: section.id.clone(),
                        point_id: point.id.clone(),
                    });
                }
            }
        }
        sequence
    }

    /// Point `offset` steps away from `current` in document order.
    pub fn neighbor_point(&self, current: &PointRef, offset: isize) -> Option<PointRef> {
        let sequence = self.point_sequence();
        let position = sequence.iter().position(|p| p == current)?;
        let target = position.checked_add_signed(offset)?;
        sequence.into_iter().nth(target)
    }

    pub fn resolve_anchor(&self, anchor_id: &str) -> Option<PointRef> {
        match self.anchor_lookup.get(anchor_id)? {
            AnchorTarget::Chapter { chapter_id } => self.first_point_in(chapter_id, None),
            AnchorTarget::Section {
                chapter_id,
                section_id,
            } => self.first_point_in(chapter_id, Some(section_id)),
            AnchorTarget::Point {
                chapter_id,
                section_id,
                point_id,
            } => self
                .resolves(chapter_id, section_id, point_id)
                .then(|| PointRef {
                    chapter_id: chapter_id.clone(),
                    section_id: section_id.clone(),
                    point_id: point_id.clone(),
                }),
        }
    }
}

fn ids_as_anchors(chapters: &[Chapter]) -> HashMap<String, AnchorTarget> {
    let mut anchors = HashMap::new();
    for chapter in chapters {
        anchors.insert(
            chapter.id.clone(),
            AnchorTarget::Chapter {
                chapter_id: chapter.id.clone(),
            },
        );
        for section in &chapter.sections {
            anchors.insert(
                section.id.clone(),
                AnchorTarget::Section {
                    chapter_id: chapter.id.clone(),
                    section_id: section.id.clone(),
                },
            );
            for point in &section.points {
                anchors.insert(
                    point.id.clone(),
                    AnchorTarget::Point {
                        chapter_id: chapter.id.clone(),
                        section_id: section.id.clone(),
                        point_id: point.id.clone(),
                    },
                );
            }
        }
    }
    anchors
}

fn element_text(node: &roxmltree::Node) -> String {
    let raw: String = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_paragraphs(heading: roxmltree::Node) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut next = heading.next_sibling_element();
    while let Some(node) = next {
        match node.tag_name().name() {
            "h1" | "h2" | "h3" => break,
            "p" => {
                let text = element_text(&node);
                if !text.is_empty() {
                    paragraphs.push(text);
                }
            }
            _ => {}
        }
        next = node.next_sibling_element();
    }
    if paragraphs.is_empty() {
        debug!(
            "Heading '{}' has no paragraphs",
            heading.attribute("id").unwrap_or_default()
        );
    }
    paragraphs
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_XHTML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>Mask 2077</title></head>
<body>
  <h2 id="orphan">Before any chapter</h2>
  <h1 id="h.prologue">Prologue</h1>
  <h2 id="h.s1">0.1 Oasis</h2>
  <h3 id="h.p1">0.1.1 Silence</h3>
  <p>First paragraph.</p>
  <p>   </p>
  <p>Second   <span>paragraph</span>.</p>
  <h3 id="h.p2">0.1.2 Ice</h3>
  <p>Belongs to p2.</p>
  <h3>No anchor, skipped</h3>
  <p>Dropped with its heading.</p>
  <h1 id="h.ch1">Chapter One</h1>
  <h2 id="h.s2">1.1 Start</h2>
  <h3 id="h.p3">1.1.1 Empty point</h3>
</body>
</html>"#;

    #[test]
    fn test_xhtml_builds_tree_with_formatted_ids() {
        let book = BookData::from_xhtml_str(SAMPLE_XHTML).unwrap();

        assert_eq!(book.meta.title, "Mask 2077");
        assert_eq!(book.chapters.len(), 2);
        assert_eq!(book.chapters[0].id, "chapter-01");
        assert_eq!(book.chapters[0].sections[0].id, "section-01-01");

        let points = &book.chapters[0].sections[0].points;
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].id, "point-01-01-01");
        assert_eq!(
            points[0].text,
            vec!["First paragraph.".to_string(), "Second paragraph.".to_string()]
        );
        assert_eq!(points[1].text, vec!["Belongs to p2.".to_string()]);

        let empty = book.point("chapter-02", "section-02-01", "point-02-01-01").unwrap();
        assert!(empty.text.is_empty());
    }

    #[test]
    fn test_xhtml_anchor_lookup() {
        let book = BookData::from_xhtml_str(SAMPLE_XHTML).unwrap();

        assert!(!book.anchor_lookup.contains_key("orphan"));
        let resolved = book.resolve_anchor("h.s2").unwrap();
        assert_eq!(resolved.point_id, "point-02-01-01");
        let resolved = book.resolve_anchor("h.p2").unwrap();
        assert_eq!(resolved.point_id, "point-01-01-02");
    }

    #[test]
    fn test_json_defaults_and_chain_validation() {
        let json = r#"{
            "chapters": [
                {"id": "prologue", "title": "Prologue", "sections": [
                    {"id": "0.1", "points": [
                        {"id": "0.1.1", "text": ["a"]},
                        {"id": "0.1.2", "text": ["b", "c"]}
                    ]}
                ]}
            ]
        }"#;
        let book = BookData::from_json_str(json).unwrap();

        assert_eq!(book.default_chapter_id.as_deref(), Some("prologue"));
        assert_eq!(book.default_point_id.as_deref(), Some("0.1.1"));
        assert!(book.resolves("prologue", "0.1", "0.1.2"));
        assert!(!book.resolves("prologue", "0.2", "0.1.2"));
        assert!(!book.resolves("missing", "0.1", "0.1.1"));
    }

    #[test]
    fn test_neighbor_point_walks_document_order() {
        let json = r#"{"chapters": [
            {"id": "a", "sections": [{"id": "a1", "points": [{"id": "p1"}, {"id": "p2"}]}]},
            {"id": "b", "sections": [{"id": "b1", "points": [{"id": "p3"}]}]}
        ]}"#;
        let book = BookData::from_json_str(json).unwrap();
        let current = book.default_point().unwrap();

        let next = book.neighbor_point(&current, 2).unwrap();
        assert_eq!(next.chapter_id, "b");
        assert_eq!(next.point_id, "p3");
        assert!(book.neighbor_point(&current, -1).is_none());
    }
}
