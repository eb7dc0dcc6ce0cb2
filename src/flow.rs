//! Flattening a chapter tree into an ordered run of typed text parts.

use log::debug;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::book::Chapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowRole {
    Title,
    ChapterHeading,
    Paragraph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartType {
    Title,
    Section,
    Point,
    Paragraph,
}

/// The chapter/section/point a page starts in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageAnchor {
    pub chapter_id: String,
    pub section_id: String,
    pub point_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub chapter_id: String,
    pub section_id: Option<String>,
    pub point_id: Option<String>,
    pub paragraph_index: Option<usize>,
    pub part_type: PartType,
}

impl Provenance {
    /// Point-level anchor; titles and section headings have none.
    pub fn page_anchor(&self) -> Option<PageAnchor> {
        Some(PageAnchor {
            chapter_id: self.chapter_id.clone(),
            section_id: self.section_id.clone()?,
            point_id: self.point_id.clone()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowPart {
    pub text: String,
    pub role: FlowRole,
    /// Paragraph that continues a point already started by an earlier part.
    pub continuation: bool,
    pub provenance: Option<Provenance>,
}

fn present(title: &Option<String>) -> Option<&str> {
    title.as_deref().map(str::trim).filter(|t| !t.is_empty())
}

pub fn build_flow_parts(chapter: &Chapter) -> Vec<FlowPart> {
    let mut parts = Vec::new();

    if let Some(title) = present(&chapter.title) {
        parts.push(FlowPart {
            text: title.to_string(),
            role: FlowRole::Title,
            continuation: false,
            provenance: Some(Provenance {
                chapter_id: chapter.id.clone(),
                section_id: None,
                point_id: None,
                paragraph_index: None,
                part_type: PartType::Title,
            }),
        });
    }

    for section in &chapter.sections {
        if let Some(title) = present(&section.title) {
            parts.push(FlowPart {
                text: title.to_string(),
                role: FlowRole::ChapterHeading,
                continuation: false,
                provenance: Some(Provenance {
                    chapter_id: chapter.id.clone(),
                    section_id: Some(section.id.clone()),
                    point_id: None,
                    paragraph_index: None,
                    part_type: PartType::Section,
                }),
            });
        }

        for point in &section.points {
            if let Some(title) = present(&point.title) {
                parts.push(FlowPart {
                    text: title.to_string(),
                    role: FlowRole::ChapterHeading,
                    continuation: false,
                    provenance: Some(Provenance {
                        chapter_id: chapter.id.clone(),
                        section_id: Some(section.id.clone()),
                        point_id: Some(point.id.clone()),
                        paragraph_index: None,
                        part_type: PartType::Point,
                    }),
                });
            }

            if point.text.is_empty() {
                debug!(
                    "Point {}/{}/{} has no paragraphs",
                    chapter.id, section.id, point.id
                );
                continue;
            }

            for (index, paragraph) in point.text.iter().enumerate() {
                parts.push(FlowPart {
                    text: paragraph.clone(),
                    role: FlowRole::Paragraph,
                    continuation: index > 0,
                    provenance: Some(Provenance {
                        chapter_id: chapter.id.clone(),
                        section_id: Some(section.id.clone()),
                        point_id: Some(point.id.clone()),
                        paragraph_index: Some(index),
                        part_type: PartType::Paragraph,
                    }),
                });
            }
        }
    }

    parts
}

/// Stable hash of the flow text and roles, used in the pagination key.
pub fn content_hash(parts: &[FlowPart]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for part in parts {
        part.role.hash(&mut hasher);
        part.text.hash(&mut hasher);
    }
    hasher.finish()
}

/// Flow parts of the active chapter; rebuilt when the chapter changes.
#[derive(Debug, Default)]
pub struct FlowCache {
    chapter_id: Option<String>,
    parts: Rc<Vec<FlowPart>>,
}

impl FlowCache {
    pub fn parts_for(&mut self, chapter: &Chapter) -> Rc<Vec<FlowPart>> {
        if self.chapter_id.as_deref() != Some(chapter.id.as_str()) {
            self.parts = Rc::new(build_flow_parts(chapter));
            self.chapter_id = Some(chapter.id.clone());
            debug!(
                "Built {} flow parts for chapter {}",
                self.parts.len(),
                chapter.id
            );
        }
        Rc::clone(&self.parts)
    }

    pub fn invalidate(&mut self) {
        self.chapter_id = None;
        self.parts = Rc::new(Vec::new());
    }
}
