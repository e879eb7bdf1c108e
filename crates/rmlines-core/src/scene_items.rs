//! Scene item data model: strokes, groups, highlights and rich text.

use std::collections::BTreeMap;

use crate::crdt_id::{CrdtId, LwwValue};
use crate::crdt_sequence::CrdtSequence;
use crate::error::SceneError;

/// Stroke colour. The numeric codes are wire-visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenColor {
    Black,
    Gray,
    White,
    Yellow,
    Green,
    Pink,
    Blue,
    Red,
    GrayOverlap,
    Highlight,
    Green2,
    Cyan,
    Magenta,
    Yellow2,
}

impl PenColor {
    pub fn from_u32(code: u32) -> Result<Self, SceneError> {
        Ok(match code {
            0 => PenColor::Black,
            1 => PenColor::Gray,
            2 => PenColor::White,
            3 => PenColor::Yellow,
            4 => PenColor::Green,
            5 => PenColor::Pink,
            6 => PenColor::Blue,
            7 => PenColor::Red,
            8 => PenColor::GrayOverlap,
            9 => PenColor::Highlight,
            10 => PenColor::Green2,
            11 => PenColor::Cyan,
            12 => PenColor::Magenta,
            13 => PenColor::Yellow2,
            other => return Err(SceneError::UnknownColor(other)),
        })
    }

    pub fn as_u32(self) -> u32 {
        match self {
            PenColor::Black => 0,
            PenColor::Gray => 1,
            PenColor::White => 2,
            PenColor::Yellow => 3,
            PenColor::Green => 4,
            PenColor::Pink => 5,
            PenColor::Blue => 6,
            PenColor::Red => 7,
            PenColor::GrayOverlap => 8,
            PenColor::Highlight => 9,
            PenColor::Green2 => 10,
            PenColor::Cyan => 11,
            PenColor::Magenta => 12,
            PenColor::Yellow2 => 13,
        }
    }
}

/// Drawing tool. Codes are wire-visible and non-contiguous; the gaps
/// belong to tools retired by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pen {
    Paintbrush1,
    Pencil1,
    Ballpoint1,
    Marker1,
    Fineliner1,
    Highlighter1,
    Eraser,
    MechanicalPencil1,
    EraserArea,
    Paintbrush2,
    MechanicalPencil2,
    Pencil2,
    Ballpoint2,
    Marker2,
    Fineliner2,
    Highlighter2,
    Calligraphy,
    Shader,
}

impl Pen {
    pub fn from_u32(code: u32) -> Result<Self, SceneError> {
        Ok(match code {
            0 => Pen::Paintbrush1,
            1 => Pen::Pencil1,
            2 => Pen::Ballpoint1,
            3 => Pen::Marker1,
            4 => Pen::Fineliner1,
            5 => Pen::Highlighter1,
            6 => Pen::Eraser,
            7 => Pen::MechanicalPencil1,
            8 => Pen::EraserArea,
            12 => Pen::Paintbrush2,
            13 => Pen::MechanicalPencil2,
            14 => Pen::Pencil2,
            15 => Pen::Ballpoint2,
            16 => Pen::Marker2,
            17 => Pen::Fineliner2,
            18 => Pen::Highlighter2,
            21 => Pen::Calligraphy,
            23 => Pen::Shader,
            other => return Err(SceneError::UnknownPen(other)),
        })
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Pen::Paintbrush1 => 0,
            Pen::Pencil1 => 1,
            Pen::Ballpoint1 => 2,
            Pen::Marker1 => 3,
            Pen::Fineliner1 => 4,
            Pen::Highlighter1 => 5,
            Pen::Eraser => 6,
            Pen::MechanicalPencil1 => 7,
            Pen::EraserArea => 8,
            Pen::Paintbrush2 => 12,
            Pen::MechanicalPencil2 => 13,
            Pen::Pencil2 => 14,
            Pen::Ballpoint2 => 15,
            Pen::Marker2 => 16,
            Pen::Fineliner2 => 17,
            Pen::Highlighter2 => 18,
            Pen::Calligraphy => 21,
            Pen::Shader => 23,
        }
    }
}

/// Paragraph formatting of root text.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ParagraphStyle {
    Basic,
    #[default]
    Plain,
    Heading,
    Bold,
    Bullet,
    Bullet2,
    Checkbox,
    CheckboxChecked,
}

impl ParagraphStyle {
    pub fn from_u8(code: u8) -> Result<Self, SceneError> {
        Ok(match code {
            0 => ParagraphStyle::Basic,
            1 => ParagraphStyle::Plain,
            2 => ParagraphStyle::Heading,
            3 => ParagraphStyle::Bold,
            4 => ParagraphStyle::Bullet,
            5 => ParagraphStyle::Bullet2,
            6 => ParagraphStyle::Checkbox,
            7 => ParagraphStyle::CheckboxChecked,
            other => {
                return Err(SceneError::InvalidEncoding(format!(
                    "unknown paragraph style code {other}"
                )))
            }
        })
    }

    pub fn as_u8(self) -> u8 {
        match self {
            ParagraphStyle::Basic => 0,
            ParagraphStyle::Plain => 1,
            ParagraphStyle::Heading => 2,
            ParagraphStyle::Bold => 3,
            ParagraphStyle::Bullet => 4,
            ParagraphStyle::Bullet2 => 5,
            ParagraphStyle::Checkbox => 6,
            ParagraphStyle::CheckboxChecked => 7,
        }
    }
}

/// One sample of a stroke.
///
/// Speed, direction, width and pressure are stored in the integer
/// units of the v2 point encoding; the v1 float scaling lives in the
/// block codec.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub speed: u16,
    pub direction: u8,
    pub width: u16,
    pub pressure: u8,
}

/// A pen stroke.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub color: PenColor,
    pub tool: Pen,
    pub points: Vec<Point>,
    pub thickness_scale: f64,
    pub starting_length: f32,
    pub move_id: Option<CrdtId>,
}

/// Axis-aligned rectangle in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// A highlight over typed or recognised text.
///
/// When `start` is absent on the wire, `length` is implicitly the
/// character count of `text`.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphRange {
    pub start: Option<u32>,
    pub length: u32,
    pub text: String,
    pub color: PenColor,
    pub rectangles: Vec<Rectangle>,
}

/// A node of the scene tree, usually a layer or a grouped selection.
///
/// The four anchor registers are either all present or all absent,
/// tracking whether the group is positioned relative to root text.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub node_id: CrdtId,
    pub children: CrdtSequence<SceneItem>,
    pub label: LwwValue<String>,
    pub visible: LwwValue<bool>,
    pub anchor_id: Option<LwwValue<CrdtId>>,
    pub anchor_type: Option<LwwValue<u8>>,
    pub anchor_threshold: Option<LwwValue<f32>>,
    pub anchor_origin_x: Option<LwwValue<f32>>,
}

impl Group {
    /// A fresh group with default registers: empty label, visible.
    pub fn new(node_id: CrdtId) -> Self {
        Self {
            node_id,
            children: CrdtSequence::new(),
            label: LwwValue::unset(String::new()),
            visible: LwwValue::unset(true),
            anchor_id: None,
            anchor_type: None,
            anchor_threshold: None,
            anchor_origin_x: None,
        }
    }
}

/// One item of root text: a span of characters, optionally carrying a
/// paragraph-style format code. The wire permits both to be present;
/// consumers treat a present format code as the item's value.
#[derive(Debug, Clone, PartialEq)]
pub struct TextItem {
    pub text: String,
    pub format: Option<u32>,
}

impl TextItem {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: None,
        }
    }
}

/// The root text of a page: a character CRDT plus paragraph styles.
///
/// `styles` is keyed by the id of the character before which each
/// paragraph break sits, plus the end-marker for the first paragraph.
#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    pub items: CrdtSequence<TextItem>,
    pub styles: BTreeMap<CrdtId, LwwValue<ParagraphStyle>>,
    pub pos_x: f64,
    pub pos_y: f64,
    pub width: f32,
}

/// A value stored in a group's child sequence.
///
/// Group children reference their group node by id; the concrete
/// [`Group`] is materialised by scene-tree lookup, so the tree holds
/// no back references.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneItem {
    Group(CrdtId),
    Line(Line),
    GlyphRange(GlyphRange),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pen_color_codes_round_trip() {
        for code in 0..=13 {
            let color = PenColor::from_u32(code).unwrap();
            assert_eq!(color.as_u32(), code);
        }
        assert_eq!(PenColor::from_u32(14), Err(SceneError::UnknownColor(14)));
    }

    #[test]
    fn test_pen_codes_round_trip() {
        for code in [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 13, 14, 15, 16, 17, 18, 21, 23] {
            let pen = Pen::from_u32(code).unwrap();
            assert_eq!(pen.as_u32(), code);
        }
        assert_eq!(Pen::from_u32(9), Err(SceneError::UnknownPen(9)));
        assert_eq!(Pen::from_u32(22), Err(SceneError::UnknownPen(22)));
    }

    #[test]
    fn test_paragraph_style_codes_round_trip() {
        for code in 0..=7 {
            let style = ParagraphStyle::from_u8(code).unwrap();
            assert_eq!(style.as_u8(), code);
        }
        assert!(ParagraphStyle::from_u8(8).is_err());
    }

    #[test]
    fn test_group_defaults() {
        let group = Group::new(CrdtId::new(0, 2));
        assert_eq!(group.label.value, "");
        assert!(group.visible.value);
        assert_eq!(group.label.timestamp, CrdtId::END_MARKER);
        assert!(group.anchor_id.is_none());
        assert!(group.children.is_empty());
    }
}
