//! Positional command encoding shared by the patch and canvas channels.
//!
//! Every command travels as a JSON array `[opcode, arg0, arg1, ...]`. The
//! argument list of each opcode has a fixed length and fixed positions;
//! optional trailing arguments are still present on the wire as `null`.

use crate::protocol::NodeId;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DomOpcode {
    SetAttr = 0,
    RemoveAttr = 1,
    CreateNode = 2,
    RemoveNode = 3,
    InsertChild = 4,
    SetText = 5,
    MoveChild = 6,
}

impl DomOpcode {
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::SetAttr),
            1 => Some(Self::RemoveAttr),
            2 => Some(Self::CreateNode),
            3 => Some(Self::RemoveNode),
            4 => Some(Self::InsertChild),
            5 => Some(Self::SetText),
            6 => Some(Self::MoveChild),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::SetAttr => "SET_ATTR",
            Self::RemoveAttr => "REMOVE_ATTR",
            Self::CreateNode => "CREATE_NODE",
            Self::RemoveNode => "REMOVE_NODE",
            Self::InsertChild => "INSERT_CHILD",
            Self::SetText => "SET_TEXT",
            Self::MoveChild => "MOVE_CHILD",
        }
    }

    fn arity(self) -> usize {
        match self {
            Self::SetAttr | Self::InsertChild | Self::MoveChild => 3,
            Self::RemoveAttr | Self::CreateNode | Self::SetText => 2,
            Self::RemoveNode => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DomCommand {
    SetAttribute {
        node_id: NodeId,
        name: String,
        value: Value,
    },
    RemoveAttribute {
        node_id: NodeId,
        name: String,
    },
    CreateNode {
        node_id: NodeId,
        tag_name: String,
    },
    RemoveNode {
        node_id: NodeId,
    },
    InsertChild {
        parent_id: NodeId,
        child_id: NodeId,
        index: usize,
    },
    SetText {
        node_id: NodeId,
        text: String,
    },
    MoveChild {
        parent_id: NodeId,
        child_id: NodeId,
        index: usize,
    },
}

impl DomCommand {
    pub fn opcode(&self) -> DomOpcode {
        match self {
            DomCommand::SetAttribute { .. } => DomOpcode::SetAttr,
            DomCommand::RemoveAttribute { .. } => DomOpcode::RemoveAttr,
            DomCommand::CreateNode { .. } => DomOpcode::CreateNode,
            DomCommand::RemoveNode { .. } => DomOpcode::RemoveNode,
            DomCommand::InsertChild { .. } => DomOpcode::InsertChild,
            DomCommand::SetText { .. } => DomOpcode::SetText,
            DomCommand::MoveChild { .. } => DomOpcode::MoveChild,
        }
    }

    /// The node whose state the command changes.
    pub fn target(&self) -> NodeId {
        match self {
            DomCommand::SetAttribute { node_id, .. }
            | DomCommand::RemoveAttribute { node_id, .. }
            | DomCommand::CreateNode { node_id, .. }
            | DomCommand::RemoveNode { node_id }
            | DomCommand::SetText { node_id, .. } => *node_id,
            DomCommand::InsertChild { child_id, .. } | DomCommand::MoveChild { child_id, .. } => {
                *child_id
            }
        }
    }

    pub fn to_positional(&self) -> Vec<Value> {
        let code = json!(self.opcode().code());
        match self {
            DomCommand::SetAttribute {
                node_id,
                name,
                value,
            } => vec![code, json!(node_id), json!(name), value.clone()],
            DomCommand::RemoveAttribute { node_id, name } => {
                vec![code, json!(node_id), json!(name)]
            }
            DomCommand::CreateNode { node_id, tag_name } => {
                vec![code, json!(node_id), json!(tag_name)]
            }
            DomCommand::RemoveNode { node_id } => vec![code, json!(node_id)],
            DomCommand::InsertChild {
                parent_id,
                child_id,
                index,
            }
            | DomCommand::MoveChild {
                parent_id,
                child_id,
                index,
            } => vec![code, json!(parent_id), json!(child_id), json!(index)],
            DomCommand::SetText { node_id, text } => vec![code, json!(node_id), json!(text)],
        }
    }

    pub fn from_positional(raw: &[Value]) -> Result<Self, String> {
        let code = leading_opcode(raw)?;
        let opcode =
            DomOpcode::from_code(code).ok_or_else(|| format!("unknown dom opcode {code}"))?;
        let args = Args::new(opcode.name(), raw, opcode.arity())?;

        Ok(match opcode {
            DomOpcode::SetAttr => DomCommand::SetAttribute {
                node_id: args.u64(0)?,
                name: args.string(1)?,
                value: args.value(2),
            },
            DomOpcode::RemoveAttr => DomCommand::RemoveAttribute {
                node_id: args.u64(0)?,
                name: args.string(1)?,
            },
            DomOpcode::CreateNode => DomCommand::CreateNode {
                node_id: args.u64(0)?,
                tag_name: args.string(1)?,
            },
            DomOpcode::RemoveNode => DomCommand::RemoveNode {
                node_id: args.u64(0)?,
            },
            DomOpcode::InsertChild => DomCommand::InsertChild {
                parent_id: args.u64(0)?,
                child_id: args.u64(1)?,
                index: args.index(2)?,
            },
            DomOpcode::SetText => DomCommand::SetText {
                node_id: args.u64(0)?,
                text: args.string(1)?,
            },
            DomOpcode::MoveChild => DomCommand::MoveChild {
                parent_id: args.u64(0)?,
                child_id: args.u64(1)?,
                index: args.index(2)?,
            },
        })
    }
}

impl Serialize for DomCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_positional().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DomCommand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<Value>::deserialize(deserializer)?;
        DomCommand::from_positional(&raw).map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CanvasOpcode {
    SetFillStyle = 0,
    SetStrokeStyle = 1,
    SetLineWidth = 2,
    SetGlobalAlpha = 3,
    SetFont = 4,
    SetTextAlign = 5,
    BeginPath = 6,
    ClosePath = 7,
    MoveTo = 8,
    LineTo = 9,
    Arc = 10,
    ArcTo = 11,
    BezierCurveTo = 12,
    Rect = 13,
    FillRect = 14,
    StrokeRect = 15,
    ClearRect = 16,
    Fill = 17,
    Stroke = 18,
    FillText = 19,
    Save = 20,
    Restore = 21,
    Rotate = 22,
    Scale = 23,
    Translate = 24,
    Transform = 25,
    SetTransform = 26,
    ResetTransform = 27,
    DrawImage = 28,
    SetLineDash = 29,
    QuadraticCurveTo = 30,
    Ellipse = 31,
    Clip = 32,
    ClipByPath = 33,
    FillByPath = 34,
    StrokeText = 35,
    PutImageData = 36,
    SetTextBaseline = 37,
    SetLineCap = 38,
    SetLineJoin = 39,
    SetMiterLimit = 40,
    SetLineDashOffset = 41,
    SetShadowBlur = 42,
    SetShadowColor = 43,
    SetShadowOffsetX = 44,
    SetShadowOffsetY = 45,
    SetGlobalCompositeOperation = 46,
    SetImageSmoothingEnabled = 47,
    SetImageSmoothingQuality = 48,
    SetDirection = 49,
    SetFillStyleByLinearGradient = 50,
    SetFillStyleByRadialGradient = 51,
    SetFillStyleByConicGradient = 52,
    SetFillStyleByPattern = 53,
    SetStrokeStyleByLinearGradient = 54,
    SetStrokeStyleByRadialGradient = 55,
    SetStrokeStyleByConicGradient = 56,
    SetStrokeStyleByPattern = 57,
}

impl CanvasOpcode {
    const ALL: [CanvasOpcode; 58] = [
        Self::SetFillStyle,
        Self::SetStrokeStyle,
        Self::SetLineWidth,
        Self::SetGlobalAlpha,
        Self::SetFont,
        Self::SetTextAlign,
        Self::BeginPath,
        Self::ClosePath,
        Self::MoveTo,
        Self::LineTo,
        Self::Arc,
        Self::ArcTo,
        Self::BezierCurveTo,
        Self::Rect,
        Self::FillRect,
        Self::StrokeRect,
        Self::ClearRect,
        Self::Fill,
        Self::Stroke,
        Self::FillText,
        Self::Save,
        Self::Restore,
        Self::Rotate,
        Self::Scale,
        Self::Translate,
        Self::Transform,
        Self::SetTransform,
        Self::ResetTransform,
        Self::DrawImage,
        Self::SetLineDash,
        Self::QuadraticCurveTo,
        Self::Ellipse,
        Self::Clip,
        Self::ClipByPath,
        Self::FillByPath,
        Self::StrokeText,
        Self::PutImageData,
        Self::SetTextBaseline,
        Self::SetLineCap,
        Self::SetLineJoin,
        Self::SetMiterLimit,
        Self::SetLineDashOffset,
        Self::SetShadowBlur,
        Self::SetShadowColor,
        Self::SetShadowOffsetX,
        Self::SetShadowOffsetY,
        Self::SetGlobalCompositeOperation,
        Self::SetImageSmoothingEnabled,
        Self::SetImageSmoothingQuality,
        Self::SetDirection,
        Self::SetFillStyleByLinearGradient,
        Self::SetFillStyleByRadialGradient,
        Self::SetFillStyleByConicGradient,
        Self::SetFillStyleByPattern,
        Self::SetStrokeStyleByLinearGradient,
        Self::SetStrokeStyleByRadialGradient,
        Self::SetStrokeStyleByConicGradient,
        Self::SetStrokeStyleByPattern,
    ];

    pub fn from_code(code: u64) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::SetFillStyle => "SET_FILL_STYLE",
            Self::SetStrokeStyle => "SET_STROKE_STYLE",
            Self::SetLineWidth => "SET_LINE_WIDTH",
            Self::SetGlobalAlpha => "SET_GLOBAL_ALPHA",
            Self::SetFont => "SET_FONT",
            Self::SetTextAlign => "SET_TEXT_ALIGN",
            Self::BeginPath => "BEGIN_PATH",
            Self::ClosePath => "CLOSE_PATH",
            Self::MoveTo => "MOVE_TO",
            Self::LineTo => "LINE_TO",
            Self::Arc => "ARC",
            Self::ArcTo => "ARC_TO",
            Self::BezierCurveTo => "BEZIER_CURVE_TO",
            Self::Rect => "RECT",
            Self::FillRect => "FILL_RECT",
            Self::StrokeRect => "STROKE_RECT",
            Self::ClearRect => "CLEAR_RECT",
            Self::Fill => "FILL",
            Self::Stroke => "STROKE",
            Self::FillText => "FILL_TEXT",
            Self::Save => "SAVE",
            Self::Restore => "RESTORE",
            Self::Rotate => "ROTATE",
            Self::Scale => "SCALE",
            Self::Translate => "TRANSLATE",
            Self::Transform => "TRANSFORM",
            Self::SetTransform => "SET_TRANSFORM",
            Self::ResetTransform => "RESET_TRANSFORM",
            Self::DrawImage => "DRAW_IMAGE",
            Self::SetLineDash => "SET_LINE_DASH",
            Self::QuadraticCurveTo => "QUADRATIC_CURVE_TO",
            Self::Ellipse => "ELLIPSE",
            Self::Clip => "CLIP",
            Self::ClipByPath => "CLIP_BY_PATH",
            Self::FillByPath => "FILL_BY_PATH",
            Self::StrokeText => "STROKE_TEXT",
            Self::PutImageData => "PUT_IMAGE_DATA",
            Self::SetTextBaseline => "SET_TEXT_BASELINE",
            Self::SetLineCap => "SET_LINE_CAP",
            Self::SetLineJoin => "SET_LINE_JOIN",
            Self::SetMiterLimit => "SET_MITER_LIMIT",
            Self::SetLineDashOffset => "SET_LINE_DASH_OFFSET",
            Self::SetShadowBlur => "SET_SHADOW_BLUR",
            Self::SetShadowColor => "SET_SHADOW_COLOR",
            Self::SetShadowOffsetX => "SET_SHADOW_OFFSET_X",
            Self::SetShadowOffsetY => "SET_SHADOW_OFFSET_Y",
            Self::SetGlobalCompositeOperation => "SET_GLOBAL_COMPOSITE_OPERATION",
            Self::SetImageSmoothingEnabled => "SET_IMAGE_SMOOTHING_ENABLED",
            Self::SetImageSmoothingQuality => "SET_IMAGE_SMOOTHING_QUALITY",
            Self::SetDirection => "SET_DIRECTION",
            Self::SetFillStyleByLinearGradient => "SET_FILL_STYLE_BY_LINEAR_GRADIENT",
            Self::SetFillStyleByRadialGradient => "SET_FILL_STYLE_BY_RADIAL_GRADIENT",
            Self::SetFillStyleByConicGradient => "SET_FILL_STYLE_BY_CONIC_GRADIENT",
            Self::SetFillStyleByPattern => "SET_FILL_STYLE_BY_PATTERN",
            Self::SetStrokeStyleByLinearGradient => "SET_STROKE_STYLE_BY_LINEAR_GRADIENT",
            Self::SetStrokeStyleByRadialGradient => "SET_STROKE_STYLE_BY_RADIAL_GRADIENT",
            Self::SetStrokeStyleByConicGradient => "SET_STROKE_STYLE_BY_CONIC_GRADIENT",
            Self::SetStrokeStyleByPattern => "SET_STROKE_STYLE_BY_PATTERN",
        }
    }

    fn arity(self) -> usize {
        match self {
            Self::BeginPath
            | Self::ClosePath
            | Self::Fill
            | Self::Stroke
            | Self::Save
            | Self::Restore
            | Self::ResetTransform => 0,
            Self::SetFillStyle
            | Self::SetStrokeStyle
            | Self::SetLineWidth
            | Self::SetGlobalAlpha
            | Self::SetFont
            | Self::SetTextAlign
            | Self::Rotate
            | Self::SetLineDash
            | Self::Clip
            | Self::SetTextBaseline
            | Self::SetLineCap
            | Self::SetLineJoin
            | Self::SetMiterLimit
            | Self::SetLineDashOffset
            | Self::SetShadowBlur
            | Self::SetShadowColor
            | Self::SetShadowOffsetX
            | Self::SetShadowOffsetY
            | Self::SetGlobalCompositeOperation
            | Self::SetImageSmoothingEnabled
            | Self::SetImageSmoothingQuality
            | Self::SetDirection => 1,
            Self::MoveTo
            | Self::LineTo
            | Self::Scale
            | Self::Translate
            | Self::ClipByPath
            | Self::FillByPath
            | Self::SetFillStyleByPattern
            | Self::SetStrokeStyleByPattern => 2,
            Self::Rect
            | Self::FillRect
            | Self::StrokeRect
            | Self::ClearRect
            | Self::FillText
            | Self::StrokeText
            | Self::QuadraticCurveTo
            | Self::SetFillStyleByConicGradient
            | Self::SetStrokeStyleByConicGradient => 4,
            Self::ArcTo
            | Self::DrawImage
            | Self::SetFillStyleByLinearGradient
            | Self::SetStrokeStyleByLinearGradient => 5,
            Self::Arc | Self::BezierCurveTo | Self::Transform | Self::SetTransform => 6,
            Self::SetFillStyleByRadialGradient | Self::SetStrokeStyleByRadialGradient => 7,
            Self::Ellipse => 8,
            Self::PutImageData => 9,
        }
    }
}

/// 2D transform matrix arguments in `a b c d e f` order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectArgs {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

pub const MAX_COLOR_STOPS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct ColorStop {
    pub offset: f64,
    pub color: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GradientShape {
    Linear {
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
    },
    Radial {
        x0: f64,
        y0: f64,
        r0: f64,
        x1: f64,
        y1: f64,
        r1: f64,
    },
    Conic {
        start_angle: f64,
        x: f64,
        y: f64,
    },
}

impl GradientShape {
    fn coordinates(&self) -> Vec<f64> {
        match *self {
            GradientShape::Linear { x0, y0, x1, y1 } => vec![x0, y0, x1, y1],
            GradientShape::Radial {
                x0,
                y0,
                r0,
                x1,
                y1,
                r1,
            } => vec![x0, y0, r0, x1, y1, r1],
            GradientShape::Conic { start_angle, x, y } => vec![start_angle, x, y],
        }
    }
}

/// A gradient paint. Stops travel as one trailing `[[offset, color], ...]`
/// argument so every gradient opcode keeps a fixed arity.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    pub shape: GradientShape,
    stops: Vec<ColorStop>,
}

impl Gradient {
    pub fn new(shape: GradientShape) -> Self {
        Self {
            shape,
            stops: Vec::new(),
        }
    }

    /// Returns false and keeps the gradient unchanged when the offset is
    /// outside `0.0..=1.0` or the gradient already holds [`MAX_COLOR_STOPS`].
    pub fn add_color_stop(&mut self, offset: f64, color: impl Into<String>) -> bool {
        if self.stops.len() >= MAX_COLOR_STOPS || !(0.0..=1.0).contains(&offset) {
            return false;
        }
        self.stops.push(ColorStop {
            offset,
            color: color.into(),
        });
        true
    }

    pub fn stops(&self) -> &[ColorStop] {
        &self.stops
    }

    fn to_args(&self) -> Vec<Value> {
        let mut args: Vec<Value> = self.shape.coordinates().into_iter().map(|v| json!(v)).collect();
        let stops: Vec<Value> = self
            .stops
            .iter()
            .map(|stop| json!([stop.offset, stop.color]))
            .collect();
        args.push(Value::Array(stops));
        args
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub src: String,
    pub repetition: String,
}

impl Pattern {
    pub fn new(src: impl Into<String>, repetition: Option<&str>) -> Self {
        Self {
            src: src.into(),
            repetition: repetition.unwrap_or("repeat").to_string(),
        }
    }
}

/// Raw RGBA pixels for `PUT_IMAGE_DATA`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub width: u64,
    pub height: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CanvasCommand {
    SetFillStyle(String),
    SetStrokeStyle(String),
    SetLineWidth(f64),
    SetGlobalAlpha(f64),
    SetFont(String),
    SetTextAlign(String),
    BeginPath,
    ClosePath,
    MoveTo {
        x: f64,
        y: f64,
    },
    LineTo {
        x: f64,
        y: f64,
    },
    Arc {
        x: f64,
        y: f64,
        radius: f64,
        start_angle: f64,
        end_angle: f64,
        anticlockwise: bool,
    },
    ArcTo {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        radius: f64,
    },
    BezierCurveTo {
        cp1x: f64,
        cp1y: f64,
        cp2x: f64,
        cp2y: f64,
        x: f64,
        y: f64,
    },
    Rect(RectArgs),
    FillRect(RectArgs),
    StrokeRect(RectArgs),
    ClearRect(RectArgs),
    Fill,
    Stroke,
    FillText {
        text: String,
        x: f64,
        y: f64,
        max_width: Option<f64>,
    },
    Save,
    Restore,
    Rotate(f64),
    Scale {
        x: f64,
        y: f64,
    },
    Translate {
        x: f64,
        y: f64,
    },
    Transform(Matrix),
    SetTransform(Matrix),
    ResetTransform,
    DrawImage {
        src: String,
        dx: f64,
        dy: f64,
        width: Option<f64>,
        height: Option<f64>,
    },
    SetLineDash(Vec<f64>),
    QuadraticCurveTo {
        cpx: f64,
        cpy: f64,
        x: f64,
        y: f64,
    },
    Ellipse {
        x: f64,
        y: f64,
        radius_x: f64,
        radius_y: f64,
        rotation: f64,
        start_angle: f64,
        end_angle: f64,
        anticlockwise: bool,
    },
    Clip(Option<String>),
    ClipByPath {
        path: Value,
        fill_rule: Option<String>,
    },
    FillByPath {
        path: Value,
        fill_rule: Option<String>,
    },
    StrokeText {
        text: String,
        x: f64,
        y: f64,
        max_width: Option<f64>,
    },
    PutImageData {
        image: ImageData,
        dx: f64,
        dy: f64,
        dirty: Option<RectArgs>,
    },
    SetTextBaseline(String),
    SetLineCap(String),
    SetLineJoin(String),
    SetMiterLimit(f64),
    SetLineDashOffset(f64),
    SetShadowBlur(f64),
    SetShadowColor(String),
    SetShadowOffsetX(f64),
    SetShadowOffsetY(f64),
    SetGlobalCompositeOperation(String),
    SetImageSmoothingEnabled(bool),
    SetImageSmoothingQuality(String),
    SetDirection(String),
    SetFillStyleByGradient(Gradient),
    SetFillStyleByPattern(Pattern),
    SetStrokeStyleByGradient(Gradient),
    SetStrokeStyleByPattern(Pattern),
}

impl CanvasCommand {
    pub fn opcode(&self) -> CanvasOpcode {
        match self {
            CanvasCommand::SetFillStyle(_) => CanvasOpcode::SetFillStyle,
            CanvasCommand::SetStrokeStyle(_) => CanvasOpcode::SetStrokeStyle,
            CanvasCommand::SetLineWidth(_) => CanvasOpcode::SetLineWidth,
            CanvasCommand::SetGlobalAlpha(_) => CanvasOpcode::SetGlobalAlpha,
            CanvasCommand::SetFont(_) => CanvasOpcode::SetFont,
            CanvasCommand::SetTextAlign(_) => CanvasOpcode::SetTextAlign,
            CanvasCommand::BeginPath => CanvasOpcode::BeginPath,
            CanvasCommand::ClosePath => CanvasOpcode::ClosePath,
            CanvasCommand::MoveTo { .. } => CanvasOpcode::MoveTo,
            CanvasCommand::LineTo { .. } => CanvasOpcode::LineTo,
            CanvasCommand::Arc { .. } => CanvasOpcode::Arc,
            CanvasCommand::ArcTo { .. } => CanvasOpcode::ArcTo,
            CanvasCommand::BezierCurveTo { .. } => CanvasOpcode::BezierCurveTo,
            CanvasCommand::Rect(_) => CanvasOpcode::Rect,
            CanvasCommand::FillRect(_) => CanvasOpcode::FillRect,
            CanvasCommand::StrokeRect(_) => CanvasOpcode::StrokeRect,
            CanvasCommand::ClearRect(_) => CanvasOpcode::ClearRect,
            CanvasCommand::Fill => CanvasOpcode::Fill,
            CanvasCommand::Stroke => CanvasOpcode::Stroke,
            CanvasCommand::FillText { .. } => CanvasOpcode::FillText,
            CanvasCommand::Save => CanvasOpcode::Save,
            CanvasCommand::Restore => CanvasOpcode::Restore,
            CanvasCommand::Rotate(_) => CanvasOpcode::Rotate,
            CanvasCommand::Scale { .. } => CanvasOpcode::Scale,
            CanvasCommand::Translate { .. } => CanvasOpcode::Translate,
            CanvasCommand::Transform(_) => CanvasOpcode::Transform,
            CanvasCommand::SetTransform(_) => CanvasOpcode::SetTransform,
            CanvasCommand::ResetTransform => CanvasOpcode::ResetTransform,
            CanvasCommand::DrawImage { .. } => CanvasOpcode::DrawImage,
            CanvasCommand::SetLineDash(_) => CanvasOpcode::SetLineDash,
            CanvasCommand::QuadraticCurveTo { .. } => CanvasOpcode::QuadraticCurveTo,
            CanvasCommand::Ellipse { .. } => CanvasOpcode::Ellipse,
            CanvasCommand::Clip(_) => CanvasOpcode::Clip,
            CanvasCommand::ClipByPath { .. } => CanvasOpcode::ClipByPath,
            CanvasCommand::FillByPath { .. } => CanvasOpcode::FillByPath,
            CanvasCommand::StrokeText { .. } => CanvasOpcode::StrokeText,
            CanvasCommand::PutImageData { .. } => CanvasOpcode::PutImageData,
            CanvasCommand::SetTextBaseline(_) => CanvasOpcode::SetTextBaseline,
            CanvasCommand::SetLineCap(_) => CanvasOpcode::SetLineCap,
            CanvasCommand::SetLineJoin(_) => CanvasOpcode::SetLineJoin,
            CanvasCommand::SetMiterLimit(_) => CanvasOpcode::SetMiterLimit,
            CanvasCommand::SetLineDashOffset(_) => CanvasOpcode::SetLineDashOffset,
            CanvasCommand::SetShadowBlur(_) => CanvasOpcode::SetShadowBlur,
            CanvasCommand::SetShadowColor(_) => CanvasOpcode::SetShadowColor,
            CanvasCommand::SetShadowOffsetX(_) => CanvasOpcode::SetShadowOffsetX,
            CanvasCommand::SetShadowOffsetY(_) => CanvasOpcode::SetShadowOffsetY,
            CanvasCommand::SetGlobalCompositeOperation(_) => {
                CanvasOpcode::SetGlobalCompositeOperation
            }
            CanvasCommand::SetImageSmoothingEnabled(_) => CanvasOpcode::SetImageSmoothingEnabled,
            CanvasCommand::SetImageSmoothingQuality(_) => CanvasOpcode::SetImageSmoothingQuality,
            CanvasCommand::SetDirection(_) => CanvasOpcode::SetDirection,
            CanvasCommand::SetFillStyleByGradient(gradient) => match gradient.shape {
                GradientShape::Linear { .. } => CanvasOpcode::SetFillStyleByLinearGradient,
                GradientShape::Radial { .. } => CanvasOpcode::SetFillStyleByRadialGradient,
                GradientShape::Conic { .. } => CanvasOpcode::SetFillStyleByConicGradient,
            },
            CanvasCommand::SetFillStyleByPattern(_) => CanvasOpcode::SetFillStyleByPattern,
            CanvasCommand::SetStrokeStyleByGradient(gradient) => match gradient.shape {
                GradientShape::Linear { .. } => CanvasOpcode::SetStrokeStyleByLinearGradient,
                GradientShape::Radial { .. } => CanvasOpcode::SetStrokeStyleByRadialGradient,
                GradientShape::Conic { .. } => CanvasOpcode::SetStrokeStyleByConicGradient,
            },
            CanvasCommand::SetStrokeStyleByPattern(_) => CanvasOpcode::SetStrokeStyleByPattern,
        }
    }

    pub fn to_positional(&self) -> Vec<Value> {
        let mut out = vec![json!(self.opcode().code())];
        match self {
            CanvasCommand::SetFillStyle(style)
            | CanvasCommand::SetStrokeStyle(style)
            | CanvasCommand::SetFont(style)
            | CanvasCommand::SetTextAlign(style)
            | CanvasCommand::SetTextBaseline(style)
            | CanvasCommand::SetLineCap(style)
            | CanvasCommand::SetLineJoin(style)
            | CanvasCommand::SetShadowColor(style)
            | CanvasCommand::SetGlobalCompositeOperation(style)
            | CanvasCommand::SetImageSmoothingQuality(style)
            | CanvasCommand::SetDirection(style) => out.push(json!(style)),
            CanvasCommand::SetLineWidth(value)
            | CanvasCommand::SetGlobalAlpha(value)
            | CanvasCommand::Rotate(value)
            | CanvasCommand::SetMiterLimit(value)
            | CanvasCommand::SetLineDashOffset(value)
            | CanvasCommand::SetShadowBlur(value)
            | CanvasCommand::SetShadowOffsetX(value)
            | CanvasCommand::SetShadowOffsetY(value) => out.push(json!(value)),
            CanvasCommand::SetImageSmoothingEnabled(flag) => out.push(json!(flag)),
            CanvasCommand::Clip(fill_rule) => out.push(json!(fill_rule)),
            CanvasCommand::ClipByPath { path, fill_rule }
            | CanvasCommand::FillByPath { path, fill_rule } => {
                out.extend([path.clone(), json!(fill_rule)])
            }
            CanvasCommand::BeginPath
            | CanvasCommand::ClosePath
            | CanvasCommand::Fill
            | CanvasCommand::Stroke
            | CanvasCommand::Save
            | CanvasCommand::Restore
            | CanvasCommand::ResetTransform => {}
            CanvasCommand::MoveTo { x, y }
            | CanvasCommand::LineTo { x, y }
            | CanvasCommand::Scale { x, y }
            | CanvasCommand::Translate { x, y } => out.extend([json!(x), json!(y)]),
            CanvasCommand::Arc {
                x,
                y,
                radius,
                start_angle,
                end_angle,
                anticlockwise,
            } => out.extend([
                json!(x),
                json!(y),
                json!(radius),
                json!(start_angle),
                json!(end_angle),
                json!(anticlockwise),
            ]),
            CanvasCommand::ArcTo {
                x1,
                y1,
                x2,
                y2,
                radius,
            } => out.extend([json!(x1), json!(y1), json!(x2), json!(y2), json!(radius)]),
            CanvasCommand::BezierCurveTo {
                cp1x,
                cp1y,
                cp2x,
                cp2y,
                x,
                y,
            } => out.extend([
                json!(cp1x),
                json!(cp1y),
                json!(cp2x),
                json!(cp2y),
                json!(x),
                json!(y),
            ]),
            CanvasCommand::Rect(rect)
            | CanvasCommand::FillRect(rect)
            | CanvasCommand::StrokeRect(rect)
            | CanvasCommand::ClearRect(rect) => out.extend([
                json!(rect.x),
                json!(rect.y),
                json!(rect.width),
                json!(rect.height),
            ]),
            CanvasCommand::FillText {
                text,
                x,
                y,
                max_width,
            }
            | CanvasCommand::StrokeText {
                text,
                x,
                y,
                max_width,
            } => out.extend([json!(text), json!(x), json!(y), json!(max_width)]),
            CanvasCommand::QuadraticCurveTo { cpx, cpy, x, y } => {
                out.extend([json!(cpx), json!(cpy), json!(x), json!(y)])
            }
            CanvasCommand::Ellipse {
                x,
                y,
                radius_x,
                radius_y,
                rotation,
                start_angle,
                end_angle,
                anticlockwise,
            } => out.extend([
                json!(x),
                json!(y),
                json!(radius_x),
                json!(radius_y),
                json!(rotation),
                json!(start_angle),
                json!(end_angle),
                json!(anticlockwise),
            ]),
            CanvasCommand::PutImageData {
                image,
                dx,
                dy,
                dirty,
            } => {
                out.extend([
                    json!(image.width),
                    json!(image.height),
                    json!(image.data),
                    json!(dx),
                    json!(dy),
                ]);
                match dirty {
                    Some(rect) => out.extend([
                        json!(rect.x),
                        json!(rect.y),
                        json!(rect.width),
                        json!(rect.height),
                    ]),
                    None => out.extend([Value::Null, Value::Null, Value::Null, Value::Null]),
                }
            }
            CanvasCommand::SetFillStyleByGradient(gradient)
            | CanvasCommand::SetStrokeStyleByGradient(gradient) => out.extend(gradient.to_args()),
            CanvasCommand::SetFillStyleByPattern(pattern)
            | CanvasCommand::SetStrokeStyleByPattern(pattern) => {
                out.extend([json!(pattern.src), json!(pattern.repetition)])
            }
            CanvasCommand::Transform(m) | CanvasCommand::SetTransform(m) => out.extend([
                json!(m.a),
                json!(m.b),
                json!(m.c),
                json!(m.d),
                json!(m.e),
                json!(m.f),
            ]),
            CanvasCommand::DrawImage {
                src,
                dx,
                dy,
                width,
                height,
            } => out.extend([json!(src), json!(dx), json!(dy), json!(width), json!(height)]),
            CanvasCommand::SetLineDash(segments) => out.push(json!(segments)),
        }
        out
    }

    pub fn from_positional(raw: &[Value]) -> Result<Self, String> {
        let code = leading_opcode(raw)?;
        let opcode =
            CanvasOpcode::from_code(code).ok_or_else(|| format!("unknown canvas opcode {code}"))?;
        let args = Args::new(opcode.name(), raw, opcode.arity())?;

        Ok(match opcode {
            CanvasOpcode::SetFillStyle => CanvasCommand::SetFillStyle(args.string(0)?),
            CanvasOpcode::SetStrokeStyle => CanvasCommand::SetStrokeStyle(args.string(0)?),
            CanvasOpcode::SetLineWidth => CanvasCommand::SetLineWidth(args.f64(0)?),
            CanvasOpcode::SetGlobalAlpha => CanvasCommand::SetGlobalAlpha(args.f64(0)?),
            CanvasOpcode::SetFont => CanvasCommand::SetFont(args.string(0)?),
            CanvasOpcode::SetTextAlign => CanvasCommand::SetTextAlign(args.string(0)?),
            CanvasOpcode::BeginPath => CanvasCommand::BeginPath,
            CanvasOpcode::ClosePath => CanvasCommand::ClosePath,
            CanvasOpcode::MoveTo => CanvasCommand::MoveTo {
                x: args.f64(0)?,
                y: args.f64(1)?,
            },
            CanvasOpcode::LineTo => CanvasCommand::LineTo {
                x: args.f64(0)?,
                y: args.f64(1)?,
            },
            CanvasOpcode::Arc => CanvasCommand::Arc {
                x: args.f64(0)?,
                y: args.f64(1)?,
                radius: args.f64(2)?,
                start_angle: args.f64(3)?,
                end_angle: args.f64(4)?,
                anticlockwise: args.bool(5)?,
            },
            CanvasOpcode::ArcTo => CanvasCommand::ArcTo {
                x1: args.f64(0)?,
                y1: args.f64(1)?,
                x2: args.f64(2)?,
                y2: args.f64(3)?,
                radius: args.f64(4)?,
            },
            CanvasOpcode::BezierCurveTo => CanvasCommand::BezierCurveTo {
                cp1x: args.f64(0)?,
                cp1y: args.f64(1)?,
                cp2x: args.f64(2)?,
                cp2y: args.f64(3)?,
                x: args.f64(4)?,
                y: args.f64(5)?,
            },
            CanvasOpcode::Rect => CanvasCommand::Rect(args.rect()?),
            CanvasOpcode::FillRect => CanvasCommand::FillRect(args.rect()?),
            CanvasOpcode::StrokeRect => CanvasCommand::StrokeRect(args.rect()?),
            CanvasOpcode::ClearRect => CanvasCommand::ClearRect(args.rect()?),
            CanvasOpcode::Fill => CanvasCommand::Fill,
            CanvasOpcode::Stroke => CanvasCommand::Stroke,
            CanvasOpcode::FillText => CanvasCommand::FillText {
                text: args.string(0)?,
                x: args.f64(1)?,
                y: args.f64(2)?,
                max_width: args.opt_f64(3)?,
            },
            CanvasOpcode::Save => CanvasCommand::Save,
            CanvasOpcode::Restore => CanvasCommand::Restore,
            CanvasOpcode::Rotate => CanvasCommand::Rotate(args.f64(0)?),
            CanvasOpcode::Scale => CanvasCommand::Scale {
                x: args.f64(0)?,
                y: args.f64(1)?,
            },
            CanvasOpcode::Translate => CanvasCommand::Translate {
                x: args.f64(0)?,
                y: args.f64(1)?,
            },
            CanvasOpcode::Transform => CanvasCommand::Transform(args.matrix()?),
            CanvasOpcode::SetTransform => CanvasCommand::SetTransform(args.matrix()?),
            CanvasOpcode::ResetTransform => CanvasCommand::ResetTransform,
            CanvasOpcode::DrawImage => CanvasCommand::DrawImage {
                src: args.string(0)?,
                dx: args.f64(1)?,
                dy: args.f64(2)?,
                width: args.opt_f64(3)?,
                height: args.opt_f64(4)?,
            },
            CanvasOpcode::SetLineDash => CanvasCommand::SetLineDash(args.f64_list(0)?),
            CanvasOpcode::QuadraticCurveTo => CanvasCommand::QuadraticCurveTo {
                cpx: args.f64(0)?,
                cpy: args.f64(1)?,
                x: args.f64(2)?,
                y: args.f64(3)?,
            },
            CanvasOpcode::Ellipse => CanvasCommand::Ellipse {
                x: args.f64(0)?,
                y: args.f64(1)?,
                radius_x: args.f64(2)?,
                radius_y: args.f64(3)?,
                rotation: args.f64(4)?,
                start_angle: args.f64(5)?,
                end_angle: args.f64(6)?,
                anticlockwise: args.bool(7)?,
            },
            CanvasOpcode::Clip => CanvasCommand::Clip(args.opt_string(0)?),
            CanvasOpcode::ClipByPath => CanvasCommand::ClipByPath {
                path: args.value(0),
                fill_rule: args.opt_string(1)?,
            },
            CanvasOpcode::FillByPath => CanvasCommand::FillByPath {
                path: args.value(0),
                fill_rule: args.opt_string(1)?,
            },
            CanvasOpcode::StrokeText => CanvasCommand::StrokeText {
                text: args.string(0)?,
                x: args.f64(1)?,
                y: args.f64(2)?,
                max_width: args.opt_f64(3)?,
            },
            CanvasOpcode::PutImageData => CanvasCommand::PutImageData {
                image: ImageData {
                    width: args.u64(0)?,
                    height: args.u64(1)?,
                    data: args.byte_list(2)?,
                },
                dx: args.f64(3)?,
                dy: args.f64(4)?,
                dirty: args.opt_rect(5)?,
            },
            CanvasOpcode::SetTextBaseline => CanvasCommand::SetTextBaseline(args.string(0)?),
            CanvasOpcode::SetLineCap => CanvasCommand::SetLineCap(args.string(0)?),
            CanvasOpcode::SetLineJoin => CanvasCommand::SetLineJoin(args.string(0)?),
            CanvasOpcode::SetMiterLimit => CanvasCommand::SetMiterLimit(args.f64(0)?),
            CanvasOpcode::SetLineDashOffset => CanvasCommand::SetLineDashOffset(args.f64(0)?),
            CanvasOpcode::SetShadowBlur => CanvasCommand::SetShadowBlur(args.f64(0)?),
            CanvasOpcode::SetShadowColor => CanvasCommand::SetShadowColor(args.string(0)?),
            CanvasOpcode::SetShadowOffsetX => CanvasCommand::SetShadowOffsetX(args.f64(0)?),
            CanvasOpcode::SetShadowOffsetY => CanvasCommand::SetShadowOffsetY(args.f64(0)?),
            CanvasOpcode::SetGlobalCompositeOperation => {
                CanvasCommand::SetGlobalCompositeOperation(args.string(0)?)
            }
            CanvasOpcode::SetImageSmoothingEnabled => {
                CanvasCommand::SetImageSmoothingEnabled(args.bool(0)?)
            }
            CanvasOpcode::SetImageSmoothingQuality => {
                CanvasCommand::SetImageSmoothingQuality(args.string(0)?)
            }
            CanvasOpcode::SetDirection => CanvasCommand::SetDirection(args.string(0)?),
            CanvasOpcode::SetFillStyleByLinearGradient => {
                CanvasCommand::SetFillStyleByGradient(args.linear_gradient()?)
            }
            CanvasOpcode::SetFillStyleByRadialGradient => {
                CanvasCommand::SetFillStyleByGradient(args.radial_gradient()?)
            }
            CanvasOpcode::SetFillStyleByConicGradient => {
                CanvasCommand::SetFillStyleByGradient(args.conic_gradient()?)
            }
            CanvasOpcode::SetFillStyleByPattern => {
                CanvasCommand::SetFillStyleByPattern(args.pattern()?)
            }
            CanvasOpcode::SetStrokeStyleByLinearGradient => {
                CanvasCommand::SetStrokeStyleByGradient(args.linear_gradient()?)
            }
            CanvasOpcode::SetStrokeStyleByRadialGradient => {
                CanvasCommand::SetStrokeStyleByGradient(args.radial_gradient()?)
            }
            CanvasOpcode::SetStrokeStyleByConicGradient => {
                CanvasCommand::SetStrokeStyleByGradient(args.conic_gradient()?)
            }
            CanvasOpcode::SetStrokeStyleByPattern => {
                CanvasCommand::SetStrokeStyleByPattern(args.pattern()?)
            }
        })
    }
}

impl Serialize for CanvasCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_positional().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CanvasCommand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<Value>::deserialize(deserializer)?;
        CanvasCommand::from_positional(&raw).map_err(de::Error::custom)
    }
}

fn leading_opcode(raw: &[Value]) -> Result<u64, String> {
    raw.first()
        .ok_or_else(|| "empty command array".to_string())?
        .as_u64()
        .ok_or_else(|| "command opcode must be an unsigned integer".to_string())
}

struct Args<'a> {
    name: &'static str,
    items: &'a [Value],
}

impl<'a> Args<'a> {
    fn new(name: &'static str, raw: &'a [Value], arity: usize) -> Result<Self, String> {
        let items = &raw[1..];
        if items.len() != arity {
            return Err(format!(
                "{name} expects {arity} argument(s), got {}",
                items.len()
            ));
        }

        Ok(Self { name, items })
    }

    fn value(&self, index: usize) -> Value {
        self.items[index].clone()
    }

    fn u64(&self, index: usize) -> Result<u64, String> {
        self.items[index]
            .as_u64()
            .ok_or_else(|| self.type_error(index, "an unsigned integer"))
    }

    fn index(&self, index: usize) -> Result<usize, String> {
        usize::try_from(self.u64(index)?).map_err(|_| self.type_error(index, "a valid index"))
    }

    fn f64(&self, index: usize) -> Result<f64, String> {
        self.items[index]
            .as_f64()
            .ok_or_else(|| self.type_error(index, "a number"))
    }

    fn opt_f64(&self, index: usize) -> Result<Option<f64>, String> {
        match &self.items[index] {
            Value::Null => Ok(None),
            _ => self.f64(index).map(Some),
        }
    }

    fn bool(&self, index: usize) -> Result<bool, String> {
        match &self.items[index] {
            Value::Null => Ok(false),
            Value::Bool(flag) => Ok(*flag),
            _ => Err(self.type_error(index, "a boolean")),
        }
    }

    fn string(&self, index: usize) -> Result<String, String> {
        self.items[index]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.type_error(index, "a string"))
    }

    fn opt_string(&self, index: usize) -> Result<Option<String>, String> {
        match &self.items[index] {
            Value::Null => Ok(None),
            _ => self.string(index).map(Some),
        }
    }

    fn byte_list(&self, index: usize) -> Result<Vec<u8>, String> {
        self.items[index]
            .as_array()
            .ok_or_else(|| self.type_error(index, "an array of bytes"))?
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|byte| u8::try_from(byte).ok())
                    .ok_or_else(|| self.type_error(index, "an array of bytes"))
            })
            .collect()
    }

    fn f64_list(&self, index: usize) -> Result<Vec<f64>, String> {
        self.items[index]
            .as_array()
            .ok_or_else(|| self.type_error(index, "an array of numbers"))?
            .iter()
            .map(|item| {
                item.as_f64()
                    .ok_or_else(|| self.type_error(index, "an array of numbers"))
            })
            .collect()
    }

    fn rect(&self) -> Result<RectArgs, String> {
        Ok(RectArgs {
            x: self.f64(0)?,
            y: self.f64(1)?,
            width: self.f64(2)?,
            height: self.f64(3)?,
        })
    }

    /// Four trailing rect slots that are either all null or all numbers.
    fn opt_rect(&self, start: usize) -> Result<Option<RectArgs>, String> {
        if self.items[start..start + 4].iter().all(Value::is_null) {
            return Ok(None);
        }
        Ok(Some(RectArgs {
            x: self.f64(start)?,
            y: self.f64(start + 1)?,
            width: self.f64(start + 2)?,
            height: self.f64(start + 3)?,
        }))
    }

    fn linear_gradient(&self) -> Result<Gradient, String> {
        let shape = GradientShape::Linear {
            x0: self.f64(0)?,
            y0: self.f64(1)?,
            x1: self.f64(2)?,
            y1: self.f64(3)?,
        };
        self.gradient(shape, 4)
    }

    fn radial_gradient(&self) -> Result<Gradient, String> {
        let shape = GradientShape::Radial {
            x0: self.f64(0)?,
            y0: self.f64(1)?,
            r0: self.f64(2)?,
            x1: self.f64(3)?,
            y1: self.f64(4)?,
            r1: self.f64(5)?,
        };
        self.gradient(shape, 6)
    }

    fn conic_gradient(&self) -> Result<Gradient, String> {
        let shape = GradientShape::Conic {
            start_angle: self.f64(0)?,
            x: self.f64(1)?,
            y: self.f64(2)?,
        };
        self.gradient(shape, 3)
    }

    fn gradient(&self, shape: GradientShape, stops_at: usize) -> Result<Gradient, String> {
        let expected = "an array of [offset, color] stops";
        let raw = self.items[stops_at]
            .as_array()
            .ok_or_else(|| self.type_error(stops_at, expected))?;
        if raw.len() > MAX_COLOR_STOPS {
            return Err(format!(
                "{} allows at most {MAX_COLOR_STOPS} color stops, got {}",
                self.name,
                raw.len()
            ));
        }

        let mut gradient = Gradient::new(shape);
        for stop in raw {
            let (offset, color) = match stop.as_array().map(Vec::as_slice) {
                Some([offset, color]) => (offset.as_f64(), color.as_str()),
                _ => (None, None),
            };
            let (Some(offset), Some(color)) = (offset, color) else {
                return Err(self.type_error(stops_at, expected));
            };
            if !gradient.add_color_stop(offset, color) {
                return Err(format!("{} color stop offset {offset} is outside 0..=1", self.name));
            }
        }
        Ok(gradient)
    }

    fn pattern(&self) -> Result<Pattern, String> {
        Ok(Pattern::new(self.string(0)?, self.opt_string(1)?.as_deref()))
    }

    fn matrix(&self) -> Result<Matrix, String> {
        Ok(Matrix {
            a: self.f64(0)?,
            b: self.f64(1)?,
            c: self.f64(2)?,
            d: self.f64(3)?,
            e: self.f64(4)?,
            f: self.f64(5)?,
        })
    }

    fn type_error(&self, index: usize, expected: &str) -> String {
        format!("{} argument {index} must be {expected}", self.name)
    }
}
