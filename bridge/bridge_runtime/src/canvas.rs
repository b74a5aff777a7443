use crate::command::{
    CanvasCommand, Gradient, GradientShape, ImageData, Matrix, Pattern, RectArgs,
};
use crate::patch_queue::{CanvasQueue, FlushScheduler, FlushTarget};
use crate::protocol::{CanvasMessage, NodeId, PageId};
use serde_json::Value;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum PaintStyle {
    Color(String),
    Gradient(Gradient),
    Pattern(Pattern),
}

impl PaintStyle {
    pub fn as_color(&self) -> Option<&str> {
        match self {
            PaintStyle::Color(color) => Some(color),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct DrawState {
    fill_style: PaintStyle,
    stroke_style: PaintStyle,
    line_width: f64,
    global_alpha: f64,
    font: String,
    text_align: String,
    text_baseline: String,
    line_dash: Vec<f64>,
    line_dash_offset: f64,
    line_cap: String,
    line_join: String,
    miter_limit: f64,
    shadow_blur: f64,
    shadow_color: String,
    shadow_offset_x: f64,
    shadow_offset_y: f64,
    global_composite_operation: String,
    image_smoothing_enabled: bool,
    image_smoothing_quality: String,
    direction: String,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            fill_style: PaintStyle::Color("#000000".to_string()),
            stroke_style: PaintStyle::Color("#000000".to_string()),
            line_width: 1.0,
            global_alpha: 1.0,
            font: "10px sans-serif".to_string(),
            text_align: "start".to_string(),
            text_baseline: "alphabetic".to_string(),
            line_dash: Vec::new(),
            line_dash_offset: 0.0,
            line_cap: "butt".to_string(),
            line_join: "miter".to_string(),
            miter_limit: 10.0,
            shadow_blur: 0.0,
            shadow_color: "#000000".to_string(),
            shadow_offset_x: 0.0,
            shadow_offset_y: 0.0,
            global_composite_operation: "source-over".to_string(),
            image_smoothing_enabled: true,
            image_smoothing_quality: "low".to_string(),
            direction: "inherit".to_string(),
        }
    }
}

pub struct CanvasContext {
    page_id: PageId,
    node_id: NodeId,
    queue: CanvasQueue,
    state: DrawState,
    saved: Vec<DrawState>,
}

impl CanvasContext {
    pub fn new(page_id: PageId, node_id: NodeId, scheduler: Rc<FlushScheduler>) -> Self {
        Self {
            page_id,
            node_id,
            queue: CanvasQueue::new(FlushTarget::Canvas { page_id, node_id }, scheduler),
            state: DrawState::default(),
            saved: Vec::new(),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn fill_style(&self) -> &PaintStyle {
        &self.state.fill_style
    }

    pub fn set_fill_style(&mut self, color: impl Into<String>) {
        let color = color.into();
        self.state.fill_style = PaintStyle::Color(color.clone());
        self.queue.enqueue(CanvasCommand::SetFillStyle(color));
    }

    pub fn set_fill_gradient(&mut self, gradient: Gradient) {
        self.state.fill_style = PaintStyle::Gradient(gradient.clone());
        self.queue.enqueue(CanvasCommand::SetFillStyleByGradient(gradient));
    }

    pub fn set_fill_pattern(&mut self, pattern: Pattern) {
        self.state.fill_style = PaintStyle::Pattern(pattern.clone());
        self.queue.enqueue(CanvasCommand::SetFillStyleByPattern(pattern));
    }

    pub fn stroke_style(&self) -> &PaintStyle {
        &self.state.stroke_style
    }

    pub fn set_stroke_style(&mut self, color: impl Into<String>) {
        let color = color.into();
        self.state.stroke_style = PaintStyle::Color(color.clone());
        self.queue.enqueue(CanvasCommand::SetStrokeStyle(color));
    }

    pub fn set_stroke_gradient(&mut self, gradient: Gradient) {
        self.state.stroke_style = PaintStyle::Gradient(gradient.clone());
        self.queue.enqueue(CanvasCommand::SetStrokeStyleByGradient(gradient));
    }

    pub fn set_stroke_pattern(&mut self, pattern: Pattern) {
        self.state.stroke_style = PaintStyle::Pattern(pattern.clone());
        self.queue.enqueue(CanvasCommand::SetStrokeStyleByPattern(pattern));
    }

    pub fn create_linear_gradient(&self, x0: f64, y0: f64, x1: f64, y1: f64) -> Gradient {
        Gradient::new(GradientShape::Linear { x0, y0, x1, y1 })
    }

    pub fn create_radial_gradient(
        &self,
        x0: f64,
        y0: f64,
        r0: f64,
        x1: f64,
        y1: f64,
        r1: f64,
    ) -> Gradient {
        Gradient::new(GradientShape::Radial {
            x0,
            y0,
            r0,
            x1,
            y1,
            r1,
        })
    }

    pub fn create_conic_gradient(&self, start_angle: f64, x: f64, y: f64) -> Gradient {
        Gradient::new(GradientShape::Conic { start_angle, x, y })
    }

    /// `repetition` falls back to `"repeat"`.
    pub fn create_pattern(&self, src: impl Into<String>, repetition: Option<&str>) -> Pattern {
        Pattern::new(src, repetition)
    }

    pub fn line_width(&self) -> f64 {
        self.state.line_width
    }

    pub fn set_line_width(&mut self, width: f64) {
        self.state.line_width = width;
        self.queue.enqueue(CanvasCommand::SetLineWidth(width));
    }

    pub fn global_alpha(&self) -> f64 {
        self.state.global_alpha
    }

    /// Values outside `0.0..=1.0` are ignored, as a 2D context does.
    pub fn set_global_alpha(&mut self, alpha: f64) {
        if !(0.0..=1.0).contains(&alpha) {
            return;
        }
        self.state.global_alpha = alpha;
        self.queue.enqueue(CanvasCommand::SetGlobalAlpha(alpha));
    }

    pub fn font(&self) -> &str {
        &self.state.font
    }

    pub fn set_font(&mut self, font: impl Into<String>) {
        let font = font.into();
        self.state.font = font.clone();
        self.queue.enqueue(CanvasCommand::SetFont(font));
    }

    pub fn text_align(&self) -> &str {
        &self.state.text_align
    }

    pub fn set_text_align(&mut self, align: impl Into<String>) {
        let align = align.into();
        self.state.text_align = align.clone();
        self.queue.enqueue(CanvasCommand::SetTextAlign(align));
    }

    pub fn text_baseline(&self) -> &str {
        &self.state.text_baseline
    }

    pub fn set_text_baseline(&mut self, baseline: impl Into<String>) {
        let baseline = baseline.into();
        self.state.text_baseline = baseline.clone();
        self.queue.enqueue(CanvasCommand::SetTextBaseline(baseline));
    }

    pub fn line_dash(&self) -> &[f64] {
        &self.state.line_dash
    }

    pub fn set_line_dash(&mut self, segments: Vec<f64>) {
        self.state.line_dash = segments.clone();
        self.queue.enqueue(CanvasCommand::SetLineDash(segments));
    }

    pub fn line_dash_offset(&self) -> f64 {
        self.state.line_dash_offset
    }

    pub fn set_line_dash_offset(&mut self, offset: f64) {
        self.state.line_dash_offset = offset;
        self.queue.enqueue(CanvasCommand::SetLineDashOffset(offset));
    }

    pub fn line_cap(&self) -> &str {
        &self.state.line_cap
    }

    pub fn set_line_cap(&mut self, cap: impl Into<String>) {
        let cap = cap.into();
        self.state.line_cap = cap.clone();
        self.queue.enqueue(CanvasCommand::SetLineCap(cap));
    }

    pub fn line_join(&self) -> &str {
        &self.state.line_join
    }

    pub fn set_line_join(&mut self, join: impl Into<String>) {
        let join = join.into();
        self.state.line_join = join.clone();
        self.queue.enqueue(CanvasCommand::SetLineJoin(join));
    }

    pub fn miter_limit(&self) -> f64 {
        self.state.miter_limit
    }

    pub fn set_miter_limit(&mut self, limit: f64) {
        self.state.miter_limit = limit;
        self.queue.enqueue(CanvasCommand::SetMiterLimit(limit));
    }

    pub fn shadow_blur(&self) -> f64 {
        self.state.shadow_blur
    }

    pub fn set_shadow_blur(&mut self, blur: f64) {
        self.state.shadow_blur = blur;
        self.queue.enqueue(CanvasCommand::SetShadowBlur(blur));
    }

    pub fn shadow_color(&self) -> &str {
        &self.state.shadow_color
    }

    pub fn set_shadow_color(&mut self, color: impl Into<String>) {
        let color = color.into();
        self.state.shadow_color = color.clone();
        self.queue.enqueue(CanvasCommand::SetShadowColor(color));
    }

    pub fn shadow_offset(&self) -> (f64, f64) {
        (self.state.shadow_offset_x, self.state.shadow_offset_y)
    }

    pub fn set_shadow_offset_x(&mut self, offset: f64) {
        self.state.shadow_offset_x = offset;
        self.queue.enqueue(CanvasCommand::SetShadowOffsetX(offset));
    }

    pub fn set_shadow_offset_y(&mut self, offset: f64) {
        self.state.shadow_offset_y = offset;
        self.queue.enqueue(CanvasCommand::SetShadowOffsetY(offset));
    }

    pub fn global_composite_operation(&self) -> &str {
        &self.state.global_composite_operation
    }

    pub fn set_global_composite_operation(&mut self, operation: impl Into<String>) {
        let operation = operation.into();
        self.state.global_composite_operation = operation.clone();
        self.queue
            .enqueue(CanvasCommand::SetGlobalCompositeOperation(operation));
    }

    pub fn image_smoothing_enabled(&self) -> bool {
        self.state.image_smoothing_enabled
    }

    pub fn set_image_smoothing_enabled(&mut self, enabled: bool) {
        self.state.image_smoothing_enabled = enabled;
        self.queue
            .enqueue(CanvasCommand::SetImageSmoothingEnabled(enabled));
    }

    pub fn image_smoothing_quality(&self) -> &str {
        &self.state.image_smoothing_quality
    }

    pub fn set_image_smoothing_quality(&mut self, quality: impl Into<String>) {
        let quality = quality.into();
        self.state.image_smoothing_quality = quality.clone();
        self.queue
            .enqueue(CanvasCommand::SetImageSmoothingQuality(quality));
    }

    pub fn direction(&self) -> &str {
        &self.state.direction
    }

    pub fn set_direction(&mut self, direction: impl Into<String>) {
        let direction = direction.into();
        self.state.direction = direction.clone();
        self.queue.enqueue(CanvasCommand::SetDirection(direction));
    }

    pub fn save(&mut self) {
        self.saved.push(self.state.clone());
        self.queue.enqueue(CanvasCommand::Save);
    }

    pub fn restore(&mut self) {
        if let Some(state) = self.saved.pop() {
            self.state = state;
        }
        self.queue.enqueue(CanvasCommand::Restore);
    }

    pub fn begin_path(&mut self) {
        self.queue.enqueue(CanvasCommand::BeginPath);
    }

    pub fn close_path(&mut self) {
        self.queue.enqueue(CanvasCommand::ClosePath);
    }

    pub fn move_to(&mut self, x: f64, y: f64) {
        self.queue.enqueue(CanvasCommand::MoveTo { x, y });
    }

    pub fn line_to(&mut self, x: f64, y: f64) {
        self.queue.enqueue(CanvasCommand::LineTo { x, y });
    }

    pub fn arc(
        &mut self,
        x: f64,
        y: f64,
        radius: f64,
        start_angle: f64,
        end_angle: f64,
        anticlockwise: bool,
    ) {
        self.queue.enqueue(CanvasCommand::Arc {
            x,
            y,
            radius,
            start_angle,
            end_angle,
            anticlockwise,
        });
    }

    pub fn arc_to(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, radius: f64) {
        self.queue.enqueue(CanvasCommand::ArcTo {
            x1,
            y1,
            x2,
            y2,
            radius,
        });
    }

    pub fn bezier_curve_to(&mut self, cp1x: f64, cp1y: f64, cp2x: f64, cp2y: f64, x: f64, y: f64) {
        self.queue.enqueue(CanvasCommand::BezierCurveTo {
            cp1x,
            cp1y,
            cp2x,
            cp2y,
            x,
            y,
        });
    }

    pub fn quadratic_curve_to(&mut self, cpx: f64, cpy: f64, x: f64, y: f64) {
        self.queue
            .enqueue(CanvasCommand::QuadraticCurveTo { cpx, cpy, x, y });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn ellipse(
        &mut self,
        x: f64,
        y: f64,
        radius_x: f64,
        radius_y: f64,
        rotation: f64,
        start_angle: f64,
        end_angle: f64,
        anticlockwise: bool,
    ) {
        self.queue.enqueue(CanvasCommand::Ellipse {
            x,
            y,
            radius_x,
            radius_y,
            rotation,
            start_angle,
            end_angle,
            anticlockwise,
        });
    }

    pub fn rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        self.queue.enqueue(CanvasCommand::Rect(RectArgs {
            x,
            y,
            width,
            height,
        }));
    }

    pub fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        self.queue.enqueue(CanvasCommand::FillRect(RectArgs {
            x,
            y,
            width,
            height,
        }));
    }

    pub fn stroke_rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        self.queue.enqueue(CanvasCommand::StrokeRect(RectArgs {
            x,
            y,
            width,
            height,
        }));
    }

    pub fn clear_rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        self.queue.enqueue(CanvasCommand::ClearRect(RectArgs {
            x,
            y,
            width,
            height,
        }));
    }

    pub fn fill(&mut self) {
        self.queue.enqueue(CanvasCommand::Fill);
    }

    pub fn stroke(&mut self) {
        self.queue.enqueue(CanvasCommand::Stroke);
    }

    pub fn fill_path(&mut self, path: Value, fill_rule: Option<&str>) {
        self.queue.enqueue(CanvasCommand::FillByPath {
            path,
            fill_rule: fill_rule.map(str::to_string),
        });
    }

    pub fn clip(&mut self, fill_rule: Option<&str>) {
        self.queue
            .enqueue(CanvasCommand::Clip(fill_rule.map(str::to_string)));
    }

    pub fn clip_path(&mut self, path: Value, fill_rule: Option<&str>) {
        self.queue.enqueue(CanvasCommand::ClipByPath {
            path,
            fill_rule: fill_rule.map(str::to_string),
        });
    }

    pub fn fill_text(&mut self, text: impl Into<String>, x: f64, y: f64, max_width: Option<f64>) {
        self.queue.enqueue(CanvasCommand::FillText {
            text: text.into(),
            x,
            y,
            max_width,
        });
    }

    pub fn stroke_text(&mut self, text: impl Into<String>, x: f64, y: f64, max_width: Option<f64>) {
        self.queue.enqueue(CanvasCommand::StrokeText {
            text: text.into(),
            x,
            y,
            max_width,
        });
    }

    pub fn rotate(&mut self, angle: f64) {
        self.queue.enqueue(CanvasCommand::Rotate(angle));
    }

    pub fn scale(&mut self, x: f64, y: f64) {
        self.queue.enqueue(CanvasCommand::Scale { x, y });
    }

    pub fn translate(&mut self, x: f64, y: f64) {
        self.queue.enqueue(CanvasCommand::Translate { x, y });
    }

    pub fn transform(&mut self, matrix: Matrix) {
        self.queue.enqueue(CanvasCommand::Transform(matrix));
    }

    pub fn set_transform(&mut self, matrix: Matrix) {
        self.queue.enqueue(CanvasCommand::SetTransform(matrix));
    }

    pub fn reset_transform(&mut self) {
        self.queue.enqueue(CanvasCommand::ResetTransform);
    }

    pub fn draw_image(
        &mut self,
        src: impl Into<String>,
        dx: f64,
        dy: f64,
        size: Option<(f64, f64)>,
    ) {
        self.queue.enqueue(CanvasCommand::DrawImage {
            src: src.into(),
            dx,
            dy,
            width: size.map(|(width, _)| width),
            height: size.map(|(_, height)| height),
        });
    }

    /// `dirty` limits the copy to a sub-rectangle of `image`.
    pub fn put_image_data(&mut self, image: ImageData, dx: f64, dy: f64, dirty: Option<RectArgs>) {
        self.queue.enqueue(CanvasCommand::PutImageData {
            image,
            dx,
            dy,
            dirty,
        });
    }

    pub fn pending(&self) -> &[CanvasCommand] {
        self.queue.pending()
    }

    pub fn flush(&mut self) -> Option<CanvasMessage> {
        self.queue.flush().map(|commands| CanvasMessage {
            page_id: self.page_id,
            node_id: self.node_id,
            commands,
        })
    }

    pub(crate) fn discard_pending(&mut self) -> usize {
        self.queue.discard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> (CanvasContext, Rc<FlushScheduler>) {
        let scheduler = Rc::new(FlushScheduler::new());
        (CanvasContext::new(1, 5, Rc::clone(&scheduler)), scheduler)
    }

    #[test]
    fn setters_batch_into_one_message() {
        let (mut ctx, scheduler) = context();

        ctx.set_fill_style("#ff0000");
        ctx.fill_rect(0.0, 0.0, 10.0, 20.0);
        ctx.arc(5.0, 5.0, 2.0, 0.0, std::f64::consts::PI, false);

        assert_eq!(
            scheduler.drain(),
            vec![FlushTarget::Canvas {
                page_id: 1,
                node_id: 5
            }]
        );

        let message = ctx.flush().expect("canvas message");
        assert_eq!(message.node_id, 5);
        assert_eq!(message.commands.len(), 3);
        assert_eq!(
            message.commands[0],
            CanvasCommand::SetFillStyle("#ff0000".to_string())
        );
        assert!(ctx.flush().is_none());
    }

    #[test]
    fn getters_read_the_shadow_state() {
        let (mut ctx, _) = context();
        assert_eq!(ctx.fill_style().as_color(), Some("#000000"));
        assert_eq!(ctx.font(), "10px sans-serif");
        assert_eq!(ctx.text_baseline(), "alphabetic");
        assert_eq!(ctx.line_cap(), "butt");
        assert_eq!(ctx.line_join(), "miter");
        assert_eq!(ctx.miter_limit(), 10.0);
        assert_eq!(ctx.shadow_color(), "#000000");
        assert_eq!(ctx.global_composite_operation(), "source-over");
        assert!(ctx.image_smoothing_enabled());
        assert_eq!(ctx.image_smoothing_quality(), "low");
        assert_eq!(ctx.direction(), "inherit");

        ctx.set_line_width(3.0);
        ctx.set_line_dash(vec![4.0, 2.0]);
        assert_eq!(ctx.line_width(), 3.0);
        assert_eq!(ctx.line_dash(), &[4.0, 2.0]);
    }

    #[test]
    fn restore_brings_back_saved_styles() {
        let (mut ctx, _) = context();
        ctx.set_global_alpha(0.5);
        ctx.save();
        ctx.set_global_alpha(0.2);
        ctx.set_stroke_style("blue");
        ctx.restore();

        assert_eq!(ctx.global_alpha(), 0.5);
        assert_eq!(ctx.stroke_style().as_color(), Some("#000000"));
    }

    #[test]
    fn restore_covers_line_shadow_and_compositing_state() {
        let (mut ctx, _) = context();
        ctx.save();
        ctx.set_line_cap("round");
        ctx.set_line_join("bevel");
        ctx.set_miter_limit(2.0);
        ctx.set_line_dash_offset(3.0);
        ctx.set_shadow_blur(4.0);
        ctx.set_shadow_color("rgba(0,0,0,0.5)");
        ctx.set_shadow_offset_x(1.0);
        ctx.set_shadow_offset_y(2.0);
        ctx.set_global_composite_operation("destination-out");
        ctx.set_image_smoothing_enabled(false);
        ctx.set_image_smoothing_quality("high");
        ctx.set_direction("rtl");
        ctx.set_text_baseline("middle");
        assert_eq!(ctx.shadow_offset(), (1.0, 2.0));
        assert_eq!(ctx.pending().len(), 14);

        ctx.restore();
        assert_eq!(ctx.line_cap(), "butt");
        assert_eq!(ctx.line_join(), "miter");
        assert_eq!(ctx.miter_limit(), 10.0);
        assert_eq!(ctx.line_dash_offset(), 0.0);
        assert_eq!(ctx.shadow_blur(), 0.0);
        assert_eq!(ctx.shadow_color(), "#000000");
        assert_eq!(ctx.shadow_offset(), (0.0, 0.0));
        assert_eq!(ctx.global_composite_operation(), "source-over");
        assert!(ctx.image_smoothing_enabled());
        assert_eq!(ctx.image_smoothing_quality(), "low");
        assert_eq!(ctx.direction(), "inherit");
        assert_eq!(ctx.text_baseline(), "alphabetic");
    }

    #[test]
    fn gradient_and_pattern_paints_are_shadowed() {
        let (mut ctx, _) = context();
        let mut gradient = ctx.create_linear_gradient(0.0, 0.0, 32.0, 0.0);
        assert!(gradient.add_color_stop(0.0, "#07c160"));
        assert!(gradient.add_color_stop(1.0, "#ffffff"));
        ctx.set_fill_gradient(gradient.clone());

        let pattern = ctx.create_pattern("tile.png", None);
        ctx.set_stroke_pattern(pattern.clone());

        assert_eq!(ctx.fill_style(), &PaintStyle::Gradient(gradient.clone()));
        assert_eq!(ctx.fill_style().as_color(), None);
        assert_eq!(ctx.stroke_style(), &PaintStyle::Pattern(pattern.clone()));
        assert_eq!(pattern.repetition, "repeat");

        let message = ctx.flush().expect("canvas message");
        assert_eq!(
            message.commands,
            vec![
                CanvasCommand::SetFillStyleByGradient(gradient),
                CanvasCommand::SetStrokeStyleByPattern(pattern),
            ]
        );

        let radial = ctx.create_radial_gradient(8.0, 8.0, 0.0, 8.0, 8.0, 8.0);
        ctx.set_stroke_gradient(radial);
        ctx.set_fill_pattern(ctx.create_pattern("dots.png", Some("repeat-x")));
        let conic = ctx.create_conic_gradient(0.0, 8.0, 8.0);
        ctx.set_fill_gradient(conic.clone());
        assert_eq!(ctx.fill_style(), &PaintStyle::Gradient(conic));
        assert_eq!(ctx.pending().len(), 3);
    }

    #[test]
    fn path_and_text_drawing_calls_queue_in_order() {
        let (mut ctx, _) = context();
        ctx.begin_path();
        ctx.quadratic_curve_to(1.0, 2.0, 3.0, 4.0);
        ctx.ellipse(10.0, 10.0, 5.0, 3.0, 0.0, 0.0, std::f64::consts::TAU, false);
        ctx.clip(None);
        ctx.clip_path(serde_json::json!({"ops": []}), Some("evenodd"));
        ctx.fill_path(serde_json::json!({"ops": []}), None);
        ctx.stroke_text("hi", 1.0, 2.0, None);
        ctx.put_image_data(
            ImageData {
                width: 1,
                height: 1,
                data: vec![0, 0, 0, 255],
            },
            0.0,
            0.0,
            None,
        );

        let opcodes: Vec<u8> = ctx
            .pending()
            .iter()
            .map(|command| command.opcode().code())
            .collect();
        assert_eq!(opcodes, vec![6, 30, 31, 32, 33, 34, 35, 36]);
    }

    #[test]
    fn out_of_range_alpha_is_ignored() {
        let (mut ctx, _) = context();
        ctx.set_global_alpha(1.5);
        assert_eq!(ctx.global_alpha(), 1.0);
        assert!(ctx.pending().is_empty());
    }

    #[test]
    fn draw_image_carries_optional_size() {
        let (mut ctx, _) = context();
        ctx.draw_image("a.png", 1.0, 2.0, None);
        ctx.draw_image("b.png", 1.0, 2.0, Some((30.0, 40.0)));

        assert_eq!(
            ctx.pending()[1],
            CanvasCommand::DrawImage {
                src: "b.png".to_string(),
                dx: 1.0,
                dy: 2.0,
                width: Some(30.0),
                height: Some(40.0),
            }
        );
    }
}
